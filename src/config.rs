use anyhow::{anyhow, Result};

use serde::Deserialize;

use crate::error::CaptureError;

/// Which tensor of the sampler callback to capture frames from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntermediateKind {
    #[default]
    Denoised,
    Noisy,
}

/// Per-run capture settings, as collected by the host UI. Immutable once a
/// run has started.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    /// Master switch. When false the engine installs nothing.
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub kind: IntermediateKind,
    /// Capture every N-th step. Step 0 (undenoised seed noise) is never
    /// captured.
    #[serde(default = "default_every_n")]
    pub every_n: u32,
    /// Stop a batch member early once this step is reached on the final
    /// pass. 0 means never stop early.
    #[serde(default)]
    pub stop_at_n: u32,
    #[serde(default)]
    pub save_timelapse: bool,
    /// Display duration of one timelapse frame, in milliseconds.
    #[serde(default = "default_frame_duration_ms")]
    pub frame_duration_ms: u32,
    #[serde(default = "default_true")]
    pub resize_timelapse: bool,
    /// Integer upscale applied to every timelapse frame when
    /// `resize_timelapse` is set.
    #[serde(default = "default_upscale_factor")]
    pub upscale_factor: u32,
    /// Write each captured frame as its own file (in addition to, or
    /// instead of, buffering for the timelapse).
    #[serde(default = "default_true")]
    pub save_intermediate_files: bool,
}

fn default_every_n() -> u32 {
    5
}

fn default_frame_duration_ms() -> u32 {
    100
}

fn default_upscale_factor() -> u32 {
    4
}

fn default_true() -> bool {
    true
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            active: false,
            kind: IntermediateKind::Denoised,
            every_n: default_every_n(),
            stop_at_n: 0,
            save_timelapse: false,
            frame_duration_ms: default_frame_duration_ms(),
            resize_timelapse: true,
            upscale_factor: default_upscale_factor(),
            save_intermediate_files: true,
        }
    }
}

impl CaptureConfig {
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents).map_err(|error| {
            let location = error
                .location()
                .map(|location| format!("line {}, column {}", location.line(), location.column()))
                .unwrap_or_else(|| "unknown location".to_owned());
            anyhow!(CaptureError::invalid_config(format!(
                "failed to parse capture config at {location}: {error}"
            )))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the UI ranges should have prevented. Runs before
    /// any step callback; a failure aborts capture for this run only.
    pub fn validate(&self) -> Result<()> {
        if self.every_n == 0 {
            return Err(CaptureError::invalid_config("every_n must be > 0").into());
        }
        if self.frame_duration_ms < 10 || self.frame_duration_ms > 1000 {
            return Err(CaptureError::invalid_config(format!(
                "frame_duration_ms must be within 10..=1000, got {}",
                self.frame_duration_ms
            ))
            .into());
        }
        if self.upscale_factor < 1 || self.upscale_factor > 10 {
            return Err(CaptureError::invalid_config(format!(
                "upscale_factor must be within 1..=10, got {}",
                self.upscale_factor
            ))
            .into());
        }
        Ok(())
    }

    /// `stop_at_n` rounded down to the nearest multiple of `every_n`;
    /// stop steps must line up with the capture cadence.
    pub fn normalized_stop_at(&self) -> u32 {
        self.stop_at_n / self.every_n * self.every_n
    }
}

/// The host's global file-naming mode, read once per run. Mirrors the
/// naming the pipeline uses for its own final images so that intermediates
/// sort alongside them.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamingQuirks {
    /// True when the host prefixes final images with an auto-incremented
    /// number. Sequence numbers are then 5 digits wide and reused from the
    /// rendered base name; otherwise they are 6 digits wide and allocated
    /// from the intermediates directory itself.
    #[serde(default = "default_true")]
    pub add_sequence_number: bool,
    /// Base decoration template rendered by the host's templater.
    #[serde(default = "default_filename_template")]
    pub filename_template: String,
}

fn default_filename_template() -> String {
    "[seed]-[prompt_spaces]".to_owned()
}

impl Default for NamingQuirks {
    fn default() -> Self {
        Self {
            add_sequence_number: true,
            filename_template: default_filename_template(),
        }
    }
}

impl NamingQuirks {
    /// Zero-padding width for sequence numbers under this naming mode.
    pub fn sequence_digits(&self) -> usize {
        if self.add_sequence_number {
            5
        } else {
            6
        }
    }
}

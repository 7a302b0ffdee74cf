use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use image::RgbaImage;

use crate::config::{CaptureConfig, IntermediateKind, NamingQuirks};
use crate::error::CaptureError;
use crate::filename::{compose, specialize_suffix};
use crate::host::{FilenameTemplater, ImageWriter, RunContext};
use crate::policy::{FrameDisposition, RunState};
use crate::sequence::SequenceAllocation;
use crate::timelapse;

/// Subdirectory of the host's output directory that holds per-run
/// intermediate captures.
pub const INTERMEDIATES_DIRNAME: &str = "intermediates";

/// The intermediate-capture engine for one generation run. Drives the
/// sequence allocator, filename composer, and capture policy once per
/// sampler step, then assembles the timelapse in `finish`.
///
/// Synchronous and single-threaded: the host calls `on_step` once per
/// diffusion step in increasing step order within a pass, and `finish`
/// once in postprocessing.
pub struct CaptureEngine<W, T> {
    config: CaptureConfig,
    naming: NamingQuirks,
    writer: W,
    templater: T,
    run: Option<RunState>,
}

impl<W: ImageWriter, T: FilenameTemplater> CaptureEngine<W, T> {
    /// Validates the configuration up front; an `InvalidConfig` here means
    /// the feature is skipped for this run and generation proceeds bare.
    pub fn new(config: CaptureConfig, naming: NamingQuirks, writer: W, templater: T) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            naming,
            writer,
            templater,
            run: None,
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn run_state(&self) -> Option<&RunState> {
        self.run.as_ref()
    }

    /// Per-step entry point. Decides, for every batch member, whether this
    /// step's frame is captured, early-final, or skipped, and performs the
    /// writes. Errors abort capture for this run only; the host's own
    /// sampling is untouched.
    pub fn on_step(
        &mut self,
        ctx: &mut dyn RunContext,
        step: u32,
        denoised: &[RgbaImage],
        noisy: &[RgbaImage],
    ) -> Result<()> {
        if self.run.is_none() {
            // The sampler reports step 0 first; run setup (directories,
            // sequence allocation, per-member identities) happens exactly
            // once, before any member of the batch is considered.
            self.run = Some(self.begin_run(ctx)?);
        }
        let Some(run) = self.run.as_mut() else {
            return Ok(());
        };

        // Pass bookkeeping runs on every step, captured or not, so the
        // first-to-final transition is seen even between capture points.
        run.observe_step(step);

        if step % self.config.every_n != 0 {
            return Ok(());
        }

        let batch_size = ctx.batch_size();
        let frames = match self.config.kind {
            IntermediateKind::Denoised => denoised,
            IntermediateKind::Noisy => noisy,
        };

        for index in 0..batch_size {
            let disposition = run.decide(self.config.every_n, step, index, batch_size);
            if matches!(disposition, FrameDisposition::Skip) {
                continue;
            }
            let image = frames.get(index).ok_or_else(|| {
                anyhow!(
                    "host delivered {} frames for batch size {batch_size}",
                    frames.len()
                )
            })?;
            let metadata = format!("{}, intermediate: {step:03}", ctx.generation_metadata(index));

            match disposition {
                FrameDisposition::Skip => continue,
                FrameDisposition::Intermediate => {
                    let filename = compose(
                        &run.member_numbers[index],
                        step,
                        run.pass_tag(),
                        &run.member_suffixes[index],
                    );
                    if self.config.save_timelapse {
                        run.timelapse_frames.push(image.clone());
                    }
                    if self.config.save_intermediate_files {
                        self.writer
                            .write(image, &run.intermediates_dir, &metadata, Some(&filename))?;
                    }
                }
                FrameDisposition::EarlyFinal { interrupt } => {
                    // This frame replaces the member's final image: the
                    // host must not save its own, and the frame goes to
                    // the main output location under default naming.
                    ctx.suppress_default_save(index);
                    if self.config.save_timelapse {
                        run.timelapse_frames.push(image.clone());
                    }
                    if self.config.save_intermediate_files {
                        self.writer.write(image, ctx.output_dir(), &metadata, None)?;
                    }
                    if interrupt {
                        ctx.interrupt();
                        run.mark_done();
                    }
                }
            }
        }

        Ok(())
    }

    /// Postprocessing: assembles the timelapse when enabled and consumes
    /// the run state. Returns the artifact path, if one was written.
    pub fn finish(&mut self) -> Result<Option<PathBuf>> {
        let run = self.run.take();
        if !self.config.save_timelapse {
            return Ok(None);
        }
        let Some(run) = run else {
            return Err(CaptureError::empty_timelapse().into());
        };
        let path = timelapse::assemble(
            run.timelapse_frames,
            self.config.frame_duration_ms,
            self.config.resize_timelapse,
            self.config.upscale_factor,
            &run.intermediates_dir,
        )?;
        Ok(Some(path))
    }

    fn begin_run(&self, ctx: &mut dyn RunContext) -> Result<RunState> {
        let output_dir = ctx.output_dir().to_path_buf();
        let intermediates_root = output_dir.join(INTERMEDIATES_DIRNAME);
        fs::create_dir_all(&intermediates_root).map_err(|error| {
            CaptureError::io(format!(
                "failed to create {}: {error}",
                intermediates_root.display()
            ))
        })?;

        let decoration = self
            .templater
            .render(&self.naming.filename_template, &*ctx);
        // Auto-number naming shares the finals' numbering, so the scan
        // targets the main output directory; otherwise runs are numbered
        // within the intermediates root itself.
        let scan_dir = if self.naming.add_sequence_number {
            &output_dir
        } else {
            &intermediates_root
        };
        let allocation = SequenceAllocation::allocate(scan_dir, decoration, &self.naming)?;

        let batch_size = ctx.batch_size();
        let primary_seed = ctx.seed();
        let member_numbers = (0..batch_size)
            .map(|index| allocation.member_number(index))
            .collect::<Vec<_>>();
        let member_suffixes = (0..batch_size)
            .map(|index| {
                let member_seed = ctx
                    .all_seeds()
                    .get(index)
                    .copied()
                    .unwrap_or(primary_seed);
                specialize_suffix(&allocation.suffix, primary_seed, member_seed)
            })
            .collect::<Vec<_>>();

        let run_dir = intermediates_root.join(allocation.run_dir_name());
        fs::create_dir_all(&run_dir).map_err(|error| {
            CaptureError::io(format!("failed to create {}: {error}", run_dir.display()))
        })?;

        Ok(RunState::new(
            ctx.two_pass(),
            self.config.normalized_stop_at(),
            allocation,
            member_numbers,
            member_suffixes,
            run_dir,
        ))
    }
}

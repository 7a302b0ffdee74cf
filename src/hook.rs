use std::path::PathBuf;

use anyhow::Result;
use image::RgbaImage;

use crate::config::{CaptureConfig, NamingQuirks};
use crate::engine::CaptureEngine;
use crate::error::find_capture_error;
use crate::host::{FilenameTemplater, ImageWriter, RunContext};

/// The host sampler's per-step callback seam. The pipeline invokes this
/// once per diffusion step with both candidate tensors already decoded to
/// images.
pub trait StepCallback {
    fn on_step(
        &mut self,
        ctx: &mut dyn RunContext,
        step: u32,
        denoised: &[RgbaImage],
        noisy: &[RgbaImage],
    ) -> Result<()>;
}

/// Wraps the pipeline's original step callback for one run: the capture
/// engine observes each step first, then the original callback runs
/// unchanged, whatever the engine did or failed to do.
///
/// Installation is explicit per run and fully reversible: `finish`
/// performs postprocessing and hands the original callback back, so a
/// disabled or failed feature leaves the pipeline exactly as it was.
pub struct CaptureHook<C, W, T> {
    original: C,
    engine: Option<CaptureEngine<W, T>>,
}

impl<C, W, T> CaptureHook<C, W, T>
where
    C: StepCallback,
    W: ImageWriter,
    T: FilenameTemplater,
{
    /// Wraps `original` for one run. An inactive or invalid configuration
    /// installs a pass-through: generation proceeds without capture.
    pub fn install(
        original: C,
        config: CaptureConfig,
        naming: NamingQuirks,
        writer: W,
        templater: T,
    ) -> Self {
        let engine = if config.active {
            match CaptureEngine::new(config, naming, writer, templater) {
                Ok(engine) => Some(engine),
                Err(error) => {
                    eprintln!("stepshot: capture disabled for this run: {error:#}");
                    None
                }
            }
        } else {
            None
        };
        Self { original, engine }
    }

    pub fn is_capturing(&self) -> bool {
        self.engine.is_some()
    }

    /// Postprocessing: assembles the timelapse if one is due, then
    /// restores the original callback. `EmptyTimelapse` and I/O failures
    /// are logged, never propagated; capture is best-effort.
    pub fn finish(mut self) -> (C, Option<PathBuf>) {
        let artifact = match self.engine.as_mut().map(CaptureEngine::finish) {
            Some(Ok(path)) => path,
            Some(Err(error)) => {
                if find_capture_error(&error).is_some() {
                    eprintln!("stepshot: skipping timelapse: {error:#}");
                } else {
                    eprintln!("stepshot: postprocessing failed: {error:#}");
                }
                None
            }
            None => None,
        };
        (self.original, artifact)
    }
}

impl<C, W, T> StepCallback for CaptureHook<C, W, T>
where
    C: StepCallback,
    W: ImageWriter,
    T: FilenameTemplater,
{
    fn on_step(
        &mut self,
        ctx: &mut dyn RunContext,
        step: u32,
        denoised: &[RgbaImage],
        noisy: &[RgbaImage],
    ) -> Result<()> {
        if let Some(engine) = self.engine.as_mut() {
            if let Err(error) = engine.on_step(ctx, step, denoised, noisy) {
                // Capture failures abort capture only; the run goes on.
                eprintln!("stepshot: capture aborted for this run: {error:#}");
                self.engine = None;
            }
        }
        self.original.on_step(ctx, step, denoised, noisy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;
    use std::path::Path;
    use tempfile::tempdir;

    struct FakeRun {
        seeds: Vec<i64>,
        subseeds: Vec<i64>,
        prompt: String,
        prompts: Vec<String>,
        output_dir: PathBuf,
        suppressed: Vec<usize>,
        interrupts: u32,
    }

    impl FakeRun {
        fn new(output_dir: &Path) -> Self {
            Self {
                seeds: vec![77],
                subseeds: vec![0],
                prompt: "fern study".to_owned(),
                prompts: vec!["fern study".to_owned()],
                output_dir: output_dir.to_path_buf(),
                suppressed: Vec::new(),
                interrupts: 0,
            }
        }
    }

    impl RunContext for FakeRun {
        fn seed(&self) -> i64 {
            self.seeds[0]
        }
        fn all_seeds(&self) -> &[i64] {
            &self.seeds
        }
        fn all_subseeds(&self) -> &[i64] {
            &self.subseeds
        }
        fn prompt(&self) -> &str {
            &self.prompt
        }
        fn all_prompts(&self) -> &[String] {
            &self.prompts
        }
        fn batch_size(&self) -> usize {
            self.seeds.len()
        }
        fn output_dir(&self) -> &Path {
            &self.output_dir
        }
        fn two_pass(&self) -> bool {
            false
        }
        fn generation_metadata(&self, _batch_index: usize) -> String {
            format!("seed: {}", self.seeds[0])
        }
        fn suppress_default_save(&mut self, batch_index: usize) {
            self.suppressed.push(batch_index);
        }
        fn interrupt(&mut self) {
            self.interrupts += 1;
        }
    }

    #[derive(Default)]
    struct CountingCallback {
        steps: Vec<u32>,
    }

    impl StepCallback for CountingCallback {
        fn on_step(
            &mut self,
            _ctx: &mut dyn RunContext,
            step: u32,
            _denoised: &[RgbaImage],
            _noisy: &[RgbaImage],
        ) -> Result<()> {
            self.steps.push(step);
            Ok(())
        }
    }

    #[derive(Default)]
    struct NullWriter {
        writes: usize,
    }

    impl ImageWriter for NullWriter {
        fn write(
            &mut self,
            _image: &RgbaImage,
            dir: &Path,
            _metadata: &str,
            forced_filename: Option<&str>,
        ) -> Result<PathBuf> {
            self.writes += 1;
            Ok(dir.join(forced_filename.unwrap_or("default")))
        }
    }

    struct FailingWriter;

    impl ImageWriter for FailingWriter {
        fn write(
            &mut self,
            _image: &RgbaImage,
            _dir: &Path,
            _metadata: &str,
            _forced_filename: Option<&str>,
        ) -> Result<PathBuf> {
            Err(CaptureError::io("disk full").into())
        }
    }

    struct PassthroughTemplater;

    impl FilenameTemplater for PassthroughTemplater {
        fn render(&self, _template: &str, ctx: &dyn RunContext) -> String {
            format!("{}-{}", ctx.seed(), ctx.prompt())
        }
    }

    fn frames(count: usize) -> Vec<RgbaImage> {
        vec![RgbaImage::from_pixel(4, 4, image::Rgba([9, 9, 9, 255])); count]
    }

    #[test]
    fn inactive_config_is_pure_passthrough() {
        let dir = tempdir().expect("tempdir");
        let mut ctx = FakeRun::new(dir.path());
        let mut hook = CaptureHook::install(
            CountingCallback::default(),
            CaptureConfig::default(),
            NamingQuirks::default(),
            NullWriter::default(),
            PassthroughTemplater,
        );
        assert!(!hook.is_capturing());

        let images = frames(1);
        for step in 0..=6 {
            hook.on_step(&mut ctx, step, &images, &images)
                .expect("forwarding should succeed");
        }
        let (original, artifact) = hook.finish();
        assert_eq!(original.steps, (0..=6).collect::<Vec<_>>());
        assert!(artifact.is_none());
        assert!(!dir.path().join("intermediates").exists());
    }

    #[test]
    fn original_callback_always_runs_after_the_engine() {
        let dir = tempdir().expect("tempdir");
        let mut ctx = FakeRun::new(dir.path());
        let mut hook = CaptureHook::install(
            CountingCallback::default(),
            CaptureConfig {
                active: true,
                every_n: 2,
                ..CaptureConfig::default()
            },
            NamingQuirks::default(),
            NullWriter::default(),
            PassthroughTemplater,
        );
        assert!(hook.is_capturing());

        let images = frames(1);
        for step in 0..=4 {
            hook.on_step(&mut ctx, step, &images, &images)
                .expect("forwarding should succeed");
        }
        let (original, _) = hook.finish();
        assert_eq!(original.steps, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn invalid_config_disables_capture_but_not_forwarding() {
        let dir = tempdir().expect("tempdir");
        let mut ctx = FakeRun::new(dir.path());
        let mut hook = CaptureHook::install(
            CountingCallback::default(),
            CaptureConfig {
                active: true,
                every_n: 0,
                ..CaptureConfig::default()
            },
            NamingQuirks::default(),
            NullWriter::default(),
            PassthroughTemplater,
        );
        assert!(!hook.is_capturing());

        let images = frames(1);
        hook.on_step(&mut ctx, 0, &images, &images)
            .expect("forwarding should succeed");
        let (original, _) = hook.finish();
        assert_eq!(original.steps, vec![0]);
    }

    #[test]
    fn engine_failure_disables_capture_for_the_rest_of_the_run() {
        let dir = tempdir().expect("tempdir");
        let mut ctx = FakeRun::new(dir.path());
        let mut hook = CaptureHook::install(
            CountingCallback::default(),
            CaptureConfig {
                active: true,
                every_n: 2,
                ..CaptureConfig::default()
            },
            NamingQuirks::default(),
            FailingWriter,
            PassthroughTemplater,
        );

        let images = frames(1);
        for step in 0..=4 {
            hook.on_step(&mut ctx, step, &images, &images)
                .expect("forwarding must survive engine failure");
        }
        assert!(!hook.is_capturing(), "first write failure disables capture");
        let (original, artifact) = hook.finish();
        assert_eq!(original.steps, vec![0, 1, 2, 3, 4]);
        assert!(artifact.is_none());
    }

    #[test]
    fn finish_returns_timelapse_path() {
        let dir = tempdir().expect("tempdir");
        let mut ctx = FakeRun::new(dir.path());
        let mut hook = CaptureHook::install(
            CountingCallback::default(),
            CaptureConfig {
                active: true,
                every_n: 2,
                save_timelapse: true,
                resize_timelapse: false,
                ..CaptureConfig::default()
            },
            NamingQuirks::default(),
            NullWriter::default(),
            PassthroughTemplater,
        );

        let images = frames(1);
        for step in 0..=4 {
            hook.on_step(&mut ctx, step, &images, &images)
                .expect("forwarding should succeed");
        }
        let (_, artifact) = hook.finish();
        let artifact = artifact.expect("timelapse should be written");
        assert!(artifact.ends_with("timelapse.gif"));
        assert!(artifact.is_file());
    }

    #[test]
    fn empty_timelapse_is_logged_not_propagated() {
        let dir = tempdir().expect("tempdir");
        let mut ctx = FakeRun::new(dir.path());
        let mut hook = CaptureHook::install(
            CountingCallback::default(),
            CaptureConfig {
                active: true,
                every_n: 10,
                save_timelapse: true,
                save_intermediate_files: false,
                ..CaptureConfig::default()
            },
            NamingQuirks::default(),
            NullWriter::default(),
            PassthroughTemplater,
        );

        let images = frames(1);
        for step in 0..=3 {
            hook.on_step(&mut ctx, step, &images, &images)
                .expect("forwarding should succeed");
        }
        let (original, artifact) = hook.finish();
        assert!(artifact.is_none());
        assert_eq!(original.steps.len(), 4);
    }
}

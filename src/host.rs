use std::path::{Path, PathBuf};

use anyhow::Result;
use image::RgbaImage;

/// Read/write window onto one generation run, provided by the host
/// pipeline. Seeds are the host's sampler seeds; one per batch member.
pub trait RunContext {
    fn seed(&self) -> i64;
    fn all_seeds(&self) -> &[i64];
    fn all_subseeds(&self) -> &[i64];
    fn prompt(&self) -> &str;
    fn all_prompts(&self) -> &[String];
    fn batch_size(&self) -> usize;
    /// Base directory the host writes final images to.
    fn output_dir(&self) -> &Path;
    /// True when this run does a low-resolution pass followed by a
    /// high-resolution refinement pass.
    fn two_pass(&self) -> bool;
    /// The host's standard generation-parameters string for one member, as
    /// embedded in written image metadata.
    fn generation_metadata(&self, batch_index: usize) -> String;
    /// Tell the host not to save its own final image for this member; the
    /// engine has already written the early-final frame in its place.
    fn suppress_default_save(&mut self, batch_index: usize);
    /// Advisory stop: every member has reached its stop step, remaining
    /// sampler work is wasted. The host stops issuing step callbacks.
    fn interrupt(&mut self);
}

/// The host's image encoder. `forced_filename` carries no extension; the
/// writer picks its configured format. `None` means the writer applies its
/// own default naming convention.
pub trait ImageWriter {
    fn write(
        &mut self,
        image: &RgbaImage,
        dir: &Path,
        metadata: &str,
        forced_filename: Option<&str>,
    ) -> Result<PathBuf>;
}

/// Token-based filename templating (seed/prompt tokens), owned by the
/// host. Rendered exactly once per run to derive the base naming pattern.
pub trait FilenameTemplater {
    fn render(&self, template: &str, ctx: &dyn RunContext) -> String;
}

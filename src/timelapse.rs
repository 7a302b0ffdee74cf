use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::gif::{GifEncoder, Repeat};
use image::imageops::{self, FilterType};
use image::{Delay, Frame, RgbaImage};

use crate::error::CaptureError;

pub const TIMELAPSE_FILENAME: &str = "timelapse.gif";

/// Upscales one frame by an integer factor. Lanczos keeps the blocky
/// low-step captures legible at display size.
pub fn upscale_frame(frame: &RgbaImage, factor: u32) -> RgbaImage {
    imageops::resize(
        frame,
        frame.width() * factor,
        frame.height() * factor,
        FilterType::Lanczos3,
    )
}

/// Encodes the run's captured frames into a single looping GIF in
/// `out_dir`, one visual frame per capture, each shown for
/// `frame_duration_ms`. Runs once, at run completion. An empty buffer is a
/// contract violation: `EmptyTimelapse` is returned instead of a 0-frame
/// file.
pub fn assemble(
    frames: Vec<RgbaImage>,
    frame_duration_ms: u32,
    resize: bool,
    upscale_factor: u32,
    out_dir: &Path,
) -> Result<PathBuf> {
    if frames.is_empty() {
        return Err(CaptureError::empty_timelapse().into());
    }

    let output_path = out_dir.join(TIMELAPSE_FILENAME);
    let file = File::create(&output_path).map_err(|error| {
        CaptureError::io(format!(
            "failed to create {}: {error}",
            output_path.display()
        ))
    })?;

    let mut encoder = GifEncoder::new(BufWriter::new(file));
    encoder
        .set_repeat(Repeat::Infinite)
        .context("failed to set gif loop count")?;

    let delay = Delay::from_numer_denom_ms(frame_duration_ms, 1);
    for frame in frames {
        let frame = if resize && upscale_factor > 1 {
            upscale_frame(&frame, upscale_factor)
        } else {
            frame
        };
        encoder
            .encode_frame(Frame::from_parts(frame, 0, 0, delay))
            .with_context(|| format!("failed to encode gif frame in {}", output_path.display()))?;
    }
    drop(encoder);

    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{find_capture_error, CaptureErrorKind};
    use image::Rgba;
    use tempfile::tempdir;

    fn solid(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(rgba))
    }

    #[test]
    fn upscale_multiplies_dimensions_uniformly() {
        let frame = solid(64, 64, [200, 40, 40, 255]);
        let upscaled = upscale_frame(&frame, 3);
        assert_eq!((upscaled.width(), upscaled.height()), (192, 192));
    }

    #[test]
    fn empty_buffer_is_rejected_not_written() {
        let dir = tempdir().expect("tempdir");
        let error = assemble(Vec::new(), 100, false, 1, dir.path()).expect_err("must fail");
        let capture = find_capture_error(&error).expect("capture error in chain");
        assert_eq!(capture.kind, CaptureErrorKind::EmptyTimelapse);
        assert!(!dir.path().join(TIMELAPSE_FILENAME).exists());
    }

    #[test]
    fn assemble_writes_a_gif_per_frame() {
        let dir = tempdir().expect("tempdir");
        let frames = vec![
            solid(8, 8, [255, 0, 0, 255]),
            solid(8, 8, [0, 255, 0, 255]),
            solid(8, 8, [0, 0, 255, 255]),
        ];
        let path = assemble(frames, 100, false, 1, dir.path()).expect("assemble");
        assert_eq!(path, dir.path().join(TIMELAPSE_FILENAME));
        let bytes = std::fs::read(&path).expect("gif should exist");
        assert_eq!(&bytes[..6], b"GIF89a");
    }

    #[test]
    fn assemble_with_resize_scales_before_encoding() {
        let dir = tempdir().expect("tempdir");
        let frames = vec![solid(8, 8, [10, 20, 30, 255])];
        let path = assemble(frames, 50, true, 4, dir.path()).expect("assemble");
        let decoded = image::open(&path).expect("gif should decode").to_rgba8();
        assert_eq!((decoded.width(), decoded.height()), (32, 32));
    }

    #[test]
    fn missing_output_dir_is_an_io_error() {
        let dir = tempdir().expect("tempdir");
        let gone = dir.path().join("never-created");
        let frames = vec![solid(4, 4, [0, 0, 0, 255])];
        let error = assemble(frames, 100, false, 1, &gone).expect_err("must fail");
        let capture = find_capture_error(&error).expect("capture error in chain");
        assert_eq!(capture.kind, CaptureErrorKind::Io);
    }
}

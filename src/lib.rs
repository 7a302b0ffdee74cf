//! stepshot: intermediate-image capture for diffusion sampling pipelines.
//!
//! The host pipeline exposes a per-step callback carrying the current
//! denoised and noisy tensors as images. stepshot wraps that callback
//! ([`hook::CaptureHook`]) and, on every step and for every batch member,
//! decides whether to capture the frame, what stable sequence number and
//! filename it gets across a two-pass (high-res fix) run, whether the
//! member's early-stop point was reached, and finally assembles the
//! captured frames into a looping timelapse GIF.
//!
//! Capture is best-effort instrumentation: every failure is local to the
//! engine and the original callback always runs.

pub mod config;
pub mod engine;
pub mod error;
pub mod filename;
pub mod hook;
pub mod host;
pub mod policy;
pub mod sequence;
pub mod timelapse;

pub use config::{CaptureConfig, IntermediateKind, NamingQuirks};
pub use engine::{CaptureEngine, INTERMEDIATES_DIRNAME};
pub use error::{CaptureError, CaptureErrorKind};
pub use hook::{CaptureHook, StepCallback};
pub use host::{FilenameTemplater, ImageWriter, RunContext};

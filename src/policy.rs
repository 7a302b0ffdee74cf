use std::path::PathBuf;

use image::RgbaImage;

use crate::sequence::SequenceAllocation;

/// Filename tag for the pass a captured frame belongs to. Only emitted for
/// two-pass (high-res fix) runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTag {
    First,
    Final,
}

impl PassTag {
    pub fn label(self) -> &'static str {
        match self {
            Self::First => "p1",
            Self::Final => "p2",
        }
    }
}

/// Where a run is in its denoising sweeps. Two-pass runs traverse
/// `FirstPass -> FinalPass`; single-pass runs start in `FinalPass`.
/// `Done` is entered after the early-stop interrupt; every later callback
/// is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    FirstPass,
    FinalPass,
    Done,
}

/// Pass-boundary detection: the sampler reports strictly increasing step
/// indices within one pass, so a step at or below the observed maximum
/// means a new pass has begun.
pub fn detect_pass_boundary(prev_max: u32, current_step: u32) -> bool {
    current_step <= prev_max
}

/// What to do with one batch member's frame at one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    Skip,
    /// Mid-run capture: write to the intermediates directory under the
    /// composed name.
    Intermediate,
    /// The member's stop step on its final pass: this frame *is* the
    /// member's final image. Suppress the host's own save and write to the
    /// main output location instead.
    EarlyFinal { interrupt: bool },
}

/// Mutable context for one generation run. Created lazily on the first
/// observed step, owned by the engine, dropped when postprocessing
/// completes. Never shared across runs.
#[derive(Debug)]
pub struct RunState {
    phase: RunPhase,
    two_pass: bool,
    max_step_seen: Option<u32>,
    /// Normalized early-stop step; 0 means never stop early.
    pub stop_at_step: u32,
    pub allocation: SequenceAllocation,
    /// Zero-padded per-member numbers, `allocation.number + index`.
    pub member_numbers: Vec<String>,
    /// Per-member seed-specialized suffixes.
    pub member_suffixes: Vec<String>,
    /// `<output_dir>/intermediates/<run number>`.
    pub intermediates_dir: PathBuf,
    pub timelapse_frames: Vec<RgbaImage>,
}

impl RunState {
    pub fn new(
        two_pass: bool,
        stop_at_step: u32,
        allocation: SequenceAllocation,
        member_numbers: Vec<String>,
        member_suffixes: Vec<String>,
        intermediates_dir: PathBuf,
    ) -> Self {
        Self {
            phase: if two_pass {
                RunPhase::FirstPass
            } else {
                RunPhase::FinalPass
            },
            two_pass,
            max_step_seen: None,
            stop_at_step,
            allocation,
            member_numbers,
            member_suffixes,
            intermediates_dir,
            timelapse_frames: Vec::new(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// True until the first pass of a two-pass run has ended. Single-pass
    /// runs are never in their first pass.
    pub fn in_first_pass(&self) -> bool {
        self.phase == RunPhase::FirstPass
    }

    /// Per-step bookkeeping, run for every callback before any capture
    /// decision. Advances `FirstPass -> FinalPass` when the step index
    /// regresses.
    pub fn observe_step(&mut self, step: u32) {
        if self.phase == RunPhase::Done {
            return;
        }
        if let Some(max) = self.max_step_seen {
            if detect_pass_boundary(max, step) {
                if self.phase == RunPhase::FirstPass {
                    self.phase = RunPhase::FinalPass;
                }
                self.max_step_seen = Some(step);
                return;
            }
        }
        self.max_step_seen = Some(step);
    }

    pub fn mark_done(&mut self) {
        self.phase = RunPhase::Done;
    }

    /// Pass tag for composed filenames; None for single-pass runs.
    pub fn pass_tag(&self) -> Option<PassTag> {
        if !self.two_pass {
            return None;
        }
        match self.phase {
            RunPhase::FirstPass => Some(PassTag::First),
            RunPhase::FinalPass | RunPhase::Done => Some(PassTag::Final),
        }
    }

    /// The per-step decision for one batch member. Pure in the state:
    /// callers apply the side effects.
    pub fn decide(
        &self,
        every_n: u32,
        step: u32,
        batch_index: usize,
        batch_size: usize,
    ) -> FrameDisposition {
        if self.phase == RunPhase::Done {
            return FrameDisposition::Skip;
        }
        // The undenoised seed image is never captured; step 0 only does
        // one-time run setup.
        if step == 0 || step % every_n != 0 {
            return FrameDisposition::Skip;
        }
        if self.stop_at_step != 0 && step == self.stop_at_step && self.phase == RunPhase::FinalPass
        {
            return FrameDisposition::EarlyFinal {
                interrupt: batch_index + 1 == batch_size,
            };
        }
        FrameDisposition::Intermediate
    }
}

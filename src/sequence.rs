use std::fs;
use std::path::Path;

use anyhow::Result;
use regex::Regex;

use crate::config::NamingQuirks;
use crate::error::CaptureError;

/// Next unused sequence number in `dir`: one past the highest leading
/// integer among existing entry stems, 0 for an empty directory. The
/// directory must already exist; scan failures are I/O errors (one-shot
/// setup, no retry).
pub fn next_sequence_number(dir: &Path) -> Result<u64> {
    let leading_digits = Regex::new(r"^(\d+)").expect("static regex must compile");
    let entries = fs::read_dir(dir).map_err(|error| {
        CaptureError::io(format!("failed to scan {}: {error}", dir.display()))
    })?;

    let mut highest: Option<u64> = None;
    for entry in entries {
        let entry = entry.map_err(|error| {
            CaptureError::io(format!("failed to scan {}: {error}", dir.display()))
        })?;
        let name = entry.file_name();
        let Some(stem) = Path::new(&name).file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let Some(captures) = leading_digits.captures(stem) else {
            continue;
        };
        // Absurdly long digit runs are not sequence numbers; skip them.
        let Ok(number) = captures[1].parse::<u64>() else {
            continue;
        };
        highest = Some(highest.map_or(number, |current| current.max(number)));
    }

    Ok(highest.map_or(0, |current| current + 1))
}

/// One run's sequence identity, allocated exactly once on batch index 0 of
/// step 0 of the first pass and shared by every batch member.
#[derive(Debug, Clone)]
pub struct SequenceAllocation {
    pub number: u64,
    pub digits: usize,
    /// Seed/prompt decoration shared by the run, before per-member seed
    /// substitution.
    pub suffix: String,
}

impl SequenceAllocation {
    /// Allocates the run's number from a directory scan. Under auto-number
    /// naming `scan_dir` is the host's main output directory, so
    /// intermediates share the number the host gives the finals; otherwise
    /// it is the intermediates root itself.
    pub fn allocate(scan_dir: &Path, suffix: String, quirks: &NamingQuirks) -> Result<Self> {
        Ok(Self {
            number: next_sequence_number(scan_dir)?,
            digits: quirks.sequence_digits(),
            suffix,
        })
    }

    /// Zero-padded number for one batch member: base + index, contiguous
    /// within the run regardless of save order.
    pub fn member_number(&self, batch_index: usize) -> String {
        format!(
            "{:0width$}",
            self.number + batch_index as u64,
            width = self.digits
        )
    }

    /// Directory name for this run under the intermediates root.
    pub fn run_dir_name(&self) -> String {
        self.member_number(0)
    }
}

//! Pure filename derivation for captured frames. Everything here is
//! deterministic: same inputs, same string, no clock involved.

use crate::policy::PassTag;

/// Re-specializes the run's shared suffix for one batch member by
/// substituting that member's seed for the run's primary seed. First
/// occurrence only: a prompt that happens to contain the seed's digits
/// must not be rewritten twice.
pub fn specialize_suffix(suffix: &str, primary_seed: i64, member_seed: i64) -> String {
    suffix.replacen(&primary_seed.to_string(), &member_seed.to_string(), 1)
}

/// Composed intermediate filename:
/// `"{member_number}-{step:03}[-p1|-p2]-{suffix}"`. The pass tag appears
/// only for two-pass runs.
pub fn compose(member_number: &str, step: u32, pass: Option<PassTag>, suffix: &str) -> String {
    match pass {
        Some(tag) => format!("{member_number}-{step:03}-{}-{suffix}", tag.label()),
        None => format!("{member_number}-{step:03}-{suffix}"),
    }
}

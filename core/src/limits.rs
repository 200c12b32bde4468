//! Clamping of caller-supplied knobs and the per-run probe budget.

use std::time::Duration;

pub const MIN_TIMEOUT_SECS: u64 = 1;
pub const MAX_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub const MIN_ROUNDS: u32 = 1;
pub const MAX_ROUNDS: u32 = 100;

/// Upper bound on rounds x batch size for one run.
pub const MAX_PROBES_PER_RUN: usize = 5_000;

/// Default ceiling on simultaneously open probes within one batch.
/// Equal to the run budget, so a budget-sized batch goes out in one wave.
pub const DEFAULT_MAX_IN_FLIGHT: usize = MAX_PROBES_PER_RUN;

pub fn clamp_timeout_secs(secs: i64) -> u64 {
    secs.clamp(MIN_TIMEOUT_SECS as i64, MAX_TIMEOUT_SECS as i64) as u64
}

pub fn probe_timeout(secs: i64) -> Duration {
    Duration::from_secs(clamp_timeout_secs(secs))
}

pub fn clamp_rounds(rounds: i64) -> u32 {
    rounds.clamp(MIN_ROUNDS as i64, MAX_ROUNDS as i64) as u32
}

/// Rounds that fit the run budget for a batch of `batch_size` URLs.
/// Never below one round, so a single oversized batch still runs once.
pub fn budget_rounds(rounds: u32, batch_size: usize) -> u32 {
    let rounds = clamp_rounds(i64::from(rounds));
    if batch_size == 0 {
        return rounds;
    }
    let fit = (MAX_PROBES_PER_RUN / batch_size).max(1);
    rounds.min(u32::try_from(fit).unwrap_or(u32::MAX))
}

//! Probe results and derived statistics. Never persisted.

use serde::Serialize;

/// Result of one probe against one URL.
///
/// Transport failures are data here: `ok == false` with `error` set and no
/// `status_code`. TLS details ride along in `ssl` for https targets only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub ssl: Option<SslInfo>,
}

impl ProbeResult {
    /// A completed HTTP exchange; `ok` iff the status is 2xx.
    pub fn response(status_code: u16, elapsed_ms: u64) -> Self {
        ProbeResult {
            ok: (200..300).contains(&status_code),
            status_code: Some(status_code),
            elapsed_ms,
            error: None,
            ssl: None,
        }
    }

    pub fn transport_error(error: impl Into<String>, elapsed_ms: u64) -> Self {
        ProbeResult { ok: false, status_code: None, elapsed_ms, error: Some(error.into()), ssl: None }
    }

    pub fn with_ssl(mut self, ssl: Option<SslInfo>) -> Self {
        self.ssl = ssl;
        self
    }

    pub fn outcome(&self) -> Outcome {
        if self.ok {
            Outcome::Success
        } else if self.status_code.is_some() || self.error.is_some() {
            Outcome::Failure
        } else {
            Outcome::Unknown
        }
    }
}

/// Certificate facts for an https target. `ssl_valid` is tri-state and is
/// always emitted (as `null` when undetermined).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct SslInfo {
    pub ssl_valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_days_left: Option<i64>,
}

impl SslInfo {
    pub fn no_hostname() -> Self {
        SslInfo { ssl_valid: None, ssl_error: Some("no hostname".into()), ..Default::default() }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        SslInfo { ssl_valid: Some(false), ssl_error: Some(error.into()), ..Default::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
    Skipped,
    Unknown,
}

/// Latency statistics for one node across all rounds of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    pub avg_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub errors: u32,
}

impl AggregateStats {
    /// Stats for a single measurement: avg = min = max, errors 0 or 1.
    pub fn single(result: &ProbeResult) -> Self {
        AggregateStats {
            avg_ms: result.elapsed_ms,
            min_ms: result.elapsed_ms,
            max_ms: result.elapsed_ms,
            errors: u32::from(!result.ok),
        }
    }
}

/// Integer mean of `count` latencies summing to `total`, ties to even.
/// `None` for an empty set.
pub fn mean_ms(total: u128, count: u64) -> Option<u64> {
    if count == 0 {
        return None;
    }
    let count = u128::from(count);
    let (q, r) = (total / count, total % count);
    let q = match (2 * r).cmp(&count) {
        std::cmp::Ordering::Greater => q + 1,
        std::cmp::Ordering::Equal if q % 2 == 1 => q + 1,
        _ => q,
    };
    Some(u64::try_from(q).unwrap_or(u64::MAX))
}

//! HTTP(S) reachability probes: one URL, or a batch probed concurrently.

use anyhow::Result;
use async_trait::async_trait;
use pulse_core::inflight::InFlight;
use pulse_core::limits::{probe_timeout, DEFAULT_MAX_IN_FLIGHT, DEFAULT_TIMEOUT_SECS};
use pulse_core::ProbeResult;
use reqwest::{redirect::Policy, Client};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

mod tls;
pub use tls::{inspect_tls, is_https, ssl_from_expiry, CertExpiry};

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    pub timeout: Duration,
    pub redirects: usize,
    pub user_agent: String,
    pub max_in_flight: usize,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        ProbeOptions {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            redirects: 10,
            user_agent: format!("endpoint-pulse/{}", env!("CARGO_PKG_VERSION")),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl ProbeOptions {
    /// Defaults with the timeout clamped to 1..=120 seconds.
    pub fn with_timeout_secs(secs: i64) -> Self {
        ProbeOptions { timeout: probe_timeout(secs), ..Default::default() }
    }
}

/// Something that probes a list of URLs and answers in input order.
#[async_trait]
pub trait BatchProber: Send + Sync {
    async fn probe_batch(&self, urls: &[String]) -> Vec<ProbeResult>;
}

/// One HTTP client plus the options it was built with. Cheap to clone:
/// clones share the connection pool and the in-flight ceiling.
#[derive(Clone)]
pub struct Prober {
    client: Client,
    opts: ProbeOptions,
    limit: InFlight,
}

impl Prober {
    pub fn new(opts: ProbeOptions) -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::limited(opts.redirects))
            .timeout(opts.timeout)
            .user_agent(opts.user_agent.clone())
            .brotli(true)
            .gzip(true)
            .deflate(true)
            .build()?;
        let limit = InFlight::new(opts.max_in_flight);
        Ok(Prober { client, opts, limit })
    }

    pub fn timeout(&self) -> Duration {
        self.opts.timeout
    }

    /// GET the URL (redirects followed) and, for https, inspect the
    /// certificate concurrently within the same timeout.
    pub async fn probe_one(&self, url: &str) -> ProbeResult {
        let tls = async {
            if is_https(url) { Some(inspect_tls(url, self.opts.timeout).await) } else { None }
        };
        let (result, ssl) = tokio::join!(self.fetch(url), tls);
        debug!(url, ok = result.ok, status = ?result.status_code, elapsed_ms = result.elapsed_ms, "probed");
        result.with_ssl(ssl)
    }

    async fn fetch(&self, url: &str) -> ProbeResult {
        let started = Instant::now();
        let outcome = self.get_status(url).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok(status) => ProbeResult::response(status, elapsed_ms),
            Err(e) => ProbeResult::transport_error(e, elapsed_ms),
        }
    }

    async fn get_status(&self, url: &str) -> std::result::Result<u16, String> {
        let resp = self.client.get(url.trim()).send().await.map_err(|e| error_chain(&e))?;
        let status = resp.status().as_u16();
        // the exchange is complete once the body has arrived
        resp.bytes().await.map_err(|e| error_chain(&e))?;
        Ok(status)
    }

    /// Probe every URL concurrently; `out[i]` describes `urls[i]`.
    pub async fn probe_many(&self, urls: &[String]) -> Vec<ProbeResult> {
        if urls.is_empty() {
            return Vec::new();
        }
        let started = Instant::now();
        let mut set = JoinSet::new();
        for (idx, url) in urls.iter().cloned().enumerate() {
            let this = self.clone();
            set.spawn(async move {
                let _slot = this.limit.acquire().await;
                (idx, this.probe_one(&url).await)
            });
        }

        let mut slots: Vec<Option<ProbeResult>> = vec![None; urls.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, r)) => slots[idx] = Some(r),
                Err(e) => warn!(error = %e, "probe task failed"),
            }
        }
        let out: Vec<ProbeResult> = slots
            .into_iter()
            .map(|s| s.unwrap_or_else(|| ProbeResult::transport_error("probe task did not complete", 0)))
            .collect();
        info!(
            urls = urls.len(),
            failed = out.iter().filter(|r| !r.ok).count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch probed"
        );
        out
    }
}

#[async_trait]
impl BatchProber for Prober {
    async fn probe_batch(&self, urls: &[String]) -> Vec<ProbeResult> {
        self.probe_many(urls).await
    }
}

/// Probe one URL with a fresh client; `timeout_secs` is clamped to 1..=120.
pub async fn probe_one(url: &str, timeout_secs: i64) -> Result<ProbeResult> {
    let prober = Prober::new(ProbeOptions::with_timeout_secs(timeout_secs))?;
    Ok(prober.probe_one(url).await)
}

/// Probe many URLs with one shared client; order is preserved.
pub async fn probe_many(urls: &[String], timeout_secs: i64) -> Result<Vec<ProbeResult>> {
    let prober = Prober::new(ProbeOptions::with_timeout_secs(timeout_secs))?;
    Ok(prober.probe_many(urls).await)
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(s) = source {
        let text = s.to_string();
        if !msg.contains(&text) {
            msg.push_str(": ");
            msg.push_str(&text);
        }
        source = s.source();
    }
    msg
}

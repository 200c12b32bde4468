//! Repeated probe rounds over a list of nodes, with per-node latency statistics.

use anyhow::Result;
use probe::{BatchProber, ProbeOptions, Prober};
use pulse_core::limits::{budget_rounds, clamp_rounds};
use pulse_core::{mean_ms, AggregateStats, Node, NodeId, Outcome, ProbeResult};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// One measurement kept from any round, for charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub node_id: NodeId,
    pub round: u32,
    pub elapsed_ms: u64,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default)]
pub struct RoundsOutcome {
    /// Rounds actually executed; 0 when no node was eligible.
    pub rounds_run: u32,
    /// Last round's raw results, keyed by index into the input node slice.
    pub last: BTreeMap<usize, ProbeResult>,
    pub aggregates: BTreeMap<NodeId, AggregateStats>,
    pub samples: Vec<Sample>,
}

impl RoundsOutcome {
    pub fn result_at(&self, index: usize) -> Option<&ProbeResult> {
        self.last.get(&index)
    }

    pub fn stats_for(&self, id: NodeId) -> Option<&AggregateStats> {
        self.aggregates.get(&id)
    }
}

/// Indices and URLs of the nodes that get probed: active, with a non-blank URL.
pub fn probe_targets(nodes: &[Node]) -> (Vec<usize>, Vec<String>) {
    nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.active && !n.url.trim().is_empty())
        .map(|(i, n)| (i, n.url.clone()))
        .unzip()
}

/// Run `rounds` sequential batches over the eligible nodes.
///
/// `rounds` is clamped to 1..=100 and further reduced so that rounds x batch
/// size stays within the per-run probe budget.
pub async fn run_rounds<P: BatchProber + ?Sized>(prober: &P, nodes: &[Node], rounds: u32) -> RoundsOutcome {
    let (indices, urls) = probe_targets(nodes);
    if urls.is_empty() {
        return RoundsOutcome::default();
    }
    let requested = clamp_rounds(i64::from(rounds));
    let rounds = budget_rounds(requested, urls.len());
    if rounds < requested {
        warn!(requested, allowed = rounds, batch = urls.len(), "probe budget reduced rounds");
    }

    let span = info_span!("probe_run", run_id = %Uuid::now_v7());
    run_sequential(prober, nodes, &indices, &urls, rounds).instrument(span).await
}

async fn run_sequential<P: BatchProber + ?Sized>(
    prober: &P,
    nodes: &[Node],
    indices: &[usize],
    urls: &[String],
    rounds: u32,
) -> RoundsOutcome {
    let started = Instant::now();
    info!(rounds, targets = urls.len(), skipped = nodes.len() - urls.len(), "probe run started");

    let mut samples = Vec::with_capacity(urls.len() * rounds as usize);
    let mut last = BTreeMap::new();
    for round in 1..=rounds {
        let results = prober.probe_batch(urls).await;
        if results.len() != urls.len() {
            warn!(round, expected = urls.len(), got = results.len(), "batch answered with wrong length");
        }
        last.clear();
        for (&idx, result) in indices.iter().zip(results) {
            samples.push(Sample {
                node_id: nodes[idx].id,
                round,
                elapsed_ms: result.elapsed_ms,
                outcome: result.outcome(),
            });
            last.insert(idx, result);
        }
    }

    let aggregates = aggregate(&samples);
    info!(rounds, samples = samples.len(), elapsed_ms = started.elapsed().as_millis() as u64, "probe run finished");
    RoundsOutcome { rounds_run: rounds, last, aggregates, samples }
}

/// The single-node path: exactly one round over one node.
pub async fn run_single<P: BatchProber + ?Sized>(prober: &P, node: &Node) -> RoundsOutcome {
    run_rounds(prober, std::slice::from_ref(node), 1).await
}

/// Build a prober for `timeout_secs` (clamped 1..=120) and run the rounds.
pub async fn run_repeated_probes(nodes: &[Node], rounds: i64, timeout_secs: i64) -> Result<RoundsOutcome> {
    let prober = Prober::new(ProbeOptions::with_timeout_secs(timeout_secs))?;
    Ok(run_rounds(&prober, nodes, clamp_rounds(rounds)).await)
}

/// Per-node min/avg/max latency and failed-round count.
/// `avg_ms` rounds ties to even.
pub fn aggregate(samples: &[Sample]) -> BTreeMap<NodeId, AggregateStats> {
    struct Acc { sum: u128, count: u64, min: u64, max: u64, errors: u32 }

    let mut acc: BTreeMap<NodeId, Acc> = BTreeMap::new();
    for s in samples {
        let a = acc.entry(s.node_id).or_insert(Acc { sum: 0, count: 0, min: u64::MAX, max: 0, errors: 0 });
        a.sum += u128::from(s.elapsed_ms);
        a.count += 1;
        a.min = a.min.min(s.elapsed_ms);
        a.max = a.max.max(s.elapsed_ms);
        if s.outcome != Outcome::Success {
            a.errors += 1;
        }
    }
    acc.into_iter()
        .map(|(id, a)| {
            let avg = mean_ms(a.sum, a.count).unwrap_or(0);
            (id, AggregateStats { avg_ms: avg, min_ms: a.min, max_ms: a.max, errors: a.errors })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    type Reply = fn(url: &str, call: usize) -> ProbeResult;

    struct Scripted {
        reply: Reply,
        calls: Mutex<Vec<Vec<String>>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl Scripted {
        fn new(reply: Reply) -> Self {
            Scripted { reply, calls: Mutex::new(Vec::new()), in_flight: AtomicUsize::new(0), max_in_flight: AtomicUsize::new(0) }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BatchProber for Scripted {
        async fn probe_batch(&self, urls: &[String]) -> Vec<ProbeResult> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(urls.to_vec());
                calls.len() - 1
            };
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            urls.iter().map(|u| (self.reply)(u, call)).collect()
        }
    }

    fn node(id: NodeId, url: &str, active: bool) -> Node {
        Node { id, folder_id: 1, name: format!("n{}", id), url: url.into(), comment: String::new(), active }
    }

    #[tokio::test]
    async fn constant_success_has_flat_stats() {
        let p = Scripted::new(|_, _| ProbeResult::response(200, 50));
        let nodes = vec![node(1, "http://a", true)];
        let out = run_rounds(&p, &nodes, 5).await;
        assert_eq!(out.rounds_run, 5);
        assert_eq!(p.calls().len(), 5);
        assert_eq!(out.stats_for(1), Some(&AggregateStats { avg_ms: 50, min_ms: 50, max_ms: 50, errors: 0 }));
        assert_eq!(out.samples.len(), 5);
    }

    #[tokio::test]
    async fn constant_failure_counts_every_round() {
        let p = Scripted::new(|_, _| ProbeResult::transport_error("refused", 3));
        let nodes = vec![node(7, "http://down", true)];
        let out = run_rounds(&p, &nodes, 4).await;
        let last = out.result_at(0).unwrap();
        assert!(!last.ok);
        assert_eq!(out.stats_for(7).unwrap().errors, 4);
    }

    #[tokio::test]
    async fn inactive_nodes_are_never_probed() {
        let p = Scripted::new(|_, _| ProbeResult::response(200, 1));
        let nodes = vec![node(1, "A", true), node(2, "B", false)];
        let out = run_rounds(&p, &nodes, 3).await;
        assert!(p.calls().iter().all(|c| c == &vec!["A".to_string()]));
        assert!(out.stats_for(2).is_none());
        assert!(out.result_at(1).is_none());
        assert!(out.samples.iter().all(|s| s.node_id == 1));
    }

    #[tokio::test]
    async fn last_round_is_retained_verbatim() {
        let p = Scripted::new(|_, call| ProbeResult::response(if call == 2 { 503 } else { 200 }, 10 * (call as u64 + 1)));
        let nodes = vec![node(1, "http://a", true)];
        let out = run_rounds(&p, &nodes, 3).await;
        let last = out.result_at(0).unwrap();
        assert_eq!(last.status_code, Some(503));
        assert_eq!(last.elapsed_ms, 30);
        assert_eq!(out.stats_for(1), Some(&AggregateStats { avg_ms: 20, min_ms: 10, max_ms: 30, errors: 1 }));
    }

    #[tokio::test]
    async fn rounds_are_clamped_and_sequential() {
        let p = Scripted::new(|_, _| ProbeResult::response(200, 1));
        let nodes = vec![node(1, "http://a", true), node(2, "http://b", true)];
        let out = run_rounds(&p, &nodes, 500).await;
        assert_eq!(out.rounds_run, 100);
        assert_eq!(p.calls().len(), 100);
        assert_eq!(p.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_rounds_means_one() {
        let p = Scripted::new(|_, _| ProbeResult::response(200, 1));
        let out = run_rounds(&p, &[node(1, "http://a", true)], 0).await;
        assert_eq!(out.rounds_run, 1);
    }

    #[tokio::test]
    async fn nothing_eligible_means_no_calls() {
        let p = Scripted::new(|_, _| ProbeResult::response(200, 1));
        let nodes = vec![node(1, "http://a", false), node(2, "   ", true)];
        let out = run_rounds(&p, &nodes, 3).await;
        assert!(p.calls().is_empty());
        assert_eq!(out.rounds_run, 0);
        assert!(out.last.is_empty() && out.aggregates.is_empty());
    }

    #[tokio::test]
    async fn single_path_degenerates() {
        let p = Scripted::new(|_, _| ProbeResult::response(500, 42));
        let n = node(3, "http://x", true);
        let out = run_single(&p, &n).await;
        assert_eq!(out.rounds_run, 1);
        assert_eq!(out.stats_for(3), Some(&AggregateStats { avg_ms: 42, min_ms: 42, max_ms: 42, errors: 1 }));
    }

    #[tokio::test]
    async fn convenience_entry_clamps_and_probes() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let nodes = vec![node(1, &format!("http://127.0.0.1:{}/", port), true)];
        let out = run_repeated_probes(&nodes, 0, -5).await.unwrap();
        assert_eq!(out.rounds_run, 1);
        assert_eq!(out.stats_for(1).unwrap().errors, 1);
        assert!(out.result_at(0).unwrap().error.is_some());
    }

    #[test]
    fn aggregate_mixed_results() {
        let s = |ms, outcome| Sample { node_id: 1, round: 1, elapsed_ms: ms, outcome };
        let stats = aggregate(&[s(100, Outcome::Success), s(200, Outcome::Failure), s(300, Outcome::Success)]);
        assert_eq!(stats[&1], AggregateStats { avg_ms: 200, min_ms: 100, max_ms: 300, errors: 1 });
    }

    #[test]
    fn aggregate_rounds_ties_to_even() {
        let s = |ms| Sample { node_id: 9, round: 1, elapsed_ms: ms, outcome: Outcome::Success };
        assert_eq!(aggregate(&[s(1), s(2)])[&9].avg_ms, 2);
        assert_eq!(aggregate(&[s(1), s(4)])[&9].avg_ms, 2);
        assert_eq!(aggregate(&[s(3), s(4)])[&9].avg_ms, 4);
        assert_eq!(aggregate(&[s(10), s(20), s(31)])[&9].avg_ms, 20);
    }

    #[test]
    fn targets_skip_inactive_and_blank() {
        let nodes = vec![node(1, "A", true), node(2, "B", false), node(3, "", true), node(4, "D", true)];
        let (idx, urls) = probe_targets(&nodes);
        assert_eq!(idx, vec![0, 3]);
        assert_eq!(urls, vec!["A".to_string(), "D".to_string()]);
    }
}

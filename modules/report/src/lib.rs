//! Turns a probe run into per-node report rows and chart geometry.

mod chart;

pub use chart::{build_chart, Bar, ChartEntry, ChartModel, YTick};

use pulse_core::{AggregateStats, Node, NodeId, Outcome, ProbeResult};
use rounds::RoundsOutcome;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

pub const INACTIVE_REASON: &str = "Node inactive";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    Single,
    Parallel,
    Skipped,
}

/// One row per input node. Probe and stats fields are flattened into the row
/// when present, so a JSON row reads `{id, name, url, active, ok, status_code, ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub id: NodeId,
    pub name: String,
    pub url: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tested: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub fetch: FetchMode,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeResult>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub stats: Option<AggregateStats>,
}

impl ReportRow {
    fn base(node: &Node, fetch: FetchMode) -> Self {
        ReportRow {
            id: node.id,
            name: node.name.clone(),
            url: node.url.clone(),
            active: node.active,
            tested: None,
            reason: None,
            fetch,
            probe: None,
            stats: None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.tested == Some(false)
    }

    pub fn outcome(&self) -> Outcome {
        if self.is_skipped() {
            return Outcome::Skipped;
        }
        self.probe.as_ref().map_or(Outcome::Unknown, ProbeResult::outcome)
    }
}

/// Build one row per node, in input order.
///
/// Inactive nodes get a skipped row. Active nodes carry their last-round
/// result and aggregate stats; an active node with no recorded result keeps
/// only the base fields.
pub fn assemble(nodes: &[Node], outcome: &RoundsOutcome, fetch: FetchMode) -> Vec<ReportRow> {
    nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| {
            if !node.active {
                return ReportRow {
                    tested: Some(false),
                    reason: Some(INACTIVE_REASON.to_string()),
                    ..ReportRow::base(node, FetchMode::Skipped)
                };
            }
            let mut row = ReportRow::base(node, fetch);
            match outcome.result_at(idx) {
                Some(result) => {
                    row.probe = Some(result.clone());
                    row.stats = outcome.stats_for(node.id).copied();
                }
                None => debug!(node_id = node.id, "active node has no probe result"),
            }
            row
        })
        .collect()
}

/// Chart input for a run: every sample from every round when there are any,
/// otherwise one entry per report row.
pub fn chart_entries(nodes: &[Node], outcome: &RoundsOutcome, rows: &[ReportRow]) -> Vec<ChartEntry> {
    if outcome.samples.is_empty() {
        return rows.iter().map(ChartEntry::from).collect();
    }
    let names: HashMap<NodeId, &str> = nodes.iter().map(|n| (n.id, n.name.as_str())).collect();
    outcome
        .samples
        .iter()
        .map(|s| ChartEntry {
            label: names.get(&s.node_id).map(|n| n.to_string()),
            elapsed_ms: Some(s.elapsed_ms),
            outcome: s.outcome,
        })
        .collect()
}

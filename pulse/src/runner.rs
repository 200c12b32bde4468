use anyhow::{bail, Result};
use probe::BatchProber;
use pulse_core::{Node, NodeId};
use report::{assemble, build_chart, chart_entries, ChartModel, FetchMode, ReportRow};
use rounds::{run_rounds, run_single};

pub struct TestRun {
    pub rounds: u32,
    pub rows: Vec<ReportRow>,
    pub chart: ChartModel,
}

/// One node, one probe. Inactive nodes come back as a skipped row.
pub async fn test_node<P: BatchProber + ?Sized>(prober: &P, node: &Node) -> TestRun {
    let outcome = run_single(prober, node).await;
    finish(std::slice::from_ref(node), outcome, FetchMode::Single)
}

/// `rounds` sequential batches over the nodes (in the given order).
pub async fn test_nodes<P: BatchProber + ?Sized>(prober: &P, nodes: &[Node], rounds: u32) -> TestRun {
    let outcome = run_rounds(prober, nodes, rounds).await;
    finish(nodes, outcome, FetchMode::Parallel)
}

fn finish(nodes: &[Node], outcome: rounds::RoundsOutcome, fetch: FetchMode) -> TestRun {
    let rows = assemble(nodes, &outcome, fetch);
    let chart = build_chart(&chart_entries(nodes, &outcome, &rows));
    TestRun { rounds: outcome.rounds_run, rows, chart }
}

/// Restrict a folder's nodes to `select` when it is non-empty.
pub fn pick_nodes(folder: &pulse_core::Folder, select: &[NodeId]) -> Result<Vec<Node>> {
    if select.is_empty() {
        return Ok(folder.nodes.clone());
    }
    let nodes = folder.selected(select);
    if nodes.is_empty() {
        bail!("none of the selected nodes belong to folder {}", folder.id);
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pulse_core::{Folder, Outcome, ProbeResult};

    struct Fixed;

    #[async_trait]
    impl BatchProber for Fixed {
        async fn probe_batch(&self, urls: &[String]) -> Vec<ProbeResult> {
            urls.iter()
                .map(|u| if u.contains("down") { ProbeResult::transport_error("refused", 4) } else { ProbeResult::response(200, 20) })
                .collect()
        }
    }

    fn node(id: NodeId, url: &str, active: bool) -> Node {
        Node { id, folder_id: 1, name: format!("n{}", id), url: url.into(), comment: String::new(), active }
    }

    #[tokio::test]
    async fn folder_run_assembles_rows_and_chart() {
        let nodes = vec![node(1, "http://up", true), node(2, "http://down", true), node(3, "http://off", false)];
        let run = test_nodes(&Fixed, &nodes, 3).await;
        assert_eq!(run.rounds, 3);
        assert_eq!(run.rows.len(), 3);
        assert_eq!(run.rows[1].stats.unwrap().errors, 3);
        assert_eq!(run.rows[2].outcome(), Outcome::Skipped);
        // one bar per sample: two probed nodes over three rounds
        assert_eq!(run.chart.count_total, 6);
    }

    #[tokio::test]
    async fn inactive_single_node_charts_its_row() {
        let run = test_node(&Fixed, &node(9, "http://up", false)).await;
        assert_eq!(run.rounds, 0);
        assert_eq!(run.rows[0].fetch, FetchMode::Skipped);
        assert_eq!(run.chart.count_total, 1);
        assert_eq!(run.chart.count_measured, 0);
    }

    #[test]
    fn selection() {
        let folder = Folder { id: 1, name: "f".into(), nodes: vec![node(1, "a", true), node(2, "b", true)] };
        assert_eq!(pick_nodes(&folder, &[]).unwrap().len(), 2);
        assert_eq!(pick_nodes(&folder, &[2, 2]).unwrap()[0].id, 2);
        assert!(pick_nodes(&folder, &[77]).is_err());
    }
}

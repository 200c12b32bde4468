use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use probe::Prober;
use pulse_core::{FolderId, NodeDraft, NodeId, ProbeResult};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use tree_store::transfer::{export_tree, merge_into, parse_tree, TransferFormat};
use tree_store::{open_store, update, TreeStore};

mod config;
mod logging;
mod output;
mod runner;

use config::{load_config, Overrides, Settings};
use logging::LogFormat;
use output::{OutputFormat, RunReport};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum DocFormat { Json, Yaml }

impl From<DocFormat> for TransferFormat {
    fn from(f: DocFormat) -> Self {
        match f {
            DocFormat::Json => TransferFormat::Json,
            DocFormat::Yaml => TransferFormat::Yaml,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "pulse", version, about = "Endpoint Pulse: organize URLs in folders and probe their health")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./pulse.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Tree store location (overrides DB_FILE / DATA_FILE and the config file)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Tree store backend: sqlite or json
    #[arg(long, global = true, value_parser = ["sqlite", "json"])]
    backend: Option<String>,
    /// Per-probe timeout in seconds (clamped to 1..=120)
    #[arg(long, global = true, allow_negative_numbers = true)]
    timeout: Option<i64>,
    /// Log line format on stderr
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Show all folders and nodes
    Tree {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Create, rename, delete, duplicate or clear folders
    Folder {
        #[command(subcommand)]
        cmd: FolderCmd,
    },
    /// Create, edit, delete, toggle or duplicate nodes
    Node {
        #[command(subcommand)]
        cmd: NodeCmd,
    },
    /// Probe stored nodes and report status, latency and certificate facts
    Test {
        #[command(subcommand)]
        cmd: TestCmd,
    },
    /// Probe ad-hoc URLs concurrently without touching the store
    Probe {
        #[arg(required = true)]
        urls: Vec<String>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Write the whole tree as JSON or YAML
    Export {
        #[arg(long, value_enum, default_value_t = DocFormat::Json)]
        format: DocFormat,
        /// Output file (overwrites). Stdout if omitted.
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
    /// Replace the tree with a JSON/YAML document, or append it with --merge
    Import {
        file: PathBuf,
        /// Append folders and nodes under fresh ids instead of replacing
        #[arg(long, default_value_t = false)]
        merge: bool,
        /// Document format; inferred from the extension if omitted
        #[arg(long, value_enum)]
        format: Option<DocFormat>,
    },
}

#[derive(Debug, Subcommand)]
enum FolderCmd {
    Add { name: String },
    Rename { id: FolderId, name: String },
    /// Delete a folder and every node in it
    Delete { id: FolderId },
    /// Copy a folder and its nodes under a copy_N_ name
    Duplicate { id: FolderId },
    /// Delete every node in a folder, keeping the folder
    Clear { id: FolderId },
}

#[derive(Debug, Subcommand)]
enum NodeCmd {
    Add {
        folder: FolderId,
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        comment: Option<String>,
        /// Create the node disabled
        #[arg(long, default_value_t = false)]
        inactive: bool,
    },
    /// Change some fields of a node; unspecified fields keep their value
    Edit {
        id: NodeId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        comment: Option<String>,
        #[arg(long)]
        active: Option<bool>,
    },
    Delete { id: NodeId },
    /// Delete several nodes; unknown ids are ignored
    BulkDelete {
        #[arg(required = true, value_delimiter = ',')]
        ids: Vec<NodeId>,
    },
    /// Flip the active flag
    Toggle { id: NodeId },
    /// Copy a node within its folder under a copy_N_ name
    Duplicate { id: NodeId },
}

#[derive(Debug, Args)]
struct ReportArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Also write the rows to FILE (JSONL, or CSV with --csv)
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
    /// Write CSV instead of JSONL when --out is provided
    #[arg(long, default_value_t = false, requires = "out")]
    csv: bool,
    /// Write the latency chart as SVG to FILE
    #[arg(long, value_name = "FILE")]
    chart: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum TestCmd {
    /// Probe one node once
    Node {
        id: NodeId,
        #[command(flatten)]
        report: ReportArgs,
    },
    /// Probe a folder's active nodes, optionally repeated and restricted to a selection
    Folder {
        id: FolderId,
        /// Repeat the batch N times (clamped to 1..=100) and aggregate latency
        #[arg(long, allow_negative_numbers = true)]
        runs: Option<i64>,
        /// Only these node ids (comma separated), kept in folder order
        #[arg(long, value_delimiter = ',')]
        select: Vec<NodeId>,
        #[command(flatten)]
        report: ReportArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded_cfg = load_config(cli.config.as_deref())?;
    let overrides = Overrides { db: cli.db.clone(), backend: cli.backend.clone(), timeout: cli.timeout, log_format: cli.log_format };
    let settings = Settings::resolve(&overrides, loaded_cfg.as_ref(), |k| std::env::var(k).ok())?;
    logging::init(&settings.log_filter, settings.log_format)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Commands::Version => {
            writeln!(out, "pulse {} (core {})", env!("CARGO_PKG_VERSION"), pulse_core::version())?;
        }
        Commands::Tree { format } => {
            let store = open(&settings)?;
            output::write_tree(&mut out, &store.load()?, format)?;
        }
        Commands::Folder { cmd } => {
            let store = open(&settings)?;
            run_folder_cmd(store.as_ref(), cmd, &mut out)?;
        }
        Commands::Node { cmd } => {
            let store = open(&settings)?;
            run_node_cmd(store.as_ref(), cmd, &mut out)?;
        }
        Commands::Test { cmd } => {
            let store = open(&settings)?;
            run_test_cmd(store.as_ref(), &settings, cmd, &mut out)?;
        }
        Commands::Probe { urls, format } => {
            let prober = Prober::new(settings.probe_options())?;
            let rt = tokio::runtime::Runtime::new()?;
            let results = rt.block_on(prober.probe_many(&urls));
            write_probe_results(&mut out, &urls, &results, format)?;
        }
        Commands::Export { format, out: path } => {
            let store = open(&settings)?;
            let text = export_tree(&store.load()?, format.into())?;
            match path {
                Some(p) => {
                    std::fs::write(&p, text).with_context(|| format!("writing {}", p.display()))?;
                    info!(path = %p.display(), "tree exported");
                }
                None => out.write_all(text.as_bytes())?,
            }
        }
        Commands::Import { file, merge, format } => {
            let store = open(&settings)?;
            let text = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let format = format.map(TransferFormat::from).unwrap_or_else(|| TransferFormat::from_path(&file));
            let incoming = parse_tree(&text, format)?;
            if merge {
                let summary = update(store.as_ref(), |t| merge_into(t, incoming))?;
                writeln!(out, "merged {} folders, {} nodes", summary.folders, summary.nodes)?;
            } else {
                let (folders, nodes) = (incoming.folders.len(), incoming.nodes().count());
                store.save(&incoming)?;
                writeln!(out, "imported {} folders, {} nodes", folders, nodes)?;
            }
        }
    }
    Ok(())
}

fn open(settings: &Settings) -> Result<Box<dyn TreeStore>> {
    open_store(settings.backend, &settings.store_path)
        .with_context(|| format!("opening tree store {}", settings.store_path.display()))
}

fn run_folder_cmd(store: &dyn TreeStore, cmd: FolderCmd, out: &mut dyn Write) -> Result<()> {
    match cmd {
        FolderCmd::Add { name } => {
            let (id, name) = update(store, |t| {
                let f = t.add_folder(&name)?;
                Ok((f.id, f.name.clone()))
            })?;
            writeln!(out, "folder {} created: {}", id, name)?;
        }
        FolderCmd::Rename { id, name } => {
            let name = update(store, |t| Ok(t.rename_folder(id, &name)?.name.clone()))?;
            writeln!(out, "folder {} renamed: {}", id, name)?;
        }
        FolderCmd::Delete { id } => {
            let removed = update(store, |t| Ok(t.delete_folder(id)?))?;
            writeln!(out, "folder {} deleted with {} nodes", id, removed)?;
        }
        FolderCmd::Duplicate { id } => {
            let (new_id, name, nodes) = update(store, |t| {
                let f = t.duplicate_folder(id)?;
                Ok((f.id, f.name.clone(), f.nodes.len()))
            })?;
            writeln!(out, "folder {} duplicated as {} ({}) with {} nodes", id, new_id, name, nodes)?;
        }
        FolderCmd::Clear { id } => {
            let removed = update(store, |t| Ok(t.clear_folder(id)?))?;
            writeln!(out, "folder {} cleared, {} nodes deleted", id, removed)?;
        }
    }
    Ok(())
}

fn run_node_cmd(store: &dyn TreeStore, cmd: NodeCmd, out: &mut dyn Write) -> Result<()> {
    match cmd {
        NodeCmd::Add { folder, name, url, comment, inactive } => {
            let draft = NodeDraft { name, url, comment, active: !inactive };
            let (id, url) = update(store, |t| {
                let n = t.add_node(folder, draft)?;
                Ok((n.id, n.url.clone()))
            })?;
            writeln!(out, "node {} created in folder {}: {}", id, folder, url)?;
        }
        NodeCmd::Edit { id, name, url, comment, active } => {
            update(store, |t| {
                let cur = t.node(id).ok_or(pulse_core::TreeError::NodeNotFound(id))?;
                let draft = NodeDraft {
                    name: name.unwrap_or_else(|| cur.name.clone()),
                    url: url.unwrap_or_else(|| cur.url.clone()),
                    comment: comment.or_else(|| Some(cur.comment.clone())),
                    active: active.unwrap_or(cur.active),
                };
                t.update_node(id, draft)?;
                Ok(())
            })?;
            writeln!(out, "node {} updated", id)?;
        }
        NodeCmd::Delete { id } => {
            update(store, |t| Ok(t.delete_node(id)?))?;
            writeln!(out, "node {} deleted", id)?;
        }
        NodeCmd::BulkDelete { ids } => {
            let removed = update(store, |t| Ok(t.delete_nodes(&ids)))?;
            writeln!(out, "{} of {} nodes deleted", removed, ids.len())?;
        }
        NodeCmd::Toggle { id } => {
            let active = update(store, |t| Ok(t.toggle_node(id)?))?;
            writeln!(out, "node {} is now {}", id, if active { "active" } else { "inactive" })?;
        }
        NodeCmd::Duplicate { id } => {
            let (new_id, name) = update(store, |t| {
                let n = t.duplicate_node(id)?;
                Ok((n.id, n.name.clone()))
            })?;
            writeln!(out, "node {} duplicated as {} ({})", id, new_id, name)?;
        }
    }
    Ok(())
}

fn run_test_cmd(store: &dyn TreeStore, settings: &Settings, cmd: TestCmd, out: &mut dyn Write) -> Result<()> {
    // the tree is read once; probing works on this snapshot
    let tree = store.load()?;
    let prober = Prober::new(settings.probe_options())?;
    let rt = tokio::runtime::Runtime::new()?;
    let (folder_id, run, args) = match cmd {
        TestCmd::Node { id, report } => {
            let node = tree.node(id).ok_or_else(|| anyhow!("node {} not found", id))?;
            (None, rt.block_on(runner::test_node(&prober, node)), report)
        }
        TestCmd::Folder { id, runs, select, report } => {
            let folder = tree.folder(id).ok_or_else(|| anyhow!("folder {} not found", id))?;
            let nodes = runner::pick_nodes(folder, &select)?;
            let rounds = runs.map(pulse_core::limits::clamp_rounds).unwrap_or(settings.runs);
            (Some(id), rt.block_on(runner::test_nodes(&prober, &nodes, rounds)), report)
        }
    };

    let report = RunReport {
        folder_id,
        generated_at: output::now_rfc3339(),
        rounds: run.rounds,
        timeout_seconds: settings.timeout_secs,
        results: run.rows,
        chart: run.chart,
    };
    output::write_report(out, &report, args.format)?;
    if args.format == OutputFormat::Text && report.results.len() > 1 {
        output::write_chart_summary(out, &report.chart)?;
    }
    if let Some(path) = &args.out {
        write_rows_file(path, &report, args.csv)?;
    }
    if let Some(path) = &args.chart {
        std::fs::write(path, report.chart.to_svg()).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "chart written");
    }
    Ok(())
}

fn write_rows_file(path: &Path, report: &RunReport, csv: bool) -> Result<()> {
    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    if csv {
        output::write_csv(file, &report.results)?;
    } else {
        let mut w = std::io::BufWriter::new(file);
        output::write_jsonl(&mut w, &report.results)?;
        w.flush()?;
    }
    info!(path = %path.display(), rows = report.results.len(), "report written");
    Ok(())
}

#[derive(Serialize)]
struct UrlResult<'a> {
    url: &'a str,
    #[serde(flatten)]
    result: &'a ProbeResult,
}

fn write_probe_results(out: &mut dyn Write, urls: &[String], results: &[ProbeResult], format: OutputFormat) -> Result<()> {
    let rows: Vec<UrlResult> = urls.iter().zip(results).map(|(url, result)| UrlResult { url, result }).collect();
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?,
        OutputFormat::Jsonl => output::write_jsonl(out, &rows)?,
        OutputFormat::Text => {
            for r in rows {
                match (r.result.status_code, &r.result.error) {
                    (Some(code), _) => writeln!(out, "{}  {} {}  {} ms", r.url, if r.result.ok { "OK" } else { "FAIL" }, code, r.result.elapsed_ms)?,
                    (None, Some(err)) => writeln!(out, "{}  ERROR {}  {} ms", r.url, err, r.result.elapsed_ms)?,
                    (None, None) => writeln!(out, "{}  UNKNOWN  {} ms", r.url, r.result.elapsed_ms)?,
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_store::JsonStore;

    fn run_folder(store: &dyn TreeStore, cmd: FolderCmd) -> String {
        let mut buf = Vec::new();
        run_folder_cmd(store, cmd, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn run_node(store: &dyn TreeStore, cmd: NodeCmd) -> Result<String> {
        let mut buf = Vec::new();
        run_node_cmd(store, cmd, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap())
    }

    #[test]
    fn cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
        let cli = Cli::try_parse_from(["pulse", "--timeout", "-5", "test", "folder", "3", "--runs", "500", "--select", "1,2"]).unwrap();
        assert_eq!(cli.timeout, Some(-5));
        match cli.command {
            Commands::Test { cmd: TestCmd::Folder { id, runs, select, .. } } => {
                assert_eq!((id, runs, select), (3, Some(500), vec![1, 2]));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Cli::try_parse_from(["pulse", "test", "node", "1", "--csv"]).is_err());
    }

    #[test]
    fn folder_and_node_commands() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("tree.json"));
        assert_eq!(run_folder(&store, FolderCmd::Add { name: "Prod".into() }), "folder 1 created: Prod\n");
        let out = run_node(
            &store,
            NodeCmd::Add { folder: 1, name: "api".into(), url: "https://api.example".into(), comment: None, inactive: false },
        )
        .unwrap();
        assert_eq!(out, "node 1 created in folder 1: https://api.example/\n");

        run_node(&store, NodeCmd::Edit { id: 1, name: None, url: None, comment: Some("main".into()), active: Some(false) })
            .unwrap();
        let n = store.load().unwrap().node(1).cloned().unwrap();
        assert_eq!((n.name.as_str(), n.comment.as_str(), n.active), ("api", "main", false));

        assert_eq!(run_node(&store, NodeCmd::Toggle { id: 1 }).unwrap(), "node 1 is now active\n");
        assert!(run_node(&store, NodeCmd::Duplicate { id: 1 }).unwrap().contains("copy_1_api"));
        assert!(run_folder(&store, FolderCmd::Duplicate { id: 1 }).contains("copy_1_Prod"));
        assert_eq!(run_node(&store, NodeCmd::BulkDelete { ids: vec![1, 2, 99] }).unwrap(), "2 of 3 nodes deleted\n");
        assert!(run_node(&store, NodeCmd::Delete { id: 1 }).is_err());
        assert_eq!(run_folder(&store, FolderCmd::Clear { id: 2 }), "folder 2 cleared, 2 nodes deleted\n");
    }

    #[test]
    fn probe_text_output() {
        let urls = vec!["http://a/".to_string(), "http://b/".to_string()];
        let results = vec![ProbeResult::response(204, 3), ProbeResult::transport_error("dns error", 1)];
        let mut buf = Vec::new();
        write_probe_results(&mut buf, &urls, &results, OutputFormat::Text).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "http://a/  OK 204  3 ms\nhttp://b/  ERROR dns error  1 ms\n");
    }
}

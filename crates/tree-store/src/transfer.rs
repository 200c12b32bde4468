//! Export and import of the whole tree as JSON or YAML documents.

use anyhow::{bail, Context, Result};
use pulse_core::{NodeDraft, Tree};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferFormat {
    Json,
    Yaml,
}

impl TransferFormat {
    /// `.yaml`/`.yml` files are YAML, anything else JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
            Some("yaml" | "yml") => TransferFormat::Yaml,
            _ => TransferFormat::Json,
        }
    }
}

pub fn export_tree(tree: &Tree, format: TransferFormat) -> Result<String> {
    Ok(match format {
        TransferFormat::Json => {
            let mut s = serde_json::to_string_pretty(tree)?;
            s.push('\n');
            s
        }
        TransferFormat::Yaml => serde_yaml::to_string(tree)?,
    })
}

/// Parse a document and check it is structurally sound: ids unique, nodes
/// pointing at their holding folder, counters above every id.
pub fn parse_tree(text: &str, format: TransferFormat) -> Result<Tree> {
    let mut tree: Tree = match format {
        TransferFormat::Json => serde_json::from_str(text).context("parsing JSON tree")?,
        TransferFormat::Yaml => serde_yaml::from_str(text).context("parsing YAML tree")?,
    };
    let mut folder_ids = HashSet::new();
    let mut node_ids = HashSet::new();
    for f in &mut tree.folders {
        if !folder_ids.insert(f.id) {
            bail!("duplicate folder id {}", f.id);
        }
        for n in &mut f.nodes {
            if !node_ids.insert(n.id) {
                bail!("duplicate node id {}", n.id);
            }
            n.folder_id = f.id;
        }
    }
    tree.normalize();
    Ok(tree)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub folders: usize,
    pub nodes: usize,
}

/// Append every incoming folder and node to `target` under fresh ids.
/// Names and URLs go through the same validation as hand-entered ones.
pub fn merge_into(target: &mut Tree, incoming: Tree) -> Result<MergeSummary> {
    let mut summary = MergeSummary::default();
    for folder in incoming.folders {
        let fid = target.add_folder(&folder.name).with_context(|| format!("folder {:?}", folder.name))?.id;
        summary.folders += 1;
        for n in folder.nodes {
            let draft = NodeDraft {
                name: n.name,
                url: n.url,
                comment: Some(n.comment),
                active: n.active,
            };
            target.add_node(fid, draft).with_context(|| format!("node {} in folder {:?}", n.id, folder.name))?;
            summary.nodes += 1;
        }
    }
    info!(folders = summary.folders, nodes = summary.nodes, "tree merged");
    Ok(summary)
}

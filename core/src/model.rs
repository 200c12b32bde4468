//! Folder/node tree as persisted by the store.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::TreeError;

pub type FolderId = i64;
pub type NodeId = i64;

/// Longest accepted folder or node name, in characters.
pub const MAX_NAME_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub folder_id: FolderId,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

/// The whole persisted state: folders in display order plus the id counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    #[serde(default = "first_id")]
    pub next_folder_id: FolderId,
    #[serde(default = "first_id")]
    pub next_node_id: NodeId,
    #[serde(default)]
    pub folders: Vec<Folder>,
}

impl Default for Tree {
    fn default() -> Self {
        Tree { next_folder_id: 1, next_node_id: 1, folders: Vec::new() }
    }
}

/// User-supplied node fields, validated before they touch the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDraft {
    pub name: String,
    pub url: String,
    pub comment: Option<String>,
    pub active: bool,
}

impl NodeDraft {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        NodeDraft { name: name.into(), url: url.into(), comment: None, active: true }
    }

    pub fn validated(self) -> Result<NodeDraft, TreeError> {
        Ok(NodeDraft {
            name: validate_name(&self.name)?,
            url: validate_url(&self.url)?,
            comment: self.comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            active: self.active,
        })
    }
}

fn default_active() -> bool { true }
fn first_id() -> i64 { 1 }

/// Trim and bound-check a folder or node name.
pub fn validate_name(raw: &str) -> Result<String, TreeError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(TreeError::EmptyName);
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(TreeError::NameTooLong { max: MAX_NAME_LEN });
    }
    Ok(name.to_string())
}

/// Accept absolute http(s) URLs with a host; returns the normalized form.
pub fn validate_url(raw: &str) -> Result<String, TreeError> {
    let trimmed = raw.trim();
    let invalid = |reason: &str| TreeError::InvalidUrl { url: trimmed.to_string(), reason: reason.to_string() };
    let parsed = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(invalid("scheme must be http or https"));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host"));
    }
    Ok(parsed.to_string())
}

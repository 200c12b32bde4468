use crate::model::{FolderId, NodeId};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("folder not found: {0}")]
    FolderNotFound(FolderId),
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("name must not be empty")]
    EmptyName,
    #[error("name is longer than {max} characters")]
    NameTooLong { max: usize },
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

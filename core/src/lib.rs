//! Core types shared by the probing engine, the tree store and the CLI.

pub mod copyname;
pub mod error;
pub mod inflight;
pub mod limits;
pub mod model;
pub mod probe;
mod tree;

pub use error::TreeError;
pub use model::{Folder, FolderId, Node, NodeDraft, NodeId, Tree};
pub use probe::{mean_ms, AggregateStats, Outcome, ProbeResult, SslInfo};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

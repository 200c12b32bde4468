//! Persistence for the folder/node tree.
//!
//! Every store loads and saves the whole tree. `transact` runs load, mutate
//! and save as one unit so id counters are consumed together with the write.

#[cfg(feature = "sqlite")]
mod insert;
mod json;
#[cfg(feature = "sqlite")]
mod open;
#[cfg(feature = "sqlite")]
mod query;
#[cfg(feature = "sqlite")]
mod schema;
pub mod transfer;

pub use json::JsonStore;
#[cfg(feature = "sqlite")]
pub use open::SqliteStore;

use anyhow::{anyhow, Result};
use pulse_core::Tree;
use std::path::Path;

pub trait TreeStore: Send + Sync {
    fn load(&self) -> Result<Tree>;

    /// Replace the stored tree with `tree`.
    fn save(&self, tree: &Tree) -> Result<()>;

    /// Load, apply `f`, save. Nothing is written when `f` fails.
    fn transact(&self, f: &mut dyn FnMut(&mut Tree) -> Result<()>) -> Result<Tree>;
}

/// Run `f` inside a store transaction and hand back its value.
pub fn update<S, T, F>(store: &S, f: F) -> Result<T>
where
    S: TreeStore + ?Sized,
    F: FnOnce(&mut Tree) -> Result<T>,
{
    let mut body = Some(f);
    let mut out = None;
    store.transact(&mut |tree| {
        let f = body.take().ok_or_else(|| anyhow!("transaction body ran twice"))?;
        out = Some(f(tree)?);
        Ok(())
    })?;
    out.ok_or_else(|| anyhow!("transaction body did not run"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Json,
}

impl Backend {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Backend::Sqlite),
            "json" => Ok(Backend::Json),
            other => Err(anyhow!("unknown store backend: {}", other)),
        }
    }
}

pub fn open_store(backend: Backend, path: impl AsRef<Path>) -> Result<Box<dyn TreeStore>> {
    match backend {
        #[cfg(feature = "sqlite")]
        Backend::Sqlite => Ok(Box::new(SqliteStore::open_or_create(path)?)),
        #[cfg(not(feature = "sqlite"))]
        Backend::Sqlite => {
            let _ = path;
            Err(anyhow!("built without sqlite support"))
        }
        Backend::Json => Ok(Box::new(JsonStore::new(path.as_ref()))),
    }
}

pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

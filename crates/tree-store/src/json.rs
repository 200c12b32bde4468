use crate::{ensure_parent, TreeStore};
use anyhow::{anyhow, Context, Result};
use pulse_core::Tree;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

/// Whole tree in one JSON document. A missing file reads as an empty tree.
pub struct JsonStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonStore { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Tree> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Tree::default()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", self.path.display())),
        };
        let mut tree: Tree =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", self.path.display()))?;
        tree.normalize();
        Ok(tree)
    }

    fn write(&self, tree: &Tree) -> Result<()> {
        ensure_parent(&self.path)?;
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(p) => p.to_path_buf(),
            None => PathBuf::from("."),
        };
        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, tree)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).with_context(|| format!("replacing {}", self.path.display()))?;
        debug!(path = %self.path.display(), folders = tree.folders.len(), "json store written");
        Ok(())
    }
}

impl TreeStore for JsonStore {
    fn load(&self) -> Result<Tree> {
        self.read()
    }

    fn save(&self, tree: &Tree) -> Result<()> {
        let _guard = self.write_lock.lock().map_err(|_| anyhow!("json store lock poisoned"))?;
        self.write(tree)
    }

    fn transact(&self, f: &mut dyn FnMut(&mut Tree) -> Result<()>) -> Result<Tree> {
        let _guard = self.write_lock.lock().map_err(|_| anyhow!("json store lock poisoned"))?;
        let mut tree = self.read()?;
        f(&mut tree)?;
        self.write(&tree)?;
        Ok(tree)
    }
}

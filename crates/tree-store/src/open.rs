use crate::schema::MIG_0001_INIT;
use crate::{ensure_parent, insert, query, TreeStore};
use anyhow::{anyhow, Result};
use pulse_core::Tree;
use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        ensure_parent(path)?;
        let conn = Connection::open(path)?;
        apply_pragmas(&conn)?;
        migrate(&conn)?;
        debug!(path = %path.display(), "sqlite store opened");
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }
}

impl TreeStore for SqliteStore {
    fn load(&self) -> Result<Tree> {
        let conn = self.conn()?;
        query::read_tree(&conn)
    }

    fn save(&self, tree: &Tree) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        insert::write_tree(&tx, tree)?;
        tx.commit()?;
        Ok(())
    }

    fn transact(&self, f: &mut dyn FnMut(&mut Tree) -> Result<()>) -> Result<Tree> {
        let mut conn = self.conn()?;
        // IMMEDIATE takes the write lock up front so concurrent processes serialize here
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut tree = query::read_tree(&tx)?;
        f(&mut tree)?;
        insert::write_tree(&tx, &tree)?;
        tx.commit()?;
        Ok(tree)
    }
}

fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", &"WAL")?;
    conn.pragma_update(None, "synchronous", &"NORMAL")?;
    conn.pragma_update(None, "foreign_keys", &"ON")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

fn migrate(conn: &Connection) -> Result<()> {
    // naive: if meta table doesn't exist, apply 0001 (idempotent for older files without meta)
    let exists: i64 = conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name='meta'",
        [],
        |r| r.get(0),
    )?;
    if exists == 0 {
        conn.execute_batch(MIG_0001_INIT)?;
        debug!("applied schema migration 0001");
    }
    Ok(())
}

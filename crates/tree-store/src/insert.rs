use anyhow::Result;
use pulse_core::Tree;
use rusqlite::{params, Connection};

/// Wipe and rewrite both tables plus the counters. Callers provide the transaction.
pub(crate) fn write_tree(conn: &Connection, tree: &Tree) -> Result<()> {
    conn.execute("DELETE FROM nodes", [])?;
    conn.execute("DELETE FROM folders", [])?;

    let mut folder_stmt = conn.prepare("INSERT INTO folders(id, name) VALUES (?,?)")?;
    let mut node_stmt =
        conn.prepare("INSERT INTO nodes(id, folder_id, name, url, comment, active) VALUES (?,?,?,?,?,?)")?;
    for f in &tree.folders {
        folder_stmt.execute(params![f.id, f.name])?;
        for n in &f.nodes {
            // the holding folder wins over a stale back-reference
            node_stmt.execute(params![n.id, f.id, n.name, n.url, n.comment, if n.active { 1i64 } else { 0i64 }])?;
        }
    }

    let mut meta = conn.prepare(
        "INSERT INTO meta(key, value) VALUES (?,?) ON CONFLICT(key) DO UPDATE SET value=excluded.value",
    )?;
    meta.execute(params!["next_folder_id", tree.next_folder_id.to_string()])?;
    meta.execute(params!["next_node_id", tree.next_node_id.to_string()])?;
    Ok(())
}

use anyhow::Result;
use pulse_core::{Folder, Node, Tree};
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;

pub(crate) fn read_tree(conn: &Connection) -> Result<Tree> {
    let mut folders: Vec<Folder> = {
        let mut stmt = conn.prepare("SELECT id, name FROM folders ORDER BY id")?;
        let rows = stmt.query_map([], |r| Ok(Folder { id: r.get(0)?, name: r.get(1)?, nodes: Vec::new() }))?;
        rows.collect::<rusqlite::Result<_>>()?
    };
    let slot: HashMap<i64, usize> = folders.iter().enumerate().map(|(i, f)| (f.id, i)).collect();

    let mut stmt = conn.prepare("SELECT id, folder_id, name, url, comment, active FROM nodes ORDER BY id")?;
    let nodes = stmt.query_map([], |r| {
        Ok(Node {
            id: r.get(0)?,
            folder_id: r.get(1)?,
            name: r.get(2)?,
            url: r.get(3)?,
            comment: r.get::<_, Option<String>>(4)?.unwrap_or_default(),
            active: r.get::<_, i64>(5)? != 0,
        })
    })?;
    for node in nodes {
        let node = node?;
        // rows whose folder is gone are unreachable, as with the cascade
        if let Some(&i) = slot.get(&node.folder_id) {
            folders[i].nodes.push(node);
        }
    }

    let next_folder_id = match meta_counter(conn, "next_folder_id")? {
        Some(v) => v,
        None => conn.query_row("SELECT COALESCE(MAX(id)+1, 1) FROM folders", [], |r| r.get(0))?,
    };
    let next_node_id = match meta_counter(conn, "next_node_id")? {
        Some(v) => v,
        None => conn.query_row("SELECT COALESCE(MAX(id)+1, 1) FROM nodes", [], |r| r.get(0))?,
    };

    let mut tree = Tree { next_folder_id, next_node_id, folders };
    tree.normalize();
    Ok(tree)
}

fn meta_counter(conn: &Connection, key: &str) -> Result<Option<i64>> {
    let raw: Option<Option<String>> =
        conn.query_row("SELECT value FROM meta WHERE key=?", [key], |r| r.get(0)).optional()?;
    Ok(raw.flatten().and_then(|v| v.trim().parse().ok()))
}

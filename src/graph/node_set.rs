//! In-memory node sets backed by one table each.
//!
//! Eight sets (End/Attack × Forward/Reverse/TwoChar/ThreeChar) are loaded in
//! full when the store opens. Every mutation writes the table first and the
//! memory copy second, so a reader can at worst see a set that lags storage
//! by one write, never one that is ahead of it.

use std::collections::HashSet;
use std::sync::RwLock;

use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::types::NodeCategory;

/// Cached membership for all eight node categories.
///
/// Single writer by convention; reads take a short read guard and never
/// wait on storage.
pub struct NodeSetStore {
    sets: [RwLock<HashSet<String>>; 8],
}

impl std::fmt::Debug for NodeSetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("NodeSetStore");
        for category in NodeCategory::ALL {
            dbg.field(category.table_name(), &self.len(category));
        }
        dbg.finish()
    }
}

impl Default for NodeSetStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_node(node: &str) -> Result<()> {
    let len = node.chars().count();
    if len == 0 || len > 2 {
        return Err(Error::invalid(format!(
            "node must be 1-2 characters, got {len} (`{node}`)"
        )));
    }
    Ok(())
}

impl NodeSetStore {
    /// Empty sets; call [`NodeSetStore::load_all`] to populate.
    pub fn new() -> Self {
        Self {
            sets: std::array::from_fn(|_| RwLock::new(HashSet::new())),
        }
    }

    fn set(&self, category: NodeCategory) -> &RwLock<HashSet<String>> {
        &self.sets[category.index()]
    }

    /// Replace the memory copy of `category` with a full scan of its table.
    pub fn load(&self, conn: &Connection, category: NodeCategory) -> Result<usize> {
        let sql = format!("SELECT node FROM {}", category.table_name());
        let mut stmt = conn.prepare_cached(&sql)?;
        let loaded = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        let count = loaded.len();
        *self.set(category).write().unwrap_or_else(|e| e.into_inner()) = loaded;
        tracing::debug!(%category, count, "loaded node set");
        Ok(count)
    }

    /// Reload every category.
    pub fn load_all(&self, conn: &Connection) -> Result<usize> {
        let mut total = 0;
        for category in NodeCategory::ALL {
            total += self.load(conn, category)?;
        }
        Ok(total)
    }

    pub fn contains(&self, category: NodeCategory, node: &str) -> bool {
        if node.is_empty() {
            return false;
        }
        self.set(category)
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(node)
    }

    /// Insert `node` into `category` if absent. Returns whether a row was
    /// newly written.
    pub fn add(&self, conn: &Connection, category: NodeCategory, node: &str) -> Result<bool> {
        validate_node(node)?;
        let sql = format!(
            "INSERT INTO {table} (node) SELECT ?1 \
             WHERE NOT EXISTS (SELECT 1 FROM {table} WHERE node = ?1)",
            table = category.table_name()
        );
        let inserted = conn.prepare_cached(&sql)?.execute(params![node])? > 0;
        self.set(category)
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(node.to_string());
        if inserted {
            tracing::debug!(%category, node, "added node");
        }
        Ok(inserted)
    }

    /// Delete every row for `node` in `category`. Returns the row count.
    pub fn remove(&self, conn: &Connection, category: NodeCategory, node: &str) -> Result<usize> {
        let sql = format!("DELETE FROM {} WHERE node = ?1", category.table_name());
        let removed = conn.prepare_cached(&sql)?.execute(params![node])?;
        self.set(category)
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(node);
        if removed > 0 {
            tracing::debug!(%category, node, removed, "removed node");
        }
        Ok(removed)
    }

    pub fn len(&self, category: NodeCategory) -> usize {
        self.set(category)
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self, category: NodeCategory) -> bool {
        self.len(category) == 0
    }

    /// Sorted copy of one set.
    pub fn snapshot(&self, category: NodeCategory) -> Vec<String> {
        let mut nodes: Vec<String> = self
            .set(category)
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect();
        nodes.sort();
        nodes
    }
}

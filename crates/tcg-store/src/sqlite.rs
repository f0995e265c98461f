use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};
use serde_json::{Map, Value};
use tracing::info;

use crate::{KeyTree, StoreError};

/// SQLite-backed key tree.
///
/// Only leaves are stored: each row is a full slash path plus its JSON
/// scalar. Subtree reads reassemble nested objects from a prefix scan, and
/// subtree writes replace the whole prefix range. One writer connection
/// behind a mutex (WAL mode), so `transaction` commits are serialized and
/// the compare-and-update contract holds without an explicit retry loop.
pub struct SqliteTree {
    conn: Mutex<Connection>,
}

impl SqliteTree {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(&conn)?;
        info!("Key tree opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> Result<(), StoreError> {
        // Paths are case-sensitive; default LIKE would merge `alice` and
        // `Alice` subtrees on prefix scans.
        conn.execute_batch(
            "PRAGMA case_sensitive_like = ON;
            CREATE TABLE IF NOT EXISTS nodes (
                path   TEXT PRIMARY KEY,
                value  TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }
}

impl KeyTree for SqliteTree {
    fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.with_conn(|conn| read_at(conn, path))
    }

    fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            write_at(&tx, path, &value)?;
            tx.commit()?;
            Ok(())
        })
    }

    fn remove(&self, path: &str) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            delete_at(&tx, path)?;
            tx.commit()?;
            Ok(())
        })
    }

    fn transaction(
        &self,
        path: &str,
        apply: &dyn Fn(Option<Value>) -> Value,
    ) -> Result<Value, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let current = read_at(&tx, path)?;
            let next = apply(current);
            write_at(&tx, path, &next)?;
            tx.commit()
                .map_err(|_| StoreError::Conflict(path.to_string()))?;
            Ok(next)
        })
    }
}

fn read_at(conn: &Connection, path: &str) -> Result<Option<Value>, StoreError> {
    let exact: Option<String> = conn
        .query_row("SELECT value FROM nodes WHERE path = ?1", [path], |row| {
            row.get(0)
        })
        .optional()?;
    if let Some(raw) = exact {
        return parse_leaf(path, &raw).map(Some);
    }

    let mut stmt =
        conn.prepare("SELECT path, value FROM nodes WHERE path LIKE ?1 ESCAPE '\\'")?;
    let rows = stmt
        .query_map([subtree_pattern(path)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    if rows.is_empty() {
        return Ok(None);
    }

    let mut root = Map::new();
    for (row_path, raw) in rows {
        let rel = &row_path[path.len() + 1..];
        let leaf = parse_leaf(&row_path, &raw)?;
        insert_nested(&mut root, rel, leaf);
    }
    Ok(Some(Value::Object(root)))
}

fn write_at(conn: &Connection, path: &str, value: &Value) -> Result<(), StoreError> {
    delete_at(conn, path)?;

    // A leaf row at any ancestor would shadow the new subtree.
    for ancestor in ancestors(path) {
        conn.execute("DELETE FROM nodes WHERE path = ?1", [ancestor])?;
    }

    let mut leaves = Vec::new();
    flatten(path, value, &mut leaves);
    for (leaf_path, leaf) in leaves {
        conn.execute(
            "INSERT OR REPLACE INTO nodes (path, value) VALUES (?1, ?2)",
            (&leaf_path, leaf.to_string()),
        )?;
    }
    Ok(())
}

fn delete_at(conn: &Connection, path: &str) -> Result<(), StoreError> {
    conn.execute("DELETE FROM nodes WHERE path = ?1", [path])?;
    conn.execute(
        "DELETE FROM nodes WHERE path LIKE ?1 ESCAPE '\\'",
        [subtree_pattern(path)],
    )?;
    Ok(())
}

fn parse_leaf(path: &str, raw: &str) -> Result<Value, StoreError> {
    serde_json::from_str(raw).map_err(|source| StoreError::Corrupt {
        path: path.to_string(),
        source,
    })
}

/// Decompose a value into `(path, scalar)` leaf rows. `Null` and empty
/// objects contribute nothing, which makes writing them a removal.
fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, child) in map {
                flatten(&format!("{prefix}/{key}"), child, out);
            }
        }
        other => out.push((prefix.to_string(), other.clone())),
    }
}

fn insert_nested(root: &mut Map<String, Value>, rel: &str, leaf: Value) {
    let mut map = root;
    let segments: Vec<&str> = rel.split('/').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };
    for segment in parents {
        let entry = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(child) = entry else {
            return;
        };
        map = child;
    }
    map.insert((*last).to_string(), leaf);
}

fn ancestors(path: &str) -> Vec<&str> {
    path.match_indices('/').map(|(i, _)| &path[..i]).collect()
}

/// LIKE pattern matching strict descendants of `path`, with LIKE
/// metacharacters in the path itself escaped.
fn subtree_pattern(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len() + 2);
    for c in path.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push_str("/%");
    escaped
}

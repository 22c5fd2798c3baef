use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde_json::{Map, Value};

use crate::config::app_cache_dir;
use crate::store::{Document, DocumentStore, merge_objects, split_path};

/// `DocumentStore` over a single SQLite table keyed by document path.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join("club_stats.sqlite"))
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Replace-write a document.
    pub fn put(&self, path: &str, data: &Value) -> Result<()> {
        let conn = self.lock()?;
        upsert_document(&conn, path, data)
    }

    /// Load a flat `{ "path": { ... } }` export in one transaction.
    pub fn import_json(&self, raw: &str) -> Result<usize> {
        let parsed: Map<String, Value> =
            serde_json::from_str(raw).context("parse document tree json")?;
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("begin import transaction")?;
        let mut written = 0usize;
        for (path, data) in &parsed {
            upsert_document(&tx, path, data)?;
            written += 1;
        }
        tx.commit().context("commit import transaction")?;
        Ok(written)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS documents (
            path TEXT PRIMARY KEY,
            parent TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            data TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_documents_parent ON documents(parent);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

fn upsert_document(conn: &Connection, path: &str, data: &Value) -> Result<()> {
    let (parent, id) = split_path(path)?;
    let body = serde_json::to_string(data).context("serialize document")?;
    conn.execute(
        "INSERT INTO documents(path, parent, doc_id, data, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(path) DO UPDATE SET
            data = excluded.data,
            updated_at = excluded.updated_at",
        params![
            path.trim_matches('/'),
            parent,
            id,
            body,
            Utc::now().to_rfc3339()
        ],
    )
    .with_context(|| format!("upsert document {path}"))?;
    Ok(())
}

fn parse_body(path: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("decode document {path}"))
}

fn collect_documents(
    conn: &Connection,
    sql: &str,
    args: &[String],
) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare(sql).context("prepare document query")?;
    let rows = stmt
        .query_map(params_from_iter(args.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })
        .context("query documents")?;

    let mut out = Vec::new();
    for row in rows {
        let (id, path, raw) = row.context("read document row")?;
        let data = parse_body(&path, &raw)?;
        out.push(Document { id, path, data });
    }
    Ok(out)
}

impl DocumentStore for SqliteStore {
    fn get(&self, path: &str) -> Result<Option<Value>> {
        let conn = self.lock()?;
        let key = path.trim_matches('/');
        let raw = conn
            .query_row(
                "SELECT data FROM documents WHERE path = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("read document {key}"))?;
        raw.map(|raw| parse_body(key, &raw)).transpose()
    }

    fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let conn = self.lock()?;
        collect_documents(
            &conn,
            "SELECT doc_id, path, data FROM documents WHERE parent = ?1",
            &[collection.trim_matches('/').to_string()],
        )
    }

    fn query_in(&self, collection: &str, field: &str, values: &[String]) -> Result<Vec<Document>> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (0..values.len())
            .map(|idx| format!("?{}", idx + 3))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT doc_id, path, data FROM documents
             WHERE parent = ?1 AND json_extract(data, ?2) IN ({placeholders})"
        );
        let mut args = Vec::with_capacity(values.len() + 2);
        args.push(collection.trim_matches('/').to_string());
        args.push(format!("$.\"{field}\""));
        args.extend(values.iter().cloned());

        let conn = self.lock()?;
        collect_documents(&conn, &sql, &args)
    }

    fn merge(&self, path: &str, data: Value) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().context("begin merge transaction")?;
        let key = path.trim_matches('/');
        let existing = tx
            .query_row(
                "SELECT data FROM documents WHERE path = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("read document {key}"))?
            .map(|raw| parse_body(key, &raw))
            .transpose()?;
        let merged = merge_objects(existing, data);
        upsert_document(&tx, key, &merged)?;
        tx.commit().context("commit merge transaction")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn round_trips_documents_and_lists_children() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("owner/a/teams/t1", &json!({"name": "First"})).unwrap();
        store
            .put("owner/a/teams/t1/players/p1", &json!({"name": "P"}))
            .unwrap();

        assert_eq!(
            store.get("owner/a/teams/t1").unwrap(),
            Some(json!({"name": "First"}))
        );
        let listed = store.list("owner/a/teams").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "t1");
    }

    #[test]
    fn query_in_matches_any_literal() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.put("c/a", &json!({"season": "2024-25"})).unwrap();
        store.put("c/b", &json!({"season": "2024/2025"})).unwrap();
        store.put("c/c", &json!({"season": "2023/24"})).unwrap();

        let mut ids: Vec<String> = store
            .query_in("c", "season", &["2024-25".into(), "2024/2025".into()])
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn merge_overwrites_only_given_keys() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.merge("c/x", json!({"a": 1})).unwrap();
        store.merge("c/x", json!({"b": 2})).unwrap();
        assert_eq!(store.get("c/x").unwrap(), Some(json!({"a": 1, "b": 2})));
    }
}

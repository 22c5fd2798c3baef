use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{Context, Result, anyhow};
use serde_json::{Map, Value};

/// One stored document: its id (last path segment), full path and body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub path: String,
    pub data: Value,
}

/// Read-mostly view of the hierarchical document store.
///
/// Paths are `/`-separated; a collection path has an odd number of
/// segments and a document path an even number. Filters are literal
/// equality only, which is why season lookups go through
/// [`crate::season_key::expand_variants`].
pub trait DocumentStore: Send + Sync {
    fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Direct children of `collection`, in no guaranteed order.
    fn list(&self, collection: &str) -> Result<Vec<Document>>;

    /// Documents of `collection` whose string `field` equals any of `values`.
    fn query_in(&self, collection: &str, field: &str, values: &[String]) -> Result<Vec<Document>> {
        Ok(self
            .list(collection)?
            .into_iter()
            .filter(|doc| field_matches(&doc.data, field, values))
            .collect())
    }

    /// Shallow merge-write: top-level keys of `data` replace the stored ones.
    fn merge(&self, path: &str, data: Value) -> Result<()>;
}

pub fn field_matches(data: &Value, field: &str, values: &[String]) -> bool {
    data.get(field)
        .and_then(Value::as_str)
        .is_some_and(|s| values.iter().any(|v| v == s))
}

pub fn merge_objects(existing: Option<Value>, incoming: Value) -> Value {
    match (existing, incoming) {
        (Some(Value::Object(mut base)), Value::Object(patch)) => {
            for (key, value) in patch {
                base.insert(key, value);
            }
            Value::Object(base)
        }
        (_, incoming) => incoming,
    }
}

pub fn split_path(path: &str) -> Result<(&str, &str)> {
    let trimmed = path.trim_matches('/');
    let (parent, id) = trimmed
        .rsplit_once('/')
        .ok_or_else(|| anyhow!("document path {path:?} has no collection"))?;
    if parent.is_empty() || id.is_empty() {
        return Err(anyhow!("malformed document path {path:?}"));
    }
    Ok((parent, id))
}

/// Path conventions of the club data store.
pub mod paths {
    pub const CLUB_PROFILES: &str = "clubProfiles";

    pub fn club_profile(id: &str) -> String {
        format!("{CLUB_PROFILES}/{id}")
    }

    pub fn seasons(scope: &str) -> String {
        format!("owner/{scope}/seasons")
    }

    pub fn roster_entry(scope: &str, season_id: &str, player_id: &str) -> String {
        format!("owner/{scope}/seasons/{season_id}/roster/{player_id}")
    }

    pub fn teams(scope: &str) -> String {
        format!("owner/{scope}/teams")
    }

    pub fn team_player(scope: &str, team_id: &str, player_id: &str) -> String {
        format!("owner/{scope}/teams/{team_id}/players/{player_id}")
    }

    pub fn competitions(scope: &str) -> String {
        format!("owner/{scope}/competitions")
    }

    pub fn rounds(scope: &str, competition_id: &str) -> String {
        format!("owner/{scope}/competitions/{competition_id}/rounds")
    }

    pub fn matches(scope: &str, competition_id: &str, round_id: &str) -> String {
        format!("owner/{scope}/competitions/{competition_id}/rounds/{round_id}/matches")
    }

    pub fn stats_cache(scope: &str, player_id: &str) -> String {
        format!("owner/{scope}/playerStatsCache/{player_id}")
    }
}

/// HashMap-style store for tests, fixtures and small embedded datasets.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a flat `{ "path": { ...document... } }` object.
    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: Map<String, Value> =
            serde_json::from_str(raw).context("parse document tree json")?;
        let store = Self::new();
        for (path, data) in parsed {
            store.insert(&path, data)?;
        }
        Ok(store)
    }

    pub fn insert(&self, path: &str, data: Value) -> Result<()> {
        split_path(path)?;
        let mut docs = self
            .docs
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        docs.insert(path.trim_matches('/').to_string(), data);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, path: &str) -> Result<Option<Value>> {
        let docs = self
            .docs
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(docs.get(path.trim_matches('/')).cloned())
    }

    fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let prefix = format!("{}/", collection.trim_matches('/'));
        let docs = self
            .docs
            .read()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(docs
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, data)| {
                let id = &path[prefix.len()..];
                if id.is_empty() || id.contains('/') {
                    return None;
                }
                Some(Document {
                    id: id.to_string(),
                    path: path.clone(),
                    data: data.clone(),
                })
            })
            .collect())
    }

    fn merge(&self, path: &str, data: Value) -> Result<()> {
        split_path(path)?;
        let key = path.trim_matches('/').to_string();
        let mut docs = self
            .docs
            .write()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        let merged = merge_objects(docs.remove(&key), data);
        docs.insert(key, merged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn list_returns_direct_children_only() {
        let store = MemoryStore::new();
        store.insert("owner/a/teams/t1", json!({"name": "First"})).unwrap();
        store.insert("owner/a/teams/t2", json!({"name": "Second"})).unwrap();
        store
            .insert("owner/a/teams/t1/players/p1", json!({"name": "P"}))
            .unwrap();
        store.insert("owner/a/teamsX/t9", json!({})).unwrap();

        let ids: Vec<String> = store
            .list("owner/a/teams")
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["t1".to_string(), "t2".to_string()]);
    }

    #[test]
    fn merge_keeps_untouched_keys() {
        let store = MemoryStore::new();
        store.insert("c/x", json!({"a": 1, "b": 2})).unwrap();
        store.merge("c/x", json!({"b": 3, "c": 4})).unwrap();
        assert_eq!(store.get("c/x").unwrap(), Some(json!({"a": 1, "b": 3, "c": 4})));
    }

    #[test]
    fn query_in_is_literal_equality() {
        let store = MemoryStore::new();
        store.insert("comps/a", json!({"season": "2024-25"})).unwrap();
        store.insert("comps/b", json!({"season": "2024/25"})).unwrap();
        store.insert("comps/c", json!({"season": "2023/24"})).unwrap();
        let hits = store
            .query_in("comps", "season", &["2024-25".to_string()])
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn paths_without_collection_are_rejected() {
        let store = MemoryStore::new();
        assert!(store.insert("lonely", json!({})).is_err());
    }
}

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use strum::{AsRefStr, Display, EnumIter, EnumString};

pub type Document = Value;

/// Emits `(key, value)` pairs for a single document.
pub type MapFn = dyn Fn(&Document) -> Vec<(String, Value)> + Send + Sync;
/// Folds every value emitted for one key.
pub type ReduceFn = dyn Fn(&str, Vec<Value>) -> Value + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, AsRefStr, EnumString, EnumIter)]
pub enum Collection {
    User,
    Blacklist,
    EventDay,
    Repository,
    Organization,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("document {collection}/{id} already exists")]
    Duplicate { collection: Collection, id: String },
    #[error("document {collection}/{id} not found")]
    NotFound { collection: Collection, id: String },
    #[error("document is not a JSON object")]
    InvalidDocument,
}

/// Schemaless storage used by the importer. Queries are JSON objects matched
/// by containment: a document matches when every field of the query is
/// present in it with an equal (or, for objects, contained) value.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fails with [`StoreError::Duplicate`] when `id` is taken.
    async fn insert(
        &self,
        collection: Collection,
        id: &str,
        doc: &Document,
    ) -> Result<(), StoreError>;

    async fn find_by_id(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError>;

    /// Replaces the whole document.
    async fn update_by_id(
        &self,
        collection: Collection,
        id: &str,
        doc: &Document,
    ) -> Result<(), StoreError>;

    async fn find(
        &self,
        collection: Collection,
        query: &Document,
    ) -> Result<Vec<Document>, StoreError>;

    /// Shallow-merges `patch` into every matching document.
    async fn update(
        &self,
        collection: Collection,
        query: &Document,
        patch: &Document,
    ) -> Result<u64, StoreError>;

    async fn remove(&self, collection: Collection, query: &Document) -> Result<u64, StoreError>;

    async fn remove_all(&self, collection: Collection) -> Result<u64, StoreError>;

    async fn count(&self, collection: Collection) -> Result<u64, StoreError>;

    async fn map_reduce(
        &self,
        collection: Collection,
        map: &MapFn,
        reduce: &ReduceFn,
    ) -> Result<BTreeMap<String, Value>, StoreError>;
}

/// Containment check shared by the in-memory backend. Mirrors Postgres `@>`
/// for the object and scalar cases the importer issues.
pub fn contains(doc: &Value, query: &Value) -> bool {
    match (doc, query) {
        (Value::Object(doc), Value::Object(query)) => query
            .iter()
            .all(|(key, expected)| doc.get(key).is_some_and(|v| contains(v, expected))),
        (Value::Array(doc), Value::Array(query)) => query
            .iter()
            .all(|expected| doc.iter().any(|v| contains(v, expected))),
        (doc, query) => doc == query,
    }
}

pub fn merge(doc: &mut Value, patch: &Value) -> Result<(), StoreError> {
    match (doc, patch) {
        (Value::Object(doc), Value::Object(patch)) => {
            for (key, value) in patch {
                doc.insert(key.clone(), value.clone());
            }
            Ok(())
        }
        _ => Err(StoreError::InvalidDocument),
    }
}

/// Accumulates mapped pairs by key. Both backends feed documents through it,
/// so grouping and reduction behave the same wherever the rows come from.
#[derive(Debug, Default)]
pub struct MapReduceGroups {
    groups: BTreeMap<String, Vec<Value>>,
}

impl MapReduceGroups {
    pub fn push(&mut self, doc: &Document, map: &MapFn) {
        for (key, value) in map(doc) {
            self.groups.entry(key).or_default().push(value);
        }
    }

    pub fn reduce(self, reduce: &ReduceFn) -> BTreeMap<String, Value> {
        self.groups
            .into_iter()
            .map(|(key, values)| {
                let reduced = reduce(&key, values);
                (key, reduced)
            })
            .collect()
    }
}

pub fn fold_map_reduce<'a>(
    docs: impl IntoIterator<Item = &'a Document>,
    map: &MapFn,
    reduce: &ReduceFn,
) -> BTreeMap<String, Value> {
    let mut groups = MapReduceGroups::default();
    for doc in docs {
        groups.push(doc, map);
    }
    groups.reduce(reduce)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn containment_matches_nested_fields() {
        let doc = json!({"id": "bob", "profile": {"name": "Bob", "age": 3}, "tags": [1, 2]});

        assert!(contains(&doc, &json!({})));
        assert!(contains(&doc, &json!({"id": "bob"})));
        assert!(contains(&doc, &json!({"profile": {"name": "Bob"}})));
        assert!(contains(&doc, &json!({"tags": [2]})));
        assert!(!contains(&doc, &json!({"id": "alice"})));
        assert!(!contains(&doc, &json!({"missing": null})));
    }

    #[test]
    fn merge_is_shallow() {
        let mut doc = json!({"a": 1, "b": {"c": 2}});
        merge(&mut doc, &json!({"b": {"d": 3}, "e": 4})).unwrap();

        assert_eq!(doc, json!({"a": 1, "b": {"d": 3}, "e": 4}));
        assert!(merge(&mut json!(1), &json!({})).is_err());
    }

    #[test]
    fn map_reduce_groups_by_key() {
        let docs = [json!({"k": "a", "v": 1}), json!({"k": "b", "v": 2}), json!({"k": "a", "v": 3})];
        let result = fold_map_reduce(
            docs.iter(),
            &|doc| vec![(doc["k"].as_str().unwrap_or_default().to_string(), doc["v"].clone())],
            &|_, values| json!(values.iter().filter_map(Value::as_u64).sum::<u64>()),
        );

        assert_eq!(result.get("a"), Some(&json!(4)));
        assert_eq!(result.get("b"), Some(&json!(2)));
    }

    #[test]
    fn streamed_groups_match_the_batch_fold() {
        let docs = [
            json!({ "k": "a", "v": 1 }),
            json!({ "k": "b", "v": 2 }),
            json!({ "k": "a", "v": 3 }),
        ];
        let map: &MapFn = &|doc| vec![(doc["k"].as_str().unwrap_or_default().to_string(), doc["v"].clone())];
        let reduce: &ReduceFn = &|_, values| json!(values.len());

        let mut groups = MapReduceGroups::default();
        for doc in &docs {
            groups.push(doc, map);
        }
        let streamed = groups.reduce(reduce);

        assert_eq!(streamed, fold_map_reduce(docs.iter(), map, reduce));
        assert_eq!(streamed.get("a"), Some(&json!(2)));
    }
}

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::store::{
    contains, fold_map_reduce, merge, Collection, Document, DocumentStore, MapFn, ReduceFn,
    StoreError,
};

/// Process-local document store. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Collection, BTreeMap<String, Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn ensure_object(doc: &Document) -> Result<(), StoreError> {
    if doc.is_object() {
        Ok(())
    } else {
        Err(StoreError::InvalidDocument)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(
        &self,
        collection: Collection,
        id: &str,
        doc: &Document,
    ) -> Result<(), StoreError> {
        ensure_object(doc)?;
        let mut collections = self.collections.write().await;
        let documents = collections.entry(collection).or_default();
        if documents.contains_key(id) {
            return Err(StoreError::Duplicate {
                collection,
                id: id.to_string(),
            });
        }
        documents.insert(id.to_string(), doc.clone());
        Ok(())
    }

    async fn find_by_id(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(&collection)
            .and_then(|documents| documents.get(id))
            .cloned())
    }

    async fn update_by_id(
        &self,
        collection: Collection,
        id: &str,
        doc: &Document,
    ) -> Result<(), StoreError> {
        ensure_object(doc)?;
        let mut collections = self.collections.write().await;
        match collections
            .get_mut(&collection)
            .and_then(|documents| documents.get_mut(id))
        {
            Some(stored) => {
                *stored = doc.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            }),
        }
    }

    async fn find(
        &self,
        collection: Collection,
        query: &Document,
    ) -> Result<Vec<Document>, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(&collection)
            .map(|documents| {
                documents
                    .values()
                    .filter(|doc| contains(doc, query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(
        &self,
        collection: Collection,
        query: &Document,
        patch: &Document,
    ) -> Result<u64, StoreError> {
        ensure_object(patch)?;
        let mut collections = self.collections.write().await;
        let mut updated = 0;
        if let Some(documents) = collections.get_mut(&collection) {
            for doc in documents.values_mut().filter(|doc| contains(doc, query)) {
                merge(doc, patch)?;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn remove(&self, collection: Collection, query: &Document) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(documents) = collections.get_mut(&collection) else {
            return Ok(0);
        };
        let before = documents.len();
        documents.retain(|_, doc| !contains(doc, query));
        Ok((before - documents.len()) as u64)
    }

    async fn remove_all(&self, collection: Collection) -> Result<u64, StoreError> {
        Ok(self
            .collections
            .write()
            .await
            .remove(&collection)
            .map_or(0, |documents| documents.len() as u64))
    }

    async fn count(&self, collection: Collection) -> Result<u64, StoreError> {
        Ok(self
            .collections
            .read()
            .await
            .get(&collection)
            .map_or(0, |documents| documents.len() as u64))
    }

    async fn map_reduce(
        &self,
        collection: Collection,
        map: &MapFn,
        reduce: &ReduceFn,
    ) -> Result<BTreeMap<String, Value>, StoreError> {
        let collections = self.collections.read().await;
        Ok(match collections.get(&collection) {
            Some(documents) => fold_map_reduce(documents.values(), map, reduce),
            None => BTreeMap::new(),
        })
    }
}

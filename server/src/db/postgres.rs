use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Row};
use tracing::instrument;

use super::store::{
    Collection, Document, DocumentStore, MapFn, MapReduceGroups, ReduceFn, StoreError,
};

/// Document store backed by a single JSONB table. The primary key on
/// `(collection, id)` is the uniqueness guarantee the importer relies on when
/// two workers register the same login.
#[derive(Clone, Debug)]
pub struct PgStore(PgPool);

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        let store = Self(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self(pool)
    }

    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body JSONB NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.0)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS documents_body_idx
            ON documents USING GIN (body jsonb_path_ops)
            "#,
        )
        .execute(&self.0)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn insert(
        &self,
        collection: Collection,
        id: &str,
        doc: &Document,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO NOTHING
            "#,
        )
        .bind(collection.as_ref())
        .bind(id)
        .bind(Json(doc))
        .execute(&self.0)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate {
                collection,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn find_by_id(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT body FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection.as_ref())
        .bind(id)
        .fetch_optional(&self.0)
        .await?;

        Ok(row
            .map(|row| row.try_get::<Json<Value>, _>("body"))
            .transpose()?
            .map(|body| body.0))
    }

    async fn update_by_id(
        &self,
        collection: Collection,
        id: &str,
        doc: &Document,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET body = $3
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection.as_ref())
        .bind(id)
        .bind(Json(doc))
        .execute(&self.0)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                collection,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn find(
        &self,
        collection: Collection,
        query: &Document,
    ) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT body FROM documents
            WHERE collection = $1 AND body @> $2
            ORDER BY id
            "#,
        )
        .bind(collection.as_ref())
        .bind(Json(query))
        .fetch_all(&self.0)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<Document, StoreError> {
                Ok(row.try_get::<Json<Value>, _>("body")?.0)
            })
            .collect()
    }

    async fn update(
        &self,
        collection: Collection,
        query: &Document,
        patch: &Document,
    ) -> Result<u64, StoreError> {
        if !patch.is_object() {
            return Err(StoreError::InvalidDocument);
        }

        let result = sqlx::query(
            r#"
            UPDATE documents
            SET body = body || $3
            WHERE collection = $1 AND body @> $2
            "#,
        )
        .bind(collection.as_ref())
        .bind(Json(query))
        .bind(Json(patch))
        .execute(&self.0)
        .await?;
        Ok(result.rows_affected())
    }

    async fn remove(&self, collection: Collection, query: &Document) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM documents
            WHERE collection = $1 AND body @> $2
            "#,
        )
        .bind(collection.as_ref())
        .bind(Json(query))
        .execute(&self.0)
        .await?;
        Ok(result.rows_affected())
    }

    async fn remove_all(&self, collection: Collection) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1")
            .bind(collection.as_ref())
            .execute(&self.0)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self, collection: Collection) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection = $1")
            .bind(collection.as_ref())
            .fetch_one(&self.0)
            .await?;
        Ok(count as u64)
    }

    async fn map_reduce(
        &self,
        collection: Collection,
        map: &MapFn,
        reduce: &ReduceFn,
    ) -> Result<BTreeMap<String, Value>, StoreError> {
        // Rows are streamed; only the mapped pairs are kept in memory.
        let mut groups = MapReduceGroups::default();
        let mut rows = sqlx::query("SELECT body FROM documents WHERE collection = $1")
            .bind(collection.as_ref())
            .fetch(&self.0);
        while let Some(row) = rows.try_next().await? {
            let body: Json<Value> = row.try_get("body")?;
            groups.push(&body.0, map);
        }

        Ok(groups.reduce(reduce))
    }
}

use std::{collections::BTreeMap, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use shared::{user_id, EventDay, User, UserId};
use tracing::{debug, instrument};

pub mod memory;
pub mod postgres;
pub mod store;
pub mod types;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{Collection, Document, DocumentStore, StoreError};

use types::{BlacklistEntry, LanguageRanking, RankingRecord};

/// Typed access to the import collections. Cloning is cheap; every clone
/// shares the same underlying store handle.
#[derive(Clone)]
pub struct DB(Arc<dyn DocumentStore>);

impl std::fmt::Debug for DB {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DB").finish()
    }
}

fn to_document<T: Serialize>(value: &T) -> Result<Document, StoreError> {
    Ok(serde_json::to_value(value)?)
}

fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T, StoreError> {
    Ok(serde_json::from_value(doc)?)
}

impl DB {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self(store)
    }

    pub fn memory() -> Self {
        Self(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.0.as_ref()
    }

    pub async fn get_user(&self, login: &str) -> Result<Option<User>, StoreError> {
        self.0
            .find_by_id(Collection::User, &user_id(login))
            .await?
            .map(from_document)
            .transpose()
    }

    /// Creates the user if no document exists for its lowercase login and
    /// returns whatever is stored afterwards. Losing a creation race to another
    /// worker is not an error: the winner's document is returned.
    pub async fn register_user(&self, login: &str) -> Result<User, StoreError> {
        let user = User::new(login);
        match self
            .0
            .insert(Collection::User, &user.id, &to_document(&user)?)
            .await
        {
            Ok(()) => Ok(user),
            Err(StoreError::Duplicate { .. }) => {
                debug!("User {} registered concurrently", user.id);
                self.get_user(login).await?.ok_or(StoreError::NotFound {
                    collection: Collection::User,
                    id: user.id,
                })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get_or_register_user(&self, login: &str) -> Result<User, StoreError> {
        match self.get_user(login).await? {
            Some(user) => Ok(user),
            None => self.register_user(login).await,
        }
    }

    pub async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        self.0
            .update_by_id(Collection::User, &user.id, &to_document(user)?)
            .await
    }

    pub async fn is_blacklisted(&self, user_id: &UserId) -> Result<bool, StoreError> {
        Ok(self
            .0
            .find_by_id(Collection::Blacklist, user_id)
            .await?
            .is_some())
    }

    pub async fn blacklist(&self, user_id: &UserId, reason: &str) -> Result<(), StoreError> {
        let entry = BlacklistEntry {
            user_id: user_id.clone(),
            reason: reason.to_string(),
        };
        match self
            .0
            .insert(Collection::Blacklist, user_id, &to_document(&entry)?)
            .await
        {
            Ok(()) | Err(StoreError::Duplicate { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn register_event_day(&self, event: &EventDay) -> Result<(), StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.0
            .insert(Collection::EventDay, &id, &to_document(event)?)
            .await
    }

    #[instrument(skip(self))]
    pub async fn clear_event_days(&self) -> Result<u64, StoreError> {
        self.0.remove_all(Collection::EventDay).await
    }

    pub async fn event_days(&self, query: &Value) -> Result<Vec<EventDay>, StoreError> {
        self.0
            .find(Collection::EventDay, query)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn event_days_for_user(&self, user_id: &UserId) -> Result<Vec<EventDay>, StoreError> {
        self.event_days(&json!({ "user_id": user_id })).await
    }

    /// True once any import has stored a user.
    pub async fn is_filled(&self) -> Result<bool, StoreError> {
        Ok(self.0.count(Collection::User).await? > 0)
    }

    /// Sums ledger experience per (language, user) and orders each language's
    /// users by experience, highest first.
    #[instrument(skip(self))]
    pub async fn daily_language_ranking(&self) -> Result<LanguageRanking, StoreError> {
        let totals = self
            .0
            .map_reduce(
                Collection::EventDay,
                &|doc| {
                    let language = doc["language"].as_str().unwrap_or_default();
                    let user = doc["user_id"].as_str().unwrap_or_default();
                    vec![(
                        format!("{language}\u{0}{user}"),
                        json!({ "xp": doc["xp"], "events": 1 }),
                    )]
                },
                &|_, values| {
                    let (xp, events) = values.iter().fold((0u64, 0u64), |(xp, events), v| {
                        (
                            xp + v["xp"].as_u64().unwrap_or_default(),
                            events + v["events"].as_u64().unwrap_or_default(),
                        )
                    });
                    json!({ "xp": xp, "events": events })
                },
            )
            .await?;

        let mut ranking: BTreeMap<String, Vec<RankingRecord>> = BTreeMap::new();
        for (key, value) in totals {
            let Some((language, user_id)) = key.split_once('\u{0}') else {
                continue;
            };
            ranking
                .entry(language.to_string())
                .or_default()
                .push(RankingRecord {
                    user_id: user_id.to_string(),
                    experience: value["xp"].as_u64().unwrap_or_default(),
                    events: value["events"].as_u64().unwrap_or_default(),
                });
        }
        for records in ranking.values_mut() {
            records.sort_by(|a, b| {
                b.experience
                    .cmp(&a.experience)
                    .then_with(|| a.user_id.cmp(&b.user_id))
            });
        }

        Ok(LanguageRanking(ranking))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_user_is_idempotent_per_login() {
        let db = DB::memory();
        let mut first = db.register_user("Alice").await.unwrap();
        first.add_experience("Rust", 3);
        db.update_user(&first).await.unwrap();

        let second = db.register_user("alice").await.unwrap();
        assert_eq!(second.experience, 3);
        assert_eq!(second.login, "Alice");
        assert_eq!(db.store().count(Collection::User).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn blacklist_is_keyed_by_user_id() {
        let db = DB::memory();
        let id = user_id("Mallory");
        assert!(!db.is_blacklisted(&id).await.unwrap());

        db.blacklist(&id, "spam").await.unwrap();
        db.blacklist(&id, "spam again").await.unwrap();
        assert!(db.is_blacklisted(&"mallory".to_string()).await.unwrap());
    }

    #[tokio::test]
    async fn is_filled_tracks_users() {
        let db = DB::memory();
        assert!(!db.is_filled().await.unwrap());
        db.register_user("bob").await.unwrap();
        assert!(db.is_filled().await.unwrap());
    }

    #[tokio::test]
    async fn ranking_sums_ledger_per_language() {
        let db = DB::memory();
        let entries = [
            ("pushevent", "Rust", "alice", 4),
            ("watchevent", "Rust", "bob", 1),
            ("pushevent", "Rust", "bob", 5),
            ("forkevent", "Go", "alice", 1),
        ];
        for (kind, language, user, xp) in entries {
            db.register_event_day(&EventDay::new(
                kind.to_string(),
                language.to_string(),
                user.to_string(),
                xp,
                1,
                String::new(),
            ))
            .await
            .unwrap();
        }

        let ranking = db.daily_language_ranking().await.unwrap();
        let rust = ranking.language("Rust").unwrap();
        assert_eq!(rust[0].user_id, "bob");
        assert_eq!(rust[0].experience, 6);
        assert_eq!(rust[0].events, 2);
        assert_eq!(rust[1].user_id, "alice");
        assert_eq!(ranking.language("Go").map(<[_]>::len), Some(1));

        assert_eq!(db.clear_event_days().await.unwrap(), 4);
        assert!(db.daily_language_ranking().await.unwrap().is_empty());
    }
}

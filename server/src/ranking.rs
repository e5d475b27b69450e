use std::sync::Arc;

use tokio::sync::{watch, RwLock};
use tracing::{debug, instrument};

use crate::db::{types::LanguageRanking, StoreError, DB};

/// Materialized daily ranking, rebuilt lazily from the ledger. Each
/// invalidation bumps a generation number that downstream readers can watch.
pub struct RankingCache {
    generation: watch::Sender<u64>,
    ranking: RwLock<Option<Arc<LanguageRanking>>>,
}

impl Default for RankingCache {
    fn default() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            generation,
            ranking: RwLock::new(None),
        }
    }
}

impl RankingCache {
    /// Readers holding the old `Arc` keep it; the next reader rebuilds.
    pub async fn invalidate(&self) {
        *self.ranking.write().await = None;
        self.generation.send_modify(|generation| *generation += 1);
    }

    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    #[instrument(skip(self, db))]
    pub async fn get_or_build(&self, db: &DB) -> Result<Arc<LanguageRanking>, StoreError> {
        if let Some(ranking) = self.ranking.read().await.as_ref() {
            return Ok(ranking.clone());
        }

        let mut slot = self.ranking.write().await;
        if let Some(ranking) = slot.as_ref() {
            return Ok(ranking.clone());
        }

        debug!("Rebuilding ranking for generation {}", self.generation());
        let ranking = Arc::new(db.daily_language_ranking().await?);
        *slot = Some(ranking.clone());
        Ok(ranking)
    }
}

#[cfg(test)]
mod tests {
    use shared::EventDay;

    use super::*;

    fn entry(user: &str, xp: u32) -> EventDay {
        EventDay::new(
            "pushevent".to_string(),
            "Rust".to_string(),
            user.to_string(),
            xp,
            1,
            String::new(),
        )
    }

    #[tokio::test]
    async fn invalidation_drops_the_materialized_ranking() {
        let db = DB::memory();
        let cache = RankingCache::default();
        let mut receiver = cache.subscribe();

        db.register_event_day(&entry("alice", 3)).await.unwrap();
        let first = cache.get_or_build(&db).await.unwrap();
        assert_eq!(first.language("Rust").unwrap()[0].experience, 3);

        db.register_event_day(&entry("alice", 2)).await.unwrap();
        let cached = cache.get_or_build(&db).await.unwrap();
        assert_eq!(cached.language("Rust").unwrap()[0].experience, 3);

        cache.invalidate().await;
        assert!(receiver.has_changed().unwrap());
        assert_eq!(*receiver.borrow_and_update(), 1);

        let rebuilt = cache.get_or_build(&db).await.unwrap();
        assert_eq!(rebuilt.language("Rust").unwrap()[0].experience, 5);
    }
}

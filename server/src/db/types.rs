use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shared::UserId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlacklistEntry {
    pub user_id: UserId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RankingRecord {
    pub user_id: UserId,
    pub experience: u64,
    pub events: u64,
}

/// Per-language daily ranking, built from the event ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LanguageRanking(pub BTreeMap<String, Vec<RankingRecord>>);

impl LanguageRanking {
    pub fn language(&self, language: &str) -> Option<&[RankingRecord]> {
        self.0.get(language).map(Vec::as_slice)
    }

    pub fn leaders(&self) -> impl Iterator<Item = (&str, &RankingRecord)> {
        self.0
            .iter()
            .filter_map(|(language, records)| Some((language.as_str(), records.first()?)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

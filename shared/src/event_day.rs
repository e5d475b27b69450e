use serde::{Deserialize, Serialize};

use crate::{RepositoryId, UserId};

/// Ranking ledger entry. Written once per scored event and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventDay {
    #[serde(rename = "type")]
    pub kind: String,
    pub language: String,
    pub user_id: UserId,
    pub xp: u32,
    pub repository_id: RepositoryId,
    pub created_at: String,
}

impl EventDay {
    pub fn new(
        kind: String,
        language: String,
        user_id: UserId,
        xp: u32,
        repository_id: RepositoryId,
        created_at: String,
    ) -> Self {
        Self {
            kind,
            language,
            user_id,
            xp,
            repository_id,
            created_at,
        }
    }
}

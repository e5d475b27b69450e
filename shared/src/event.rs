use serde::{Deserialize, Deserializer, Serialize};

use crate::{EventKind, UNKNOWN_LANGUAGE};

/// Actor type that takes part in scoring. Organizations and bots are dropped.
pub const PARTICIPANT_ACTOR_TYPE: &str = "User";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed event line: {0}")]
    Malformed(#[from] serde_json::Error),
}

// Archives contain explicit nulls for absent strings and counters.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ActorAttributes {
    #[serde(default, deserialize_with = "null_as_default")]
    pub login: String,
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub gravatar_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ImportedRepository {
    #[serde(default, deserialize_with = "null_as_default")]
    pub language: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub organization: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stargazers_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub size: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub owner: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_wiki: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub has_downloads: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub forks_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub open_issues_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fork: bool,
}

impl ImportedRepository {
    pub fn is_personal(&self) -> bool {
        self.organization.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Payload {
    #[serde(default, deserialize_with = "null_as_default")]
    pub action: String,
}

/// One line of an hourly archive.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ImportedEvent {
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, rename = "actor_attributes", deserialize_with = "null_as_default")]
    pub actor: ActorAttributes,
    #[serde(default, deserialize_with = "null_as_default")]
    pub repository: ImportedRepository,
    #[serde(default, deserialize_with = "null_as_default")]
    pub payload: Payload,
}

impl ImportedEvent {
    /// Parses a single archive line. Returns `Ok(None)` for well-formed
    /// events that do not take part in scoring (non-user actors).
    pub fn decode(line: &str) -> Result<Option<Self>, DecodeError> {
        let mut event: ImportedEvent = serde_json::from_str(line)?;

        if event.actor.kind != PARTICIPANT_ACTOR_TYPE || event.actor.login.is_empty() {
            return Ok(None);
        }

        if event.repository.language.is_empty() {
            event.repository.language = UNKNOWN_LANGUAGE.to_string();
        }

        Ok(Some(event))
    }

    pub fn event_kind(&self) -> Option<EventKind> {
        EventKind::from_type(&self.kind)
    }

    /// Lowercased `type`, as stored in the ranking ledger.
    pub fn kind_key(&self) -> String {
        self.kind.to_lowercase()
    }
}

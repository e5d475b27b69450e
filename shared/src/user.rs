use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{level_for, Counter, ImportedRepository};

pub const UNKNOWN_LANGUAGE: &str = "Unknown";

pub type UserId = String;
pub type RepositoryId = u64;

/// Users are keyed by their lowercase login so that `Alice` and `alice`
/// always land on the same document.
pub fn user_id(login: &str) -> UserId {
    login.to_lowercase()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EventCounters {
    pub pushes: u64,
    pub creates: u64,
    pub deletes: u64,
    pub issues: u64,
    pub comments: u64,
    pub stars: u64,
    pub forks: u64,
    pub pullrequests: u64,
}

impl EventCounters {
    pub fn increment(&mut self, counter: Counter) {
        let slot = match counter {
            Counter::Pushes => &mut self.pushes,
            Counter::Creates => &mut self.creates,
            Counter::Deletes => &mut self.deletes,
            Counter::Issues => &mut self.issues,
            Counter::Comments => &mut self.comments,
            Counter::Stars => &mut self.stars,
            Counter::Forks => &mut self.forks,
            Counter::PullRequests => &mut self.pullrequests,
        };
        *slot += 1;
    }

    pub fn total(&self) -> u64 {
        self.pushes
            + self.creates
            + self.deletes
            + self.issues
            + self.comments
            + self.stars
            + self.forks
            + self.pullrequests
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Language {
    pub name: String,
    pub events: EventCounters,
    pub experience: u64,
    pub level: u32,
}

impl Language {
    pub fn new(name: String) -> Self {
        Self {
            name,
            events: EventCounters::default(),
            experience: 0,
            level: level_for(0),
        }
    }

    fn add_experience(&mut self, xp: u32) {
        self.experience += u64::from(xp);
        self.level = level_for(self.experience);
    }
}

/// Last observed state of a repository. Every field is overwritten from the
/// most recent event; nothing here is accumulated by the importer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Repository {
    pub id: RepositoryId,
    pub name: String,
    pub size: u64,
    pub url: String,
    pub language: String,
    pub owner: String,
    pub organization: String,
    pub wiki: bool,
    pub downloads: bool,
    pub forks: u64,
    pub stars: u64,
    pub issues: u64,
    pub is_fork: bool,
    pub description: String,
}

impl Repository {
    pub fn new(id: RepositoryId, name: String) -> Self {
        Self {
            id,
            name,
            ..Default::default()
        }
    }

    pub fn snapshot(&mut self, source: &ImportedRepository) {
        *self = Self {
            id: source.id,
            name: source.name.clone(),
            size: source.size,
            url: source.url.clone(),
            language: source.language.clone(),
            owner: source.owner.to_lowercase(),
            organization: source.organization.to_lowercase(),
            wiki: source.has_wiki,
            downloads: source.has_downloads,
            forks: source.forks_count,
            stars: source.stargazers_count,
            issues: source.open_issues_count,
            is_fork: source.fork,
            description: source.description.clone(),
        };
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub login: String,
    pub name: String,
    pub avatar: String,
    pub experience: u64,
    pub level: u32,
    pub languages: BTreeMap<String, Language>,
    pub repositories: BTreeMap<RepositoryId, Repository>,
}

impl User {
    pub fn new(login: &str) -> Self {
        Self {
            id: user_id(login),
            login: login.to_string(),
            name: String::new(),
            avatar: String::new(),
            experience: 0,
            level: level_for(0),
            languages: BTreeMap::new(),
            repositories: BTreeMap::new(),
        }
    }

    pub fn set_profile(&mut self, name: &str, gravatar_id: &str) {
        self.name = name.to_string();
        self.avatar = format!("http://gravatar.com/avatar/{gravatar_id}");
    }

    /// Returns the language record, creating it on first use.
    pub fn language_mut(&mut self, name: &str) -> &mut Language {
        self.languages
            .entry(name.to_string())
            .or_insert_with(|| Language::new(name.to_string()))
    }

    pub fn language(&self, name: &str) -> Option<&Language> {
        self.languages.get(name)
    }

    /// Returns the repository record, creating it on first use. The numeric
    /// id is the key, so a renamed repository keeps its record.
    pub fn repository_mut(&mut self, id: RepositoryId, name: &str) -> &mut Repository {
        self.repositories
            .entry(id)
            .or_insert_with(|| Repository::new(id, name.to_string()))
    }

    /// Adds `xp` to the language and to the user total in one step.
    pub fn add_experience(&mut self, language: &str, xp: u32) {
        self.language_mut(language).add_experience(xp);
        self.experience += u64::from(xp);
        self.level = level_for(self.experience);
    }
}

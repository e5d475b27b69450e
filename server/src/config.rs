use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

use crate::{
    archive::HttpArchive,
    import::{ImportConfig, DEFAULT_BATCH_SIZE},
};

/// Process configuration, read from environment variables (and `.env`).
#[derive(Debug, Clone, Deserialize)]
pub struct Env {
    #[serde(default = "default_archive_url")]
    pub archive_url: String,
    #[serde(default = "default_import_folder")]
    pub import_folder: PathBuf,
    #[serde(default = "default_database_address")]
    pub database_address: String,
    #[serde(default = "default_database_port")]
    pub database_port: u16,
    #[serde(default = "default_database_name")]
    pub database_name: String,
    pub database_user: Option<String>,
    pub database_password: Option<String>,
    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_in_seconds: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_in_seconds: u64,
    #[serde(default = "default_sleep_duration")]
    pub sleep_duration_in_minutes: u64,
    #[serde(default = "default_bootstrap_ranking")]
    pub bootstrap_ranking: bool,
}

fn default_archive_url() -> String {
    "http://data.githubarchive.org".to_string()
}

fn default_import_folder() -> PathBuf {
    PathBuf::from("imports")
}

fn default_database_address() -> String {
    "127.0.0.1".to_string()
}

fn default_database_port() -> u16 {
    5432
}

fn default_database_name() -> String {
    "rpgit".to_string()
}

fn default_database_max_connections() -> u32 {
    10
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_fetch_timeout() -> u64 {
    3600
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_sleep_duration() -> u64 {
    24 * 60
}

fn default_bootstrap_ranking() -> bool {
    true
}

impl Env {
    pub fn load() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn database_url(&self) -> String {
        let credentials = match (&self.database_user, &self.database_password) {
            (Some(user), Some(password)) => format!("{user}:{password}@"),
            (Some(user), None) => format!("{user}@"),
            _ => String::new(),
        };
        format!(
            "postgres://{credentials}{}:{}/{}",
            self.database_address, self.database_port, self.database_name
        )
    }

    pub fn import_config(&self) -> ImportConfig {
        ImportConfig {
            batch_size: self.batch_size.max(1),
            bootstrap_ranking: self.bootstrap_ranking,
        }
    }

    pub fn sleep_duration(&self) -> Duration {
        Duration::from_secs(self.sleep_duration_in_minutes.max(1) * 60)
    }

    pub fn archive(&self) -> anyhow::Result<HttpArchive> {
        HttpArchive::new(
            self.archive_url.clone(),
            self.import_folder.clone(),
            Duration::from_secs(self.connect_timeout_in_seconds),
            Duration::from_secs(self.fetch_timeout_in_seconds),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> Env {
        envy::from_iter(
            vars.iter()
                .map(|(key, value)| (key.to_string(), value.to_string())),
        )
        .unwrap()
    }

    #[test]
    fn defaults_apply_to_an_empty_environment() {
        let env = env(&[]);
        assert_eq!(env.archive_url, "http://data.githubarchive.org");
        assert_eq!(env.import_folder, PathBuf::from("imports"));
        assert_eq!(env.batch_size, 3);
        assert!(env.bootstrap_ranking);
        assert_eq!(env.sleep_duration(), Duration::from_secs(24 * 60 * 60));
        assert_eq!(env.database_url(), "postgres://127.0.0.1:5432/rpgit");
    }

    #[test]
    fn credentials_are_part_of_the_database_url() {
        let env = env(&[
            ("DATABASE_USER", "rpgit"),
            ("DATABASE_PASSWORD", "secret"),
            ("DATABASE_ADDRESS", "db"),
            ("DATABASE_PORT", "6543"),
        ]);
        assert_eq!(env.database_url(), "postgres://rpgit:secret@db:6543/rpgit");
    }

    #[test]
    fn zero_batch_size_is_clamped() {
        let env = env(&[("BATCH_SIZE", "0"), ("BOOTSTRAP_RANKING", "false")]);
        let config = env.import_config();
        assert_eq!(config.batch_size, 1);
        assert!(!config.bootstrap_ranking);
    }
}

use std::{sync::Arc, time::Instant};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures::future::join_all;
use shared::ImportedEvent;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::{
    archive::{ArchiveSource, DecompressError, FetchError, HourKey},
    db::{StoreError, DB},
    metrics::{EventOutcome, HourOutcome, ImportMetrics},
    ranking::RankingCache,
};

pub mod locks;
pub mod resolver;

use self::{
    locks::IdentityLocks,
    resolver::{Resolution, Resolver},
};

pub const DEFAULT_BATCH_SIZE: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decompress(#[from] DecompressError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Yesterday, relative to the trigger time.
    Incremental,
    /// A single recent day, only while the store holds no users.
    Bootstrap,
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Hour slices downloaded and processed concurrently.
    pub batch_size: usize,
    pub bootstrap_ranking: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            bootstrap_ranking: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HourReport {
    pub hour: HourKey,
    pub lines: u64,
    pub scored: u64,
    pub discarded: u64,
    pub filtered: u64,
    pub blacklisted: u64,
    pub failed: u64,
    pub experience: u64,
}

impl HourReport {
    fn new(hour: HourKey) -> Self {
        Self {
            hour,
            lines: 0,
            scored: 0,
            discarded: 0,
            filtered: 0,
            blacklisted: 0,
            failed: 0,
            experience: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayReport {
    pub date: NaiveDate,
    pub mode: ImportMode,
    pub hours: Vec<HourReport>,
    pub failed_hours: Vec<HourKey>,
}

impl DayReport {
    pub fn scored(&self) -> u64 {
        self.hours.iter().map(|h| h.scored).sum()
    }

    pub fn discarded(&self) -> u64 {
        self.hours.iter().map(|h| h.discarded).sum()
    }

    pub fn experience(&self) -> u64 {
        self.hours.iter().map(|h| h.experience).sum()
    }
}

pub struct Importer {
    db: DB,
    archive: Arc<dyn ArchiveSource>,
    metrics: Arc<ImportMetrics>,
    ranking: Arc<RankingCache>,
    config: ImportConfig,
}

impl Importer {
    pub fn new(
        db: DB,
        archive: Arc<dyn ArchiveSource>,
        metrics: Arc<ImportMetrics>,
        ranking: Arc<RankingCache>,
        config: ImportConfig,
    ) -> Self {
        Self {
            db,
            archive,
            metrics,
            ranking,
            config,
        }
    }

    pub fn db(&self) -> &DB {
        &self.db
    }

    pub fn ranking(&self) -> &Arc<RankingCache> {
        &self.ranking
    }

    /// Imports the day before `now`.
    pub async fn run_incremental(&self, now: DateTime<Utc>) -> Result<DayReport, StoreError> {
        let date = (now - Duration::hours(24)).date_naive();
        self.run_day(date, ImportMode::Incremental).await
    }

    /// Imports the day two days before `now`, but only into an empty store.
    pub async fn run_bootstrap(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<DayReport>, StoreError> {
        if self.db.is_filled().await? {
            debug!("Store already holds imported data. Skipping first import");
            return Ok(None);
        }

        warn!("First import...");
        let date = (now - Duration::hours(48)).date_naive();
        self.run_day(date, ImportMode::Bootstrap).await.map(Some)
    }

    /// Processes all 24 hours of `date` in batches of `batch_size`. No hour of
    /// a batch starts before the previous batch has finished. The ranking
    /// ledger is cleared first, since this rebuilds it.
    #[instrument(skip(self))]
    pub async fn run_day(&self, date: NaiveDate, mode: ImportMode) -> Result<DayReport, StoreError> {
        let started = Instant::now();
        let ranking = match mode {
            ImportMode::Incremental => true,
            ImportMode::Bootstrap => self.config.bootstrap_ranking,
        };

        let cleared = self.db.clear_event_days().await?;
        info!("Cleared {cleared} ranking entries before importing {date}");

        let locks = IdentityLocks::default();
        let resolver = Resolver::new(&self.db, &locks, ranking);
        let mut report = DayReport {
            date,
            mode,
            hours: Vec::with_capacity(24),
            failed_hours: Vec::new(),
        };

        let hours = HourKey::day(date);
        for batch in hours.chunks(self.config.batch_size.max(1)) {
            let results = join_all(batch.iter().map(|hour| self.import_hour(*hour, &resolver))).await;
            for (hour, result) in batch.iter().zip(results) {
                match result {
                    Ok(hour_report) => report.hours.push(hour_report),
                    Err(e) => {
                        error!("Failed to import {hour}: {e}");
                        report.failed_hours.push(*hour);
                    }
                }
            }
        }

        self.ranking.invalidate().await;
        info!("Cache cleared");

        self.metrics
            .set_last_day_duration(started.elapsed().as_secs() as i64);
        info!(
            "Imported {date}: {} events scored, {} xp, {} hours failed",
            report.scored(),
            report.experience(),
            report.failed_hours.len()
        );
        Ok(report)
    }

    #[instrument(skip(self, resolver))]
    async fn import_hour(
        &self,
        hour: HourKey,
        resolver: &Resolver<'_>,
    ) -> Result<HourReport, ImportError> {
        let staged = self.archive.fetch(hour).await.map_err(|e| {
            self.metrics.record_hour(HourOutcome::FetchFailed);
            e
        })?;

        // A corrupt archive stays in the staging folder for inspection.
        let text = staged.decompress().await.map_err(|e| {
            self.metrics.record_hour(HourOutcome::DecompressFailed);
            e
        })?;

        let report = self.parse(hour, &text, resolver).await;
        drop(text);

        let path = staged.path.clone();
        if let Err(e) = staged.remove().await {
            warn!("Failed to remove staged archive {}: {e}", path.display());
        }

        self.metrics.record_hour(HourOutcome::Completed);
        info!(
            "Finished {hour}: {} lines, {} scored, {} discarded",
            report.lines, report.scored, report.discarded
        );
        Ok(report)
    }

    /// Runs every line of an hour's text through decode, resolve and score.
    /// Malformed lines are dropped without retry.
    pub async fn parse(&self, hour: HourKey, text: &str, resolver: &Resolver<'_>) -> HourReport {
        let mut report = HourReport::new(hour);

        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            report.lines += 1;
            trace!("-> Event {} of {hour}", index + 1);

            let event = match ImportedEvent::decode(line) {
                Ok(Some(event)) => event,
                Ok(None) => {
                    report.filtered += 1;
                    continue;
                }
                Err(_) => {
                    report.discarded += 1;
                    continue;
                }
            };

            match resolver.apply(&event).await {
                Ok(Resolution::Scored { xp }) => {
                    report.scored += 1;
                    report.experience += u64::from(xp);
                }
                Ok(Resolution::Blacklisted) => report.blacklisted += 1,
                Err(e) => {
                    error!("Failed to resolve event from {}: {e}", event.actor.login);
                    report.failed += 1;
                }
            }
        }

        self.metrics.record_events(EventOutcome::Scored, report.scored);
        self.metrics
            .record_events(EventOutcome::Discarded, report.discarded);
        self.metrics.record_events(EventOutcome::Filtered, report.filtered);
        self.metrics
            .record_events(EventOutcome::Blacklisted, report.blacklisted);
        self.metrics.record_events(EventOutcome::Failed, report.failed);
        self.metrics.add_experience(report.experience);

        report
    }
}

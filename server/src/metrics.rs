use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum HourOutcome {
    Completed,
    FetchFailed,
    DecompressFailed,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum EventOutcome {
    Scored,
    Discarded,
    Filtered,
    Blacklisted,
    Failed,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HourLabels {
    pub outcome: HourOutcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EventLabels {
    pub outcome: EventOutcome,
}

pub struct ImportMetrics {
    registry: Registry,
    hours: Family<HourLabels, Counter>,
    events: Family<EventLabels, Counter>,
    experience: Counter,
    // Wall time of the most recent full day, so a stuck batch shows up
    last_day_duration: Gauge,
}

impl Default for ImportMetrics {
    fn default() -> Self {
        let mut registry = Registry::default();
        let hours = Family::default();
        let events = Family::default();
        let experience = Counter::default();
        let last_day_duration = Gauge::default();

        registry.register(
            "import_hours",
            "Hourly archives processed, by outcome",
            hours.clone(),
        );
        registry.register(
            "import_events",
            "Archive lines processed, by outcome",
            events.clone(),
        );
        registry.register(
            "import_experience_awarded",
            "Total experience handed out since start",
            experience.clone(),
        );
        registry.register(
            "import_last_day_duration_seconds",
            "Wall time of the last imported day",
            last_day_duration.clone(),
        );

        Self {
            registry,
            hours,
            events,
            experience,
            last_day_duration,
        }
    }
}

impl ImportMetrics {
    pub fn record_hour(&self, outcome: HourOutcome) {
        self.hours.get_or_create(&HourLabels { outcome }).inc();
    }

    pub fn record_events(&self, outcome: EventOutcome, amount: u64) {
        self.events.get_or_create(&EventLabels { outcome }).inc_by(amount);
    }

    pub fn add_experience(&self, xp: u64) {
        self.experience.inc_by(xp);
    }

    pub fn set_last_day_duration(&self, seconds: i64) {
        self.last_day_duration.set(seconds);
    }

    pub fn hours(&self, outcome: HourOutcome) -> u64 {
        self.hours.get_or_create(&HourLabels { outcome }).get()
    }

    pub fn events(&self, outcome: EventOutcome) -> u64 {
        self.events.get_or_create(&EventLabels { outcome }).get()
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }
}

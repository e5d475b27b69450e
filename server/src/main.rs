use std::{sync::Arc, time::Duration};

use chrono::Utc;
use rocket::routes;
use tokio::signal;
use tracing::{error, info, instrument, warn};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use rpgit_server::{
    config::Env,
    db::{PgStore, DB},
    import::{DayReport, Importer},
    metrics::ImportMetrics,
    ranking::RankingCache,
};

#[rocket::get("/metrics")]
pub async fn metrics(
    state: &rocket::State<Arc<ImportMetrics>>,
) -> Option<(
    rocket::http::ContentType,
    rocket::response::content::RawHtml<String>,
)> {
    let metrics = state.encode().ok()?;
    Some((
        rocket::http::ContentType::new(
            "application/openmetrics-text",
            " version=1.0.0; charset=utf-8",
        ),
        rocket::response::content::RawHtml(metrics),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let env = Env::load()?;

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;

    let store = PgStore::connect(&env.database_url(), env.database_max_connections).await?;
    let db = DB::new(Arc::new(store));
    let archive = Arc::new(env.archive()?);
    let prometheus: Arc<ImportMetrics> = Default::default();
    let ranking: Arc<RankingCache> = Default::default();
    let importer = Importer::new(
        db,
        archive,
        prometheus.clone(),
        ranking,
        env.import_config(),
    );

    tokio::select! {
        _ = run(importer, env.sleep_duration()) => {
        }
        _ = signal::ctrl_c() => {
            warn!("Received SIGINT. Exiting.");
        }
        _ = rocket::build()
            .mount("/", routes![metrics])
            .manage(prometheus)
            .launch() => {
            }
    }
    warn!("Exiting importer...");

    Ok(())
}

async fn run(importer: Importer, sleep_duration: Duration) {
    warn!("Starting importer...");

    match importer.run_bootstrap(Utc::now()).await {
        Ok(Some(report)) => {
            log_report(&report);
            publish_ranking(&importer).await;
        }
        Ok(None) => {}
        Err(e) => error!("First import failed: {e}"),
    }

    let mut interval = tokio::time::interval(sleep_duration);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        interval.tick().await;
        match importer.run_incremental(Utc::now()).await {
            Ok(report) => {
                log_report(&report);
                publish_ranking(&importer).await;
            }
            Err(e) => error!("Daily import failed: {e}"),
        }
    }
}

fn log_report(report: &DayReport) {
    info!(
        "{:?} import of {} done: {} hours, {} scored, {} discarded, {} xp",
        report.mode,
        report.date,
        report.hours.len(),
        report.scored(),
        report.discarded(),
        report.experience()
    );
    for hour in &report.failed_hours {
        warn!("Hour {hour} was not imported");
    }
}

#[instrument(skip(importer))]
async fn publish_ranking(importer: &Importer) {
    let ranking = match importer.ranking().get_or_build(importer.db()).await {
        Ok(ranking) => ranking,
        Err(e) => {
            error!("Failed to build daily ranking: {e}");
            return;
        }
    };

    for (language, leader) in ranking.leaders() {
        info!(
            "Daily leader for {language}: {} with {} xp over {} events",
            leader.user_id, leader.experience, leader.events
        );
    }
}

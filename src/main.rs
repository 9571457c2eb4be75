use anyhow::Result;
use ashmon::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        archive = %app_config.archive.path,
        "starting ashmon"
    );

    let archive = Arc::new(archive::HourlyArchive::open(&app_config.archive.path)?);
    let statements = Arc::new(statements::InMemoryStatementCache::new(
        app_config.buffer.statement_cache_size,
    ));
    let buffer = Arc::new(buffer::SnapshotBuffer::new(
        app_config.buffer.retention(),
        app_config.max_backlog(),
        app_config.buffer.wait_classes.clone(),
        archive.clone(),
    ));
    let ash = ash::Ash::new(buffer.clone(), archive.clone(), statements.clone());

    let source = Arc::new(
        source::PgActivitySource::connect(
            &app_config.source.url,
            app_config.source.max_pool_size,
        )
        .await?,
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let stats = Arc::new(worker::SamplerStats::default());
    let sampler_handle = worker::spawn(
        worker::SamplerDeps {
            source,
            buffer,
            statements,
            stats,
            shutdown_rx,
        },
        worker::SamplerConfig {
            sample_interval_ms: app_config.sampling.sample_interval_ms,
            samples_per_snapshot: app_config.sampling.samples_per_snapshot,
            stats_log_interval_secs: app_config.monitoring.stats_log_interval_secs,
        },
    );
    let housekeeping_handle = housekeeping::spawn(
        archive,
        housekeeping::HousekeepingConfig {
            retention_days: app_config.archive.retention_days,
            prune_schedule: app_config.archive.prune_schedule.clone(),
            prune_interval_secs: app_config.archive.prune_interval_secs,
        },
    );

    wait_for_shutdown().await;
    tracing::info!("Received shutdown signal");
    let _ = shutdown_tx.send(());
    let _ = sampler_handle.await;
    housekeeping_handle.abort();

    let window = ash.activity(&|_: &models::ActiveSession| true);
    tracing::info!(
        start = window.start,
        end = window.end,
        total_activity = window.total_activity,
        total_samples = window.total_samples,
        top_sql = ?window.top_sql.first().and_then(|s| s.sql_id.as_deref()),
        "in-memory window at shutdown"
    );

    let flush_buffer = ash.buffer().clone();
    match tokio::task::spawn_blocking(move || flush_buffer.flush_to_sink()).await {
        Ok(outcome) => {
            if let Some(e) = &outcome.archive_error {
                tracing::warn!(
                    error = %e,
                    operation = "flush_to_sink",
                    archived = outcome.archived,
                    remaining = ash.buffer().len(),
                    "Archive write failed at shutdown; remaining snapshots lost"
                );
            } else {
                tracing::info!(archived = outcome.archived, "In-memory window flushed to archive");
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, operation = "flush_to_sink", "Flush task panicked");
        }
    }
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

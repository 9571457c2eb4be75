// Archive housekeeping: delete hour buckets older than the retention period.
// Runs on a cron schedule (local time) or a fixed interval, independent of the sampler.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::archive::{CivilZone, HourlyArchive};
use crate::worker::now_ms;
use tracing::{info, instrument, warn};

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct HousekeepingConfig {
    pub retention_days: u32,
    /// Optional cron expression for pruning (e.g. "0 15 * * * *" = quarter past every hour).
    pub prune_schedule: Option<String>,
    /// Prune every N seconds when prune_schedule is not set.
    pub prune_interval_secs: u64,
}

pub fn spawn<Z: CivilZone + 'static>(
    archive: Arc<HourlyArchive<Z>>,
    config: HousekeepingConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(archive, config).await;
    })
}

#[instrument(skip(archive), fields(retention_days = config.retention_days))]
async fn run<Z: CivilZone + 'static>(archive: Arc<HourlyArchive<Z>>, config: HousekeepingConfig) {
    let (prune_tx, mut prune_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(prune_scheduler(config.clone(), prune_tx));

    while prune_rx.recv().await.is_some() {
        match run_prune(&archive, config.retention_days, now_ms()).await {
            Ok(0) => {}
            Ok(removed) => info!(buckets_removed = removed, "archive pruned"),
            Err(e) => warn!(error = %e, "archive prune failed"),
        }
    }
}

/// Sends a message on `tx` at each prune time (cron or fixed interval). Uses local time for cron.
async fn prune_scheduler(config: HousekeepingConfig, tx: tokio::sync::mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.prune_schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid prune_schedule; archive will not be pruned");
            return;
        };
        loop {
            let now = chrono::Local::now();
            let next = schedule.after(&now).next();
            if let Some(next) = next {
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(delay).await;
                if tx.send(()).await.is_err() {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    } else {
        let interval = Duration::from_secs(config.prune_interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    }
}

/// Removes buckets that ended more than `retention_days` before `now_ms`. Blocking I/O
/// runs on the blocking pool.
pub async fn run_prune<Z: CivilZone + 'static>(
    archive: &Arc<HourlyArchive<Z>>,
    retention_days: u32,
    now_ms: i64,
) -> anyhow::Result<usize> {
    let cutoff = now_ms - i64::from(retention_days) * MS_PER_DAY;
    let archive = archive.clone();
    let removed = tokio::task::spawn_blocking(move || archive.prune_before(cutoff)).await??;
    Ok(removed)
}

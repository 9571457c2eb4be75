// Background ASH sampler. One task, one tick at a time: take a micro-sample, fold it into the
// pending snapshot, and every `samples_per_snapshot` micro-samples append one AshSnapshot.
// Appends run on the blocking pool because eviction writes to the archive.

use crate::buffer::{AppendOutcome, SnapshotBuffer};
use crate::error::AshError;
use crate::models::{ActiveSession, AshSnapshot};
use crate::source::SessionSource;
use crate::statements::InMemoryStatementCache;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tokio::time::{Duration, interval};

/// Source, buffer, caches and shutdown for the sampler.
pub struct SamplerDeps<S: SessionSource> {
    pub source: Arc<S>,
    pub buffer: Arc<SnapshotBuffer>,
    pub statements: Arc<InMemoryStatementCache>,
    pub stats: Arc<SamplerStats>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

pub struct SamplerConfig {
    pub sample_interval_ms: u64,
    pub samples_per_snapshot: u32,
    /// How often to log sampler stats (real seconds).
    pub stats_log_interval_secs: u64,
}

/// Counters shared with whoever wants to report on the sampler.
#[derive(Debug, Default)]
pub struct SamplerStats {
    pub snapshots_appended: AtomicU64,
    pub snapshots_archived: AtomicU64,
    pub snapshots_discarded: AtomicU64,
    pub out_of_order_dropped: AtomicU64,
    pub archive_write_failures: AtomicU64,
    pub sample_failures: AtomicU64,
}

impl SamplerStats {
    fn record(&self, outcome: &AppendOutcome) {
        self.snapshots_appended.fetch_add(1, Ordering::Relaxed);
        self.snapshots_archived
            .fetch_add(outcome.archived as u64, Ordering::Relaxed);
        self.snapshots_discarded
            .fetch_add(outcome.discarded as u64, Ordering::Relaxed);
        if outcome.archive_error.is_some() {
            self.archive_write_failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Micro-samples collected since the last snapshot.
#[derive(Debug, Default)]
pub struct PendingSnapshot {
    samples: u32,
    sessions: Vec<ActiveSession>,
}

impl PendingSnapshot {
    pub fn add(&mut self, sessions: Vec<ActiveSession>) {
        self.samples += 1;
        self.sessions.extend(sessions);
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Builds the snapshot and resets; `None` if no micro-sample was taken.
    pub fn take(&mut self, timestamp: i64) -> Option<AshSnapshot> {
        if self.samples == 0 {
            return None;
        }
        let samples = std::mem::take(&mut self.samples);
        let sessions = std::mem::take(&mut self.sessions);
        AshSnapshot::new(timestamp, samples, sessions).ok()
    }
}

pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "get_timestamp", "system time error");
            0
        })
}

/// Appends on the blocking pool and logs the outcome. Out-of-order snapshots are dropped.
pub async fn append_snapshot(
    buffer: &Arc<SnapshotBuffer>,
    snapshot: AshSnapshot,
    stats: &SamplerStats,
) {
    let buffer = buffer.clone();
    let result = tokio::task::spawn_blocking(move || buffer.append(snapshot)).await;
    match result {
        Ok(Ok(outcome)) => {
            stats.record(&outcome);
            if let Some(e) = &outcome.archive_error {
                tracing::warn!(
                    error = %e,
                    operation = "archive_write",
                    "Archive write failed; snapshots kept in memory"
                );
            }
        }
        Ok(Err(e @ AshError::OutOfOrderSample { .. })) => {
            stats.out_of_order_dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, operation = "append", "Dropping out-of-order snapshot");
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, operation = "append", "Snapshot append failed");
        }
        Err(e) => {
            tracing::warn!(error = %e, operation = "append", "Append task panicked");
        }
    }
}

pub fn spawn<S: SessionSource>(
    deps: SamplerDeps<S>,
    config: SamplerConfig,
) -> tokio::task::JoinHandle<()> {
    let SamplerDeps {
        source,
        buffer,
        statements,
        stats,
        mut shutdown_rx,
    } = deps;
    let SamplerConfig {
        sample_interval_ms,
        samples_per_snapshot,
        stats_log_interval_secs,
    } = config;
    let samples_per_snapshot = samples_per_snapshot.max(1);

    tokio::spawn(async move {
        let mut tick = interval(Duration::from_millis(sample_interval_ms));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut pending = PendingSnapshot::default();

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let micro = match source.sample().await {
                        Ok(m) => m,
                        Err(e) => {
                            stats.sample_failures.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(
                                error = %e,
                                operation = "sample",
                                "Micro-sample failed"
                            );
                            continue;
                        }
                    };
                    for (sql_id, statement) in micro.statements {
                        statements.insert(sql_id, statement);
                    }
                    pending.add(micro.sessions);
                    if pending.samples() >= samples_per_snapshot
                        && let Some(snapshot) = pending.take(now_ms())
                    {
                        append_snapshot(&buffer, snapshot, &stats).await;
                    }
                }
                _ = &mut shutdown_rx => {
                    if let Some(snapshot) = pending.take(now_ms()) {
                        append_snapshot(&buffer, snapshot, &stats).await;
                    }
                    tracing::debug!("Sampler shutting down");
                    break;
                }
                _ = stats_log_tick.tick() => {
                    tracing::info!(
                        snapshots_appended = stats.snapshots_appended.load(Ordering::Relaxed),
                        snapshots_archived = stats.snapshots_archived.load(Ordering::Relaxed),
                        snapshots_discarded = stats.snapshots_discarded.load(Ordering::Relaxed),
                        out_of_order_dropped = stats.out_of_order_dropped.load(Ordering::Relaxed),
                        buffer_len = buffer.len(),
                        statements_cached = statements.len(),
                        "ash stats"
                    );
                }
            }
        }
    })
}

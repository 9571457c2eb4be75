// In-memory window of recent ASH snapshots. Single writer (the sampler), many readers.
// Snapshots leaving the window are written to the archive first; a failed write keeps them.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::instrument;

use crate::error::{AshError, Result};
use crate::models::AshSnapshot;

/// How much history the buffer keeps in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Keep the newest N snapshots.
    Count(usize),
    /// Keep snapshots no older than this many ms behind the newest one.
    MaxAgeMs(i64),
}

/// Destination of evicted snapshots.
pub trait EvictionSink: Send + Sync {
    fn persist(&self, snapshot: &AshSnapshot) -> Result<()>;
}

impl<Z: crate::archive::CivilZone> EvictionSink for crate::archive::HourlyArchive<Z> {
    fn persist(&self, snapshot: &AshSnapshot) -> Result<()> {
        self.write(snapshot).map(|_| ())
    }
}

/// What one `append` did besides inserting the snapshot.
#[derive(Debug, Default)]
pub struct AppendOutcome {
    /// Snapshots written to the sink and dropped from memory.
    pub archived: usize,
    /// Snapshots dropped unarchived because the backlog exceeded `max_backlog`.
    pub discarded: usize,
    /// Archive failure that stopped eviction; the affected snapshots stay in memory.
    pub archive_error: Option<AshError>,
}

pub struct SnapshotBuffer {
    snapshots: RwLock<VecDeque<Arc<AshSnapshot>>>,
    writer: Mutex<()>,
    retention: Retention,
    max_backlog: usize,
    wait_classes: Vec<String>,
    sink: Arc<dyn EvictionSink>,
}

impl SnapshotBuffer {
    /// `max_backlog` bounds the buffer while archive writes fail; past it the oldest
    /// snapshots are discarded (and logged). It is never below a count retention.
    pub fn new(
        retention: Retention,
        max_backlog: usize,
        wait_classes: Vec<String>,
        sink: Arc<dyn EvictionSink>,
    ) -> Self {
        let floor = match retention {
            Retention::Count(n) => n.max(1),
            Retention::MaxAgeMs(_) => 1,
        };
        Self {
            snapshots: RwLock::new(VecDeque::new()),
            writer: Mutex::new(()),
            retention,
            max_backlog: max_backlog.max(floor),
            wait_classes,
            sink,
        }
    }

    /// Point-in-time copy of the window, oldest first. Later appends do not affect it.
    pub fn snapshots(&self) -> Vec<Arc<AshSnapshot>> {
        self.read().iter().cloned().collect()
    }

    /// Static wait-class catalog.
    pub fn wait_classes(&self) -> &[String] {
        &self.wait_classes
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Timestamps of the oldest and newest snapshot in memory.
    pub fn bounds(&self) -> Option<(i64, i64)> {
        let guard = self.read();
        Some((guard.front()?.timestamp(), guard.back()?.timestamp()))
    }

    /// Inserts at the tail, then archives and evicts whatever falls outside the retention.
    /// Fails with `OutOfOrderSample` if `timestamp` is not after the current tail.
    #[instrument(skip(self, snapshot), fields(operation = "append", timestamp = snapshot.timestamp()))]
    pub fn append(&self, snapshot: AshSnapshot) -> Result<AppendOutcome> {
        let _writer = match self.writer.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        {
            let mut guard = self.write();
            if let Some(tail) = guard.back()
                && snapshot.timestamp() <= tail.timestamp()
            {
                return Err(AshError::OutOfOrderSample {
                    timestamp: snapshot.timestamp(),
                    tail: tail.timestamp(),
                });
            }
            guard.push_back(Arc::new(snapshot));
        }

        let mut outcome = AppendOutcome::default();
        // Sink I/O runs without the read/write lock; the writer mutex keeps the front stable.
        for candidate in self.eviction_candidates() {
            match self.sink.persist(&candidate) {
                Ok(()) => {
                    self.pop_front_if(candidate.timestamp());
                    outcome.archived += 1;
                }
                Err(e) => {
                    outcome.archive_error = Some(e);
                    break;
                }
            }
        }
        if outcome.archive_error.is_some() {
            outcome.discarded = self.discard_overflow();
        }
        Ok(outcome)
    }

    /// Writes every snapshot still in memory to the sink, oldest first, dropping each once
    /// written. Stops at the first failure; the rest stay in memory.
    #[instrument(skip(self), fields(operation = "flush_to_sink"))]
    pub fn flush_to_sink(&self) -> AppendOutcome {
        let _writer = match self.writer.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut outcome = AppendOutcome::default();
        let pending: Vec<Arc<AshSnapshot>> = self.read().iter().cloned().collect();
        for snapshot in pending {
            match self.sink.persist(&snapshot) {
                Ok(()) => {
                    self.pop_front_if(snapshot.timestamp());
                    outcome.archived += 1;
                }
                Err(e) => {
                    outcome.archive_error = Some(e);
                    break;
                }
            }
        }
        outcome
    }

    fn eviction_candidates(&self) -> Vec<Arc<AshSnapshot>> {
        let guard = self.read();
        let excess = match self.retention {
            Retention::Count(n) => guard.len().saturating_sub(n),
            Retention::MaxAgeMs(age) => match guard.back() {
                Some(newest) => {
                    let cutoff = newest.timestamp() - age;
                    guard.iter().take_while(|s| s.timestamp() < cutoff).count()
                }
                None => 0,
            },
        };
        guard.iter().take(excess).cloned().collect()
    }

    fn pop_front_if(&self, timestamp: i64) {
        let mut guard = self.write();
        if guard.front().map(|s| s.timestamp()) == Some(timestamp) {
            guard.pop_front();
        }
    }

    fn discard_overflow(&self) -> usize {
        let mut guard = self.write();
        let mut discarded = 0;
        while guard.len() > self.max_backlog {
            if let Some(lost) = guard.pop_front() {
                tracing::error!(
                    operation = "discard_overflow",
                    timestamp = lost.timestamp(),
                    max_backlog = self.max_backlog,
                    "archive backlog full; snapshot discarded without archiving"
                );
                discarded += 1;
            }
        }
        discarded
    }

    fn read(&self) -> RwLockReadGuard<'_, VecDeque<Arc<AshSnapshot>>> {
        match self.snapshots.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<Arc<AshSnapshot>>> {
        match self.snapshots.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

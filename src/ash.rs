// Query entry point: answers activity questions from the in-memory window or the disk archive.

use std::sync::Arc;

use chrono::Local;
use tracing::instrument;

use crate::aggregation::{self, IntervalAggregator, SessionFilter};
use crate::archive::{CivilZone, HourlyArchive};
use crate::buffer::SnapshotBuffer;
use crate::error::{AshError, BucketKey, Result};
use crate::models::{ActiveSession, IntervalActivity, Snapshot};
use crate::statements::StatementCache;

pub struct Ash<Z: CivilZone = Local> {
    buffer: Arc<SnapshotBuffer>,
    archive: Arc<HourlyArchive<Z>>,
    statements: Arc<dyn StatementCache>,
}

impl<Z: CivilZone> Ash<Z> {
    pub fn new(
        buffer: Arc<SnapshotBuffer>,
        archive: Arc<HourlyArchive<Z>>,
        statements: Arc<dyn StatementCache>,
    ) -> Self {
        Self {
            buffer,
            archive,
            statements,
        }
    }

    pub fn buffer(&self) -> &Arc<SnapshotBuffer> {
        &self.buffer
    }

    pub fn archive(&self) -> &Arc<HourlyArchive<Z>> {
        &self.archive
    }

    /// Known wait classes, in catalog order.
    pub fn wait_classes(&self) -> Vec<String> {
        self.buffer.wait_classes().to_vec()
    }

    /// Average active sessions by wait class for every snapshot in memory.
    pub fn wait_classes_snapshots(&self) -> Vec<Snapshot<f64>> {
        self.buffer
            .snapshots()
            .iter()
            .map(|s| s.wait_classes_snapshot().clone())
            .collect()
    }

    /// Activity of the sessions matching `filter` over the whole in-memory window.
    pub fn activity(&self, filter: SessionFilter<'_>) -> IntervalActivity {
        let snapshots = self.buffer.snapshots();
        let (start, end) = match (snapshots.first(), snapshots.last()) {
            (Some(first), Some(last)) => (first.timestamp(), last.timestamp()),
            _ => (0, 0),
        };
        aggregation::interval_activity(
            snapshots.iter().map(|s| s.as_ref()),
            start,
            end,
            Some(filter),
            self.statements.as_ref(),
        )
    }

    /// Activity of the in-memory snapshots with timestamp in `[start, end]`.
    pub fn interval_activity(&self, start: i64, end: i64) -> Result<IntervalActivity> {
        if start > end {
            return Err(AshError::invalid_argument(
                "start",
                format!("window start {} is after end {}", start, end),
            ));
        }
        let snapshots = self.buffer.snapshots();
        Ok(aggregation::interval_activity(
            snapshots.iter().map(|s| s.as_ref()),
            start,
            end,
            None,
            self.statements.as_ref(),
        ))
    }

    /// Activity for the archived local hour `year-month-day [hour, hour + 1)`.
    ///
    /// Blocking file I/O; call from a blocking context (e.g. `spawn_blocking`).
    #[instrument(skip(self), fields(operation = "archived_interval_activity"))]
    pub fn archived_interval_activity(
        &self,
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
    ) -> Result<IntervalActivity> {
        let key = BucketKey::new(year, month, day, hour);
        let (start, end) = self.archive.hour_window(key)?;
        self.archive.with_bucket(key, |snapshots| {
            let mut agg = IntervalAggregator::new(start, end, None);
            for snapshot in snapshots {
                agg.push(&snapshot?);
            }
            Ok(agg.finish(self.statements.as_ref()))
        })
    }

    /// Average activity of one statement by wait event, per in-memory snapshot.
    pub fn sql_snapshots(&self, sql_id: &str) -> Result<Vec<Snapshot<f64>>> {
        if sql_id.trim().is_empty() {
            return Err(AshError::invalid_argument("sql_id", "must be non-empty"));
        }
        Ok(self.events_by_filter(&|s: &ActiveSession| s.sql_id.as_deref() == Some(sql_id)))
    }

    /// Average activity of one session by wait event, per in-memory snapshot.
    pub fn session_snapshots(&self, sid: i64, serial_number: i64) -> Vec<Snapshot<f64>> {
        self.events_by_filter(&|s: &ActiveSession| s.sid == sid && s.serial_number == serial_number)
    }

    pub fn events_by_filter(&self, filter: SessionFilter<'_>) -> Vec<Snapshot<f64>> {
        let snapshots = self.buffer.snapshots();
        aggregation::events_by_filter(snapshots.iter().map(|s| s.as_ref()), filter)
    }
}

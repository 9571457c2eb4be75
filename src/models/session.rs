// Sampled sessions and the per-cycle ASH snapshot

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

use super::snapshot::{Snapshot, count_labels};
use crate::error::{AshError, Result};

/// One database session observed active at sample time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    pub sid: i64,
    /// Disambiguates `sid` reuse after logoff.
    pub serial_number: i64,
    pub username: String,
    pub program: String,
    /// Executing statement; `None` when the session runs no statement.
    pub sql_id: Option<String>,
    pub event: String,
    pub wait_class: String,
}

/// One sampling cycle: `samples` micro-samples folded together.
///
/// Fields are private so the precomputed wait-class point always matches the sessions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AshSnapshot {
    timestamp: i64,
    samples: u32,
    active_sessions: Vec<ActiveSession>,
    wait_classes_snapshot: Snapshot<f64>,
}

impl AshSnapshot {
    /// Builds a snapshot and precomputes its wait-class point. Rejects `samples == 0`.
    pub fn new(timestamp: i64, samples: u32, active_sessions: Vec<ActiveSession>) -> Result<Self> {
        if samples == 0 {
            return Err(AshError::invalid_argument(
                "samples",
                format!("snapshot at {} has zero samples", timestamp),
            ));
        }
        let counts = count_labels(active_sessions.iter().map(|s| s.wait_class.as_str()));
        let wait_classes_snapshot = Snapshot::normalized(timestamp, &counts, samples);
        Ok(Self {
            timestamp,
            samples,
            active_sessions,
            wait_classes_snapshot,
        })
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn active_sessions(&self) -> &[ActiveSession] {
        &self.active_sessions
    }

    pub fn wait_classes_snapshot(&self) -> &Snapshot<f64> {
        &self.wait_classes_snapshot
    }

    pub(crate) fn to_record(&self) -> SnapshotRecord {
        SnapshotRecord {
            timestamp: self.timestamp,
            samples: self.samples,
            active_sessions: self.active_sessions.clone(),
        }
    }
}

/// On-disk form of a snapshot; the wait-class point is derived again on read.
#[derive(Debug, Clone, SchemaRead, SchemaWrite)]
pub(crate) struct SnapshotRecord {
    pub timestamp: i64,
    pub samples: u32,
    pub active_sessions: Vec<ActiveSession>,
}

impl TryFrom<SnapshotRecord> for AshSnapshot {
    type Error = AshError;

    fn try_from(r: SnapshotRecord) -> Result<Self> {
        AshSnapshot::new(r.timestamp, r.samples, r.active_sessions)
    }
}

// Interval activity results and the accumulators that build them

use serde::{Deserialize, Serialize};

use super::{ActiveSession, Snapshot};

/// Activity attributed to one statement over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlActivity {
    pub sql_id: Option<String>,
    pub sql_text: Option<String>,
    pub command: Option<String>,
    pub activity_count: u64,
    pub total_activity: u64,
    pub total_samples: u64,
}

impl SqlActivity {
    /// Share of all session activity in the window, in percent.
    pub fn activity_percent(&self) -> f64 {
        percent(self.activity_count, self.total_activity)
    }

    /// Average active sessions running this statement over the window.
    pub fn average_active_sessions(&self) -> f64 {
        if self.total_samples == 0 {
            0.0
        } else {
            self.activity_count as f64 / self.total_samples as f64
        }
    }
}

/// Activity attributed to one session, keyed by (sid, serial number).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionActivity {
    pub sid: i64,
    pub serial_number: i64,
    pub username: String,
    pub program: String,
    pub activity_count: u64,
    pub total_activity: u64,
}

impl SessionActivity {
    pub fn activity_percent(&self) -> f64 {
        percent(self.activity_count, self.total_activity)
    }
}

/// Aggregated activity for an inclusive `[start, end]` window (epoch ms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalActivity {
    pub start: i64,
    pub end: i64,
    pub events_snapshots: Vec<Snapshot<f64>>,
    pub wait_classes_snapshots: Vec<Snapshot<f64>>,
    /// At most 10, descending by activity count.
    pub top_sql: Vec<SqlActivity>,
    /// At most 10, descending by activity count.
    pub top_sessions: Vec<SessionActivity>,
    pub total_activity: u64,
    pub total_samples: u64,
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

/// Per-statement accumulator, scoped to one aggregation call.
#[derive(Debug, Clone)]
pub struct SqlActivityBuilder {
    sql_id: Option<String>,
    activity_count: u64,
}

impl SqlActivityBuilder {
    pub fn new(sql_id: Option<String>) -> Self {
        Self {
            sql_id,
            activity_count: 0,
        }
    }

    pub fn add(&mut self) {
        self.activity_count += 1;
    }

    pub fn sql_id(&self) -> Option<&str> {
        self.sql_id.as_deref()
    }

    pub fn activity_count(&self) -> u64 {
        self.activity_count
    }

    pub fn build(
        self,
        sql_text: Option<String>,
        command: Option<String>,
        total_activity: u64,
        total_samples: u64,
    ) -> SqlActivity {
        SqlActivity {
            sql_id: self.sql_id,
            sql_text,
            command,
            activity_count: self.activity_count,
            total_activity,
            total_samples,
        }
    }
}

/// Per-session accumulator. Username and program come from the first occurrence.
#[derive(Debug, Clone)]
pub struct SessionActivityBuilder {
    sid: i64,
    serial_number: i64,
    username: String,
    program: String,
    activity_count: u64,
}

impl SessionActivityBuilder {
    pub fn new(first: &ActiveSession) -> Self {
        Self {
            sid: first.sid,
            serial_number: first.serial_number,
            username: first.username.clone(),
            program: first.program.clone(),
            activity_count: 0,
        }
    }

    pub fn add(&mut self) {
        self.activity_count += 1;
    }

    pub fn activity_count(&self) -> u64 {
        self.activity_count
    }

    pub fn build(self, total_activity: u64) -> SessionActivity {
        SessionActivity {
            sid: self.sid,
            serial_number: self.serial_number,
            username: self.username,
            program: self.program,
            activity_count: self.activity_count,
            total_activity,
        }
    }
}

// Shared test helpers
#![allow(dead_code)]

use ashmon::archive::CivilZone;
use ashmon::buffer::EvictionSink;
use ashmon::error::{AshError, BucketKey};
use ashmon::models::{ActiveSession, AshSnapshot};
use chrono::{DateTime, FixedOffset, LocalResult, NaiveDateTime, TimeDelta, Utc};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

pub fn session(sid: i64, sql_id: Option<&str>, event: &str, wait_class: &str) -> ActiveSession {
    ActiveSession {
        sid,
        serial_number: sid * 10,
        username: format!("user{}", sid),
        program: "app".into(),
        sql_id: sql_id.map(str::to_string),
        event: event.into(),
        wait_class: wait_class.into(),
    }
}

pub fn cpu(sid: i64, sql_id: Option<&str>) -> ActiveSession {
    session(sid, sql_id, "CPU", "CPU")
}

pub fn snapshot(timestamp: i64, samples: u32, sessions: Vec<ActiveSession>) -> AshSnapshot {
    AshSnapshot::new(timestamp, samples, sessions).expect("valid snapshot")
}

/// Sink that records persisted timestamps and can be switched to fail.
#[derive(Default)]
pub struct RecordingSink {
    pub fail: AtomicBool,
    pub written: Mutex<Vec<i64>>,
}

impl RecordingSink {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn written(&self) -> Vec<i64> {
        self.written.lock().unwrap().clone()
    }
}

impl EvictionSink for RecordingSink {
    fn persist(&self, snapshot: &AshSnapshot) -> Result<(), AshError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AshError::ArchiveWrite {
                key: BucketKey::new(1970, 1, 1, 0),
                timestamp: snapshot.timestamp(),
                source: std::io::Error::other("disk full"),
            });
        }
        self.written.lock().unwrap().push(snapshot.timestamp());
        Ok(())
    }
}

/// US Eastern rules for 2024 only: EDT (-4) from 2024-03-10T07:00Z to 2024-11-03T06:00Z,
/// EST (-5) otherwise.
pub struct Eastern2024 {
    standard: FixedOffset,
    daylight: FixedOffset,
    dst_start: NaiveDateTime,
    dst_end: NaiveDateTime,
}

impl Eastern2024 {
    pub fn new() -> Self {
        Self {
            standard: FixedOffset::west_opt(5 * 3600).unwrap(),
            daylight: FixedOffset::west_opt(4 * 3600).unwrap(),
            dst_start: DateTime::<Utc>::from_timestamp_millis(1_710_054_000_000)
                .unwrap()
                .naive_utc(),
            dst_end: DateTime::<Utc>::from_timestamp_millis(1_730_613_600_000)
                .unwrap()
                .naive_utc(),
        }
    }

    fn offset_at_utc(&self, utc: &NaiveDateTime) -> FixedOffset {
        if *utc >= self.dst_start && *utc < self.dst_end {
            self.daylight
        } else {
            self.standard
        }
    }
}

impl CivilZone for Eastern2024 {
    fn offsets_at_local(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
        let mut valid: Vec<(NaiveDateTime, FixedOffset)> = [self.daylight, self.standard]
            .into_iter()
            .filter_map(|offset| {
                let utc = *local - TimeDelta::seconds(i64::from(offset.local_minus_utc()));
                (self.offset_at_utc(&utc) == offset).then_some((utc, offset))
            })
            .collect();
        valid.sort_by_key(|(utc, _)| *utc);
        match valid.as_slice() {
            [] => LocalResult::None,
            [(_, only)] => LocalResult::Single(*only),
            [(_, earlier), (_, later), ..] => LocalResult::Ambiguous(*earlier, *later),
        }
    }

    fn local_at(&self, utc: &NaiveDateTime) -> NaiveDateTime {
        *utc + TimeDelta::seconds(i64::from(self.offset_at_utc(utc).local_minus_utc()))
    }
}

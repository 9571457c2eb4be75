// Error taxonomy for the ASH pipeline. Application glue (config, main, workers) uses anyhow.

use std::fmt;

use thiserror::Error;

/// Local calendar hour addressing one archive bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketKey {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
}

impl BucketKey {
    pub fn new(year: i32, month: u32, day: u32, hour: u32) -> Self {
        Self {
            year,
            month,
            day,
            hour,
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}h",
            self.year, self.month, self.day, self.hour
        )
    }
}

#[derive(Debug, Error)]
pub enum AshError {
    /// Buffer append would break strictly increasing timestamp order.
    #[error("out-of-order sample: timestamp {timestamp} is not after buffer tail {tail}")]
    OutOfOrderSample { timestamp: i64, tail: i64 },

    #[error("archive bucket {key} unreadable: {source}")]
    ArchiveRead {
        key: BucketKey,
        #[source]
        source: std::io::Error,
    },

    #[error("archive bucket {key} not writable (snapshot {timestamp}): {source}")]
    ArchiveWrite {
        key: BucketKey,
        timestamp: i64,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("invalid calendar date {year:04}-{month:02}-{day:02} hour {hour}")]
    InvalidCalendarDate {
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
    },
}

impl AshError {
    pub(crate) fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        AshError::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = AshError> = std::result::Result<T, E>;

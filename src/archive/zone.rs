// Local civil time for hour buckets. DST gaps shift forward by the gap length; overlaps
// resolve to the earlier instant.

use chrono::{
    DateTime, Datelike, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, Offset,
    TimeDelta, TimeZone, Timelike, Utc,
};

use crate::error::{AshError, BucketKey, Result};

pub const HOUR_MS: i64 = 60 * 60 * 1000;

/// Wall-clock mapping used to address buckets.
pub trait CivilZone: Send + Sync {
    /// Offsets valid at a local wall-clock time: none (gap), one, or two (overlap, earlier first).
    fn offsets_at_local(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset>;

    /// Local wall-clock time of a UTC instant.
    fn local_at(&self, utc: &NaiveDateTime) -> NaiveDateTime;
}

fn offsets_via<Tz: TimeZone>(tz: &Tz, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
    tz.offset_from_local_datetime(local).map(|o| o.fix())
}

fn local_via<Tz: TimeZone>(tz: &Tz, utc: &NaiveDateTime) -> NaiveDateTime {
    tz.from_utc_datetime(utc).naive_local()
}

impl CivilZone for Local {
    fn offsets_at_local(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
        offsets_via(self, local)
    }

    fn local_at(&self, utc: &NaiveDateTime) -> NaiveDateTime {
        local_via(self, utc)
    }
}

impl CivilZone for Utc {
    fn offsets_at_local(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
        offsets_via(self, local)
    }

    fn local_at(&self, utc: &NaiveDateTime) -> NaiveDateTime {
        local_via(self, utc)
    }
}

impl CivilZone for FixedOffset {
    fn offsets_at_local(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
        offsets_via(self, local)
    }

    fn local_at(&self, utc: &NaiveDateTime) -> NaiveDateTime {
        local_via(self, utc)
    }
}

/// Bucket holding the instant `timestamp_ms`, or `None` if it is out of chrono's range.
pub fn bucket_key_of<Z: CivilZone + ?Sized>(zone: &Z, timestamp_ms: i64) -> Option<BucketKey> {
    let utc = DateTime::<Utc>::from_timestamp_millis(timestamp_ms)?.naive_utc();
    let local = zone.local_at(&utc);
    Some(BucketKey::new(
        local.year(),
        local.month(),
        local.day(),
        local.hour(),
    ))
}

/// Wall-clock start of a bucket; fails on an impossible date or hour.
pub fn bucket_start_local(key: BucketKey) -> Result<NaiveDateTime> {
    NaiveDate::from_ymd_opt(key.year, key.month, key.day)
        .and_then(|d| d.and_hms_opt(key.hour, 0, 0))
        .ok_or(AshError::InvalidCalendarDate {
            year: key.year,
            month: key.month,
            day: key.day,
            hour: key.hour,
        })
}

/// Inclusive millisecond range `[start, end]` covered by the bucket's hour.
///
/// The end is the start plus one hour; when that lands on the same hour-of-day (clocks went
/// back), one more hour is added so the repeated hour is covered too.
pub fn hour_window<Z: CivilZone + ?Sized>(zone: &Z, key: BucketKey) -> Result<(i64, i64)> {
    let local = bucket_start_local(key)?;
    let start = local_start_ms(zone, &local);
    let mut end = start + HOUR_MS;
    if bucket_key_of(zone, end).map(|k| k.hour) == Some(key.hour) {
        end += HOUR_MS;
    }
    Ok((start, end - 1))
}

fn local_start_ms<Z: CivilZone + ?Sized>(zone: &Z, local: &NaiveDateTime) -> i64 {
    match zone.offsets_at_local(local) {
        LocalResult::Single(offset) | LocalResult::Ambiguous(offset, _) => {
            instant_ms(local, offset)
        }
        LocalResult::None => {
            // Skipped wall-clock time: keep the offset in force before the jump.
            let before = (1..=48)
                .find_map(|i| {
                    let probe = *local - TimeDelta::minutes(30 * i);
                    zone.offsets_at_local(&probe).earliest()
                })
                .unwrap_or_else(|| Utc.fix());
            instant_ms(local, before)
        }
    }
}

fn instant_ms(local: &NaiveDateTime, offset: FixedOffset) -> i64 {
    let utc = *local - TimeDelta::seconds(i64::from(offset.local_minus_utc()));
    utc.and_utc().timestamp_millis()
}

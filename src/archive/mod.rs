// Hour-bucketed disk archive for snapshots evicted from the in-memory buffer.
// One append-only file per local calendar hour: <root>/ash-YYYYMMDD-HH.bin.
// Inspect a bucket with `cargo run --example dump_archive -- [ARCHIVE_DIR] [YYYY MM DD HH]`.

mod blob;
pub mod zone;

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::instrument;

use crate::error::{AshError, BucketKey, Result};
use crate::models::AshSnapshot;
pub use zone::{CivilZone, HOUR_MS, bucket_key_of, hour_window};

const FILE_PREFIX: &str = "ash-";
const FILE_SUFFIX: &str = ".bin";

pub struct HourlyArchive<Z: CivilZone = Local> {
    root: PathBuf,
    zone: Z,
}

impl HourlyArchive<Local> {
    /// Archive in the system's local time zone; creates `root` if missing.
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        Self::with_zone(root, Local)
    }
}

impl<Z: CivilZone> HourlyArchive<Z> {
    pub fn with_zone(root: impl AsRef<Path>, zone: Z) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root, zone })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn zone(&self) -> &Z {
        &self.zone
    }

    pub fn bucket_path(&self, key: BucketKey) -> PathBuf {
        self.root.join(format!(
            "{}{:04}{:02}{:02}-{:02}{}",
            FILE_PREFIX, key.year, key.month, key.day, key.hour, FILE_SUFFIX
        ))
    }

    /// Inclusive millisecond range covered by the bucket, DST-aware.
    pub fn hour_window(&self, key: BucketKey) -> Result<(i64, i64)> {
        hour_window(&self.zone, key)
    }

    /// Appends the snapshot to its local-hour bucket, creating the file on first write.
    #[instrument(skip(self, snapshot), fields(repo = "archive", operation = "write", timestamp = snapshot.timestamp()))]
    pub fn write(&self, snapshot: &AshSnapshot) -> Result<BucketKey> {
        let key = bucket_key_of(&self.zone, snapshot.timestamp()).ok_or_else(|| {
            AshError::invalid_argument(
                "timestamp",
                format!("{} is outside the calendar range", snapshot.timestamp()),
            )
        })?;
        let write_err = |source: io::Error| AshError::ArchiveWrite {
            key,
            timestamp: snapshot.timestamp(),
            source,
        };
        let frame = blob::encode_record(&snapshot.to_record()).map_err(write_err)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.bucket_path(key))
            .map_err(write_err)?;
        file.write_all(&frame).map_err(write_err)?;
        file.flush().map_err(write_err)?;
        Ok(key)
    }

    /// Opens one hour's snapshots as a lazy, forward-only sequence in write order.
    /// A bucket that was never written reads as empty.
    pub fn read_bucket(&self, key: BucketKey) -> Result<ArchivedSnapshots> {
        zone::bucket_start_local(key)?;
        let reader = match File::open(self.bucket_path(key)) {
            Ok(f) => Some(BufReader::new(f)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(source) => return Err(AshError::ArchiveRead { key, source }),
        };
        Ok(ArchivedSnapshots { key, reader })
    }

    /// Runs `f` over the bucket's snapshots and closes the bucket on every exit path.
    pub fn with_bucket<T>(
        &self,
        key: BucketKey,
        f: impl FnOnce(&mut ArchivedSnapshots) -> Result<T>,
    ) -> Result<T> {
        let mut snapshots = self.read_bucket(key)?;
        let out = f(&mut snapshots);
        snapshots.close();
        out
    }

    /// Keys of all buckets on disk, oldest first.
    pub fn buckets(&self) -> io::Result<Vec<BucketKey>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if let Some(key) = entry.file_name().to_str().and_then(parse_bucket_file_name) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Deletes buckets whose hour ends at or before `cutoff_ms`. Returns buckets removed.
    #[instrument(skip(self), fields(repo = "archive", operation = "prune_before"))]
    pub fn prune_before(&self, cutoff_ms: i64) -> io::Result<usize> {
        let mut removed = 0;
        for key in self.buckets()? {
            let Ok((_, end)) = self.hour_window(key) else {
                continue;
            };
            if end < cutoff_ms {
                fs::remove_file(self.bucket_path(key))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn parse_bucket_file_name(name: &str) -> Option<BucketKey> {
    let stem = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    let (date, hour) = stem.split_once('-')?;
    if date.len() != 8 || hour.len() != 2 {
        return None;
    }
    Some(BucketKey::new(
        date.get(0..4)?.parse().ok()?,
        date.get(4..6)?.parse().ok()?,
        date.get(6..8)?.parse().ok()?,
        hour.parse().ok()?,
    ))
}

/// Forward-only reader over one bucket. Holds the file open until exhausted, closed, or dropped.
pub struct ArchivedSnapshots {
    key: BucketKey,
    reader: Option<BufReader<File>>,
}

impl ArchivedSnapshots {
    pub fn key(&self) -> BucketKey {
        self.key
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// Releases the underlying file handle. Further `next()` calls yield nothing.
    pub fn close(&mut self) {
        self.reader = None;
    }
}

impl Iterator for ArchivedSnapshots {
    type Item = Result<AshSnapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        let key = self.key;
        let read_err = |source: io::Error| AshError::ArchiveRead { key, source };
        let frame = match blob::read_frame(reader) {
            Ok(frame) => frame,
            Err(e) => {
                self.close();
                return Some(Err(read_err(e)));
            }
        };
        match frame {
            blob::Frame::Record(body) => {
                let decoded = blob::decode_record(&body).and_then(|record| {
                    AshSnapshot::try_from(record)
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
                });
                match decoded {
                    Ok(snapshot) => Some(Ok(snapshot)),
                    Err(e) => {
                        self.close();
                        Some(Err(read_err(e)))
                    }
                }
            }
            blob::Frame::End => {
                self.close();
                None
            }
            blob::Frame::Truncated => {
                tracing::warn!(bucket = %key, "archive bucket ends in a partial record; ignoring tail");
                self.close();
                None
            }
        }
    }
}

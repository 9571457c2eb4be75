// SnapshotBuffer tests: ordering, copy-on-read views, eviction to the archive

mod common;

use ashmon::buffer::{Retention, SnapshotBuffer};
use ashmon::config::AppConfig;
use ashmon::error::AshError;
use common::{RecordingSink, cpu, snapshot};
use std::sync::Arc;

fn buffer(retention: Retention, max_backlog: usize, sink: Arc<RecordingSink>) -> SnapshotBuffer {
    SnapshotBuffer::new(
        retention,
        max_backlog,
        vec!["CPU".into(), "User I/O".into()],
        sink,
    )
}

fn timestamps(b: &SnapshotBuffer) -> Vec<i64> {
    b.snapshots().iter().map(|s| s.timestamp()).collect()
}

#[test]
fn append_keeps_strictly_increasing_order() {
    let sink = Arc::new(RecordingSink::default());
    let b = buffer(Retention::Count(10), 20, sink);
    for ts in [100, 200, 300] {
        b.append(snapshot(ts, 1, vec![cpu(1, None)])).unwrap();
    }
    assert_eq!(timestamps(&b), vec![100, 200, 300]);
    assert_eq!(b.bounds(), Some((100, 300)));
}

#[test]
fn append_rejects_equal_or_older_timestamp() {
    let sink = Arc::new(RecordingSink::default());
    let b = buffer(Retention::Count(10), 20, sink);
    b.append(snapshot(200, 1, vec![])).unwrap();

    for ts in [200, 150] {
        let err = b.append(snapshot(ts, 1, vec![])).unwrap_err();
        match err {
            AshError::OutOfOrderSample { timestamp, tail } => {
                assert_eq!(timestamp, ts);
                assert_eq!(tail, 200);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(timestamps(&b), vec![200]);
}

#[test]
fn snapshots_view_is_not_affected_by_later_appends() {
    let sink = Arc::new(RecordingSink::default());
    let b = buffer(Retention::Count(2), 4, sink);
    b.append(snapshot(1, 1, vec![])).unwrap();
    b.append(snapshot(2, 1, vec![])).unwrap();

    let view = b.snapshots();
    b.append(snapshot(3, 1, vec![])).unwrap();
    b.append(snapshot(4, 1, vec![])).unwrap();

    let seen: Vec<i64> = view.iter().map(|s| s.timestamp()).collect();
    assert_eq!(seen, vec![1, 2]);
    assert_eq!(timestamps(&b), vec![3, 4]);
}

#[test]
fn count_retention_archives_oldest_before_dropping() {
    let sink = Arc::new(RecordingSink::default());
    let b = buffer(Retention::Count(3), 6, sink.clone());
    let mut archived = 0;
    for ts in 1..=5 {
        archived += b.append(snapshot(ts, 1, vec![])).unwrap().archived;
    }
    assert_eq!(archived, 2);
    assert_eq!(sink.written(), vec![1, 2]);
    assert_eq!(timestamps(&b), vec![3, 4, 5]);
}

#[test]
fn age_retention_keeps_recent_window() {
    let sink = Arc::new(RecordingSink::default());
    let b = buffer(Retention::MaxAgeMs(1_000), 100, sink.clone());
    for ts in [0, 400, 800, 1_200, 1_600] {
        b.append(snapshot(ts, 1, vec![])).unwrap();
    }
    // Newest is 1600; anything older than 600 leaves memory.
    assert_eq!(sink.written(), vec![0, 400]);
    assert_eq!(timestamps(&b), vec![800, 1_200, 1_600]);
}

#[test]
fn archive_failure_blocks_eviction() {
    let sink = Arc::new(RecordingSink::default());
    let b = buffer(Retention::Count(2), 10, sink.clone());
    b.append(snapshot(1, 1, vec![])).unwrap();
    b.append(snapshot(2, 1, vec![])).unwrap();

    sink.set_failing(true);
    let outcome = b.append(snapshot(3, 1, vec![])).unwrap();
    assert_eq!(outcome.archived, 0);
    assert!(matches!(
        outcome.archive_error,
        Some(AshError::ArchiveWrite { timestamp: 1, .. })
    ));
    b.append(snapshot(4, 1, vec![])).unwrap();
    assert_eq!(timestamps(&b), vec![1, 2, 3, 4]);
    assert!(sink.written().is_empty());

    // Once the archive recovers the backlog drains in order.
    sink.set_failing(false);
    let outcome = b.append(snapshot(5, 1, vec![])).unwrap();
    assert_eq!(outcome.archived, 3);
    assert!(outcome.archive_error.is_none());
    assert_eq!(sink.written(), vec![1, 2, 3]);
    assert_eq!(timestamps(&b), vec![4, 5]);
}

#[test]
fn backlog_overflow_discards_oldest_and_reports_it() {
    let sink = Arc::new(RecordingSink::default());
    let b = buffer(Retention::Count(1), 3, sink.clone());
    sink.set_failing(true);
    let mut discarded = 0;
    for ts in 1..=5 {
        discarded += b.append(snapshot(ts, 1, vec![])).unwrap().discarded;
    }
    assert_eq!(discarded, 2);
    assert_eq!(timestamps(&b), vec![3, 4, 5]);
}

#[test]
fn count_retention_window_is_never_discarded() {
    let sink = Arc::new(RecordingSink::default());
    // A backlog below the retention is raised to it.
    let b = buffer(Retention::Count(5), 2, sink.clone());
    sink.set_failing(true);
    let mut discarded = 0;
    for ts in 1..=6 {
        discarded += b.append(snapshot(ts, 1, vec![])).unwrap().discarded;
    }
    assert_eq!(discarded, 1);
    assert_eq!(timestamps(&b), vec![2, 3, 4, 5, 6]);
}

const AGE_CONFIG: &str = r#"
[source]
url = "postgres://monitor@localhost/app"
max_pool_size = 1

[sampling]
sample_interval_ms = 1000
samples_per_snapshot = 1

[buffer]
max_age_secs = 3600

[archive]
path = "data/ash"

[monitoring]
stats_log_interval_secs = 60
"#;

#[test]
fn age_window_survives_a_failed_archive_write() {
    let config = AppConfig::load_from_str(AGE_CONFIG).expect("valid");
    let sink = Arc::new(RecordingSink::default());
    let b = buffer(config.buffer.retention(), config.max_backlog(), sink.clone());

    for i in 0..=3_600 {
        b.append(snapshot(i * 1000, 1, vec![])).unwrap();
    }
    assert_eq!(b.len(), 3_601);
    assert!(sink.written().is_empty());

    sink.set_failing(true);
    let outcome = b.append(snapshot(3_601_000, 1, vec![])).unwrap();
    assert!(outcome.archive_error.is_some());
    assert_eq!(outcome.discarded, 0);
    assert_eq!(b.len(), 3_602);
    assert_eq!(b.bounds(), Some((0, 3_601_000)));

    sink.set_failing(false);
    let outcome = b.append(snapshot(3_602_000, 1, vec![])).unwrap();
    assert_eq!(outcome.archived, 2);
    assert_eq!(sink.written(), vec![0, 1000]);
}

#[test]
fn flush_to_sink_persists_every_retained_snapshot() {
    let sink = Arc::new(RecordingSink::default());
    let b = buffer(Retention::Count(3), 6, sink.clone());
    for ts in 1..=5 {
        b.append(snapshot(ts, 1, vec![])).unwrap();
    }
    assert_eq!(sink.written(), vec![1, 2]);

    let outcome = b.flush_to_sink();
    assert_eq!(outcome.archived, 3);
    assert!(outcome.archive_error.is_none());
    assert_eq!(sink.written(), vec![1, 2, 3, 4, 5]);
    assert!(b.is_empty());

    // Nothing left: a second flush writes nothing twice.
    assert_eq!(b.flush_to_sink().archived, 0);
    assert_eq!(sink.written().len(), 5);
}

#[test]
fn flush_to_sink_keeps_snapshots_it_could_not_write() {
    let sink = Arc::new(RecordingSink::default());
    let b = buffer(Retention::Count(3), 6, sink.clone());
    b.append(snapshot(10, 1, vec![])).unwrap();
    b.append(snapshot(20, 1, vec![])).unwrap();

    sink.set_failing(true);
    let outcome = b.flush_to_sink();
    assert_eq!(outcome.archived, 0);
    assert!(matches!(
        outcome.archive_error,
        Some(AshError::ArchiveWrite { timestamp: 10, .. })
    ));
    assert_eq!(timestamps(&b), vec![10, 20]);

    sink.set_failing(false);
    assert_eq!(b.flush_to_sink().archived, 2);
    assert_eq!(sink.written(), vec![10, 20]);
}

#[test]
fn wait_classes_is_static_catalog() {
    let sink = Arc::new(RecordingSink::default());
    let b = buffer(Retention::Count(2), 4, sink);
    assert_eq!(b.wait_classes(), &["CPU".to_string(), "User I/O".to_string()]);
    assert!(b.is_empty());
}

#[test]
fn concurrent_readers_always_see_ordered_views() {
    let sink = Arc::new(RecordingSink::default());
    let b = Arc::new(buffer(Retention::Count(50), 100, sink));

    let writer = {
        let b = b.clone();
        std::thread::spawn(move || {
            for ts in 1..=2_000 {
                b.append(snapshot(ts, 1, vec![cpu(ts, None)])).unwrap();
            }
        })
    };
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let b = b.clone();
            std::thread::spawn(move || {
                for _ in 0..500 {
                    let view = b.snapshots();
                    assert!(view.len() <= 51);
                    assert!(view.windows(2).all(|w| w[0].timestamp() < w[1].timestamp()));
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(b.len(), 50);
    assert_eq!(b.bounds(), Some((1_951, 2_000)));
}

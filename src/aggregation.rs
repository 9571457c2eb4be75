// Interval activity: one pass over snapshots -> normalized event and wait-class series,
// top-10 SQL and top-10 sessions. Pure logic; callers feed snapshots from memory or archive.

use std::collections::{BTreeMap, HashMap};

use crate::models::{
    ActiveSession, AshSnapshot, IntervalActivity, SessionActivityBuilder, Snapshot,
    SqlActivityBuilder, count_labels,
};
use crate::statements::StatementCache;

pub const TOP_N: usize = 10;

/// Session-level filter applied during aggregation.
pub type SessionFilter<'a> = &'a (dyn Fn(&ActiveSession) -> bool + Sync);

/// Streaming accumulator for one `[start, end]` window (inclusive, epoch ms).
///
/// Feed every snapshot once through [`push`](Self::push), then [`finish`](Self::finish).
/// Builders keep first-seen order so equal counts rank deterministically.
pub struct IntervalAggregator<'f> {
    start: i64,
    end: i64,
    filter: Option<SessionFilter<'f>>,
    total_samples: u64,
    total_activity: u64,
    events_snapshots: Vec<Snapshot<f64>>,
    wait_classes_snapshots: Vec<Snapshot<f64>>,
    sql_index: HashMap<Option<String>, usize>,
    sql: Vec<SqlActivityBuilder>,
    session_index: HashMap<(i64, i64), usize>,
    sessions: Vec<SessionActivityBuilder>,
}

impl<'f> IntervalAggregator<'f> {
    pub fn new(start: i64, end: i64, filter: Option<SessionFilter<'f>>) -> Self {
        Self {
            start,
            end,
            filter,
            total_samples: 0,
            total_activity: 0,
            events_snapshots: Vec::new(),
            wait_classes_snapshots: Vec::new(),
            sql_index: HashMap::new(),
            sql: Vec::new(),
            session_index: HashMap::new(),
            sessions: Vec::new(),
        }
    }

    /// Accounts one snapshot; those outside the window are ignored.
    pub fn push(&mut self, snapshot: &AshSnapshot) {
        let ts = snapshot.timestamp();
        if ts < self.start || ts > self.end {
            return;
        }
        self.total_samples += u64::from(snapshot.samples());

        let mut events: BTreeMap<&str, u32> = BTreeMap::new();
        let mut wait_classes: BTreeMap<&str, u32> = BTreeMap::new();
        for s in snapshot.active_sessions() {
            if let Some(filter) = self.filter
                && !filter(s)
            {
                continue;
            }
            self.total_activity += 1;
            *events.entry(s.event.as_str()).or_insert(0) += 1;
            *wait_classes.entry(s.wait_class.as_str()).or_insert(0) += 1;

            let idx = match self.sql_index.get(&s.sql_id) {
                Some(&i) => i,
                None => {
                    self.sql.push(SqlActivityBuilder::new(s.sql_id.clone()));
                    self.sql_index.insert(s.sql_id.clone(), self.sql.len() - 1);
                    self.sql.len() - 1
                }
            };
            self.sql[idx].add();

            let key = (s.sid, s.serial_number);
            let idx = match self.session_index.get(&key) {
                Some(&i) => i,
                None => {
                    self.sessions.push(SessionActivityBuilder::new(s));
                    self.session_index.insert(key, self.sessions.len() - 1);
                    self.sessions.len() - 1
                }
            };
            self.sessions[idx].add();
        }

        self.events_snapshots
            .push(Snapshot::normalized(ts, &events, snapshot.samples()));
        self.wait_classes_snapshots
            .push(Snapshot::normalized(ts, &wait_classes, snapshot.samples()));
    }

    /// Ranks, resolves statement text for the top SQL only, and builds the result.
    pub fn finish(self, statements: &dyn StatementCache) -> IntervalActivity {
        let total_activity = self.total_activity;
        let total_samples = self.total_samples;

        let top_sql = top_by(self.sql, |b| b.activity_count())
            .into_iter()
            .map(|b| {
                let statement = b.sql_id().and_then(|id| statements.lookup(id));
                let (sql_text, command) = match statement {
                    Some(st) => (Some(st.sql_text), st.command),
                    None => (None, None),
                };
                b.build(sql_text, command, total_activity, total_samples)
            })
            .collect();
        let top_sessions = top_by(self.sessions, |b| b.activity_count())
            .into_iter()
            .map(|b| b.build(total_activity))
            .collect();

        IntervalActivity {
            start: self.start,
            end: self.end,
            events_snapshots: self.events_snapshots,
            wait_classes_snapshots: self.wait_classes_snapshots,
            top_sql,
            top_sessions,
            total_activity,
            total_samples,
        }
    }
}

/// The `TOP_N` items with the highest count, descending; ties keep input order.
fn top_by<T>(items: Vec<T>, count: impl Fn(&T) -> u64) -> Vec<T> {
    let mut ranked: Vec<(usize, T)> = items.into_iter().enumerate().collect();
    ranked.sort_by(|(ia, a), (ib, b)| count(b).cmp(&count(a)).then(ia.cmp(ib)));
    ranked.truncate(TOP_N);
    ranked.into_iter().map(|(_, item)| item).collect()
}

/// Aggregates an iterator of snapshots in a single pass.
pub fn interval_activity<'a, I>(
    snapshots: I,
    start: i64,
    end: i64,
    filter: Option<SessionFilter<'_>>,
    statements: &dyn StatementCache,
) -> IntervalActivity
where
    I: IntoIterator<Item = &'a AshSnapshot>,
{
    let mut agg = IntervalAggregator::new(start, end, filter);
    for snapshot in snapshots {
        agg.push(snapshot);
    }
    agg.finish(statements)
}

/// Per-snapshot event series over matching sessions; one point per snapshot, no ranking.
pub fn events_by_filter<'a, I>(snapshots: I, filter: SessionFilter<'_>) -> Vec<Snapshot<f64>>
where
    I: IntoIterator<Item = &'a AshSnapshot>,
{
    snapshots
        .into_iter()
        .map(|snapshot| {
            let counts = count_labels(
                snapshot
                    .active_sessions()
                    .iter()
                    .filter(|&s| filter(s))
                    .map(|s| s.event.as_str()),
            );
            Snapshot::normalized(snapshot.timestamp(), &counts, snapshot.samples())
        })
        .collect()
}

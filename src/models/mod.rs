// Domain models: sampled sessions, snapshots, interval activity

mod activity;
mod session;
mod snapshot;

pub use activity::{
    IntervalActivity, SessionActivity, SessionActivityBuilder, SqlActivity, SqlActivityBuilder,
};
pub(crate) use session::SnapshotRecord;
pub use session::{ActiveSession, AshSnapshot};
pub use snapshot::{Snapshot, count_labels};

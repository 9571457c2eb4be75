// Micro-sample sources. The daemon samples PostgreSQL's pg_stat_activity.

mod postgres;

use std::future::Future;

use crate::models::ActiveSession;
use crate::statements::Statement;

pub use postgres::PgActivitySource;

/// Sessions active at one instant, plus statement texts seen for their sql ids.
#[derive(Debug, Clone, Default)]
pub struct MicroSample {
    pub sessions: Vec<ActiveSession>,
    pub statements: Vec<(String, Statement)>,
}

pub trait SessionSource: Send + Sync + 'static {
    fn sample(&self) -> impl Future<Output = anyhow::Result<MicroSample>> + Send;
}

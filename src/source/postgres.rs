// pg_stat_activity sampler over a read-only sqlx pool

use std::str::FromStr;
use std::time::Duration;

use sqlx::Row;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use tracing::instrument;

use super::{MicroSample, SessionSource};
use crate::models::ActiveSession;
use crate::statements::Statement;

const APPLICATION_NAME: &str = "ashmon";

/// Active client backends other than our own. backend_start disambiguates pid reuse;
/// sessions not waiting are reported as on CPU.
const ACTIVE_SESSIONS_SQL: &str = r#"
SELECT pid::int8 AS sid,
       COALESCE(EXTRACT(EPOCH FROM backend_start)::int8, 0) AS serial_number,
       COALESCE(usename::text, '') AS username,
       COALESCE(application_name, '') AS program,
       query_id::text AS sql_id,
       COALESCE(wait_event, 'CPU') AS event,
       COALESCE(wait_event_type, 'CPU') AS wait_class,
       query
FROM pg_stat_activity
WHERE state = 'active'
  AND backend_type = 'client backend'
  AND pid <> pg_backend_pid()
"#;

pub struct PgActivitySource {
    pool: PgPool,
}

impl PgActivitySource {
    pub async fn connect(url: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        let opts = PgConnectOptions::from_str(url)?.application_name(APPLICATION_NAME);
        let pool = PgPoolOptions::new()
            .max_connections(max_pool_size)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    fn parse_row(row: &PgRow) -> anyhow::Result<(ActiveSession, Option<String>)> {
        let session = ActiveSession {
            sid: row.try_get("sid")?,
            serial_number: row.try_get("serial_number")?,
            username: row.try_get("username")?,
            program: row.try_get("program")?,
            sql_id: row.try_get("sql_id")?,
            event: row.try_get("event")?,
            wait_class: row.try_get("wait_class")?,
        };
        let query: Option<String> = row.try_get("query")?;
        Ok((session, query))
    }
}

impl SessionSource for PgActivitySource {
    #[instrument(skip(self), fields(repo = "pg_stat_activity", operation = "sample"))]
    async fn sample(&self) -> anyhow::Result<MicroSample> {
        let rows = sqlx::query(ACTIVE_SESSIONS_SQL)
            .fetch_all(&self.pool)
            .await?;
        let mut sample = MicroSample {
            sessions: Vec::with_capacity(rows.len()),
            statements: Vec::new(),
        };
        for row in rows {
            let (session, query) = Self::parse_row(&row)?;
            if let (Some(sql_id), Some(text)) = (&session.sql_id, query)
                && !text.trim().is_empty()
            {
                sample
                    .statements
                    .push((sql_id.clone(), Statement::from_text(text)));
            }
            sample.sessions.push(session);
        }
        Ok(sample)
    }
}

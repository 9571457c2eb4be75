use serde::Deserialize;

use crate::buffer::Retention;

/// Wait classes reported by the bundled PostgreSQL source, CPU first.
pub const DEFAULT_WAIT_CLASSES: &[&str] = &[
    "CPU",
    "Activity",
    "BufferPin",
    "Client",
    "Extension",
    "IO",
    "IPC",
    "Lock",
    "LWLock",
    "Timeout",
];

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub sampling: SamplingConfig,
    pub buffer: BufferConfig,
    pub archive: ArchiveConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Monitored database, e.g. postgres://monitor@localhost/app
    pub url: String,
    pub max_pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplingConfig {
    pub sample_interval_ms: u64,
    /// Micro-samples folded into one snapshot.
    pub samples_per_snapshot: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BufferConfig {
    pub max_snapshots: Option<usize>,
    pub max_age_secs: Option<u64>,
    /// Cap on snapshots held while archive writes fail; defaults to twice the retained window.
    pub max_backlog: Option<usize>,
    #[serde(default = "default_wait_classes")]
    pub wait_classes: Vec<String>,
    #[serde(default = "default_statement_cache_size")]
    pub statement_cache_size: usize,
}

fn default_wait_classes() -> Vec<String> {
    DEFAULT_WAIT_CLASSES.iter().map(|s| s.to_string()).collect()
}

fn default_statement_cache_size() -> usize {
    10_000
}

impl BufferConfig {
    pub fn retention(&self) -> Retention {
        match (self.max_snapshots, self.max_age_secs) {
            (Some(n), _) => Retention::Count(n),
            (None, Some(secs)) => Retention::MaxAgeMs((secs as i64).saturating_mul(1000)),
            (None, None) => Retention::Count(0),
        }
    }

}

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    pub path: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Optional cron expression (local time); overrides prune_interval_secs.
    pub prune_schedule: Option<String>,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
}

fn default_retention_days() -> u32 {
    7
}

fn default_prune_interval_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// How often to log sampler stats at INFO level.
    pub stats_log_interval_secs: u64,
}

impl AppConfig {
    /// Wall-clock time between two snapshots.
    pub fn snapshot_period_ms(&self) -> u64 {
        self.sampling
            .sample_interval_ms
            .saturating_mul(u64::from(self.sampling.samples_per_snapshot))
            .max(1)
    }

    /// Snapshots the retention policy keeps in memory once the window is full.
    pub fn retained_snapshots(&self) -> usize {
        match (self.buffer.max_snapshots, self.buffer.max_age_secs) {
            (Some(n), _) => n,
            (None, Some(secs)) => {
                let window_ms = secs.saturating_mul(1000);
                usize::try_from(window_ms / self.snapshot_period_ms())
                    .unwrap_or(usize::MAX)
                    .saturating_add(1)
            }
            (None, None) => 0,
        }
    }

    /// Cap on the buffer while archive writes fail: `buffer.max_backlog`, or twice the
    /// retained window.
    pub fn max_backlog(&self) -> usize {
        self.buffer
            .max_backlog
            .unwrap_or_else(|| self.retained_snapshots().saturating_mul(2))
    }

    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.source.url.is_empty(), "source.url must be non-empty");
        anyhow::ensure!(
            self.source.max_pool_size > 0,
            "source.max_pool_size must be > 0, got {}",
            self.source.max_pool_size
        );
        anyhow::ensure!(
            self.sampling.sample_interval_ms > 0,
            "sampling.sample_interval_ms must be > 0, got {}",
            self.sampling.sample_interval_ms
        );
        anyhow::ensure!(
            self.sampling.samples_per_snapshot > 0,
            "sampling.samples_per_snapshot must be > 0, got {}",
            self.sampling.samples_per_snapshot
        );
        anyhow::ensure!(
            self.buffer.max_snapshots.is_some() != self.buffer.max_age_secs.is_some(),
            "exactly one of buffer.max_snapshots and buffer.max_age_secs must be set"
        );
        if let Some(n) = self.buffer.max_snapshots {
            anyhow::ensure!(n > 0, "buffer.max_snapshots must be > 0, got {}", n);
        }
        if let Some(secs) = self.buffer.max_age_secs {
            anyhow::ensure!(secs > 0, "buffer.max_age_secs must be > 0, got {}", secs);
        }
        anyhow::ensure!(
            self.max_backlog() >= self.retained_snapshots(),
            "buffer.max_backlog must be >= the {} snapshots the retention keeps, got {}",
            self.retained_snapshots(),
            self.max_backlog()
        );
        anyhow::ensure!(
            !self.buffer.wait_classes.is_empty(),
            "buffer.wait_classes must be non-empty"
        );
        anyhow::ensure!(
            self.buffer.statement_cache_size > 0,
            "buffer.statement_cache_size must be > 0, got {}",
            self.buffer.statement_cache_size
        );
        anyhow::ensure!(!self.archive.path.is_empty(), "archive.path must be non-empty");
        anyhow::ensure!(
            self.archive.retention_days > 0,
            "archive.retention_days must be > 0, got {}",
            self.archive.retention_days
        );
        anyhow::ensure!(
            self.archive.prune_interval_secs > 0,
            "archive.prune_interval_secs must be > 0, got {}",
            self.archive.prune_interval_secs
        );
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        Ok(())
    }
}

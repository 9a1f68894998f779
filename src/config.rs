use anyhow::bail;
use chrono::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub detector: DetectorConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectorConfig {
    /// Minimum profit, in percent, an opportunity must clear to be emitted.
    pub min_profit_threshold: f64,
    /// Notional bankroll split across the two legs of every opportunity.
    pub total_stake: f64,
    pub opportunity_horizon_seconds: u64,
    /// Quotes older than this are skipped by scans (W1).
    pub freshness_window_seconds: u64,
    /// Quotes older than this are removed by purge (W2).
    pub purge_window_seconds: u64,
    pub cleanup_interval_seconds: u64,
    /// Capacity of the engine → publisher queue. Overflow is dropped.
    pub publish_buffer: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Simulated,
    Stdin,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    pub kind: SourceKind,
    #[serde(default)]
    pub sportsbooks: Vec<String>,
    #[serde(default = "default_source_interval")]
    pub interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BroadcastConfig {
    pub capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_source_interval() -> u64 {
    5
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_profit_threshold: 0.5,
            total_stake: 1000.0,
            opportunity_horizon_seconds: 300,
            freshness_window_seconds: 30,
            purge_window_seconds: 60,
            cleanup_interval_seconds: 30,
            publish_buffer: 100,
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// Upper bound for every window, horizon and interval (one week).
pub const MAX_WINDOW_SECONDS: u64 = 7 * 24 * 60 * 60;

fn bounded_seconds(seconds: u64) -> Duration {
    Duration::seconds(seconds.min(MAX_WINDOW_SECONDS) as i64)
}

impl DetectorConfig {
    pub fn freshness_window(&self) -> Duration {
        bounded_seconds(self.freshness_window_seconds)
    }

    pub fn purge_window(&self) -> Duration {
        bounded_seconds(self.purge_window_seconds)
    }

    pub fn opportunity_horizon(&self) -> Duration {
        bounded_seconds(self.opportunity_horizon_seconds)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.min_profit_threshold.is_finite() || self.min_profit_threshold < 0.0 {
            bail!(
                "min_profit_threshold must be a non-negative number, got {}",
                self.min_profit_threshold
            );
        }
        if !self.total_stake.is_finite() || self.total_stake <= 0.0 {
            bail!("total_stake must be positive, got {}", self.total_stake);
        }
        if self.opportunity_horizon_seconds == 0 {
            bail!("opportunity_horizon_seconds must be positive");
        }
        if self.freshness_window_seconds == 0 || self.cleanup_interval_seconds == 0 {
            bail!("freshness and cleanup intervals must be positive");
        }
        if self.purge_window_seconds < self.freshness_window_seconds {
            bail!(
                "purge_window_seconds ({}) must not be shorter than freshness_window_seconds ({})",
                self.purge_window_seconds,
                self.freshness_window_seconds
            );
        }
        for (name, seconds) in [
            ("opportunity_horizon_seconds", self.opportunity_horizon_seconds),
            ("freshness_window_seconds", self.freshness_window_seconds),
            ("purge_window_seconds", self.purge_window_seconds),
            ("cleanup_interval_seconds", self.cleanup_interval_seconds),
        ] {
            if seconds > MAX_WINDOW_SECONDS {
                bail!("{} must be at most {}, got {}", name, MAX_WINDOW_SECONDS, seconds);
            }
        }
        if self.publish_buffer == 0 {
            bail!("publish_buffer must be at least 1");
        }
        Ok(())
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let mut settings = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::Environment::with_prefix("ARBITRAGE").separator("__"));

        // Override database URL from environment if present
        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            settings = settings.set_override("database.url", db_url)?;
        }

        let config: Config = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.detector.validate()?;
        if self.source.interval_seconds > MAX_WINDOW_SECONDS {
            bail!(
                "source.interval_seconds must be at most {}, got {}",
                MAX_WINDOW_SECONDS,
                self.source.interval_seconds
            );
        }
        if self.broadcast.capacity == 0 {
            bail!("broadcast.capacity must be at least 1");
        }
        if self.source.kind == SourceKind::Simulated && self.source.sportsbooks.len() < 2 {
            bail!("the simulated source needs at least two sportsbooks to compare");
        }
        Ok(())
    }
}

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// PostgreSQL connection URL for the ledger store (and the durable queue)
    pub postgres_url: String,
    #[serde(default = "default_max_connections")]
    pub postgres_max_connections: u32,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub recovery: RecoverySection,
    #[serde(default)]
    pub seed: SeedConfig,
}

fn default_max_connections() -> u32 {
    20
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Which Transfer Queue implementation backs the pipeline
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    /// In-process tokio channel (lost on restart, recovered by the scanner)
    Channel,
    /// `transfer_queue` outbox table in PostgreSQL
    Postgres,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_max_redeliveries")]
    pub max_redeliveries: u32,
    #[serde(default = "default_redelivery_delay_ms")]
    pub redelivery_delay_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_capacity() -> usize {
    1024
}

fn default_max_redeliveries() -> u32 {
    5
}

fn default_redelivery_delay_ms() -> u64 {
    500
}

fn default_poll_interval_ms() -> u64 {
    200
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::Postgres,
            capacity: default_capacity(),
            max_redeliveries: default_max_redeliveries(),
            redelivery_delay_ms: default_redelivery_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl QueueConfig {
    pub fn redelivery_delay(&self) -> Duration {
        Duration::from_millis(self.redelivery_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkerSection {
    /// Number of consume loops per process
    pub concurrency: usize,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecoverySection {
    /// `processing` transactions older than this are re-published at startup (0 = off)
    pub stale_processing_secs: u64,
}

impl Default for RecoverySection {
    fn default() -> Self {
        Self {
            stale_processing_secs: 300,
        }
    }
}

impl RecoverySection {
    pub fn stale_processing_after(&self) -> Option<Duration> {
        (self.stale_processing_secs > 0).then(|| Duration::from_secs(self.stale_processing_secs))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SeedConfig {
    pub enabled: bool,
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

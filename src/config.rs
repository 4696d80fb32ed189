use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub kafka: KafkaConfig,
    pub schema_registry: SchemaRegistryConfig,
    #[serde(default)]
    pub consumer: ConsumerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    #[serde(default = "default_compression")]
    pub compression: String,
    #[serde(default = "default_acks")]
    pub acks: String,
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u32,
    #[serde(default = "default_metadata_timeout_secs")]
    pub metadata_timeout_secs: u64,
    #[serde(default = "default_partitions")]
    pub default_partitions: i32,
    #[serde(default = "default_replication_factor")]
    pub default_replication_factor: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchemaRegistryConfig {
    pub url: String,
    #[serde(default)]
    pub auto_register: bool,
    #[serde(default = "default_registry_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsumerConfig {
    #[serde(default = "default_group_id")]
    pub group_id: String,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("KAFKA_EVENT")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }
}

impl KafkaConfig {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }
}

impl ConsumerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Builds a [`RetryPolicy`] from the configured attempts and backoff.
    pub fn policy(&self, label: impl Into<String>) -> RetryPolicy {
        RetryPolicy::new(self.attempts, self.backoff(), label)
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            compression: default_compression(),
            acks: default_acks(),
            linger_ms: default_linger_ms(),
            metadata_timeout_secs: default_metadata_timeout_secs(),
            default_partitions: default_partitions(),
            default_replication_factor: default_replication_factor(),
        }
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group_id: default_group_id(),
            read_timeout_ms: default_read_timeout_ms(),
            auto_offset_reset: default_auto_offset_reset(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_compression() -> String {
    "snappy".to_string()
}

fn default_acks() -> String {
    "all".to_string()
}

fn default_linger_ms() -> u32 {
    0
}

fn default_metadata_timeout_secs() -> u64 {
    10
}

fn default_partitions() -> i32 {
    3
}

fn default_replication_factor() -> i32 {
    1
}

fn default_registry_timeout_secs() -> u64 {
    10
}

fn default_group_id() -> String {
    "kafka-event-client".to_string()
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

fn default_attempts() -> u32 {
    5
}

fn default_backoff_ms() -> u64 {
    1000
}

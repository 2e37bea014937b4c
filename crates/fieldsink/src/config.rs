use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // NATS configuration
    /// NATS server URL
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// NATS JetStream stream carrying telemetry events. Required.
    #[serde(default)]
    pub nats_stream: String,

    /// Durable consumer name, the subscription identity. Required.
    #[serde(default)]
    pub nats_consumer: String,

    /// NATS subject pattern for the consumer filter; empty matches every
    /// subject on the stream.
    #[serde(default)]
    pub nats_subject: String,

    /// Maximum messages per pull
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Max wait time for a pull in seconds
    #[serde(default = "default_pull_wait_secs")]
    pub pull_wait_secs: u64,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Directory receiving the daily CSV files
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_pull_wait_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_output_dir() -> String {
    "daily_data".to_string()
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("FIELDSINK"))
            .build()?
            .try_deserialize()
    }

    /// Startup preconditions: the stream and consumer identities must be
    /// configured before any connection is attempted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nats_stream.is_empty() {
            return Err(ConfigError::Message(
                "FIELDSINK_NATS_STREAM must be set".to_string(),
            ));
        }
        if self.nats_consumer.is_empty() {
            return Err(ConfigError::Message(
                "FIELDSINK_NATS_CONSUMER must be set".to_string(),
            ));
        }
        Ok(())
    }
}

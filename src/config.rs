use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use thiserror::Error;

use crate::channel::{AckMode, SubscriptionConfig};
use crate::transfer::{ProjectorConfig, SettlementMode};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidOverride { key: &'static str, value: String },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    /// PostgreSQL connection URL. When absent the process runs on in-memory stores.
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub projector: ProjectorSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Deadline for the store calls of one request
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub settlement: SettlementMode,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChannelConfig {
    pub queue_name: String,
    /// Number of independent consumer workers (one per subscription)
    pub subscriptions: usize,
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub ack: AckPolicy,
    /// Delivery attempts before a message is dead-lettered (after_processing only)
    pub max_attempts: u32,
    /// How long an unacked PostgreSQL delivery stays invisible to other consumers
    #[serde(default = "default_visibility_timeout_ms")]
    pub visibility_timeout_ms: u64,
}

fn default_visibility_timeout_ms() -> u64 {
    30_000
}

/// When a consumer acknowledges a delivery
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// Ack at dequeue
    #[default]
    OnReceipt,
    /// Ack once the transfer is handled, redeliver otherwise
    AfterProcessing,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            queue_name: "transactions".to_string(),
            subscriptions: 1,
            poll_interval_ms: 200,
            ack: AckPolicy::OnReceipt,
            max_attempts: 5,
            visibility_timeout_ms: default_visibility_timeout_ms(),
        }
    }
}

impl ChannelConfig {
    pub fn ack_mode(&self) -> AckMode {
        match self.ack {
            AckPolicy::AfterProcessing => AckMode::AfterProcessing {
                max_attempts: self.max_attempts.max(1),
            },
            AckPolicy::OnReceipt => AckMode::OnReceipt,
        }
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_millis(self.visibility_timeout_ms)
    }

    pub fn subscription(&self) -> SubscriptionConfig {
        SubscriptionConfig {
            ack_mode: self.ack_mode(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProjectorSettings {
    pub scan_interval_ms: u64,
    pub batch_size: usize,
    /// Exclusive hold on an outbox intent, taken by the engine at commit
    /// and by the projector at each claim
    #[serde(default = "default_lease_ms")]
    pub lease_ms: u64,
}

fn default_lease_ms() -> u64 {
    30_000
}

impl ProjectorSettings {
    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }
}

impl Default for ProjectorSettings {
    fn default() -> Self {
        Self {
            scan_interval_ms: 5_000,
            batch_size: 100,
            lease_ms: default_lease_ms(),
        }
    }
}

impl From<&ProjectorSettings> for ProjectorConfig {
    fn from(s: &ProjectorSettings) -> Self {
        ProjectorConfig {
            scan_interval: Duration::from_millis(s.scan_interval_ms),
            batch_size: s.batch_size,
            lease: s.lease(),
        }
    }
}

impl AppConfig {
    /// Load `config/{env}.yaml` and apply environment overrides.
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// `POSTGRES_DSN`, `HTTP_PORT` and `QUEUE_NAME` win over the file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dsn) = lookup("POSTGRES_DSN").filter(|v| !v.is_empty()) {
            self.postgres_url = Some(dsn);
        }
        if let Some(port) = lookup("HTTP_PORT").filter(|v| !v.is_empty()) {
            // Accept listen-address style values such as ":8080".
            let trimmed = port.trim_start_matches(':');
            self.gateway.port = trimmed
                .parse()
                .map_err(|_| ConfigError::InvalidOverride {
                    key: "HTTP_PORT",
                    value: port.clone(),
                })?;
        }
        if let Some(queue) = lookup("QUEUE_NAME").filter(|v| !v.is_empty()) {
            self.channel.queue_name = queue;
        }
        Ok(())
    }
}

//! Configuration types for bulk-ops

use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};
use utoipa::ToSchema;

use crate::error::{Error, Result};

/// When a task counts as finished
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPolicy {
    /// The first worker reporting `end` finishes the whole task
    #[default]
    FirstWorker,
    /// The task finishes once every worker reported `end`
    AllWorkers,
}

/// Task orchestration settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct EngineConfig {
    /// Worker count used when the caller gives no hint (default: 2)
    #[serde(default = "default_worker_count")]
    pub default_worker_count: usize,

    /// Item lists shorter than this run on a single worker (default: 50)
    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: usize,

    /// When a task counts as finished (default: first_worker)
    #[serde(default)]
    pub completion_policy: CompletionPolicy,

    /// Fail a task when no worker message arrives for this long (default: disabled)
    #[serde(default, with = "optional_duration_serde")]
    #[schema(value_type = Option<u64>)]
    pub stall_timeout: Option<Duration>,

    /// Maximum live tasks per owner and operation type (default: unlimited)
    #[serde(default)]
    pub max_active_per_operation: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_worker_count: default_worker_count(),
            min_batch_size: default_min_batch_size(),
            completion_policy: CompletionPolicy::default(),
            stall_timeout: None,
            max_active_per_operation: None,
        }
    }
}

/// Settings for the built-in tokio worker executor
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct WorkerConfig {
    /// Items processed between two progress reports (default: 10)
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,

    /// Longest time a worker holds back unreported progress (default: 2 seconds)
    #[serde(default = "default_progress_interval", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub progress_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            progress_every: default_progress_every(),
            progress_interval: default_progress_interval(),
        }
    }
}

/// Subscription gateway settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct GatewayConfig {
    /// Upper bound on one token verification (default: 10 seconds)
    #[serde(default = "default_verify_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub verify_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            verify_timeout: default_verify_timeout(),
        }
    }
}

/// REST API and WebSocket server settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration
///
/// Every section and field has a default, so `{}` is a valid configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Task orchestration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Built-in worker executor
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Subscription gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// HTTP / WebSocket server
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Parse a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.engine.default_worker_count == 0 {
            return Err(invalid("default_worker_count", "must be at least 1"));
        }
        if self.engine.min_batch_size == 0 {
            return Err(invalid("min_batch_size", "must be at least 1"));
        }
        if self.engine.max_active_per_operation == Some(0) {
            return Err(invalid(
                "max_active_per_operation",
                "must be at least 1 when set",
            ));
        }
        if self.worker.progress_every == 0 {
            return Err(invalid("progress_every", "must be at least 1"));
        }
        if self.engine.stall_timeout == Some(Duration::ZERO) {
            return Err(invalid("stall_timeout", "must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> Error {
    Error::Config {
        message: format!("{key} {reason}"),
        key: Some(key.to_string()),
    }
}

fn default_true() -> bool {
    true
}

fn default_worker_count() -> usize {
    2
}

fn default_min_batch_size() -> usize {
    50
}

fn default_progress_every() -> usize {
    10
}

fn default_progress_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_verify_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}

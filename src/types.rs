//! Core types for bulk-ops

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::error::Error;

/// Identifier of a single item handed to a worker (tweet id, user id, DM id, ...)
pub type ItemId = String;

/// Unique identifier for a task
///
/// Assigned from a process-wide monotonically increasing counter and never reused.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Identifier of the user owning a task
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    /// Create a new OwnerId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OwnerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one observer connection attached to the subscription gateway
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Kind of bulk action a task performs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum OperationType {
    /// Delete tweets
    #[serde(rename = "tweet")]
    TweetDelete,
    /// Unmute accounts
    #[serde(rename = "mute")]
    Mute,
    /// Unblock accounts
    #[serde(rename = "block")]
    Block,
    /// Remove favorites
    #[serde(rename = "fav")]
    FavoriteRemoval,
    /// Delete direct messages
    #[serde(rename = "dm")]
    DirectMessageDelete,
}

impl OperationType {
    /// Every operation type, in declaration order
    pub const ALL: [OperationType; 5] = [
        OperationType::TweetDelete,
        OperationType::Mute,
        OperationType::Block,
        OperationType::FavoriteRemoval,
        OperationType::DirectMessageDelete,
    ];

    /// Wire name of the operation type
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::TweetDelete => "tweet",
            OperationType::Mute => "mute",
            OperationType::Block => "block",
            OperationType::FavoriteRemoval => "fav",
            OperationType::DirectMessageDelete => "dm",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationType::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| Error::InvalidOperation(s.to_string()))
    }
}

/// Credentials of the task owner
///
/// `token` / `token_secret` form the per-owner API credential pair handed to workers.
#[derive(Clone, Serialize, Deserialize)]
pub struct OwnerCredentials {
    /// Owning user
    pub owner: OwnerId,
    /// Display handle, used in log lines only
    #[serde(default)]
    pub screen_name: Option<String>,
    /// Per-owner access token
    pub token: String,
    /// Per-owner access token secret
    pub token_secret: String,
}

impl OwnerCredentials {
    /// Create credentials for an owner
    pub fn new(
        owner: impl Into<OwnerId>,
        token: impl Into<String>,
        token_secret: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            screen_name: None,
            token: token.into(),
            token_secret: token_secret.into(),
        }
    }

    /// Credential pair sent to workers
    pub fn worker_credentials(&self) -> WorkerCredentials {
        WorkerCredentials {
            key: self.token.clone(),
            secret: self.token_secret.clone(),
        }
    }
}

impl std::fmt::Debug for OwnerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerCredentials")
            .field("owner", &self.owner)
            .field("screen_name", &self.screen_name)
            .field("token", &"<redacted>")
            .field("token_secret", &"<redacted>")
            .finish()
    }
}

/// Credential pair a worker uses against the third-party API
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCredentials {
    /// Access token
    pub key: String,
    /// Access token secret
    pub secret: String,
}

impl std::fmt::Debug for WorkerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerCredentials")
            .field("key", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Immutable aggregated progress of a task, as broadcast to subscribers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProgressSnapshot {
    /// Task ID
    pub id: TaskId,
    /// Operation the task performs
    #[serde(rename = "type")]
    pub operation: OperationType,
    /// Items processed successfully
    pub done: u64,
    /// Items not processed yet
    pub remaining: u64,
    /// Items that failed
    pub failed: u64,
    /// Item count at creation
    pub total: u64,
    /// `100 * (done + failed) / total`, 100 when the task has no items
    pub percentage: f64,
    /// Present only on a terminal error snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressSnapshot {
    /// Build a progress snapshot from running counters
    pub fn progress(
        id: TaskId,
        operation: OperationType,
        done: u64,
        remaining: u64,
        failed: u64,
    ) -> Self {
        let total = done + remaining + failed;
        Self {
            id,
            operation,
            done,
            remaining,
            failed,
            total,
            percentage: percentage(done + failed, total),
            error: None,
        }
    }

    /// Build the terminal snapshot emitted when a worker fails fatally
    ///
    /// Counts are zeroed; only `total` and the error message are kept.
    pub fn failure(
        id: TaskId,
        operation: OperationType,
        total: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id,
            operation,
            done: 0,
            remaining: 0,
            failed: 0,
            total,
            percentage: 0.0,
            error: Some(message.into()),
        }
    }

    /// Whether this is a terminal error snapshot
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

fn percentage(processed: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (processed as f64 / total as f64) * 100.0
}

/// Event delivered to a subscribed observer connection
///
/// Serialized as `{"event": "<name>", "data": {...}}`, every event scoped to one task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum TaskEvent {
    /// Current progress (also used for the terminal error snapshot)
    #[serde(rename = "progression")]
    Progression(ProgressSnapshot),

    /// Task finished normally
    #[serde(rename = "task end")]
    TaskEnd {
        /// Task ID
        id: TaskId,
        /// Operation the task performed
        #[serde(rename = "type")]
        operation: OperationType,
    },

    /// Task was cancelled by its owner
    #[serde(rename = "task cancel")]
    TaskCancel {
        /// Task ID
        id: TaskId,
        /// Operation the task performed
        #[serde(rename = "type")]
        operation: OperationType,
    },

    /// A subscription request for this task was rejected
    #[serde(rename = "task error")]
    TaskError {
        /// Task identifier exactly as the observer sent it
        id: String,
        /// Human-readable reason
        message: String,
    },
}

impl TaskEvent {
    /// Event name as seen on the wire
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::Progression(_) => "progression",
            TaskEvent::TaskEnd { .. } => "task end",
            TaskEvent::TaskCancel { .. } => "task cancel",
            TaskEvent::TaskError { .. } => "task error",
        }
    }

    /// Whether no further events follow for this task
    pub fn is_terminal(&self) -> bool {
        match self {
            TaskEvent::Progression(snapshot) => snapshot.is_error(),
            TaskEvent::TaskEnd { .. } | TaskEvent::TaskCancel { .. } => true,
            TaskEvent::TaskError { .. } => false,
        }
    }
}

/// Where a task is in its lifecycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Workers are processing items
    #[default]
    Running,
    /// A worker reported the end of its slice
    Completed,
    /// A worker failed fatally or the task stalled
    Failed,
    /// The owner cancelled the task
    Cancelled,
}

impl TaskStatus {
    /// Whether the task has been torn down
    pub fn is_finished(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

/// Point-in-time view of a task, returned by the REST surface
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TaskSummary {
    /// Latest progress snapshot
    #[serde(flatten)]
    pub progress: ProgressSnapshot,
    /// Lifecycle state
    pub status: TaskStatus,
    /// Owning user
    pub owner: OwnerId,
    /// When the task was accepted
    pub created_at: DateTime<Utc>,
    /// Number of workers still owned by the task
    pub workers: usize,
    /// Provider error codes encountered so far, with occurrence counts
    #[serde(default)]
    pub provider_errors: BTreeMap<u32, u64>,
}

/// Engine-wide counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EngineStats {
    /// Tasks currently registered
    pub active_tasks: usize,
    /// Tweets deleted since the process started
    pub deleted_tweets: u64,
}

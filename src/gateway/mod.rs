//! Subscription gateway between observer connections and tasks.
//!
//! Every observer holds one persistent connection. Over it the observer asks to attach to
//! (or detach from) tasks by id, presenting a credential token each time. The gateway:
//! - verifies the token through a [`TokenVerifier`]
//! - resolves the task in the [`TaskRegistry`] and checks ownership
//! - keeps, per connection, the set of task ids it is attached to, so a lost connection
//!   can be detached from every task at once
//!
//! Rejected attach requests are answered with a `task error` event on the connection.

mod auth;


pub use auth::{StaticTokenVerifier, TokenVerifier};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::config::GatewayConfig;
use crate::engine::{Subscriber, TaskRegistry};
use crate::error::GatewayError;
use crate::types::{ConnectionId, OwnerId, TaskEvent, TaskId};

/// What an observer asks the gateway to do
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayAction {
    /// Attach to a task
    Task,
    /// Detach from a task
    Remove,
}

/// One inbound request on an observer connection
///
/// ```json
/// { "action": "task", "id": "12", "token": "..." }
/// ```
#[derive(Clone, Debug, Deserialize)]
pub struct GatewayRequest {
    /// Attach or detach
    pub action: GatewayAction,
    /// Task identifier, as a string or a number
    pub id: serde_json::Value,
    /// Observer credential token
    #[serde(default)]
    pub token: String,
}

impl GatewayRequest {
    /// Task identifier exactly as the observer sent it
    pub fn raw_id(&self) -> String {
        match &self.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

struct Connection {
    subscriber: Subscriber,
    tasks: HashSet<TaskId>,
}

struct GatewayInner {
    registry: TaskRegistry,
    verifier: Arc<dyn TokenVerifier>,
    config: GatewayConfig,
    connections: Mutex<HashMap<ConnectionId, Connection>>,
    next_connection: AtomicU64,
}

/// Attaches observer connections to tasks (cloneable, clones share state)
#[derive(Clone)]
pub struct SubscriptionGateway {
    inner: Arc<GatewayInner>,
}

impl SubscriptionGateway {
    /// Create a gateway resolving tasks in `registry`
    pub fn new(
        registry: TaskRegistry,
        verifier: Arc<dyn TokenVerifier>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                registry,
                verifier,
                config,
                connections: Mutex::new(HashMap::new()),
                next_connection: AtomicU64::new(1),
            }),
        }
    }

    /// Open a connection; events for it arrive on the returned receiver
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<TaskEvent>) {
        let id = ConnectionId(self.inner.next_connection.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.lock().insert(
            id,
            Connection {
                subscriber: Subscriber::new(id, tx),
                tasks: HashSet::new(),
            },
        );
        tracing::debug!(connection = %id, "Observer connected");
        (id, rx)
    }

    /// Handle one inbound request
    pub async fn handle(
        &self,
        connection: ConnectionId,
        request: &GatewayRequest,
    ) -> Result<(), GatewayError> {
        let raw_id = request.raw_id();
        match request.action {
            GatewayAction::Task => self
                .subscribe(connection, &request.token, &raw_id)
                .await
                .map(|_| ()),
            GatewayAction::Remove => self
                .unsubscribe(connection, &request.token, &raw_id)
                .await
                .map(|_| ()),
        }
    }

    /// Attach `connection` to the task `raw_id` on behalf of the token's user
    ///
    /// On success the connection immediately receives the task's latest snapshot. Any
    /// rejection is also sent to the connection as a `task error` event.
    pub async fn subscribe(
        &self,
        connection: ConnectionId,
        token: &str,
        raw_id: &str,
    ) -> Result<TaskId, GatewayError> {
        let result = self.try_subscribe(connection, token, raw_id).await;
        if let Err(error) = &result {
            tracing::debug!(%connection, task = raw_id, %error, "Subscription rejected");
            self.send_error(connection, raw_id, error);
        }
        result
    }

    async fn try_subscribe(
        &self,
        connection: ConnectionId,
        token: &str,
        raw_id: &str,
    ) -> Result<TaskId, GatewayError> {
        let user = self.verify(token).await?;
        let id: TaskId = raw_id.parse().map_err(|_| GatewayError::InvalidTaskId)?;
        let task = self
            .inner
            .registry
            .get(id)
            .ok_or(GatewayError::TaskNotFound)?;
        if task.owner() != &user {
            return Err(GatewayError::NotOwner);
        }

        // Both sides change under the connection lock so they never disagree
        let mut connections = self.inner.connections.lock();
        let entry = connections
            .get_mut(&connection)
            .ok_or(GatewayError::ConnectionClosed)?;
        self.prune(entry);
        entry.tasks.insert(id);
        if !task.subscribe(entry.subscriber.clone()) {
            // Ended after the registry lookup
            entry.tasks.remove(&id);
            return Err(GatewayError::TaskNotFound);
        }

        tracing::debug!(%connection, task_id = id.0, owner = %user, "Subscribed to task");
        Ok(id)
    }

    /// Detach `connection` from the task `raw_id`
    ///
    /// Token and id problems are reported like for [`SubscriptionGateway::subscribe`]. A
    /// missing task, a foreign task or an absent subscription is not an error here:
    /// the call returns `Ok(false)` and the connection hears nothing.
    pub async fn unsubscribe(
        &self,
        connection: ConnectionId,
        token: &str,
        raw_id: &str,
    ) -> Result<bool, GatewayError> {
        let parsed = match self.verify(token).await {
            Ok(user) => raw_id
                .parse::<TaskId>()
                .map(|id| (user, id))
                .map_err(|_| GatewayError::InvalidTaskId),
            Err(error) => Err(error),
        };
        let (user, id) = match parsed {
            Ok(parsed) => parsed,
            Err(error) => {
                self.send_error(connection, raw_id, &error);
                return Err(error);
            }
        };

        let Some(task) = self.inner.registry.get(id) else {
            // The task is gone, so is its side of the subscription
            self.forget(connection, id);
            return Ok(false);
        };
        if task.owner() != &user {
            return Ok(false);
        }

        let mut connections = self.inner.connections.lock();
        let Some(entry) = connections.get_mut(&connection) else {
            return Ok(false);
        };
        let recorded = entry.tasks.remove(&id);
        let attached = task.unsubscribe(connection);
        if recorded || attached {
            tracing::debug!(%connection, task_id = id.0, "Unsubscribed from task");
        }
        Ok(recorded || attached)
    }

    /// Detach a lost connection from every task it was attached to
    pub fn disconnect(&self, connection: ConnectionId) {
        let Some(entry) = self.inner.connections.lock().remove(&connection) else {
            return;
        };

        let mut detached = 0;
        for id in &entry.tasks {
            if let Some(task) = self.inner.registry.get(*id)
                && task.unsubscribe(connection)
            {
                detached += 1;
            }
        }
        tracing::debug!(%connection, detached, "Observer disconnected");
    }

    /// Running task ids `connection` is attached to
    ///
    /// Tasks that ended since the last call are dropped from the connection's record.
    pub fn subscriptions(&self, connection: ConnectionId) -> Vec<TaskId> {
        let mut connections = self.inner.connections.lock();
        let Some(entry) = connections.get_mut(&connection) else {
            return Vec::new();
        };
        self.prune(entry);
        let mut ids: Vec<TaskId> = entry.tasks.iter().copied().collect();
        ids.sort();
        ids
    }

    /// Number of open connections
    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().len()
    }

    async fn verify(&self, token: &str) -> Result<OwnerId, GatewayError> {
        match tokio::time::timeout(self.inner.config.verify_timeout, self.inner.verifier.verify(token))
            .await
        {
            Ok(Some(user)) => Ok(user),
            Ok(None) => Err(GatewayError::InvalidToken),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.inner.config.verify_timeout.as_secs(),
                    "Token verification timed out"
                );
                Err(GatewayError::InvalidToken)
            }
        }
    }

    /// Drop ended tasks from a connection's record; a task clears its own side on teardown
    fn prune(&self, entry: &mut Connection) {
        let registry = &self.inner.registry;
        entry
            .tasks
            .retain(|id| registry.get(*id).is_some_and(|task| task.is_running()));
    }

    fn forget(&self, connection: ConnectionId, id: TaskId) {
        if let Some(entry) = self.inner.connections.lock().get_mut(&connection) {
            entry.tasks.remove(&id);
        }
    }

    /// Push an event straight to `connection`; false if it is closed
    pub fn send_event(&self, connection: ConnectionId, event: TaskEvent) -> bool {
        self.inner
            .connections
            .lock()
            .get(&connection)
            .is_some_and(|entry| entry.subscriber.send(event))
    }

    fn send_error(&self, connection: ConnectionId, raw_id: &str, error: &GatewayError) {
        self.send_event(
            connection,
            TaskEvent::TaskError {
                id: raw_id.to_string(),
                message: error.to_string(),
            },
        );
    }
}

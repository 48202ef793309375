//! Lookup of the third-party credentials a task runs with.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{OwnerCredentials, OwnerId};

/// Source of per-owner third-party API credentials
///
/// The REST surface only knows who the caller is; the token pair handed to workers comes
/// from here.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Credentials of `owner`, if any are on file
    async fn credentials(&self, owner: &OwnerId) -> Option<OwnerCredentials>;
}

/// Credential store kept in memory
#[derive(Clone, Default)]
pub struct InMemoryCredentialStore {
    entries: Arc<RwLock<HashMap<OwnerId, OwnerCredentials>>>,
}

impl InMemoryCredentialStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) the credentials of their owner
    pub fn insert(&self, credentials: OwnerCredentials) {
        self.entries
            .write()
            .insert(credentials.owner.clone(), credentials);
    }

    /// Forget the credentials of `owner`; returns whether any were stored
    pub fn remove(&self, owner: &OwnerId) -> bool {
        self.entries.write().remove(owner).is_some()
    }
}

#[async_trait::async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn credentials(&self, owner: &OwnerId) -> Option<OwnerCredentials> {
        self.entries.read().get(owner).cloned()
    }
}

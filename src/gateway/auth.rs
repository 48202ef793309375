//! Token verification for observers.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::OwnerId;

/// Resolves an observer's credential token to the user it belongs to
///
/// Implementations typically call an external identity service. A `None` means the token
/// is invalid or the user no longer exists; the gateway bounds every call with a timeout.
#[async_trait::async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify `token`
    async fn verify(&self, token: &str) -> Option<OwnerId>;
}

/// Verifier backed by an in-memory token table
#[derive(Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: Arc<RwLock<HashMap<String, OwnerId>>>,
}

impl StaticTokenVerifier {
    /// Create an empty verifier (every token is rejected)
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style variant of [`StaticTokenVerifier::insert`]
    pub fn with_token(self, token: impl Into<String>, owner: impl Into<OwnerId>) -> Self {
        self.insert(token, owner);
        self
    }

    /// Accept `token` for `owner`
    pub fn insert(&self, token: impl Into<String>, owner: impl Into<OwnerId>) {
        self.tokens.write().insert(token.into(), owner.into());
    }

    /// Stop accepting `token`; returns whether it was known
    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.write().remove(token).is_some()
    }
}

#[async_trait::async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Option<OwnerId> {
        if token.is_empty() {
            return None;
        }
        self.tokens.read().get(token).cloned()
    }
}

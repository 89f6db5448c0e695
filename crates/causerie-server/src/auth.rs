//! Interfaces to the excluded account/auth subsystem.
//!
//! The delivery core never authenticates anyone itself.  It consumes two
//! narrow capabilities: resolving a validated bearer token to a `UserId`,
//! and checking that a user exists before persisting a message addressed to
//! them.  Both are trait objects so the real implementations (JWT
//! verification, the account service) plug in without touching the core.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;

use causerie_shared::types::UserId;

use crate::error::ServerError;
use crate::storage::MessageService;

/// Resolves a bearer token to the user it authenticates.
///
/// The core trusts whatever this returns; token validation happened in the
/// subsystem that issued it.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<UserId>;
}

/// Checks that a user id references a real account.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_exists(&self, id: UserId) -> Result<bool, ServerError>;
}

/// Directory backed by the store's `users` table.
pub struct StoreUserDirectory {
    store: MessageService,
}

impl StoreUserDirectory {
    pub fn new(store: MessageService) -> Self {
        Self { store }
    }
}

#[async_trait]
impl UserDirectory for StoreUserDirectory {
    async fn user_exists(&self, id: UserId) -> Result<bool, ServerError> {
        self.store.user_exists(id).await
    }
}

/// Development-only resolver: the token *is* the user's UUID.
///
/// Stands in for the JWT verifier during local development and tests.  A
/// deployment wires a real [`IdentityResolver`] here instead; nothing else
/// in the server changes.
pub struct InsecureTokenResolver;

#[async_trait]
impl IdentityResolver for InsecureTokenResolver {
    async fn resolve(&self, token: &str) -> Option<UserId> {
        UserId::parse(token).ok()
    }
}

/// Extract and resolve the bearer identity of an HTTP request.
pub async fn require_user(
    headers: &HeaderMap,
    resolver: &Arc<dyn IdentityResolver>,
) -> Result<UserId, ServerError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);
    if token.is_empty() {
        return Err(ServerError::Unauthenticated);
    }

    resolver
        .resolve(token)
        .await
        .ok_or(ServerError::Unauthenticated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[tokio::test]
    async fn test_bearer_extraction() {
        let resolver: Arc<dyn IdentityResolver> = Arc::new(InsecureTokenResolver);
        let user = UserId::new();

        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {user}")).unwrap(),
        );

        let resolved = require_user(&headers, &resolver).await.unwrap();
        assert_eq!(resolved, user);
    }

    #[tokio::test]
    async fn test_missing_or_bogus_token_is_unauthenticated() {
        let resolver: Arc<dyn IdentityResolver> = Arc::new(InsecureTokenResolver);

        let empty = HeaderMap::new();
        assert!(matches!(
            require_user(&empty, &resolver).await,
            Err(ServerError::Unauthenticated)
        ));

        let mut bogus = HeaderMap::new();
        bogus.insert("authorization", HeaderValue::from_static("Bearer nonsense"));
        assert!(matches!(
            require_user(&bogus, &resolver).await,
            Err(ServerError::Unauthenticated)
        ));
    }
}

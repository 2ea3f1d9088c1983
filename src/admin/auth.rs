//! Admin authentication
//!
//! Admins present a bearer token; each token maps to one admin id, which is
//! what ends up in the admin action log.

use crate::config::AdminCredential;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Authenticated administrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity {
    pub admin_id: String,
}

/// Trait for admin authentication services
#[async_trait]
pub trait AdminAuthenticator: Send + Sync {
    /// Resolve a bearer token to an admin, `None` when the token is unknown
    async fn authenticate(&self, token: &str) -> Result<Option<AdminIdentity>>;
}

/// Authenticator backed by the configured token list
pub struct TokenAuthenticator {
    tokens: HashMap<String, String>,
}

impl TokenAuthenticator {
    pub fn new(credentials: &[AdminCredential]) -> Self {
        let tokens = credentials
            .iter()
            .filter(|c| !c.token.is_empty())
            .map(|c| (c.token.clone(), c.admin_id.clone()))
            .collect();
        Self { tokens }
    }

    pub fn admin_count(&self) -> usize {
        self.tokens.len()
    }
}

#[async_trait]
impl AdminAuthenticator for TokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Option<AdminIdentity>> {
        match self.tokens.get(token) {
            Some(admin_id) => {
                debug!("Admin {} authenticated", admin_id);
                Ok(Some(AdminIdentity {
                    admin_id: admin_id.clone(),
                }))
            }
            None => {
                warn!("Admin authentication failed: unknown token");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Vec<AdminCredential> {
        vec![
            AdminCredential {
                admin_id: "admin1".to_string(),
                token: "alpha".to_string(),
            },
            AdminCredential {
                admin_id: "admin2".to_string(),
                token: "beta".to_string(),
            },
            AdminCredential {
                admin_id: "nobody".to_string(),
                token: String::new(),
            },
        ]
    }

    #[tokio::test]
    async fn test_known_tokens_resolve_to_admins() {
        let auth = TokenAuthenticator::new(&credentials());
        assert_eq!(auth.admin_count(), 2);

        let identity = auth.authenticate("beta").await.unwrap().unwrap();
        assert_eq!(identity.admin_id, "admin2");
    }

    #[tokio::test]
    async fn test_unknown_and_empty_tokens_are_rejected() {
        let auth = TokenAuthenticator::new(&credentials());
        assert!(auth.authenticate("gamma").await.unwrap().is_none());
        assert!(auth.authenticate("").await.unwrap().is_none());
    }
}

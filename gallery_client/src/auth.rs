//! Bearer-token provisioning for gallery requests.
//!
//! The browser-based sign-in flow lives outside this crate; hosts hand in an
//! initial token and, optionally, a [`TokenRefresher`] callback that is
//! invoked once the cached token expires.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no auth token available")]
    NoTokenAvailable,

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
}

/// Helper to provide auth tokens for the gallery service.
pub trait TokenRefresher: Debug + Send + Sync {
    /// Get a new bearer token and the unixtime (in seconds) for expiration.
    /// An expiration of 0 means the token does not expire.
    fn refresh(&self) -> Result<(String, u64), AuthError>;
}

#[derive(Debug)]
pub struct NoOpTokenRefresher;

impl TokenRefresher for NoOpTokenRefresher {
    fn refresh(&self) -> Result<(String, u64), AuthError> {
        Ok(("token".to_string(), 0))
    }
}

/// Shared configuration for token-based auth.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Initial token to use.
    pub token: Option<String>,
    /// Initial token expiration time epoch in seconds; 0 or absent means the
    /// token does not expire.
    pub token_expiration: Option<u64>,
    /// A function to refresh tokens.
    pub token_refresher: Option<Arc<dyn TokenRefresher>>,
}

/// Caches the current bearer token and refreshes it through the configured
/// refresher once it has expired.
#[derive(Debug)]
pub struct TokenProvider {
    token: Option<String>,
    expiration: Option<u64>,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl TokenProvider {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            token: config.token.clone(),
            expiration: config.token_expiration,
            refresher: config.token_refresher.clone(),
        }
    }

    /// Returns a token that is valid right now, refreshing if necessary.
    pub fn get_valid_token(&mut self) -> Result<String, AuthError> {
        if self.token.is_none() || self.is_expired() {
            if let Some(refresher) = self.refresher.clone() {
                debug!("refreshing gallery auth token");
                let (token, expiration) = refresher.refresh()?;
                self.token = Some(token);
                self.expiration = Some(expiration);
            }
        }

        self.token.clone().ok_or(AuthError::NoTokenAvailable)
    }

    fn is_expired(&self) -> bool {
        match self.expiration {
            None | Some(0) => false,
            Some(expiration) => expiration <= unix_timestamp_now(),
        }
    }
}

fn unix_timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

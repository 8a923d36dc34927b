use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::storage::{DurableMedium, StorageError};

/// Identity adapter's own keychain entry for its long-lived refresh token
pub const IDENTITY_REFRESH_KEY: &str = "studygate.identity_refresh";

/// Refresh the cached identity token this long before it expires
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Transient identity provider failures. The identity session may still be
/// valid, so none of these end the local session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Identity provider rate limited the request")]
    RateLimited,

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for IdentityError {
    fn from(e: reqwest::Error) -> Self {
        IdentityError::Unavailable(e.to_string())
    }
}

/// Identity provider as seen by the session validator.
///
/// `Ok(None)` means there is no active identity session.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn fresh_identity_token(&self, force_refresh: bool)
        -> Result<Option<String>, IdentityError>;
}

#[derive(Debug, Clone)]
struct IdentityToken {
    token: String,
    issued_at: DateTime<Utc>,
    lifetime: Duration,
}

impl IdentityToken {
    fn needs_refresh(&self) -> bool {
        let refresh_at =
            self.issued_at + self.lifetime - Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES);
        Utc::now() > refresh_at
    }
}

#[derive(Debug, Deserialize)]
struct SecureTokenResponse {
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    // Some providers send this as a string
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

fn parse_lifetime(raw: Option<&serde_json::Value>) -> Duration {
    let secs = match raw {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    Duration::seconds(secs.filter(|s| *s > 0).unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS))
}

/// Exchanges a stored refresh token at a secure-token endpoint
/// (`grant_type=refresh_token`) for a short-lived identity token.
pub struct SecureTokenIdentity {
    client: Client,
    token_url: String,
    api_key: Option<String>,
    medium: Option<Arc<dyn DurableMedium>>,
    cached: Mutex<Option<IdentityToken>>,
}

impl SecureTokenIdentity {
    pub fn new(
        token_url: impl Into<String>,
        api_key: Option<String>,
        medium: Option<Arc<dyn DurableMedium>>,
        timeout: StdDuration,
    ) -> Result<Self, IdentityError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token_url: token_url.into(),
            api_key,
            medium,
            cached: Mutex::new(None),
        })
    }

    /// Remember the identity session's refresh token
    pub fn store_refresh_token(&self, refresh_token: &str) -> Result<(), StorageError> {
        match &self.medium {
            Some(medium) => medium.write(IDENTITY_REFRESH_KEY, refresh_token),
            None => Ok(()),
        }
    }

    /// End the identity session locally
    pub async fn sign_out(&self) -> Result<(), StorageError> {
        *self.cached.lock().await = None;
        match &self.medium {
            Some(medium) => medium.remove(IDENTITY_REFRESH_KEY),
            None => Ok(()),
        }
    }

    fn refresh_token(&self) -> Option<String> {
        let medium = self.medium.as_ref()?;
        match medium.read(IDENTITY_REFRESH_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read identity refresh token");
                None
            }
        }
    }

    async fn exchange(&self, refresh_token: &str) -> Result<Option<IdentityToken>, IdentityError> {
        let mut request = self.client.post(&self.token_url).form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = request.send().await?;

        let status = response.status();
        if status.as_u16() == 429 {
            warn!("Identity provider rate limited token refresh");
            return Err(IdentityError::RateLimited);
        }
        if status.is_client_error() {
            // Revoked or expired refresh token: the identity session is over
            debug!(status = %status, "Identity provider refused refresh token");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(IdentityError::Unavailable(format!("status {}", status)));
        }

        let body: SecureTokenResponse = response.json().await.map_err(|e| {
            IdentityError::Unavailable(format!("Failed to parse identity token response: {}", e))
        })?;

        if let Some(rotated) = body.refresh_token.as_deref() {
            if rotated != refresh_token {
                if let Err(e) = self.store_refresh_token(rotated) {
                    warn!(error = %e, "Failed to store rotated identity refresh token");
                }
            }
        }

        Ok(Some(IdentityToken {
            lifetime: parse_lifetime(body.expires_in.as_ref()),
            token: body.id_token,
            issued_at: Utc::now(),
        }))
    }
}

#[async_trait]
impl IdentityProvider for SecureTokenIdentity {
    async fn fresh_identity_token(
        &self,
        force_refresh: bool,
    ) -> Result<Option<String>, IdentityError> {
        let mut cached = self.cached.lock().await;
        if !force_refresh {
            if let Some(token) = cached.as_ref().filter(|t| !t.needs_refresh()) {
                return Ok(Some(token.token.clone()));
            }
        }

        let Some(refresh_token) = self.refresh_token() else {
            *cached = None;
            return Ok(None);
        };

        let fresh = self.exchange(&refresh_token).await?;
        let token = fresh.as_ref().map(|t| t.token.clone());
        *cached = fresh;
        Ok(token)
    }
}

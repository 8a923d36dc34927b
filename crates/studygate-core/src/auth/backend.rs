use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Credential, User};

/// Successful exchange of an identity token for a backend session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    #[serde(rename = "token", alias = "sessionToken")]
    pub session_token: Credential,
}

/// Closed set of refresh failures the validator switches on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// Transient refusal; existing session state must survive it
    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Token refresh rejected: {0}")]
    Rejected(String),
}

/// Backend auth API as seen by the session validator.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn refresh_token(&self, identity_token: &str) -> Result<AuthResponse, RefreshError>;
}

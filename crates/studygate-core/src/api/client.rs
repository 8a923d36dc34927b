//! HTTP client for the study backend's auth and generation endpoints.
//!
//! The backend accepts a bearer token and answers with JSON. Auth endpoints
//! take the identity provider's token; everything else takes the session
//! credential.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::auth::{AuthBackend, AuthResponse, RefreshError};
use crate::entitlement::{can_generate, GenerationKind};
use crate::models::{Credential, User};

use super::ApiError;

/// HTTP request timeout in seconds.
/// 30s allows for slow generation responses while failing fast enough for good UX.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// A flashcard or quiz generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    #[serde(skip)]
    pub kind: GenerationKind,
    pub topic: String,
    #[serde(rename = "count")]
    pub quantity: u32,
}

impl GenerationRequest {
    fn path(&self) -> &'static str {
        match self.kind {
            GenerationKind::Flashcard => "generate/flashcards",
            GenerationKind::Quiz => "generate/quiz",
        }
    }
}

/// Backend API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<Credential>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Create a new ApiClient with the given credential, sharing the connection pool.
    pub fn with_token(&self, token: Credential) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Exchange an identity token for a user and session credential (first sign-in)
    pub async fn sign_in(&self, identity_token: &str) -> Result<AuthResponse, ApiError> {
        self.post_bearer("auth/login", identity_token, &serde_json::json!({}))
            .await
    }

    /// Exchange a fresh identity token for a new session credential
    pub async fn refresh_session(&self, identity_token: &str) -> Result<AuthResponse, ApiError> {
        self.post_bearer("auth/refresh-token", identity_token, &serde_json::json!({}))
            .await
    }

    /// Dispatch a generation request after the entitlement gate allows it.
    ///
    /// A denied request never reaches the network.
    pub async fn request_generation(
        &self,
        user: Option<&User>,
        request: &GenerationRequest,
    ) -> Result<serde_json::Value, ApiError> {
        let entitlement = can_generate(request.kind, user, request.quantity);
        if !entitlement.allowed {
            debug!(kind = %request.kind, quantity = request.quantity, "Generation denied by entitlement gate");
            return Err(match (entitlement.credits, entitlement.required) {
                (Some(credits), Some(required)) => ApiError::InsufficientCredits { credits, required },
                _ => ApiError::NotAuthenticated,
            });
        }

        let token = self.token.as_ref().ok_or(ApiError::NotAuthenticated)?;
        self.post_bearer(request.path(), token.as_str(), request).await
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = ApiError::from_status(status, &body);
            if error.is_rate_limited() {
                warn!(status = %status, "Backend rate limited request");
            }
            Err(error)
        }
    }

    async fn post_bearer<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        bearer: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .header(header::ACCEPT, "application/json")
            .bearer_auth(bearer)
            .json(body)
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }
}

#[async_trait]
impl AuthBackend for ApiClient {
    async fn refresh_token(&self, identity_token: &str) -> Result<AuthResponse, RefreshError> {
        self.refresh_session(identity_token)
            .await
            .map_err(RefreshError::from)
    }
}

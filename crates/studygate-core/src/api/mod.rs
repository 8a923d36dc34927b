//! REST API client module for the study backend.
//!
//! This module provides the `ApiClient`, which exchanges identity tokens for
//! session credentials and dispatches entitlement-gated generation requests.
//! It is also the `AuthBackend` the session validator talks to; HTTP
//! failures are folded into the closed `RefreshError` set here.

pub mod client;
pub mod error;

pub use client::{ApiClient, GenerationRequest, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::ApiError;

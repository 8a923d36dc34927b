//! Core library for studygate.
//!
//! Answers one question before any protected operation: is this actor
//! allowed to do this right now, and under what degraded conditions?
//!
//! - `auth`: credential slot, session store, and the cold-start validator
//! - `guard`: route guard deciding between loading, rendering and redirecting
//! - `entitlement`: credit gate for flashcard and quiz generation
//! - `api`: backend HTTP client (session refresh, gated generation)
//! - `storage`: durable key-value media (keychain, file, memory)
//! - `config`: configuration file and environment overrides

pub mod api;
pub mod auth;
pub mod config;
pub mod entitlement;
pub mod guard;
pub mod models;
pub mod storage;

pub use api::{ApiClient, ApiError, GenerationRequest};
pub use auth::{
    AuthBackend, AuthResponse, CredentialStore, IdentityError, IdentityProvider, RefreshError,
    SecureTokenIdentity, Session, SessionFault, SessionStore, SessionValidator, ValidationState,
};
pub use config::{Config, Media, StoreKind};
pub use entitlement::{can_generate, EntitlementResult, GenerationKind};
pub use guard::{GuardConfig, GuardDecision, Navigator, RouteGuard};
pub use models::{Credential, User};

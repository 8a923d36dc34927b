//! Authentication module for session recovery and credential storage.
//!
//! This module provides:
//! - `CredentialStore`: the single durable slot for the bearer credential
//! - `SessionStore`: the in-memory session, restorable from a snapshot
//! - `SessionValidator`: the cold-start refresh state machine
//! - `IdentityProvider` / `AuthBackend`: the collaborators it calls
//!
//! The credential and the session snapshot live under separate keys; the
//! snapshot never carries the credential.

pub mod backend;
pub mod credentials;
pub mod identity;
pub mod session;
pub mod validator;

pub use backend::{AuthBackend, AuthResponse, RefreshError};
pub use credentials::{CredentialStore, CREDENTIAL_KEY};
pub use identity::{IdentityError, IdentityProvider, SecureTokenIdentity, IDENTITY_REFRESH_KEY};
pub use session::{Session, SessionStore, SESSION_KEY};
pub use validator::{SessionFault, SessionValidator, ValidationState};

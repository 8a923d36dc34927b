//! Login-recovery state machine run once per mounted guard.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{AuthBackend, AuthResponse, IdentityError, IdentityProvider, RefreshError, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    Cold,
    Validating,
    Authenticated,
    RateLimited,
    Unauthenticated,
}

impl ValidationState {
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            ValidationState::Authenticated
                | ValidationState::RateLimited
                | ValidationState::Unauthenticated
        )
    }
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationState::Cold => write!(f, "cold"),
            ValidationState::Validating => write!(f, "validating"),
            ValidationState::Authenticated => write!(f, "authenticated"),
            ValidationState::RateLimited => write!(f, "rate-limited"),
            ValidationState::Unauthenticated => write!(f, "unauthenticated"),
        }
    }
}

/// Why a validation did not end in `Authenticated`.
///
/// All of these are resolved inside the validator; callers only see the
/// resulting state and session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionFault {
    #[error("No stored credential")]
    NoCredential,

    #[error("Session flagged authenticated but no credential is stored")]
    CredentialMissing,

    #[error("Identity provider has no active session")]
    IdentityExpired,

    #[error("Identity provider unavailable: {0}")]
    IdentityUnavailable(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Token refresh rejected: {0}")]
    RefreshRejected(String),

    #[error("Refreshed credential could not be stored: {0}")]
    CredentialNotStored(String),
}

impl SessionFault {
    /// Transient faults leave the stored credential in place for a manual retry
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionFault::RateLimited | SessionFault::IdentityUnavailable(_))
    }
}

/// Drives `Cold` to a settled state.
///
/// One validator belongs to one guard instance; `validate` does its work at
/// most once and `retry` only leaves `RateLimited`.
pub struct SessionValidator {
    session: Arc<SessionStore>,
    identity: Arc<dyn IdentityProvider>,
    backend: Arc<dyn AuthBackend>,
    state: watch::Sender<ValidationState>,
    fault: Mutex<Option<SessionFault>>,
    alive: AtomicBool,
}

impl SessionValidator {
    pub fn new(
        session: Arc<SessionStore>,
        identity: Arc<dyn IdentityProvider>,
        backend: Arc<dyn AuthBackend>,
    ) -> Self {
        let (state, _) = watch::channel(ValidationState::Cold);
        Self {
            session,
            identity,
            backend,
            state,
            fault: Mutex::new(None),
            alive: AtomicBool::new(true),
        }
    }

    pub fn state(&self) -> ValidationState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ValidationState> {
        self.state.subscribe()
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Most recent reason validation did not authenticate
    pub fn last_fault(&self) -> Option<SessionFault> {
        self.fault.lock().ok().and_then(|f| f.clone())
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Mark the owner as gone; in-flight results are discarded on arrival.
    pub fn detach(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Resolve the cold-start state. Later calls return the current state.
    pub async fn validate(&self) -> ValidationState {
        let current = self.state();
        if current != ValidationState::Cold {
            debug!(state = %current, "Validation already attempted");
            return current;
        }

        let is_authenticated = self.session.is_authenticated();
        let has_credential = self.session.credentials().has_credential();
        debug!(is_authenticated, has_credential, "Validating session");

        match (is_authenticated, has_credential) {
            // Trust the rehydrated session
            (true, true) => self.settle_from(ValidationState::Cold, ValidationState::Authenticated, None),
            (true, false) => {
                warn!("Authenticated session without stored credential, forcing logout");
                self.session.logout();
                self.settle_from(
                    ValidationState::Cold,
                    ValidationState::Unauthenticated,
                    Some(SessionFault::CredentialMissing),
                )
            }
            (false, false) => self.settle_from(
                ValidationState::Cold,
                ValidationState::Unauthenticated,
                Some(SessionFault::NoCredential),
            ),
            // A credential outlived the in-memory user
            (false, true) => {
                if self.claim(ValidationState::Cold) {
                    self.run_refresh().await
                } else {
                    self.state()
                }
            }
        }
    }

    /// Manual retry after a rate limit. No-op from any other state.
    pub async fn retry(&self) -> ValidationState {
        if self.claim(ValidationState::RateLimited) {
            info!("Retrying session validation after rate limit");
            self.run_refresh().await
        } else {
            self.state()
        }
    }

    /// Move `from -> Validating` atomically; false if someone else got there first.
    fn claim(&self, from: ValidationState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == from {
                *state = ValidationState::Validating;
                true
            } else {
                false
            }
        })
    }

    fn settle_from(
        &self,
        from: ValidationState,
        to: ValidationState,
        fault: Option<SessionFault>,
    ) -> ValidationState {
        let moved = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if !moved {
            return self.state();
        }
        if let Ok(mut slot) = self.fault.lock() {
            *slot = fault;
        }
        debug!(state = %to, "Session validation settled");
        to
    }

    async fn run_refresh(&self) -> ValidationState {
        let outcome = {
            let _loading = self.session.begin_loading();
            self.exchange().await
        };

        if !self.is_alive() {
            debug!("Guard detached during validation, discarding result");
            return self.state();
        }

        let validating = ValidationState::Validating;
        match outcome {
            Ok(AuthResponse { user, session_token }) => {
                match self.session.login(user, session_token) {
                    Ok(()) => self.settle_from(validating, ValidationState::Authenticated, None),
                    Err(e) => {
                        warn!(error = %e, "Failed to store refreshed credential, logging out");
                        self.session.logout();
                        self.settle_from(
                            validating,
                            ValidationState::Unauthenticated,
                            Some(SessionFault::CredentialNotStored(e.to_string())),
                        )
                    }
                }
            }
            Err(fault) if fault.is_transient() => {
                warn!(reason = %fault, "Session refresh refused for now; keeping stored credential until a manual retry");
                self.settle_from(validating, ValidationState::RateLimited, Some(fault))
            }
            Err(fault) => {
                info!(reason = %fault, "Session could not be refreshed, logging out");
                self.session.logout();
                self.settle_from(validating, ValidationState::Unauthenticated, Some(fault))
            }
        }
    }

    async fn exchange(&self) -> Result<AuthResponse, SessionFault> {
        let identity_token = match self.identity.fresh_identity_token(false).await {
            Ok(Some(token)) => token,
            Ok(None) => return Err(SessionFault::IdentityExpired),
            Err(IdentityError::RateLimited) => return Err(SessionFault::RateLimited),
            Err(IdentityError::Unavailable(reason)) => {
                return Err(SessionFault::IdentityUnavailable(reason))
            }
        };

        self.backend
            .refresh_token(&identity_token)
            .await
            .map_err(|e| match e {
                RefreshError::RateLimited => SessionFault::RateLimited,
                RefreshError::Rejected(reason) => SessionFault::RefreshRejected(reason),
            })
    }
}

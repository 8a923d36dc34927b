//! Route guard gating protected content on the session validator's outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::{SessionStore, SessionValidator, ValidationState};

/// Default sign-in entry point
pub const DEFAULT_SIGN_IN_PATH: &str = "/sign-in";

/// Receives the guard's redirect.
pub trait Navigator: Send + Sync {
    fn redirect(&self, to: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    pub sign_in_path: String,
    /// Treat `RateLimited` like `Unauthenticated` instead of waiting
    pub redirect_when_rate_limited: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            sign_in_path: DEFAULT_SIGN_IN_PATH.to_string(),
            redirect_when_rate_limited: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Validation in flight or the session is loading
    Loading,
    /// Rate limited or identity provider unavailable; neutral waiting view,
    /// retry is manual. The state-machine rules read a rate limit as
    /// unauthenticated while the error-handling rules ask for a waiting view;
    /// this follows the latter unless `redirect_when_rate_limited` is set.
    Waiting,
    Render,
    Redirect { to: String },
}

pub struct RouteGuard {
    session: Arc<SessionStore>,
    validator: SessionValidator,
    navigator: Arc<dyn Navigator>,
    config: GuardConfig,
    redirected: AtomicBool,
}

impl RouteGuard {
    pub fn new(
        session: Arc<SessionStore>,
        validator: SessionValidator,
        navigator: Arc<dyn Navigator>,
        config: GuardConfig,
    ) -> Self {
        Self {
            session,
            validator,
            navigator,
            config,
            redirected: AtomicBool::new(false),
        }
    }

    pub fn validator(&self) -> &SessionValidator {
        &self.validator
    }

    /// Run validation for this mount, then decide.
    pub async fn mount(&self) -> GuardDecision {
        self.validator.validate().await;
        self.evaluate()
    }

    /// Manual retry from the waiting view.
    pub async fn retry(&self) -> GuardDecision {
        self.validator.retry().await;
        self.evaluate()
    }

    pub fn unmount(&self) {
        self.validator.detach();
    }

    pub fn has_redirected(&self) -> bool {
        self.redirected.load(Ordering::SeqCst)
    }

    /// Decide from the current state. Issues the redirect at most once.
    pub fn evaluate(&self) -> GuardDecision {
        let state = self.validator.state();
        let session = self.session.snapshot();

        if !state.is_settled() || session.is_loading {
            debug!(state = %state, loading = session.is_loading, "Guard waiting on validation");
            return GuardDecision::Loading;
        }

        match state {
            ValidationState::Authenticated if session.is_authenticated => GuardDecision::Render,
            ValidationState::RateLimited if !self.config.redirect_when_rate_limited => {
                GuardDecision::Waiting
            }
            _ => self.redirect_once(),
        }
    }

    fn redirect_once(&self) -> GuardDecision {
        let to = self.config.sign_in_path.clone();
        if !self.redirected.swap(true, Ordering::SeqCst) {
            info!(to = %to, "Redirecting to sign-in");
            self.navigator.redirect(&to);
        }
        GuardDecision::Redirect { to }
    }
}

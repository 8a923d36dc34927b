use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::CredentialStore;
use crate::models::{Credential, User};
use crate::storage::{DurableMedium, StorageError};

/// Reserved key for the persisted `{user, isAuthenticated}` snapshot
pub const SESSION_KEY: &str = "studygate.auth_state";

/// Process-wide session record.
///
/// `is_authenticated` is true iff `user` is present. `is_loading` is only
/// raised while a validation or refresh is in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_loading: bool,
}

/// What survives a restart. Never contains the credential.
#[derive(Debug, Serialize, Deserialize)]
struct SessionSnapshot {
    #[serde(default)]
    user: Option<User>,
    #[serde(rename = "isAuthenticated", default)]
    is_authenticated: bool,
}

/// Owner of the single `Session`.
///
/// Readers take a `snapshot()` or `subscribe()` for change notifications.
/// Writers go through `set_user`, `login`, `logout` and `set_loading`, each
/// of which replaces its slice in one step.
pub struct SessionStore {
    state: watch::Sender<Session>,
    credentials: CredentialStore,
    snapshot_medium: Option<Arc<dyn DurableMedium>>,
    // Open `LoadingHold`s; the flag drops only when the last one does
    loading_holds: Mutex<usize>,
}

/// Keeps `is_loading` raised until dropped.
pub struct LoadingHold<'a> {
    store: &'a SessionStore,
}

impl Drop for LoadingHold<'_> {
    fn drop(&mut self) {
        self.store.release_loading();
    }
}

impl SessionStore {
    /// Empty, logged-out session
    pub fn new(credentials: CredentialStore, snapshot_medium: Option<Arc<dyn DurableMedium>>) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            state,
            credentials,
            snapshot_medium,
            loading_holds: Mutex::new(0),
        }
    }

    /// Rehydrate user and auth flag from the snapshot medium.
    ///
    /// The credential is not part of the snapshot; it stays in the
    /// `CredentialStore` and is read from there by the validator.
    pub fn restore(credentials: CredentialStore, snapshot_medium: Option<Arc<dyn DurableMedium>>) -> Self {
        let store = Self::new(credentials, snapshot_medium);
        if let Some(snapshot) = store.load_snapshot() {
            // A flag without a user, or a user without the flag, is not a session
            let user = snapshot.user.filter(|_| snapshot.is_authenticated);
            debug!(authenticated = user.is_some(), "Session restored from snapshot");
            store.state.send_modify(|s| {
                s.is_authenticated = user.is_some();
                s.user = user;
            });
        }
        store
    }

    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    /// Replace the user; the auth flag follows. Leaves the credential alone.
    pub fn set_user(&self, user: Option<User>) {
        self.state.send_modify(|s| {
            s.is_authenticated = user.is_some();
            s.user = user;
        });
        self.persist();
    }

    /// Persist the credential, then authenticate.
    ///
    /// If the credential cannot be written the session is left untouched.
    pub fn login(&self, user: User, credential: Credential) -> Result<(), StorageError> {
        self.credentials.set(&credential)?;
        info!(user_id = %user.id, "Logged in");
        self.set_user(Some(user));
        Ok(())
    }

    /// Drop the credential and the user. Safe to call repeatedly.
    pub fn logout(&self) {
        if let Err(e) = self.credentials.remove() {
            warn!(error = %e, "Failed to remove stored credential during logout");
        }
        let was_authenticated = self.is_authenticated();
        self.set_user(None);
        if was_authenticated {
            info!("Logged out");
        }
    }

    pub fn set_loading(&self, loading: bool) {
        self.state.send_if_modified(|s| {
            if s.is_loading == loading {
                false
            } else {
                s.is_loading = loading;
                true
            }
        });
    }

    /// Raise `is_loading` for the lifetime of the returned hold.
    ///
    /// Concurrent holders share the flag: it clears when the last one is dropped.
    pub fn begin_loading(&self) -> LoadingHold<'_> {
        let mut holds = self.loading_holds.lock().unwrap_or_else(|e| e.into_inner());
        *holds += 1;
        self.set_loading(true);
        LoadingHold { store: self }
    }

    fn release_loading(&self) {
        let mut holds = self.loading_holds.lock().unwrap_or_else(|e| e.into_inner());
        *holds = holds.saturating_sub(1);
        if *holds == 0 {
            self.set_loading(false);
        }
    }

    fn load_snapshot(&self) -> Option<SessionSnapshot> {
        let medium = self.snapshot_medium.as_ref()?;
        let raw = match medium.read(SESSION_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read session snapshot");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(error = %e, "Discarding unreadable session snapshot");
                None
            }
        }
    }

    /// Snapshot failures are not fatal; losing the user only costs a refresh.
    fn persist(&self) {
        let Some(medium) = self.snapshot_medium.as_ref() else {
            return;
        };
        let snapshot = {
            let state = self.state.borrow();
            SessionSnapshot {
                user: state.user.clone(),
                is_authenticated: state.is_authenticated,
            }
        };
        let result = serde_json::to_string(&snapshot)
            .map_err(StorageError::from)
            .and_then(|json| medium.write(SESSION_KEY, &json));
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist session snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryMedium;

    /// Medium whose writes always fail
    struct ReadOnlyMedium;

    impl DurableMedium for ReadOnlyMedium {
        fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        fn write(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    fn memory_store() -> (SessionStore, Arc<MemoryMedium>) {
        let medium = Arc::new(MemoryMedium::new());
        let store = SessionStore::new(CredentialStore::new(medium.clone()), Some(medium.clone()));
        (store, medium)
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    #[test]
    fn test_set_user_derives_flag() {
        let (store, _) = memory_store();
        store.set_user(Some(User::new("u_1", 5)));
        assert!(store.is_authenticated());
        assert_eq!(store.user().map(|u| u.id), Some("u_1".to_string()));

        store.set_user(None);
        let session = store.snapshot();
        assert!(!session.is_authenticated);
        assert!(session.user.is_none());
    }

    #[test]
    fn test_set_user_does_not_touch_credential() {
        let (store, _) = memory_store();
        store.credentials().set(&Credential::new("tok")).unwrap();
        store.set_user(None);
        assert_eq!(store.credentials().get(), Some(Credential::new("tok")));
    }

    #[test]
    fn test_login_then_get() {
        let (store, _) = memory_store();
        store.login(User::new("u_1", 10), Credential::new("session-tok")).unwrap();

        assert_eq!(store.credentials().get(), Some(Credential::new("session-tok")));
        assert!(store.snapshot().is_authenticated);
    }

    #[test]
    fn test_login_fails_when_credential_not_persisted() {
        let medium: Arc<dyn DurableMedium> = Arc::new(ReadOnlyMedium);
        let store = SessionStore::new(CredentialStore::new(medium), None);

        assert!(store.login(User::new("u_1", 10), Credential::new("tok")).is_err());
        assert!(!store.is_authenticated());
        assert!(store.user().is_none());
    }

    #[test]
    fn test_logout_is_idempotent() {
        let (store, _) = memory_store();
        store.login(User::new("u_1", 10), Credential::new("tok")).unwrap();

        store.logout();
        assert!(store.credentials().get().is_none());
        assert!(!store.is_authenticated());

        store.logout();
        assert!(store.credentials().get().is_none());
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_set_loading_is_independent() {
        let (store, _) = memory_store();
        store.login(User::new("u_1", 1), Credential::new("tok")).unwrap();
        store.set_loading(true);

        let session = store.snapshot();
        assert!(session.is_loading);
        assert!(session.is_authenticated);

        store.set_loading(false);
        assert!(!store.snapshot().is_loading);
        assert!(store.is_authenticated());
    }

    #[test]
    fn test_loading_hold_clears_with_last_holder() {
        let store = SessionStore::new(CredentialStore::unavailable(), None);
        let first = store.begin_loading();
        let second = store.begin_loading();
        assert!(store.snapshot().is_loading);

        drop(first);
        assert!(store.snapshot().is_loading);

        drop(second);
        assert!(!store.snapshot().is_loading);
    }

    #[test]
    fn test_subscribers_see_transitions() {
        let (store, _) = memory_store();
        let mut rx = store.subscribe();
        assert!(!rx.borrow_and_update().is_authenticated);

        store.set_user(Some(User::new("u_1", 0)));
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().is_authenticated);

        // No-op loading change does not notify
        store.set_loading(false);
        assert!(!rx.has_changed().unwrap());
    }

    // -------------------------------------------------------------------------
    // Restoration
    // -------------------------------------------------------------------------

    #[test]
    fn test_restore_rehydrates_user_but_not_credential() {
        let (store, medium) = memory_store();
        store.login(User::new("u_1", 3), Credential::new("tok")).unwrap();

        // Snapshot never contains the credential
        let raw = medium.read(SESSION_KEY).unwrap().unwrap();
        assert!(!raw.contains("tok\""));
        assert!(raw.contains("\"isAuthenticated\":true"));

        let snapshot_only = Arc::new(MemoryMedium::new());
        snapshot_only.write(SESSION_KEY, &raw).unwrap();
        let restored = SessionStore::restore(
            CredentialStore::new(Arc::new(MemoryMedium::new())),
            Some(snapshot_only),
        );
        assert!(restored.is_authenticated());
        assert_eq!(restored.user().map(|u| u.credits), Some(3));
        assert!(restored.credentials().get().is_none());
        assert!(!restored.snapshot().is_loading);
    }

    #[test]
    fn test_restore_rejects_flag_without_user() {
        let medium = Arc::new(MemoryMedium::new());
        medium
            .write(SESSION_KEY, r#"{"user":null,"isAuthenticated":true}"#)
            .unwrap();
        let store = SessionStore::restore(CredentialStore::unavailable(), Some(medium));
        assert!(!store.is_authenticated());
    }

    #[test]
    fn test_restore_ignores_garbage_snapshot() {
        let medium = Arc::new(MemoryMedium::new());
        medium.write(SESSION_KEY, "{{{").unwrap();
        let store = SessionStore::restore(CredentialStore::unavailable(), Some(medium));
        assert_eq!(store.snapshot(), Session::default());
    }

    #[test]
    fn test_restore_without_medium() {
        let store = SessionStore::restore(CredentialStore::unavailable(), None);
        assert_eq!(store.snapshot(), Session::default());
        store.set_user(Some(User::new("u_1", 0)));
        assert!(store.is_authenticated());
    }
}

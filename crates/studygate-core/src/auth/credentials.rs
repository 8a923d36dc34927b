use std::sync::Arc;

use tracing::warn;

use crate::models::Credential;
use crate::storage::{DurableMedium, StorageError};

/// Reserved key for the bearer session token
pub const CREDENTIAL_KEY: &str = "studygate.auth_token";

/// Single overwritable slot holding the session credential.
///
/// Without a medium every operation is a no-op and `get` returns `None`.
#[derive(Clone)]
pub struct CredentialStore {
    medium: Option<Arc<dyn DurableMedium>>,
    key: String,
}

impl CredentialStore {
    pub fn new(medium: Arc<dyn DurableMedium>) -> Self {
        Self {
            medium: Some(medium),
            key: CREDENTIAL_KEY.to_string(),
        }
    }

    /// Store for contexts with no durable medium at all
    pub fn unavailable() -> Self {
        Self {
            medium: None,
            key: CREDENTIAL_KEY.to_string(),
        }
    }

    pub fn from_medium(medium: Option<Arc<dyn DurableMedium>>) -> Self {
        Self {
            medium,
            key: CREDENTIAL_KEY.to_string(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.medium.is_some()
    }

    /// Read the stored credential. Read failures degrade to `None`.
    pub fn get(&self) -> Option<Credential> {
        let medium = self.medium.as_ref()?;
        match medium.read(&self.key) {
            Ok(value) => value.filter(|v| !v.is_empty()).map(Credential::from),
            Err(e) => {
                warn!(error = %e, "Failed to read stored credential");
                None
            }
        }
    }

    /// Overwrite the slot
    pub fn set(&self, credential: &Credential) -> Result<(), StorageError> {
        match &self.medium {
            Some(medium) => medium.write(&self.key, credential.as_str()),
            None => Ok(()),
        }
    }

    pub fn remove(&self) -> Result<(), StorageError> {
        match &self.medium {
            Some(medium) => medium.remove(&self.key),
            None => Ok(()),
        }
    }

    pub fn has_credential(&self) -> bool {
        self.get().is_some()
    }
}

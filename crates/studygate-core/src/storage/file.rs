use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{DurableMedium, Sealer, StorageError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    /// Present only for sealed documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    salt: Option<String>,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

/// Key-value medium persisted as a single JSON document.
///
/// The whole document is rewritten on every mutation. With a `Sealer`,
/// each value is encrypted individually and the salt lives in the document.
pub struct FileMedium {
    path: PathBuf,
    sealer: Option<Sealer>,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileMedium {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sealer: None,
            lock: Mutex::new(()),
        }
    }

    /// Open (or create) a sealed document. The salt is generated on first
    /// use and reused afterwards, so the same passphrase reopens it.
    pub fn sealed(path: impl Into<PathBuf>, passphrase: &str) -> Result<Self, StorageError> {
        let path = path.into();
        let mut doc = load_document(&path)?;

        let salt = match doc.salt.as_deref() {
            Some(encoded) => STANDARD
                .decode(encoded)
                .map_err(|e| StorageError::Sealing(format!("bad salt: {}", e)))?,
            None => {
                let salt = Sealer::random_salt().to_vec();
                doc.salt = Some(STANDARD.encode(&salt));
                save_document(&path, &doc)?;
                debug!(path = %path.display(), "Created sealed store document");
                salt
            }
        };

        Ok(Self {
            sealer: Some(Sealer::derive(passphrase, &salt)?),
            path,
            lock: Mutex::new(()),
        })
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>, StorageError> {
        self.lock.lock().map_err(|_| {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "file medium lock poisoned",
            ))
        })
    }
}

impl DurableMedium for FileMedium {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.guard()?;
        let doc = load_document(&self.path)?;
        match (doc.entries.get(key), &self.sealer) {
            (None, _) => Ok(None),
            (Some(value), None) => Ok(Some(value.clone())),
            (Some(value), Some(sealer)) => sealer.open(value).map(Some),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.guard()?;
        let mut doc = load_document(&self.path)?;
        let stored = match &self.sealer {
            Some(sealer) => sealer.seal(value)?,
            None => value.to_string(),
        };
        doc.entries.insert(key.to_string(), stored);
        save_document(&self.path, &doc)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.guard()?;
        let mut doc = load_document(&self.path)?;
        if doc.entries.remove(key).is_some() {
            save_document(&self.path, &doc)?;
        }
        Ok(())
    }
}

fn load_document(path: &Path) -> Result<StoreDocument, StorageError> {
    if !path.exists() {
        return Ok(StoreDocument::default());
    }
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(StoreDocument::default());
    }
    Ok(serde_json::from_str(&contents)?)
}

fn save_document(path: &Path, doc: &StoreDocument) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(doc)?;
    std::fs::write(path, contents)?;
    Ok(())
}

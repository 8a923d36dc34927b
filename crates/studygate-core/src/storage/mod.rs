//! Durable key-value media backing the session snapshot and credential slot.
//!
//! This module provides:
//! - `DurableMedium`: the synchronous read/write/remove contract
//! - `MemoryMedium`: process-local map
//! - `FileMedium`: JSON document on disk, optionally sealed with a `Sealer`
//! - `KeychainMedium`: one OS keychain entry per key
//!
//! A medium may be absent altogether (headless runs, tests); callers hold an
//! `Option<Arc<dyn DurableMedium>>` and degrade to no-ops.

pub mod file;
pub mod keychain;
pub mod memory;
pub mod sealed;

use thiserror::Error;

pub use file::FileMedium;
pub use keychain::KeychainMedium;
pub use memory::MemoryMedium;
pub use sealed::Sealer;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage document is malformed: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Keychain error: {0}")]
    Keychain(#[from] keyring::Error),

    #[error("Sealing failed: {0}")]
    Sealing(String),
}

/// Namespaced key-value medium. Reads and writes are synchronous from the
/// caller's point of view; overwrite is the only mutation.
pub trait DurableMedium: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

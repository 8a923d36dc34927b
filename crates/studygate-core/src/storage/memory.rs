use std::collections::HashMap;
use std::sync::Mutex;

use super::{DurableMedium, StorageError};

/// In-process medium. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryMedium {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DurableMedium for MemoryMedium {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        entries.remove(key);
        Ok(())
    }
}

fn poisoned() -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        "memory medium lock poisoned",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overwrite_and_remove() {
        let medium = MemoryMedium::new();
        assert_eq!(medium.read("k").unwrap(), None);

        medium.write("k", "one").unwrap();
        medium.write("k", "two").unwrap();
        assert_eq!(medium.read("k").unwrap().as_deref(), Some("two"));
        assert_eq!(medium.len(), 1);

        medium.remove("k").unwrap();
        medium.remove("k").unwrap(); // missing key is fine
        assert!(medium.is_empty());
    }
}

use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

use super::StorageError;

/// Nonce length for ChaCha20-Poly1305
const NONCE_LEN: usize = 12;

/// Salt length used when a new sealed document is created
pub const SALT_LEN: usize = 16;

/// Encrypts values at rest with a passphrase-derived key.
///
/// Sealed form is `base64(nonce || ciphertext)`; a fresh random nonce is
/// drawn for every value.
pub struct Sealer {
    cipher: ChaCha20Poly1305,
}

impl Sealer {
    /// Derive the key with Argon2 (default params). `salt` must be at least 8 bytes.
    pub fn derive(passphrase: &str, salt: &[u8]) -> Result<Self, StorageError> {
        let mut key = [0u8; 32];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| StorageError::Sealing(format!("key derivation: {}", e)))?;

        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }

    pub fn random_salt() -> [u8; SALT_LEN] {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        salt
    }

    pub fn seal(&self, plaintext: &str) -> Result<String, StorageError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| StorageError::Sealing("encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(out))
    }

    pub fn open(&self, sealed: &str) -> Result<String, StorageError> {
        let raw = STANDARD
            .decode(sealed)
            .map_err(|e| StorageError::Sealing(format!("bad encoding: {}", e)))?;
        if raw.len() < NONCE_LEN {
            return Err(StorageError::Sealing("sealed value too short".to_string()));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StorageError::Sealing("wrong passphrase or tampered value".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| StorageError::Sealing("sealed value is not UTF-8".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALT: &[u8] = b"0123456789abcdef";

    #[test]
    fn test_seal_then_open() {
        let sealer = Sealer::derive("correct horse", SALT).unwrap();
        let sealed = sealer.seal("bearer-token").unwrap();
        assert!(!sealed.contains("bearer-token"));
        assert_eq!(sealer.open(&sealed).unwrap(), "bearer-token");
    }

    #[test]
    fn test_nonce_differs_per_value() {
        let sealer = Sealer::derive("correct horse", SALT).unwrap();
        assert_ne!(sealer.seal("same").unwrap(), sealer.seal("same").unwrap());
    }

    #[test]
    fn test_wrong_passphrase_rejected() {
        let sealed = Sealer::derive("right", SALT).unwrap().seal("x").unwrap();
        let other = Sealer::derive("wrong", SALT).unwrap();
        assert!(matches!(other.open(&sealed), Err(StorageError::Sealing(_))));
    }

    #[test]
    fn test_short_input_rejected() {
        let sealer = Sealer::derive("p", SALT).unwrap();
        assert!(sealer.open("AAAA").is_err());
        assert!(sealer.open("not base64!").is_err());
    }
}

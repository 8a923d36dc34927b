//! Application configuration management.
//!
//! Configuration is stored at `~/.config/studygate/config.json` and can be
//! overridden by `STUDYGATE_*` environment variables. The store passphrase
//! is only ever read from the environment and never written back.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::guard::{GuardConfig, DEFAULT_SIGN_IN_PATH};
use crate::storage::{DurableMedium, FileMedium, KeychainMedium, MemoryMedium};

/// Application name used for config/data directory paths
const APP_NAME: &str = "studygate";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Session snapshot file used alongside the keychain
const SESSION_FILE: &str = "session.json";

/// Combined store file used when the keychain is not wanted
const STORE_FILE: &str = "store.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
const DEFAULT_IDENTITY_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// Where the credential and session snapshot are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Credential in the OS keychain, snapshot in a JSON file
    #[default]
    Keyring,
    /// Both in one JSON file, sealed when a passphrase is set
    File,
    Memory,
    /// No durable medium; everything degrades to no-ops
    None,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "keyring" | "keychain" => Ok(StoreKind::Keyring),
            "file" => Ok(StoreKind::File),
            "memory" => Ok(StoreKind::Memory),
            "none" | "off" => Ok(StoreKind::None),
            other => Err(anyhow::anyhow!("Unknown store kind: {}", other)),
        }
    }
}

/// Durable media handed to the credential and session stores.
#[derive(Clone, Default)]
pub struct Media {
    pub credentials: Option<Arc<dyn DurableMedium>>,
    pub snapshot: Option<Arc<dyn DurableMedium>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub identity_token_url: String,
    pub identity_api_key: Option<String>,
    pub sign_in_path: String,
    pub request_timeout_secs: u64,
    pub store: StoreKind,
    pub redirect_when_rate_limited: bool,
    #[serde(skip)]
    pub store_passphrase: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            identity_token_url: DEFAULT_IDENTITY_TOKEN_URL.to_string(),
            identity_api_key: None,
            sign_in_path: DEFAULT_SIGN_IN_PATH.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            store: StoreKind::default(),
            redirect_when_rate_limited: false,
            store_passphrase: None,
        }
    }
}

impl Config {
    /// Load from disk (defaults if missing), then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("STUDYGATE_API_BASE_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = get("STUDYGATE_IDENTITY_URL") {
            self.identity_token_url = v;
        }
        if let Some(v) = get("STUDYGATE_IDENTITY_API_KEY") {
            self.identity_api_key = Some(v);
        }
        if let Some(v) = get("STUDYGATE_SIGN_IN_PATH") {
            self.sign_in_path = v;
        }
        if let Some(v) = get("STUDYGATE_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = v
                .parse()
                .with_context(|| format!("Invalid STUDYGATE_REQUEST_TIMEOUT_SECS: {}", v))?;
        }
        if let Some(v) = get("STUDYGATE_STORE") {
            self.store = v.parse()?;
        }
        if let Some(v) = get("STUDYGATE_STORE_PASSPHRASE") {
            self.store_passphrase = Some(v);
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            sign_in_path: self.sign_in_path.clone(),
            redirect_when_rate_limited: self.redirect_when_rate_limited,
        }
    }

    /// Open the configured media under the platform data directory
    pub fn open_media(&self) -> Result<Media> {
        match self.store {
            StoreKind::Memory | StoreKind::None => self.open_media_in(Path::new(".")),
            _ => self.open_media_in(&self.data_dir()?),
        }
    }

    pub fn open_media_in(&self, dir: &Path) -> Result<Media> {
        let media = match self.store {
            StoreKind::Keyring => {
                let keychain: Arc<dyn DurableMedium> = Arc::new(KeychainMedium::new());
                let snapshot: Arc<dyn DurableMedium> =
                    Arc::new(FileMedium::new(dir.join(SESSION_FILE)));
                Media {
                    credentials: Some(keychain),
                    snapshot: Some(snapshot),
                }
            }
            StoreKind::File => {
                let path = dir.join(STORE_FILE);
                let medium: Arc<dyn DurableMedium> = match &self.store_passphrase {
                    Some(passphrase) => Arc::new(
                        FileMedium::sealed(&path, passphrase)
                            .context("Failed to open sealed store")?,
                    ),
                    None => Arc::new(FileMedium::new(path)),
                };
                Media {
                    credentials: Some(medium.clone()),
                    snapshot: Some(medium),
                }
            }
            StoreKind::Memory => {
                let medium: Arc<dyn DurableMedium> = Arc::new(MemoryMedium::new());
                Media {
                    credentials: Some(medium.clone()),
                    snapshot: Some(medium),
                }
            }
            StoreKind::None => Media::default(),
        };
        Ok(media)
    }
}

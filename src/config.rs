//! Configuration loading and persistence.
//!
//! Handles reading and writing the ivathy configuration file. VAPID keys
//! are kept out of `config.json`: they come from environment variables or
//! a separate owner-only `vapid_keys.json`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_DELIVERY_TIMEOUT, DEFAULT_PAIR_CODE_TTL, DEFAULT_PUSH_TTL_SECS, DEFAULT_VAPID_SUBJECT,
};
use crate::notifications::vapid::VapidKeys;

const CONFIG_FILE: &str = "config.json";
const VAPID_KEYS_FILE: &str = "vapid_keys.json";

/// Configuration for ivathy.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// Snapshot file path. `None` means `<config_dir>/data/db.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_file: Option<PathBuf>,
    /// Seconds an unconsumed pairing code stays valid. 0 disables expiry.
    pub pair_code_ttl_secs: u64,
    /// Upper bound in seconds on one push delivery attempt.
    pub delivery_timeout_secs: u64,
    /// Seconds the push service should hold an undelivered message.
    pub push_ttl_secs: u32,
    /// VAPID `sub` claim (a `mailto:` or `https:` contact).
    pub vapid_subject: String,
    /// VAPID keypair - NOT serialized to config.json.
    #[serde(skip)]
    pub vapid_keys: Option<VapidKeys>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_file: None,
            pair_code_ttl_secs: DEFAULT_PAIR_CODE_TTL.as_secs(),
            delivery_timeout_secs: DEFAULT_DELIVERY_TIMEOUT.as_secs(),
            push_ttl_secs: DEFAULT_PUSH_TTL_SECS,
            vapid_subject: DEFAULT_VAPID_SUBJECT.to_string(),
            vapid_keys: None,
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `#[cfg(test)]` (unit tests): `tmp/ivathy-test`
    /// 2. `IVATHY_CONFIG_DIR` env var: explicit override
    /// 3. `IVATHY_ENV=test`: `tmp/ivathy-test`
    /// 4. Default: platform config dir (Linux: ~/.config/ivathy)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/ivathy-test")
            }

            #[cfg(not(test))]
            {
                if let Ok(custom_dir) = std::env::var("IVATHY_CONFIG_DIR") {
                    PathBuf::from(custom_dir)
                } else if crate::env::is_test_mode() {
                    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tmp/ivathy-test")
                } else {
                    dirs::config_dir()
                        .context("Could not determine config directory")?
                        .join("ivathy")
                }
            }
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from file, with environment variable overrides.
    ///
    /// A missing `config.json` means defaults; one that cannot be read or
    /// parsed is an error. VAPID keys are taken from
    /// `IVATHY_VAPID_PUBLIC_KEY` / `IVATHY_VAPID_PRIVATE_KEY` when both are
    /// set, otherwise from `vapid_keys.json` if present.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_dir()?.join(CONFIG_FILE);
        let mut config = match Self::load_from_file(&config_path)? {
            Some(config) => config,
            None => {
                log::debug!("No config at {}, using defaults", config_path.display());
                Self::default()
            }
        };
        config.apply_env_overrides();
        config.vapid_keys = Self::load_vapid_keys()?;
        Ok(config)
    }

    fn load_from_file(config_path: &Path) -> Result<Option<Self>> {
        let content = match fs::read_to_string(config_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", config_path.display()))
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .with_context(|| format!("Failed to parse {}", config_path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(data_file) = std::env::var("IVATHY_DATA_FILE") {
            self.data_file = Some(PathBuf::from(data_file));
        }

        if let Ok(ttl) = std::env::var("IVATHY_PAIR_CODE_TTL") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.pair_code_ttl_secs = ttl;
            }
        }

        if let Ok(timeout) = std::env::var("IVATHY_DELIVERY_TIMEOUT") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                self.delivery_timeout_secs = timeout;
            }
        }

        if let Ok(ttl) = std::env::var("IVATHY_PUSH_TTL") {
            if let Ok(ttl) = ttl.parse::<u32>() {
                self.push_ttl_secs = ttl;
            }
        }

        if let Ok(subject) = std::env::var("IVATHY_VAPID_SUBJECT") {
            self.vapid_subject = subject;
        }
    }

    fn load_vapid_keys() -> Result<Option<VapidKeys>> {
        if let (Ok(public), Ok(private)) = (
            std::env::var("IVATHY_VAPID_PUBLIC_KEY"),
            std::env::var("IVATHY_VAPID_PRIVATE_KEY"),
        ) {
            let keys = VapidKeys::from_base64url(&public, &private)
                .context("Invalid VAPID keys in IVATHY_VAPID_* environment")?;
            return Ok(Some(keys));
        }

        let path = Self::config_dir()?.join(VAPID_KEYS_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).context("Failed to read VAPID key file")?;
        let keys: VapidKeys =
            serde_json::from_str(&content).context("Failed to parse VAPID key file")?;
        Ok(Some(keys))
    }

    /// Store a VAPID keypair next to the config, readable by the owner only.
    pub fn save_vapid_keys(&mut self, keys: VapidKeys) -> Result<PathBuf> {
        let path = Self::config_dir()?.join(VAPID_KEYS_FILE);
        fs::write(&path, serde_json::to_string_pretty(&keys)?)
            .context("Failed to write VAPID key file")?;

        #[cfg(unix)]
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;

        self.vapid_keys = Some(keys);
        Ok(path)
    }

    /// Resolved snapshot file path.
    pub fn data_file(&self) -> Result<PathBuf> {
        match &self.data_file {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("data").join("db.json")),
        }
    }

    /// Pairing code lifetime, `None` when codes never expire.
    pub fn pair_code_ttl(&self) -> Option<Duration> {
        (self.pair_code_ttl_secs > 0).then(|| Duration::from_secs(self.pair_code_ttl_secs))
    }

    /// Delivery timeout for a single push attempt.
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs.max(1))
    }
}

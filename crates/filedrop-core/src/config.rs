//! Persistent configuration.
//!
//! Stored as JSON (default `~/.config/filedrop/config.json`). Environment
//! variables override the file; command-line flags override both.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PickerError, PickerResult};
use crate::options::{FilePickerOptions, ImageConstraints};
use crate::store::{SessionCredentials, DEFAULT_STORAGE_DOMAIN};

pub const ENV_BUCKET: &str = "FILEDROP_BUCKET";
pub const ENV_REGION: &str = "FILEDROP_REGION";
pub const ENV_ENDPOINT: &str = "FILEDROP_ENDPOINT";
pub const ENV_ACCESS_KEY_ID: &str = "FILEDROP_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "FILEDROP_SECRET_ACCESS_KEY";
pub const ENV_SESSION_TOKEN: &str = "FILEDROP_SESSION_TOKEN";
pub const ENV_CREDENTIALS_EXPIRE_AT: &str = "FILEDROP_CREDENTIALS_EXPIRE_AT";

/// Where and how to reach the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Bucket name, optionally followed by `/folder/...`
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible services
    pub endpoint: Option<String>,
    /// Domain used when building public object URLs
    pub storage_domain: String,
    pub credentials: Option<SessionCredentials>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: "us-east-1".to_string(),
            endpoint: None,
            storage_domain: DEFAULT_STORAGE_DOMAIN.to_string(),
            credentials: None,
        }
    }
}

/// Everything a picker needs besides the files themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickerConfig {
    pub store: StoreConfig,
    pub options: FilePickerOptions,
    pub image: ImageConstraints,
}

impl PickerConfig {
    /// Load from `path`, or return defaults when the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> PickerResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(?path, "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn load(path: impl AsRef<Path>) -> PickerResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> PickerResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply `FILEDROP_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> PickerResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> PickerResult<()> {
        if let Some(bucket) = lookup(ENV_BUCKET) {
            self.store.bucket = bucket;
        }
        if let Some(region) = lookup(ENV_REGION) {
            self.store.region = region;
        }
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            self.store.endpoint = Some(endpoint);
        }

        let key_id = lookup(ENV_ACCESS_KEY_ID);
        let secret = lookup(ENV_SECRET_ACCESS_KEY);
        if let (Some(access_key_id), Some(secret_access_key)) = (key_id, secret) {
            let expires_at = lookup(ENV_CREDENTIALS_EXPIRE_AT)
                .map(|s| parse_expiry(&s))
                .transpose()?;
            self.store.credentials = Some(SessionCredentials {
                access_key_id,
                secret_access_key,
                session_token: lookup(ENV_SESSION_TOKEN),
                expires_at,
            });
        }
        Ok(())
    }

    /// Check option combinations and return normalized options.
    pub fn checked_options(&self) -> PickerResult<FilePickerOptions> {
        let options = self.options.clone().normalized();
        options.check(&self.image)?;
        Ok(options)
    }
}

fn parse_expiry(value: &str) -> PickerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            PickerError::Configuration(format!("invalid credential expiry '{}': {}", value, e))
        })
}

/// `~/.config/filedrop/config.json`, or `./filedrop.json` without a config dir.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("filedrop").join("config.json"))
        .unwrap_or_else(|| PathBuf::from("filedrop.json"))
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use core_types::{ALLOWED_MIME_TYPES, DEFAULT_BASE_URL, MAX_UPLOAD_BYTES, UiLanguage};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const CURRENT_SCHEMA_VERSION: u32 = 2;
pub const BASE_URL_ENV: &str = "DOCCHAT_BASE_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    /// Connect timeout only; streamed answers may take arbitrarily long.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl BackendConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

const fn default_connect_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub ttl_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { ttl_ms: 5_000 }
    }
}

impl NotificationConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub max_bytes: u64,
    pub allowed_mime_types: Vec<String>,
    pub progress_step: u8,
    pub progress_interval_ms: u64,
    pub progress_ceiling: u8,
    pub completion_hold_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: MAX_UPLOAD_BYTES,
            allowed_mime_types: ALLOWED_MIME_TYPES.iter().map(ToString::to_string).collect(),
            progress_step: 10,
            progress_interval_ms: 100,
            progress_ceiling: 90,
            completion_hold_ms: 1_000,
        }
    }
}

impl UploadConfig {
    /// Progress increment per tick, never zero.
    pub fn progress_step(&self) -> u8 {
        self.progress_step.max(1)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn completion_hold(&self) -> Duration {
        Duration::from_millis(self.completion_hold_ms)
    }

    pub fn allows(&self, mime_type: &str) -> bool {
        self.allowed_mime_types.iter().any(|allowed| allowed == mime_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub schema_version: u32,
    pub language: UiLanguage,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            language: UiLanguage::EnUs,
            backend: BackendConfig::default(),
            notifications: NotificationConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

impl AppConfig {
    /// Applies `DOCCHAT_BASE_URL` on top of the stored backend URL.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var(BASE_URL_ENV) {
            self.apply_base_url_override(&url);
        }
    }

    fn apply_base_url_override(&mut self, url: &str) {
        let url = url.trim();
        if url.is_empty() {
            return;
        }
        info!(base_url = %url, "backend url overridden from environment");
        self.backend.base_url = url.trim_end_matches('/').to_string();
    }
}

pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join("config.json"),
        }
    }

    pub fn from_default_location() -> Result<Self> {
        let mut dir = dirs::config_dir().context("failed to resolve config_dir")?;
        dir.push("docchat");
        Ok(Self::from_dir(dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        if !self.path.exists() {
            let config = AppConfig::default();
            self.save(&config)?;
            return Ok(config);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let mut config: AppConfig =
            serde_json::from_str(&raw).context("failed to parse app config json")?;
        if self.migrate(&mut config) {
            self.save(&config)?;
        }
        Ok(config)
    }

    pub fn save(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let text = serde_json::to_string_pretty(config).context("failed to serialize config")?;
        fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    fn migrate(&self, config: &mut AppConfig) -> bool {
        if config.schema_version >= CURRENT_SCHEMA_VERSION {
            return false;
        }

        warn!(
            from = config.schema_version,
            to = CURRENT_SCHEMA_VERSION,
            "migrating app config schema"
        );

        // v1 files could carry an empty allow-list, which rejects every upload.
        if config.upload.allowed_mime_types.is_empty() {
            config.upload.allowed_mime_types = UploadConfig::default().allowed_mime_types;
        }
        config.schema_version = CURRENT_SCHEMA_VERSION;
        true
    }
}

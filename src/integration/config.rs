//! Configuration for the integration layer
//!
//! One file configures every component. Missing fields take their defaults,
//! so an empty file is a valid configuration.

use crate::conversation::ConversationConfig;
use crate::sync::SyncConfig;
use crate::timing::TimingConfig;
use crate::{ReadalongError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "READALONG_CONFIG";

/// Configuration for the complete read-along host
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadalongConfig {
    /// JSON list of article sections
    pub catalog_path: PathBuf,

    /// Use the sound card for narration, microphone and companion audio.
    /// Only honoured when built with the `audio-io` feature.
    pub audio_devices: bool,

    /// Silent narration keeps playing this long after the last timed word
    pub narration_tail_ms: u64,

    pub timing: TimingConfig,

    pub sync: SyncConfig,

    pub conversation: ConversationConfig,
}

impl Default for ReadalongConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("article.json"),
            audio_devices: true,
            narration_tail_ms: 1000,
            timing: TimingConfig::default(),
            sync: SyncConfig::default(),
            conversation: ConversationConfig::default(),
        }
    }
}

impl ReadalongConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| ReadalongError::ConfigError(e.to_string()))
    }

    /// Load a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&raw)
            .map_err(|e| ReadalongError::ConfigError(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load the file named by `READALONG_CONFIG`, or use defaults
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.is_empty() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn narration_tail(&self) -> Duration {
        Duration::from_millis(self.narration_tail_ms)
    }

    /// Set the article catalog
    pub fn with_catalog(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = path.into();
        self
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_conversation(mut self, conversation: ConversationConfig) -> Self {
        self.conversation = conversation;
        self
    }

    /// Run without sound devices (silent narration, no microphone)
    pub fn without_audio_devices(mut self) -> Self {
        self.audio_devices = false;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.catalog_path.exists() {
            return Err(format!("Catalog not found: {:?}", self.catalog_path));
        }

        self.timing.validate()?;
        self.sync.validate()?;
        self.conversation.validate()?;

        if self.audio_devices && cfg!(feature = "audio-io") && !self.sync.audio_dir.is_dir() {
            return Err(format!(
                "Narration directory not found: {:?}",
                self.sync.audio_dir
            ));
        }

        Ok(())
    }
}

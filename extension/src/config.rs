use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::content::KeyChord;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExtensionConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub companion: CompanionConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Origin of the pet-data backend, without the `/api/...` path
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// On-screen layout of the companion, in CSS pixels.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct CompanionConfig {
    #[serde(default = "default_cursor_offset")]
    pub cursor_offset: i32,
    #[serde(default = "default_pet_size")]
    pub pet_size: u32,
    #[serde(default = "default_asset_size")]
    pub asset_size: u32,
    #[serde(default = "default_asset_offset_x")]
    pub asset_offset_x: i32,
    #[serde(default = "default_asset_offset_y")]
    pub asset_offset_y: i32,
    #[serde(default = "default_animated_size")]
    pub animated_size: u32,
    #[serde(default = "default_hotkey")]
    pub hotkey: String,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            cursor_offset: default_cursor_offset(),
            pet_size: default_pet_size(),
            asset_size: default_asset_size(),
            asset_offset_x: default_asset_offset_x(),
            asset_offset_y: default_asset_offset_y(),
            animated_size: default_animated_size(),
            hotkey: default_hotkey(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_cursor_offset() -> i32 {
    15
}

fn default_pet_size() -> u32 {
    50
}

fn default_asset_size() -> u32 {
    25
}

fn default_asset_offset_x() -> i32 {
    30
}

fn default_asset_offset_y() -> i32 {
    -30
}

fn default_animated_size() -> u32 {
    40
}

fn default_hotkey() -> String {
    "Ctrl+Shift+P".to_string()
}

fn default_store_path() -> String {
    "./data/companion-store.json".to_string()
}

impl ExtensionConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    pub fn validate(&self) -> Result<()> {
        let url = &self.backend.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!("backend.base_url must be an http(s) URL, got '{}'", url);
        }
        if self.backend.timeout_secs == 0 {
            anyhow::bail!("backend.timeout_secs must be at least 1");
        }
        if self.companion.pet_size == 0
            || self.companion.asset_size == 0
            || self.companion.animated_size == 0
        {
            anyhow::bail!("companion sizes must be positive");
        }
        self.companion
            .hotkey
            .parse::<KeyChord>()
            .map_err(|e| anyhow::anyhow!("companion.hotkey: {}", e))?;
        Ok(())
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub owners: Vec<OwnerConfig>,
    #[serde(default)]
    pub assets: Vec<AssetConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

/// A wallet address and the pets it owns, in listing order.
#[derive(Debug, Deserialize, Clone)]
pub struct OwnerConfig {
    pub address: String,
    #[serde(default)]
    pub pets: Vec<PetConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PetConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    /// Asset ids, in equip order
    #[serde(default)]
    pub equipped: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssetConfig {
    pub id: String,
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub action: Option<u32>,
    #[serde(default)]
    pub frames: Option<u32>,
    #[serde(default)]
    pub attributes: Option<String>,
}

impl ConfigFile {
    pub fn load(path: &str) -> Result<Self> {
        let content =
            fs::read_to_string(path).context(format!("Failed to read config file: {}", path))?;

        let config: ConfigFile = toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;

        tracing::info!(
            "Loaded pet registry: {} owners, {} assets",
            config.owners.len(),
            config.assets.len()
        );

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut asset_ids = HashSet::new();
        for asset in &self.assets {
            if !asset_ids.insert(asset.id.as_str()) {
                anyhow::bail!("Duplicate asset id: {}", asset.id);
            }
        }

        let mut addresses = HashSet::new();
        let mut pet_ids = HashSet::new();
        for owner in &self.owners {
            if !addresses.insert(owner.address.as_str()) {
                anyhow::bail!("Duplicate owner address: {}", owner.address);
            }
            for pet in &owner.pets {
                if !pet_ids.insert(pet.id.as_str()) {
                    anyhow::bail!("Duplicate pet id: {}", pet.id);
                }
                if let Some(unknown) = pet.equipped.iter().find(|id| !asset_ids.contains(id.as_str())) {
                    anyhow::bail!("Pet {} equips unknown asset {}", pet.id, unknown);
                }
            }
        }

        Ok(())
    }
}

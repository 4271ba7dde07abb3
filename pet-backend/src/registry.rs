// Owner -> pets -> equipped assets lookup backing the API

use std::collections::HashMap;
use thiserror::Error;

use crate::config::{AssetConfig, ConfigFile, OwnerConfig, PetConfig};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("No pets found for this address.")]
    NoPets,

    #[error("Pet not found for user.")]
    PetNotFound,
}

/// A pet with its equipped assets resolved.
#[derive(Debug)]
pub struct PetRecord<'a> {
    pub pet: &'a PetConfig,
    pub assets: Vec<&'a AssetConfig>,
}

pub struct Registry {
    owners: HashMap<String, Vec<PetConfig>>,
    assets: HashMap<String, AssetConfig>,
}

impl Registry {
    pub fn new(owners: Vec<OwnerConfig>, assets: Vec<AssetConfig>) -> Self {
        Self {
            owners: owners
                .into_iter()
                .map(|owner| (owner.address, owner.pets))
                .collect(),
            assets: assets
                .into_iter()
                .map(|asset| (asset.id.clone(), asset))
                .collect(),
        }
    }

    pub fn from_config(config: ConfigFile) -> Self {
        Self::new(config.owners, config.assets)
    }

    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Pets owned by `address`. Entries without an id or name are not listed.
    pub fn pets(&self, address: &str) -> Vec<&PetConfig> {
        self.owners
            .get(address)
            .map(|pets| {
                pets.iter()
                    .filter(|p| !p.id.is_empty() && !p.name.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The requested pet, or the owner's first pet when `pet_id` is `None`.
    pub fn user_pet(&self, address: &str, pet_id: Option<&str>) -> Result<PetRecord<'_>, LookupError> {
        let pets = self.pets(address);
        if pets.is_empty() {
            return Err(LookupError::NoPets);
        }

        let pet = match pet_id {
            Some(id) => pets.into_iter().find(|p| p.id == id),
            None => pets.into_iter().next(),
        }
        .ok_or(LookupError::PetNotFound)?;

        let assets = pet
            .equipped
            .iter()
            .filter_map(|id| {
                let asset = self.assets.get(id);
                if asset.is_none() {
                    tracing::warn!("Pet {} equips unknown asset {}, skipping", pet.id, id);
                }
                asset
            })
            .collect();

        Ok(PetRecord { pet, assets })
    }
}

// Popup controller
// User-editable settings: address, pet selection, playlist and visibility.

use std::sync::Arc;

use crate::bus::Endpoint;
use crate::defaults;
use crate::error::{CompanionError, Result};
use crate::protocol::{Broadcast, PetSelection, Request, Response};
use crate::services::backend::PetBackend;
use crate::services::storage::{SharedStore, StoreKey, StorePatch};
use crate::types::{ConfigPatch, OrbitAssetConfig, Pet, PetData};

pub const SELECTION_REQUIRED: &str = "Sui address and pet must be selected.";

/// What the popup displays.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PopupState {
    pub sui_address: String,
    pub selected_pet_id: Option<String>,
    pub pet_data: Option<PetData>,
    pub playlist: Vec<OrbitAssetConfig>,
    pub visible: bool,
    /// Fetched live, never persisted.
    pub pet_list: Vec<Pet>,
    pub loading: bool,
    /// Last error, shown until the next successful action.
    pub error: Option<String>,
}

pub struct PopupController<B: PetBackend> {
    store: Arc<dyn SharedStore>,
    runtime: Endpoint,
    backend: B,
    state: PopupState,
}

impl<B: PetBackend> PopupController<B> {
    /// Load the store snapshot and, when an address is known, its pet list.
    pub async fn open(store: Arc<dyn SharedStore>, runtime: Endpoint, backend: B) -> Result<Self> {
        let settings = defaults::settle(store.snapshot().await?);

        let mut popup = Self {
            store,
            runtime,
            backend,
            state: PopupState {
                sui_address: settings.sui_address.unwrap_or_default(),
                selected_pet_id: settings.pet_id,
                pet_data: settings.pet_data,
                playlist: settings.playlist,
                visible: settings.visible,
                ..Default::default()
            },
        };
        popup.refresh_pet_list().await;
        Ok(popup)
    }

    pub fn state(&self) -> &PopupState {
        &self.state
    }

    /// A new address drops the old pet selection and picks the owner's first pet.
    pub async fn set_address(&mut self, address: &str) {
        let address = address.trim().to_string();
        if address != self.state.sui_address {
            self.state.sui_address = address;
            self.state.selected_pet_id = None;
        }
        self.refresh_pet_list().await;
    }

    /// Failures leave an empty list; they are never surfaced as errors.
    pub async fn refresh_pet_list(&mut self) {
        if self.state.sui_address.is_empty() {
            self.state.pet_list.clear();
            return;
        }

        self.state.pet_list = match self.backend.fetch_pet_list(&self.state.sui_address).await {
            Ok(pets) => pets,
            Err(e) => {
                tracing::warn!("Could not load pets for {}: {}", self.state.sui_address, e);
                Vec::new()
            }
        };

        if self.state.selected_pet_id.is_none() {
            self.state.selected_pet_id = self.state.pet_list.first().map(|p| p.id.clone());
        }
    }

    pub fn select_pet(&mut self, pet_id: &str) {
        self.state.selected_pet_id = Some(pet_id.to_string());
    }

    fn selection(&mut self) -> Result<PetSelection> {
        match (&self.state.sui_address, &self.state.selected_pet_id) {
            (address, Some(pet_id)) if !address.is_empty() && !pet_id.is_empty() => Ok(PetSelection {
                sui_address: address.clone(),
                pet_id: pet_id.clone(),
            }),
            _ => {
                self.state.error = Some(SELECTION_REQUIRED.to_string());
                Err(CompanionError::Validation(SELECTION_REQUIRED.to_string()))
            }
        }
    }

    pub async fn save_and_fetch(&mut self) -> Result<()> {
        let selection = self.selection()?;
        self.send(Request::SaveAddressAndFetch(selection)).await
    }

    pub async fn refresh(&mut self) -> Result<()> {
        let selection = self.selection()?;
        self.send(Request::FetchPetData(selection)).await
    }

    async fn send(&mut self, request: Request) -> Result<()> {
        self.state.loading = true;
        self.state.error = None;

        let answer = self.runtime.call(request).await;
        self.state.loading = false;

        match answer? {
            Response::Success { .. } => {
                self.state.pet_data = self.store.snapshot().await?.pet_data;
            }
            Response::Error { message } => {
                self.state.error = Some(message);
                self.state.pet_data = None;
            }
            other => tracing::warn!("Unexpected answer from background: {:?}", other),
        }
        Ok(())
    }

    pub fn on_broadcast(&mut self, message: Broadcast) {
        self.state.loading = false;
        match message {
            Broadcast::PetDataUpdated(data) => {
                self.state.pet_data = Some(data);
                self.state.error = None;
            }
            Broadcast::PetDataError(message) => {
                self.state.pet_data = None;
                self.state.error = Some(message);
            }
        }
    }

    /// Optimistic: the store is written directly, no round trip.
    pub async fn toggle_visibility(&mut self) -> Result<bool> {
        let visible = !self.state.visible;
        self.store
            .set(StorePatch::new().put(StoreKey::PetCompanionVisible, &visible)?)
            .await?;
        self.state.visible = visible;
        Ok(visible)
    }

    /// Returns false when the asset is not equipped or already queued.
    pub async fn add_to_playlist(&mut self, asset_id: &str) -> Result<bool> {
        let equipped = self
            .state
            .pet_data
            .as_ref()
            .is_some_and(|data| data.asset(asset_id).is_some());
        if !equipped || self.in_playlist(asset_id) {
            return Ok(false);
        }

        self.state.playlist.push(defaults::new_entry(asset_id));
        self.write_playlist().await?;
        Ok(true)
    }

    pub async fn remove_from_playlist(&mut self, asset_id: &str) -> Result<bool> {
        let before = self.state.playlist.len();
        self.state.playlist.retain(|entry| entry.id != asset_id);
        if self.state.playlist.len() == before {
            return Ok(false);
        }
        self.write_playlist().await?;
        Ok(true)
    }

    pub async fn edit_entry(&mut self, asset_id: &str, patch: &ConfigPatch) -> Result<bool> {
        if patch.is_empty() {
            return Ok(false);
        }
        let Some(entry) = self.state.playlist.iter_mut().find(|e| e.id == asset_id) else {
            return Ok(false);
        };

        patch.apply(entry);
        self.write_playlist().await?;
        Ok(true)
    }

    fn in_playlist(&self, asset_id: &str) -> bool {
        self.state.playlist.iter().any(|entry| entry.id == asset_id)
    }

    /// The whole sequence is written every time; last writer wins.
    async fn write_playlist(&self) -> Result<()> {
        let patch = StorePatch::new().put(StoreKey::OrbitAssetConfig, &self.state.playlist)?;
        self.store.set(patch).await?;
        Ok(())
    }
}

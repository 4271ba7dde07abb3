// Background fetcher
// Owns all network I/O: fetches pet data, mirrors it into the store and
// broadcasts the outcome to every page.

use futures::StreamExt;
use std::sync::Arc;

use crate::bus::{Broadcaster, Envelope, Inbox};
use crate::error::{FetchError, StoreError};
use crate::protocol::{Broadcast, PendingPayload, PetSelection, Request, Response, StoredPetData};
use crate::services::backend::PetBackend;
use crate::services::storage::{SharedStore, StoreKey, StorePatch};

pub struct Background<B: PetBackend> {
    store: Arc<dyn SharedStore>,
    backend: B,
    broadcaster: Broadcaster,
}

impl<B: PetBackend + 'static> Background<B> {
    pub fn new(store: Arc<dyn SharedStore>, backend: B, broadcaster: Broadcaster) -> Self {
        Self {
            store,
            backend,
            broadcaster,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Persist the selection, then fetch.
    pub async fn handle_save_and_fetch(&self, selection: &PetSelection) -> Response {
        let patch = StorePatch::new()
            .put(StoreKey::SuiAddress, &selection.sui_address)
            .and_then(|p| p.put(StoreKey::PetId, &selection.pet_id));
        let saved = match patch {
            Ok(patch) => self.store.set(patch).await,
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            tracing::error!("Failed to save selection: {}", e);
            return Response::error(e.to_string());
        }

        self.refresh(&selection.sui_address, Some(&selection.pet_id)).await
    }

    /// Refresh path: same as save-and-fetch without rewriting the selection.
    pub async fn handle_fetch_only(&self, selection: &PetSelection) -> Response {
        self.refresh(&selection.sui_address, Some(&selection.pet_id)).await
    }

    pub async fn handle_get_pet_data(&self) -> Response {
        let snapshot = match self.store.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => return Response::error(e.to_string()),
        };

        match (snapshot.pet_data, snapshot.sui_address) {
            (Some(pet_data), Some(sui_address)) => Response::Success {
                payload: Some(StoredPetData {
                    pet_data,
                    sui_address,
                }),
            },
            (None, Some(sui_address)) => Response::Pending {
                payload: PendingPayload { sui_address },
            },
            _ => Response::Nodata,
        }
    }

    pub async fn handle(&self, request: &Request) -> Response {
        tracing::debug!("Background received {}", request.name());
        match request {
            Request::SaveAddressAndFetch(selection) => self.handle_save_and_fetch(selection).await,
            Request::FetchPetData(selection) => self.handle_fetch_only(selection).await,
            Request::GetPetData => self.handle_get_pet_data().await,
            other => Response::error(format!("Unsupported request: {}", other.name())),
        }
    }

    /// Re-fetch the stored selection once at startup. Nobody awaits the
    /// outcome except through the broadcast.
    pub async fn startup_refresh(&self) {
        let snapshot = match self.store.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Startup refresh skipped, store unreadable: {}", e);
                return;
            }
        };

        match snapshot.sui_address.filter(|a| !a.trim().is_empty()) {
            Some(address) => {
                tracing::info!("Refreshing pet data for stored address {}", address);
                self.refresh(&address, snapshot.pet_id.as_deref()).await;
            }
            None => tracing::debug!("No stored address, nothing to refresh"),
        }
    }

    /// Answer every request on `inbox` until all senders are gone.
    /// Requests are handled concurrently.
    pub async fn serve(self: Arc<Self>, mut inbox: Inbox) {
        tracing::info!("🚀 Background fetcher listening");
        while let Some(envelope) = inbox.next().await {
            let this = Arc::clone(&self);
            tokio::spawn(async move { this.dispatch(envelope).await });
        }
        tracing::info!("Background fetcher stopped");
    }

    async fn dispatch(&self, envelope: Envelope) {
        let response = self.handle(&envelope.request).await;
        envelope.respond(response);
    }

    async fn refresh(&self, address: &str, pet_id: Option<&str>) -> Response {
        match self.backend.fetch_pet_data(address, pet_id).await {
            Ok(pet_data) => {
                if let Err(e) = self.store_pet_data(&pet_data).await {
                    tracing::error!("Fetched pet data but could not store it: {}", e);
                    return Response::error(e.to_string());
                }
                tracing::info!(
                    "Fetched {} with {} assets",
                    pet_data.pet.name,
                    pet_data.assets.len()
                );
                self.broadcaster.publish(Broadcast::PetDataUpdated(pet_data));
                Response::success()
            }
            Err(e) => {
                tracing::error!("Fetching pet data for {} failed: {}", address, e);
                self.clear_pet_data().await;
                let message = error_message(&e);
                self.broadcaster
                    .publish(Broadcast::PetDataError(message.clone()));
                Response::error(message)
            }
        }
    }

    async fn store_pet_data(&self, pet_data: &crate::types::PetData) -> Result<(), StoreError> {
        self.store
            .set(StorePatch::new().put(StoreKey::PetData, pet_data)?)
            .await
    }

    async fn clear_pet_data(&self) {
        if let Err(e) = self.store.remove(&[StoreKey::PetData]).await {
            tracing::error!("Failed to clear stale pet data: {}", e);
        }
    }
}

fn error_message(e: &FetchError) -> String {
    match e {
        FetchError::Backend { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus;
    use crate::services::storage::{Entries, MemoryStore};
    use crate::types::{Asset, Pet, PetData};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeBackend {
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl FakeBackend {
        fn calls(&self) -> Vec<(String, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn pet_data() -> PetData {
        PetData {
            pet: Pet {
                id: "p1".into(),
                name: "Fluffy".into(),
                image_url: None,
            },
            assets: vec![Asset {
                id: "a1".into(),
                url: "http://x/a1.png".into(),
                name: "Hat".into(),
                description: String::new(),
                action: None,
                frames: None,
                attributes: None,
            }],
        }
    }

    #[async_trait]
    impl PetBackend for FakeBackend {
        async fn fetch_pet_data(
            &self,
            address: &str,
            pet_id: Option<&str>,
        ) -> Result<PetData, FetchError> {
            self.calls
                .lock()
                .unwrap()
                .push((address.to_string(), pet_id.map(str::to_string)));
            match (address, pet_id) {
                ("0xowner", Some("p1")) | ("0xowner", None) => Ok(pet_data()),
                ("0xowner", Some(_)) => Err(FetchError::backend(Some(404), "Pet not found for user.")),
                ("0xslow", _) => Err(FetchError::Timeout { secs: 10 }),
                _ => Err(FetchError::backend(Some(404), "No pets found for this address.")),
            }
        }

        async fn fetch_pet_list(&self, _address: &str) -> Result<Vec<Pet>, FetchError> {
            Ok(vec![pet_data().pet])
        }
    }

    fn selection(address: &str, pet: &str) -> PetSelection {
        PetSelection {
            sui_address: address.into(),
            pet_id: pet.into(),
        }
    }

    fn background(store: Arc<MemoryStore>) -> (Background<FakeBackend>, bus::BroadcastStream) {
        let broadcaster = Broadcaster::new();
        let pages = broadcaster.subscribe();
        (Background::new(store, FakeBackend::default(), broadcaster), pages)
    }

    #[tokio::test]
    async fn test_save_and_fetch_stores_and_broadcasts() {
        let store = Arc::new(MemoryStore::new());
        let (background, mut pages) = background(store.clone());

        let response = background.handle_save_and_fetch(&selection("0xowner", "p1")).await;

        assert_eq!(response, Response::success());
        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.sui_address.as_deref(), Some("0xowner"));
        assert_eq!(snapshot.pet_id.as_deref(), Some("p1"));
        assert_eq!(snapshot.pet_data, Some(pet_data()));
        assert_eq!(pages.next().await, Some(Broadcast::PetDataUpdated(pet_data())));
    }

    #[tokio::test]
    async fn test_not_found_clears_stale_pet_data() {
        let mut entries = Entries::new();
        entries.insert(StoreKey::PetData, serde_json::to_value(pet_data()).unwrap());
        let store = Arc::new(MemoryStore::with_entries(entries));
        let (background, mut pages) = background(store.clone());

        let response = background.handle_save_and_fetch(&selection("0xowner", "p9")).await;

        assert_eq!(response, Response::error("Pet not found for user."));
        assert_eq!(store.snapshot().await.unwrap().pet_data, None);
        assert_eq!(
            pages.next().await,
            Some(Broadcast::PetDataError("Pet not found for user.".into()))
        );
    }

    #[tokio::test]
    async fn test_fetch_only_keeps_selection() {
        let mut entries = Entries::new();
        entries.insert(StoreKey::SuiAddress, json!("0xother"));
        let store = Arc::new(MemoryStore::with_entries(entries));
        let (background, _pages) = background(store.clone());

        let response = background.handle_fetch_only(&selection("0xowner", "p1")).await;

        assert_eq!(response, Response::success());
        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.sui_address.as_deref(), Some("0xother"));
        assert_eq!(snapshot.pet_id, None);
        assert!(snapshot.pet_data.is_some());
    }

    #[tokio::test]
    async fn test_timeout_is_reported_as_error() {
        let store = Arc::new(MemoryStore::new());
        let (background, _pages) = background(store);

        let response = background.handle_fetch_only(&selection("0xslow", "p1")).await;

        assert_eq!(response, Response::error("Request timed out after 10s"));
    }

    #[tokio::test]
    async fn test_get_pet_data_states() {
        let store = Arc::new(MemoryStore::new());
        let (background, _pages) = background(store.clone());
        assert_eq!(background.handle_get_pet_data().await, Response::Nodata);

        store
            .set(StorePatch::new().put(StoreKey::SuiAddress, "0xowner").unwrap())
            .await
            .unwrap();
        assert_eq!(
            background.handle_get_pet_data().await,
            Response::Pending {
                payload: PendingPayload {
                    sui_address: "0xowner".into()
                }
            }
        );

        store
            .set(StorePatch::new().put(StoreKey::PetData, &pet_data()).unwrap())
            .await
            .unwrap();
        assert!(matches!(
            background.handle_get_pet_data().await,
            Response::Success { payload: Some(StoredPetData { ref sui_address, .. }) } if sui_address == "0xowner"
        ));
    }

    #[tokio::test]
    async fn test_startup_refresh_uses_stored_selection() {
        let mut entries = Entries::new();
        entries.insert(StoreKey::SuiAddress, json!("0xowner"));
        let store = Arc::new(MemoryStore::with_entries(entries));
        let (background, mut pages) = background(store.clone());

        background.startup_refresh().await;

        assert_eq!(background.backend().calls(), vec![("0xowner".to_string(), None)]);
        assert!(store.snapshot().await.unwrap().pet_data.is_some());
        assert!(matches!(pages.next().await, Some(Broadcast::PetDataUpdated(_))));
    }

    #[tokio::test]
    async fn test_startup_without_address_does_nothing() {
        let (background, _pages) = background(Arc::new(MemoryStore::new()));

        background.startup_refresh().await;

        assert!(background.backend().calls().is_empty());
    }

    #[tokio::test]
    async fn test_serve_answers_over_the_bus() {
        let (background, _pages) = background(Arc::new(MemoryStore::new()));
        let (runtime, inbox) = bus::channel("runtime");
        tokio::spawn(Arc::new(background).serve(inbox));

        let response = runtime
            .call(Request::SaveAddressAndFetch(selection("0xowner", "p1")))
            .await
            .unwrap();
        assert_eq!(response, Response::success());

        let response = runtime.call(Request::ToggleVisibility).await.unwrap();
        assert_eq!(response, Response::error("Unsupported request: TOGGLE_VISIBILITY"));
    }
}

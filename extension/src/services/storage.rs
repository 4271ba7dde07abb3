// Shared extension storage
// Durable key-value store with change notification, shared by background, popup and content script

use async_trait::async_trait;
use futures::channel::mpsc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StoreError;
use crate::types::{OrbitAssetConfig, PetData};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum StoreKey {
    SuiAddress,
    PetId,
    PetData,
    OrbitAssetConfig,
    PetCompanionVisible,
}

impl StoreKey {
    pub const ALL: [StoreKey; 5] = [
        StoreKey::SuiAddress,
        StoreKey::PetId,
        StoreKey::PetData,
        StoreKey::OrbitAssetConfig,
        StoreKey::PetCompanionVisible,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::SuiAddress => "suiAddress",
            StoreKey::PetId => "petId",
            StoreKey::PetData => "petData",
            StoreKey::OrbitAssetConfig => "orbitAssetConfig",
            StoreKey::PetCompanionVisible => "petCompanionVisible",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        StoreKey::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

pub type Entries = BTreeMap<StoreKey, Value>;

/// Typed view of the store. A field holding malformed JSON reads as absent.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sui_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pet_data: Option<PetData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orbit_asset_config: Option<Vec<OrbitAssetConfig>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pet_companion_visible: Option<bool>,
}

impl StoreSnapshot {
    pub fn from_entries(entries: &Entries) -> Self {
        Self {
            sui_address: decode_entry(StoreKey::SuiAddress, entries.get(&StoreKey::SuiAddress)),
            pet_id: decode_entry(StoreKey::PetId, entries.get(&StoreKey::PetId)),
            pet_data: decode_entry(StoreKey::PetData, entries.get(&StoreKey::PetData)),
            orbit_asset_config: decode_entry(
                StoreKey::OrbitAssetConfig,
                entries.get(&StoreKey::OrbitAssetConfig),
            ),
            pet_companion_visible: decode_entry(
                StoreKey::PetCompanionVisible,
                entries.get(&StoreKey::PetCompanionVisible),
            ),
        }
    }
}

fn decode_entry<T: DeserializeOwned>(key: StoreKey, value: Option<&Value>) -> Option<T> {
    let value = value?;
    match serde_json::from_value(value.clone()) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::warn!("Ignoring malformed {} in store: {}", key.as_str(), e);
            None
        }
    }
}

/// Keys to write in one `set` call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StorePatch {
    entries: Entries,
}

impl StorePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<T: Serialize + ?Sized>(mut self, key: StoreKey, value: &T) -> Result<Self, StoreError> {
        self.entries.insert(key, serde_json::to_value(value)?);
        Ok(self)
    }
}

/// One notification per write: every key whose value changed, with its new
/// value (`None` when the key was removed).
#[derive(Clone, Debug, PartialEq)]
pub struct StoreChange {
    pub changes: BTreeMap<StoreKey, Option<Value>>,
}

impl StoreChange {
    /// `None` if `key` did not change, `Some(None)` if it was cleared.
    fn decode<T: DeserializeOwned>(&self, key: StoreKey) -> Option<Option<T>> {
        self.changes
            .get(&key)
            .map(|value| decode_entry(key, value.as_ref()))
    }

    pub fn sui_address(&self) -> Option<Option<String>> {
        self.decode(StoreKey::SuiAddress)
    }

    pub fn pet_data(&self) -> Option<Option<PetData>> {
        self.decode(StoreKey::PetData)
    }

    pub fn orbit_asset_config(&self) -> Option<Option<Vec<OrbitAssetConfig>>> {
        self.decode(StoreKey::OrbitAssetConfig)
    }

    pub fn companion_visible(&self) -> Option<Option<bool>> {
        self.decode(StoreKey::PetCompanionVisible)
    }
}

pub type ChangeStream = mpsc::UnboundedReceiver<StoreChange>;

#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Values for the requested keys; absent keys are simply missing.
    async fn get(&self, keys: &[StoreKey]) -> Result<Entries, StoreError>;

    async fn set(&self, patch: StorePatch) -> Result<(), StoreError>;

    async fn remove(&self, keys: &[StoreKey]) -> Result<(), StoreError>;

    /// Change notifications, in write order, for as long as the receiver lives.
    fn subscribe(&self) -> ChangeStream;

    async fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let entries = self.get(&StoreKey::ALL).await?;
        Ok(StoreSnapshot::from_entries(&entries))
    }
}

struct State {
    entries: Entries,
    listeners: Vec<mpsc::UnboundedSender<StoreChange>>,
}

impl State {
    fn notify(&mut self, change: StoreChange) {
        if change.changes.is_empty() {
            return;
        }
        self.listeners
            .retain(|listener| listener.unbounded_send(change.clone()).is_ok());
    }
}

/// In-process store. Also the backing map for [`FileStore`].
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_entries(Entries::new())
    }

    pub fn with_entries(entries: Entries) -> Self {
        Self {
            state: Mutex::new(State {
                entries,
                listeners: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn entries(&self) -> Entries {
        self.lock().entries.clone()
    }

    fn apply_set(&self, patch: StorePatch) {
        let mut state = self.lock();
        // Notify under the lock so listeners see writes in the order they landed
        let change = stage_set(&mut state.entries, patch);
        state.notify(change);
    }

    fn apply_remove(&self, keys: &[StoreKey]) {
        let mut state = self.lock();
        let change = stage_remove(&mut state.entries, keys);
        state.notify(change);
    }

    /// Swap in entries that were already staged and saved elsewhere.
    fn commit(&self, entries: Entries, change: StoreChange) {
        let mut state = self.lock();
        state.entries = entries;
        state.notify(change);
    }
}

fn stage_set(entries: &mut Entries, patch: StorePatch) -> StoreChange {
    let mut changes = BTreeMap::new();
    for (key, value) in patch.entries {
        if entries.get(&key) != Some(&value) {
            changes.insert(key, Some(value.clone()));
            entries.insert(key, value);
        }
    }
    StoreChange { changes }
}

fn stage_remove(entries: &mut Entries, keys: &[StoreKey]) -> StoreChange {
    let mut changes = BTreeMap::new();
    for key in keys {
        if entries.remove(key).is_some() {
            changes.insert(*key, None);
        }
    }
    StoreChange { changes }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, keys: &[StoreKey]) -> Result<Entries, StoreError> {
        let state = self.lock();
        Ok(keys
            .iter()
            .filter_map(|k| state.entries.get(k).map(|v| (*k, v.clone())))
            .collect())
    }

    async fn set(&self, patch: StorePatch) -> Result<(), StoreError> {
        self.apply_set(patch);
        Ok(())
    }

    async fn remove(&self, keys: &[StoreKey]) -> Result<(), StoreError> {
        self.apply_remove(keys);
        Ok(())
    }

    fn subscribe(&self) -> ChangeStream {
        let (tx, rx) = mpsc::unbounded();
        self.lock().listeners.push(tx);
        rx
    }
}

/// Store persisted as a JSON object on disk, rewritten after every write.
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    /// Open the store at `path`, loading existing contents if the file exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let raw: Map<String, Value> = serde_json::from_str(&content)?;
                let mut entries = Entries::new();
                for (name, value) in raw {
                    match StoreKey::parse(&name) {
                        Some(key) => {
                            entries.insert(key, value);
                        }
                        None => tracing::warn!("Dropping unknown store key: {}", name),
                    }
                }
                tracing::info!("Loaded {} store entries from {}", entries.len(), path.display());
                entries
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No store at {}, starting empty", path.display());
                Entries::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            inner: MemoryStore::with_entries(entries),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn persist(&self, entries: &Entries) -> Result<(), StoreError> {
        let raw: Map<String, Value> = entries
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), v.clone()))
            .collect();
        let content = serde_json::to_string_pretty(&raw)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        // Write-then-rename so a crash never leaves a half-written store
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Listeners only hear about a change once it is on disk.
    async fn save(&self, entries: Entries, change: StoreChange) -> Result<(), StoreError> {
        if change.changes.is_empty() {
            return Ok(());
        }
        self.persist(&entries).await?;
        self.inner.commit(entries, change);
        Ok(())
    }
}

#[async_trait]
impl SharedStore for FileStore {
    async fn get(&self, keys: &[StoreKey]) -> Result<Entries, StoreError> {
        self.inner.get(keys).await
    }

    async fn set(&self, patch: StorePatch) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.inner.entries();
        let change = stage_set(&mut entries, patch);
        self.save(entries, change).await
    }

    async fn remove(&self, keys: &[StoreKey]) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.inner.entries();
        let change = stage_remove(&mut entries, keys);
        self.save(entries, change).await
    }

    fn subscribe(&self) -> ChangeStream {
        self.inner.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults;
    use futures::StreamExt;
    use serde_json::json;

    fn temp_store_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("pet-companion-{}-{}", std::process::id(), name))
            .join("store.json")
    }

    #[tokio::test]
    async fn test_get_omits_missing_keys() {
        let store = MemoryStore::new();
        store
            .set(StorePatch::new().put(StoreKey::SuiAddress, "0xabc").unwrap())
            .await
            .unwrap();

        let entries = store
            .get(&[StoreKey::SuiAddress, StoreKey::PetData])
            .await
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[&StoreKey::SuiAddress], json!("0xabc"));
    }

    #[tokio::test]
    async fn test_every_listener_sees_writes_in_order() {
        let store = MemoryStore::new();
        let mut first = store.subscribe();
        let mut second = store.subscribe();

        for visible in [false, true, false] {
            let patch = StorePatch::new()
                .put(StoreKey::PetCompanionVisible, &visible)
                .unwrap();
            store.set(patch).await.unwrap();
        }

        for listener in [&mut first, &mut second] {
            let mut seen = Vec::new();
            for _ in 0..3 {
                let change = listener.next().await.unwrap();
                seen.push(change.companion_visible().unwrap().unwrap());
            }
            assert_eq!(seen, vec![false, true, false]);
        }
    }

    #[tokio::test]
    async fn test_unchanged_write_is_silent() {
        let store = MemoryStore::new();
        let patch = StorePatch::new().put(StoreKey::PetId, "p1").unwrap();
        store.set(patch.clone()).await.unwrap();

        let mut changes = store.subscribe();
        store.set(patch).await.unwrap();
        store.remove(&[StoreKey::PetData]).await.unwrap();
        store
            .set(StorePatch::new().put(StoreKey::PetId, "p2").unwrap())
            .await
            .unwrap();

        let change = changes.next().await.unwrap();
        assert_eq!(change.changes.keys().copied().collect::<Vec<_>>(), vec![StoreKey::PetId]);
        assert_eq!(change.changes[&StoreKey::PetId], Some(json!("p2")));
    }

    #[tokio::test]
    async fn test_remove_reports_cleared_key() {
        let store = MemoryStore::new();
        store
            .set(StorePatch::new().put(StoreKey::SuiAddress, "0xabc").unwrap())
            .await
            .unwrap();
        let mut changes = store.subscribe();

        store.remove(&[StoreKey::SuiAddress]).await.unwrap();

        let change = changes.next().await.unwrap();
        assert_eq!(change.sui_address(), Some(None));
        assert_eq!(change.pet_data(), None);
    }

    #[tokio::test]
    async fn test_malformed_field_reads_as_absent() {
        let mut entries = Entries::new();
        entries.insert(StoreKey::PetData, json!({"pet": 12}));
        entries.insert(StoreKey::PetCompanionVisible, json!(false));
        let store = MemoryStore::with_entries(entries);

        let snapshot = store.snapshot().await.unwrap();

        assert_eq!(snapshot.pet_data, None);
        assert_eq!(snapshot.pet_companion_visible, Some(false));
    }

    #[tokio::test]
    async fn test_playlist_round_trips_in_order() {
        let store = MemoryStore::new();
        let mut animated = defaults::new_entry("a2");
        animated.mode = crate::types::OrbitMode::Animated;
        defaults::fill_animated(&mut animated);
        let playlist = vec![defaults::new_entry("a3"), animated, defaults::new_entry("a1")];

        store
            .set(StorePatch::new().put(StoreKey::OrbitAssetConfig, &playlist).unwrap())
            .await
            .unwrap();

        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.orbit_asset_config, Some(playlist));
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let path = temp_store_path("reopen");
        let _ = std::fs::remove_file(&path);

        {
            let store = FileStore::open(&path).await.unwrap();
            store
                .set(
                    StorePatch::new()
                        .put(StoreKey::SuiAddress, "0xabc")
                        .unwrap()
                        .put(StoreKey::PetCompanionVisible, &false)
                        .unwrap(),
                )
                .await
                .unwrap();
            store.remove(&[StoreKey::PetCompanionVisible]).await.unwrap();
        }

        let reopened = FileStore::open(&path).await.unwrap();
        let snapshot = reopened.snapshot().await.unwrap();

        assert_eq!(snapshot.sui_address.as_deref(), Some("0xabc"));
        assert_eq!(snapshot.pet_companion_visible, None);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[tokio::test]
    async fn test_failed_file_write_changes_nothing() {
        let path = temp_store_path("blocked");
        let _ = std::fs::remove_dir_all(path.parent().unwrap());

        let store = FileStore::open(&path).await.unwrap();
        let mut changes = store.subscribe();
        // A directory where the file should go makes the final rename fail
        std::fs::create_dir_all(&path).unwrap();

        let result = store
            .set(StorePatch::new().put(StoreKey::SuiAddress, "0xabc").unwrap())
            .await;

        assert!(result.is_err());
        assert!(changes.try_next().is_err());
        assert_eq!(store.snapshot().await.unwrap().sui_address, None);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}

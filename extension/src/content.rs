// Content script
// Hosts the orbit renderer on a page and keeps it in sync with the store,
// background broadcasts, tab requests and page input.

use futures::channel::mpsc;
use futures::StreamExt;
use std::str::FromStr;
use std::sync::Arc;

use crate::bus::{BroadcastStream, Endpoint, Envelope, Inbox};
use crate::config::CompanionConfig;
use crate::defaults::{self, resolve_playlist, DEFAULT_VISIBLE};
use crate::error::{CompanionError, Result};
use crate::orbit::{OrbitRenderer, Phase, Point, Surface, Update};
use crate::protocol::{Broadcast, Request, Response};
use crate::services::storage::{SharedStore, StoreChange, StoreKey, StorePatch};

/// A keyboard shortcut such as `Ctrl+Shift+P`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyChord {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub key: String,
}

impl FromStr for KeyChord {
    type Err = CompanionError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |why: &str| CompanionError::Validation(format!("invalid hotkey '{}': {}", s, why));

        let mut chord = KeyChord {
            ctrl: false,
            shift: false,
            alt: false,
            key: String::new(),
        };

        for part in s.split('+').map(str::trim) {
            match part.to_ascii_lowercase().as_str() {
                "" => return Err(invalid("empty key")),
                "ctrl" | "control" => chord.ctrl = true,
                "shift" => chord.shift = true,
                "alt" | "option" => chord.alt = true,
                key => {
                    if !chord.key.is_empty() {
                        return Err(invalid("more than one key"));
                    }
                    chord.key = key.to_string();
                }
            }
        }

        if chord.key.is_empty() {
            return Err(invalid("no key"));
        }
        Ok(chord)
    }
}

impl KeyChord {
    pub fn matches(&self, press: &KeyPress) -> bool {
        self.ctrl == press.ctrl
            && self.shift == press.shift
            && self.alt == press.alt
            && self.key.eq_ignore_ascii_case(&press.key)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPress {
    pub key: String,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageEvent {
    PointerMoved(Point),
    KeyDown(KeyPress),
    Unload,
}

pub type PageEvents = mpsc::UnboundedReceiver<PageEvent>;

/// Everything the page feeds into the content script.
pub struct ContentInputs {
    pub page: PageEvents,
    /// Requests addressed to this tab.
    pub tab: Inbox,
    pub broadcasts: BroadcastStream,
}

pub struct ContentScript<S: Surface> {
    renderer: OrbitRenderer<S>,
    store: Arc<dyn SharedStore>,
    runtime: Endpoint,
    hotkey: KeyChord,
    sui_address: Option<String>,
}

impl<S: Surface> ContentScript<S> {
    pub fn new(
        surface: S,
        layout: CompanionConfig,
        store: Arc<dyn SharedStore>,
        runtime: Endpoint,
    ) -> Result<Self> {
        let hotkey = layout.hotkey.parse()?;
        Ok(Self {
            renderer: OrbitRenderer::new(surface, layout),
            store,
            runtime,
            hotkey,
            sui_address: None,
        })
    }

    pub fn renderer(&self) -> &OrbitRenderer<S> {
        &self.renderer
    }

    /// First read of the store. Asks the background for pet data when an
    /// address is known but nothing has been fetched into the store yet.
    pub async fn initialize(&mut self) -> Result<Phase> {
        let settings = defaults::settle(self.store.snapshot().await?);
        self.sui_address = settings.sui_address.clone();

        self.renderer.initialize(&settings);

        if self.sui_address.is_some() && settings.pet_data.is_none() {
            self.request_pet_data().await;
        }
        Ok(self.renderer.phase())
    }

    pub async fn request_pet_data(&mut self) {
        match self.runtime.call(Request::GetPetData).await {
            Ok(Response::Success {
                payload: Some(stored),
            }) => {
                tracing::debug!("Adopting pet data for {}", stored.sui_address);
                self.renderer.update(Update {
                    pet_data: Some(Some(stored.pet_data)),
                    ..Default::default()
                });
            }
            Ok(Response::Pending { payload }) => {
                tracing::debug!("Pet data for {} not fetched yet", payload.sui_address);
            }
            Ok(other) => tracing::debug!("No pet data available: {:?}", other),
            Err(e) => tracing::warn!("GET_PET_DATA failed: {}", e),
        }
    }

    pub async fn on_store_change(&mut self, change: StoreChange) {
        let address_changed = match change.sui_address() {
            Some(address) => {
                self.sui_address = address.filter(|a| !a.trim().is_empty());
                true
            }
            None => false,
        };

        self.renderer.update(Update {
            visible: change
                .companion_visible()
                .map(|v| v.unwrap_or(DEFAULT_VISIBLE)),
            pet_data: change.pet_data(),
            playlist: change
                .orbit_asset_config()
                .map(|p| resolve_playlist(&p.unwrap_or_default())),
        });

        if address_changed && self.sui_address.is_some() && !self.renderer.has_pet_data() {
            self.request_pet_data().await;
        }
    }

    pub fn on_broadcast(&mut self, message: Broadcast) {
        let pet_data = match message {
            Broadcast::PetDataUpdated(data) => Some(data),
            Broadcast::PetDataError(message) => {
                tracing::warn!("Pet data error: {}", message);
                None
            }
        };
        self.renderer.update(Update {
            pet_data: Some(pet_data),
            ..Default::default()
        });
    }

    /// Flip visibility locally and persist it. Returns the new value.
    pub async fn toggle_visibility(&mut self) -> bool {
        let visible = self.renderer.toggle_visibility();

        let written = match StorePatch::new().put(StoreKey::PetCompanionVisible, &visible) {
            Ok(patch) => self.store.set(patch).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::error!("Failed to persist visibility: {}", e);
        }

        tracing::info!("Companion {}", if visible { "shown" } else { "hidden" });
        visible
    }

    async fn on_request(&mut self, envelope: Envelope) {
        let response = match envelope.request {
            Request::ToggleVisibility => Response::VisibilityToggled {
                is_visible: self.toggle_visibility().await,
            },
            ref other => Response::error(format!("{} is not handled by pages", other.name())),
        };
        envelope.respond(response);
    }

    /// Returns false once the page is gone.
    async fn on_page_event(&mut self, event: PageEvent) -> bool {
        match event {
            PageEvent::PointerMoved(at) => self.renderer.pointer_moved(at),
            PageEvent::KeyDown(press) => {
                if self.hotkey.matches(&press) {
                    self.toggle_visibility().await;
                }
            }
            PageEvent::Unload => {
                self.renderer.unload();
                return false;
            }
        }
        true
    }

    /// Event loop for one page. Frames other than the top frame never host
    /// a companion.
    pub async fn run(mut self, is_top_frame: bool, inputs: ContentInputs) -> Result<()> {
        if !is_top_frame {
            tracing::debug!("Not the top frame, companion disabled");
            return Ok(());
        }

        let ContentInputs {
            mut page,
            mut tab,
            mut broadcasts,
        } = inputs;
        let mut changes = self.store.subscribe();

        self.initialize().await?;

        loop {
            tokio::select! {
                fired = self.renderer.next_timer() => self.renderer.on_timer(fired),
                Some(change) = changes.next() => self.on_store_change(change).await,
                Some(message) = broadcasts.next() => self.on_broadcast(message),
                Some(envelope) = tab.next() => self.on_request(envelope).await,
                event = page.next() => {
                    let alive = match event {
                        Some(event) => self.on_page_event(event).await,
                        None => {
                            self.renderer.unload();
                            false
                        }
                    };
                    if !alive {
                        break;
                    }
                }
            }
        }

        tracing::debug!("Page unloaded");
        Ok(())
    }
}

// Playlist scheduling as a pure state machine. No timers, no drawing: each
// input returns the `Transition` the renderer has to carry out.

use crate::defaults::{ResolvedConfig, DEFAULT_VISIBLE};
use crate::types::{Asset, Pet, PetData};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Store not read yet.
    Uninitialized,
    /// Nothing on screen, no timers.
    IdleHidden,
    /// Playlist entry `i` is on screen.
    Displaying(usize),
}

/// One playlist slot ready to present. `asset` is `None` when the entry
/// points at an asset the pet no longer has; the slot still runs for its
/// duration but shows nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slide {
    pub index: usize,
    pub config: ResolvedConfig,
    pub asset: Option<Asset>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Stay,
    /// Cancel timers and remove the companion.
    Hide,
    /// Tear everything down and build the companion from scratch.
    Rebuild { pet: Pet, slide: Slide },
    /// Swap the orbit asset, keep the companion.
    Advance(Slide),
}

/// Inputs changed together. `None` leaves a field untouched.
#[derive(Clone, Debug, Default)]
pub struct Update {
    pub visible: Option<bool>,
    pub pet_data: Option<Option<PetData>>,
    pub playlist: Option<Vec<ResolvedConfig>>,
}

impl Update {
    pub fn is_empty(&self) -> bool {
        self.visible.is_none() && self.pet_data.is_none() && self.playlist.is_none()
    }
}

pub struct Scheduler {
    phase: Phase,
    visible: bool,
    pet_data: Option<PetData>,
    playlist: Vec<ResolvedConfig>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            phase: Phase::Uninitialized,
            visible: DEFAULT_VISIBLE,
            pet_data: None,
            playlist: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn pet_data(&self) -> Option<&PetData> {
        self.pet_data.as_ref()
    }

    pub fn playlist(&self) -> &[ResolvedConfig] {
        &self.playlist
    }

    /// First read of the store.
    pub fn initialize(
        &mut self,
        visible: bool,
        pet_data: Option<PetData>,
        playlist: Vec<ResolvedConfig>,
    ) -> Transition {
        self.visible = visible;
        self.pet_data = pet_data;
        self.playlist = playlist;
        self.settle()
    }

    /// Any change to what should be shown restarts the playlist from entry 0.
    /// Values equal to the ones already held are not a change.
    pub fn apply(&mut self, update: Update) -> Transition {
        let mut changed = false;

        if let Some(visible) = update.visible {
            if visible != self.visible {
                self.visible = visible;
                changed = true;
            }
        }
        if let Some(pet_data) = update.pet_data {
            if pet_data != self.pet_data {
                self.pet_data = pet_data;
                changed = true;
            }
        }
        if let Some(playlist) = update.playlist {
            if playlist != self.playlist {
                self.playlist = playlist;
                changed = true;
            }
        }

        if !changed || self.phase == Phase::Uninitialized {
            return Transition::Stay;
        }
        self.settle()
    }

    pub fn toggle_visibility(&mut self) -> (bool, Transition) {
        let visible = !self.visible;
        let transition = self.apply(Update {
            visible: Some(visible),
            ..Default::default()
        });
        (visible, transition)
    }

    /// The current entry's duration ran out: move to the next one, wrapping.
    pub fn duration_elapsed(&mut self) -> Transition {
        let Phase::Displaying(index) = self.phase else {
            return Transition::Stay;
        };
        if self.playlist.is_empty() {
            return self.settle();
        }

        let next = (index + 1) % self.playlist.len();
        self.phase = Phase::Displaying(next);
        Transition::Advance(self.slide(next))
    }

    pub fn unload(&mut self) -> Transition {
        let was_displaying = matches!(self.phase, Phase::Displaying(_));
        self.phase = Phase::IdleHidden;
        if was_displaying {
            Transition::Hide
        } else {
            Transition::Stay
        }
    }

    fn settle(&mut self) -> Transition {
        match &self.pet_data {
            Some(data) if self.visible && !self.playlist.is_empty() => {
                let pet = data.pet.clone();
                self.phase = Phase::Displaying(0);
                Transition::Rebuild {
                    pet,
                    slide: self.slide(0),
                }
            }
            _ => {
                self.phase = Phase::IdleHidden;
                Transition::Hide
            }
        }
    }

    fn slide(&self, index: usize) -> Slide {
        let config = self.playlist[index].clone();
        let asset = self
            .pet_data
            .as_ref()
            .and_then(|data| match data.require_asset(&config.id) {
                Ok(asset) => Some(asset.clone()),
                Err(e) => {
                    tracing::debug!("Skipping playlist entry {}: {}", index, e);
                    None
                }
            });

        Slide {
            index,
            config,
            asset,
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

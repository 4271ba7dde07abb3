// Every default the extension applies lives here. Values read from the store
// pass through `settle`/`resolve` once; consumers never patch in their own.

use std::time::Duration;

use crate::orbit::sprite::SpriteSheet;
use crate::services::storage::StoreSnapshot;
use crate::types::{OrbitAssetConfig, OrbitMode, PetData};

pub const DEFAULT_VISIBLE: bool = true;
pub const DEFAULT_DURATION_SECS: u32 = 5;
pub const DEFAULT_FRAME_SIZE: u32 = 500;
pub const DEFAULT_FRAME_COUNT: u32 = 4;
pub const DEFAULT_FRAME_RATE: u32 = 4;
pub const DEFAULT_SHEET_COLUMNS: u32 = 2;
/// Frames per second above this are played at this rate.
pub const MAX_FRAME_RATE: u32 = 1000;

/// Store contents with defaults applied.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub sui_address: Option<String>,
    pub pet_id: Option<String>,
    pub pet_data: Option<PetData>,
    pub playlist: Vec<OrbitAssetConfig>,
    pub visible: bool,
}

pub fn settle(snapshot: StoreSnapshot) -> Settings {
    Settings {
        sui_address: snapshot.sui_address.filter(|a| !a.trim().is_empty()),
        pet_id: snapshot.pet_id.filter(|p| !p.is_empty()),
        pet_data: snapshot.pet_data,
        playlist: snapshot.orbit_asset_config.unwrap_or_default(),
        visible: snapshot.pet_companion_visible.unwrap_or(DEFAULT_VISIBLE),
    }
}

/// Entry appended when an asset joins the playlist.
pub fn new_entry(asset_id: &str) -> OrbitAssetConfig {
    OrbitAssetConfig {
        id: asset_id.to_string(),
        mode: OrbitMode::Static,
        duration: DEFAULT_DURATION_SECS,
        frame_size: None,
        frame_count: None,
        frame_rate: None,
        columns: None,
    }
}

/// Fill the sprite-sheet fields an animated entry needs, keeping any already set.
pub fn fill_animated(entry: &mut OrbitAssetConfig) {
    entry.frame_size.get_or_insert(DEFAULT_FRAME_SIZE);
    entry.frame_count.get_or_insert(DEFAULT_FRAME_COUNT);
    entry.frame_rate.get_or_insert(DEFAULT_FRAME_RATE);
    entry.columns.get_or_insert(DEFAULT_SHEET_COLUMNS);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Display {
    Static,
    Animated(SpriteSheet),
}

/// A playlist entry with every value concrete and in range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub id: String,
    pub duration: Duration,
    pub display: Display,
}

pub fn resolve(entry: &OrbitAssetConfig) -> ResolvedConfig {
    let display = match entry.mode {
        OrbitMode::Static => Display::Static,
        OrbitMode::Animated => Display::Animated(SpriteSheet {
            frame_size: entry.frame_size.unwrap_or(DEFAULT_FRAME_SIZE).max(1),
            frame_count: entry.frame_count.unwrap_or(DEFAULT_FRAME_COUNT).max(1),
            frame_rate: entry
                .frame_rate
                .unwrap_or(DEFAULT_FRAME_RATE)
                .clamp(1, MAX_FRAME_RATE),
            columns: entry.columns.unwrap_or(DEFAULT_SHEET_COLUMNS).max(1),
        }),
    };

    ResolvedConfig {
        id: entry.id.clone(),
        duration: Duration::from_secs(u64::from(entry.duration.max(1))),
        display,
    }
}

pub fn resolve_playlist(playlist: &[OrbitAssetConfig]) -> Vec<ResolvedConfig> {
    playlist.iter().map(resolve).collect()
}

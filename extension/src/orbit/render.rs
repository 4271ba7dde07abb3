// What the companion looks like, separated from where it is drawn.
// `build_visual` and `companion_view` are pure; a `Surface` turns their output
// into pixels (DOM in a browser, log lines in the headless host).

use std::sync::{Arc, Mutex};

use super::sprite::{SpriteCell, SpriteSheet};
use crate::config::CompanionConfig;
use crate::defaults::{Display, ResolvedConfig};
use crate::types::{Asset, Pet};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PetBadge {
    Image { url: String, alt: String, size: u32 },
    Label(String),
}

/// The companion container: the pet itself, before any orbit asset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompanionView {
    pub pet_id: String,
    pub badge: PetBadge,
}

pub fn companion_view(pet: &Pet, layout: &CompanionConfig) -> CompanionView {
    let badge = match &pet.image_url {
        Some(url) if !url.is_empty() => PetBadge::Image {
            url: url.clone(),
            alt: pet.name.clone(),
            size: layout.pet_size,
        },
        _ => PetBadge::Label(pet.name.clone()),
    };

    CompanionView {
        pet_id: pet.id.clone(),
        badge,
    }
}

/// The orbit asset currently attached to the companion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Visual {
    Image {
        asset_id: String,
        url: String,
        alt: String,
        size: u32,
        offset: Point,
    },
    /// Fixed-size drawing surface fed one sheet cell per tick.
    Sprite {
        asset_id: String,
        url: String,
        size: u32,
        offset: Point,
        sheet: SpriteSheet,
    },
}

impl Visual {
    pub fn asset_id(&self) -> &str {
        match self {
            Visual::Image { asset_id, .. } | Visual::Sprite { asset_id, .. } => asset_id,
        }
    }

    pub fn sheet(&self) -> Option<SpriteSheet> {
        match self {
            Visual::Sprite { sheet, .. } => Some(*sheet),
            Visual::Image { .. } => None,
        }
    }
}

pub fn build_visual(asset: &Asset, config: &ResolvedConfig, layout: &CompanionConfig) -> Visual {
    let offset = Point::new(layout.asset_offset_x, layout.asset_offset_y);
    match config.display {
        Display::Static => Visual::Image {
            asset_id: asset.id.clone(),
            url: asset.url.clone(),
            alt: asset.name.clone(),
            size: layout.asset_size,
            offset,
        },
        Display::Animated(sheet) => Visual::Sprite {
            asset_id: asset.id.clone(),
            url: asset.url.clone(),
            size: layout.animated_size,
            offset,
            sheet,
        },
    }
}

/// Drawing target for the companion. Calls arrive in a consistent order:
/// `mount` before any `show`, at most one visual at a time, `dispose`
/// before the next `show` and before `unmount`.
pub trait Surface: Send {
    fn mount(&mut self, view: &CompanionView);
    fn unmount(&mut self);
    fn show(&mut self, visual: &Visual);
    /// Remove the current visual.
    fn dispose(&mut self);
    fn blit(&mut self, cell: &SpriteCell);
    fn move_to(&mut self, at: Point);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SurfaceOp {
    Mount(CompanionView),
    Unmount,
    Show(Visual),
    Dispose,
    Blit(SpriteCell),
    MoveTo(Point),
}

/// Surface that records every call. Clones share the same log.
#[derive(Clone, Default)]
pub struct RecordingSurface {
    ops: Arc<Mutex<Vec<SurfaceOp>>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, op: SurfaceOp) {
        self.ops
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(op);
    }

    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.ops
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Asset ids in the order they were shown.
    pub fn shown(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                SurfaceOp::Show(v) => Some(v.asset_id().to_string()),
                _ => None,
            })
            .collect()
    }

    pub fn blitted_frames(&self) -> Vec<u32> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                SurfaceOp::Blit(cell) => Some(cell.frame),
                _ => None,
            })
            .collect()
    }

    /// Whether a companion is on screen after replaying the log.
    pub fn is_mounted(&self) -> bool {
        self.ops().iter().fold(false, |mounted, op| match op {
            SurfaceOp::Mount(_) => true,
            SurfaceOp::Unmount => false,
            _ => mounted,
        })
    }
}

impl Surface for RecordingSurface {
    fn mount(&mut self, view: &CompanionView) {
        self.push(SurfaceOp::Mount(view.clone()));
    }

    fn unmount(&mut self) {
        self.push(SurfaceOp::Unmount);
    }

    fn show(&mut self, visual: &Visual) {
        self.push(SurfaceOp::Show(visual.clone()));
    }

    fn dispose(&mut self) {
        self.push(SurfaceOp::Dispose);
    }

    fn blit(&mut self, cell: &SpriteCell) {
        self.push(SurfaceOp::Blit(*cell));
    }

    fn move_to(&mut self, at: Point) {
        self.push(SurfaceOp::MoveTo(at));
    }
}

/// Headless surface: reports what would be drawn through `tracing`.
#[derive(Default)]
pub struct TracingSurface {
    pet: Option<String>,
}

impl Surface for TracingSurface {
    fn mount(&mut self, view: &CompanionView) {
        let label = match &view.badge {
            PetBadge::Image { alt, url, .. } => format!("{} ({})", alt, url),
            PetBadge::Label(name) => name.clone(),
        };
        tracing::info!("🐾 Companion mounted: {}", label);
        self.pet = Some(view.pet_id.clone());
    }

    fn unmount(&mut self) {
        if let Some(pet) = self.pet.take() {
            tracing::info!("Companion for pet {} removed", pet);
        }
    }

    fn show(&mut self, visual: &Visual) {
        match visual {
            Visual::Image { alt, url, .. } => tracing::info!("Showing {} ({})", alt, url),
            Visual::Sprite { asset_id, sheet, .. } => tracing::info!(
                "Animating {}: {} frames @ {} fps, {}px cells",
                asset_id,
                sheet.frame_count,
                sheet.frame_rate,
                sheet.frame_size
            ),
        }
    }

    fn dispose(&mut self) {
        tracing::debug!("Orbit asset disposed");
    }

    fn blit(&mut self, cell: &SpriteCell) {
        tracing::trace!("frame {} @ ({}, {})", cell.frame, cell.x, cell.y);
    }

    fn move_to(&mut self, at: Point) {
        tracing::trace!("companion at ({}, {})", at.x, at.y);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults;
    use crate::types::OrbitMode;

    fn hat() -> Asset {
        Asset {
            id: "a1".into(),
            url: "http://x/a1.png".into(),
            name: "Hat".into(),
            description: String::new(),
            action: None,
            frames: None,
            attributes: None,
        }
    }

    #[test]
    fn test_static_visual_uses_small_footprint() {
        let layout = CompanionConfig::default();
        let config = defaults::resolve(&defaults::new_entry("a1"));

        let visual = build_visual(&hat(), &config, &layout);

        assert_eq!(
            visual,
            Visual::Image {
                asset_id: "a1".into(),
                url: "http://x/a1.png".into(),
                alt: "Hat".into(),
                size: 25,
                offset: Point::new(30, -30),
            }
        );
    }

    #[test]
    fn test_animated_visual_carries_sheet() {
        let layout = CompanionConfig::default();
        let mut entry = defaults::new_entry("a1");
        entry.mode = OrbitMode::Animated;
        entry.frame_count = Some(6);

        let visual = build_visual(&hat(), &defaults::resolve(&entry), &layout);

        let sheet = visual.sheet().unwrap();
        assert_eq!(sheet.frame_count, 6);
        assert_eq!(sheet.columns, 2);
        assert!(matches!(visual, Visual::Sprite { size: 40, .. }));
    }

    #[test]
    fn test_pet_without_image_gets_label() {
        let layout = CompanionConfig::default();
        let pet = Pet {
            id: "p1".into(),
            name: "Fluffy".into(),
            image_url: Some(String::new()),
        };

        assert_eq!(
            companion_view(&pet, &layout).badge,
            PetBadge::Label("Fluffy".into())
        );
    }
}

// Orbit renderer
// Follows the cursor with the pet and cycles its playlist of equipped assets

pub mod render;
pub mod sprite;
pub mod state;
pub mod timers;

pub use render::{Point, RecordingSurface, Surface, SurfaceOp, TracingSurface, Visual};
pub use state::{Phase, Scheduler, Slide, Transition, Update};
pub use timers::{TimerFired, Timers};

use crate::config::CompanionConfig;
use crate::defaults::{resolve_playlist, Settings};
use sprite::SpriteSheet;

/// Drives a `Surface` from the `Scheduler`. Owns both timers; every
/// transition cancels them before anything new is armed.
pub struct OrbitRenderer<S: Surface> {
    scheduler: Scheduler,
    timers: Timers,
    surface: S,
    layout: CompanionConfig,
    anchor: Option<Point>,
    mounted: bool,
    showing: bool,
    sprite: Option<SpriteSheet>,
    tick: u64,
}

impl<S: Surface> OrbitRenderer<S> {
    pub fn new(surface: S, layout: CompanionConfig) -> Self {
        Self {
            scheduler: Scheduler::new(),
            timers: Timers::new(),
            surface,
            layout,
            anchor: None,
            mounted: false,
            showing: false,
            sprite: None,
            tick: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.scheduler.phase()
    }

    pub fn is_visible(&self) -> bool {
        self.scheduler.is_visible()
    }

    pub fn has_pet_data(&self) -> bool {
        self.scheduler.pet_data().is_some()
    }

    pub fn live_timers(&self) -> usize {
        self.timers.live()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn initialize(&mut self, settings: &Settings) -> Phase {
        let transition = self.scheduler.initialize(
            settings.visible,
            settings.pet_data.clone(),
            resolve_playlist(&settings.playlist),
        );
        self.perform(transition);
        tracing::debug!("Orbit renderer initialized: {:?}", self.phase());
        self.phase()
    }

    pub fn update(&mut self, update: Update) -> Phase {
        if update.is_empty() {
            return self.phase();
        }
        let transition = self.scheduler.apply(update);
        self.perform(transition);
        self.phase()
    }

    /// Returns the new visibility.
    pub fn toggle_visibility(&mut self) -> bool {
        let (visible, transition) = self.scheduler.toggle_visibility();
        self.perform(transition);
        visible
    }

    pub fn pointer_moved(&mut self, at: Point) {
        self.anchor = Some(at);
        if self.mounted {
            let offset = self.layout.cursor_offset;
            self.surface.move_to(at.offset(offset, offset));
        }
    }

    pub fn unload(&mut self) {
        let transition = self.scheduler.unload();
        self.perform(transition);
    }

    /// Resolves when a timer is due. Pends forever while hidden.
    pub async fn next_timer(&mut self) -> TimerFired {
        self.timers.fired().await
    }

    pub fn on_timer(&mut self, fired: TimerFired) {
        match fired {
            TimerFired::Advance => {
                let transition = self.scheduler.duration_elapsed();
                self.perform(transition);
            }
            TimerFired::Frame => self.next_frame(),
        }
    }

    fn perform(&mut self, transition: Transition) {
        match transition {
            Transition::Stay => {}
            Transition::Hide => {
                tracing::debug!("Hiding companion");
                self.teardown();
            }
            Transition::Rebuild { pet, slide } => {
                self.teardown();
                let view = render::companion_view(&pet, &self.layout);
                self.surface.mount(&view);
                self.mounted = true;
                if let Some(at) = self.anchor {
                    let offset = self.layout.cursor_offset;
                    self.surface.move_to(at.offset(offset, offset));
                }
                self.present(slide);
            }
            Transition::Advance(slide) => {
                self.timers.cancel_all();
                self.dispose_visual();
                self.present(slide);
            }
        }
    }

    fn present(&mut self, slide: Slide) {
        if let Some(asset) = &slide.asset {
            let visual = render::build_visual(asset, &slide.config, &self.layout);
            self.surface.show(&visual);
            self.showing = true;

            if let Some(sheet) = visual.sheet() {
                self.sprite = Some(sheet);
                self.tick = 0;
                self.surface.blit(&sheet.cell(sheet.frame_at(0)));
                self.timers.arm_frames(sheet.frame_period());
            }
        }

        tracing::debug!(
            "Playlist entry {} ({}) for {:?}",
            slide.index,
            slide.config.id,
            slide.config.duration
        );
        self.timers.arm_advance(slide.config.duration);
    }

    fn next_frame(&mut self) {
        if let Some(sheet) = self.sprite {
            self.tick += 1;
            self.surface.blit(&sheet.cell(sheet.frame_at(self.tick)));
        }
    }

    fn dispose_visual(&mut self) {
        if self.showing {
            self.surface.dispose();
            self.showing = false;
        }
        self.sprite = None;
        self.tick = 0;
    }

    fn teardown(&mut self) {
        self.timers.cancel_all();
        self.dispose_visual();
        if self.mounted {
            self.surface.unmount();
            self.mounted = false;
        }
    }
}

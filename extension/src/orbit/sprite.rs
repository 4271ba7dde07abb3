use std::time::Duration;

/// Geometry and playback rate of a sprite sheet: square cells of
/// `frame_size` pixels laid out row-major, `columns` cells per row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpriteSheet {
    pub frame_size: u32,
    pub frame_count: u32,
    pub frame_rate: u32,
    pub columns: u32,
}

/// Source rectangle of one frame within the sheet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpriteCell {
    pub frame: u32,
    pub x: u32,
    pub y: u32,
    pub size: u32,
}

impl SpriteSheet {
    /// Frame shown on animation tick `tick` (0-based, wraps forever).
    pub fn frame_at(&self, tick: u64) -> u32 {
        (tick % u64::from(self.frame_count.max(1))) as u32
    }

    pub fn cell(&self, frame: u32) -> SpriteCell {
        let columns = self.columns.max(1);
        SpriteCell {
            frame,
            x: (frame % columns).saturating_mul(self.frame_size),
            y: (frame / columns).saturating_mul(self.frame_size),
            size: self.frame_size,
        }
    }

    /// Time between two animation ticks. Never zero.
    pub fn frame_period(&self) -> Duration {
        (Duration::from_secs(1) / self.frame_rate.max(1)).max(Duration::from_nanos(1))
    }
}

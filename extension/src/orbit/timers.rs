use std::future::pending;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior, Sleep};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerFired {
    /// The current playlist entry's duration ran out.
    Advance,
    /// Next sprite frame is due.
    Frame,
}

/// The renderer's only two timers. Arming one replaces whatever was armed
/// before, so at most one of each is ever live.
#[derive(Default)]
pub struct Timers {
    advance: Option<Pin<Box<Sleep>>>,
    frames: Option<Interval>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm_advance(&mut self, after: Duration) {
        self.advance = Some(Box::pin(sleep(after)));
    }

    /// First tick one `period` from now; frame 0 is drawn by the caller.
    pub fn arm_frames(&mut self, period: Duration) {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.frames = Some(interval);
    }

    pub fn cancel_all(&mut self) {
        self.advance = None;
        self.frames = None;
    }

    pub fn live(&self) -> usize {
        usize::from(self.advance.is_some()) + usize::from(self.frames.is_some())
    }

    /// Wait for the next timer. Pends forever when nothing is armed.
    /// The advance timer wins when both are due at the same instant.
    pub async fn fired(&mut self) -> TimerFired {
        let Timers { advance, frames } = self;

        tokio::select! {
            biased;
            _ = async {
                match advance.as_mut() {
                    Some(deadline) => deadline.await,
                    None => pending().await,
                }
            } => {
                *advance = None;
                TimerFired::Advance
            }
            _ = async {
                match frames.as_mut() {
                    Some(interval) => {
                        interval.tick().await;
                    }
                    None => pending::<()>().await,
                }
            } => TimerFired::Frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_advance_is_one_shot() {
        let mut timers = Timers::new();
        timers.arm_advance(Duration::from_secs(5));
        let start = Instant::now();

        assert_eq!(timers.fired().await, TimerFired::Advance);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(timers.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_tick_every_period() {
        let mut timers = Timers::new();
        timers.arm_frames(Duration::from_millis(250));
        let start = Instant::now();

        for n in 1..=3 {
            assert_eq!(timers.fired().await, TimerFired::Frame);
            assert_eq!(start.elapsed(), Duration::from_millis(250 * n));
        }
        assert_eq!(timers.live(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_replaces_instead_of_stacking() {
        let mut timers = Timers::new();
        for _ in 0..10 {
            timers.arm_advance(Duration::from_secs(5));
            timers.arm_frames(Duration::from_millis(250));
        }
        assert_eq!(timers.live(), 2);

        timers.cancel_all();
        assert_eq!(timers.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_armed_never_fires() {
        let mut timers = Timers::new();

        let result = tokio::time::timeout(Duration::from_secs(60), timers.fired()).await;

        assert!(result.is_err());
    }
}

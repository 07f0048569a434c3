use std::time::Duration;

use tokio::time::{interval, Instant, Interval, MissedTickBehavior};

/// Fixed-rate tick clock for the frame loop.
///
/// Timeline time is derived from the integer frame index rather than
/// accumulated, so the n-th tick is always exactly `n / fps`. Wall-clock
/// pacing comes from a tokio interval that delays instead of bursting when
/// a tick overruns (for example after a blocking seek).
pub struct FrameClock {
    fps: u32,
    frame: u64,
    pacer: Interval,
    origin: Instant,
}

impl FrameClock {
    /// Must be called from within a tokio runtime
    pub fn new(fps: u32) -> Self {
        let fps = fps.max(1);
        let mut pacer = interval(Duration::from_nanos(1_000_000_000 / fps as u64));
        pacer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            fps,
            frame: 0,
            pacer,
            origin: Instant::now(),
        }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Index of the frame about to be rendered
    pub fn frame_index(&self) -> u64 {
        self.frame
    }

    /// Timeline time of the frame about to be rendered
    pub fn time(&self) -> f64 {
        self.frame as f64 / self.fps as f64
    }

    /// Step to the next frame and return its timeline time
    pub fn advance(&mut self) -> f64 {
        self.frame += 1;
        self.time()
    }

    /// Wait for the next tick of the host frame clock
    pub async fn wait_tick(&mut self) {
        self.pacer.tick().await;
    }

    /// How far wall-clock time has run ahead of timeline time
    pub fn lag(&self) -> Duration {
        self.origin
            .elapsed()
            .saturating_sub(Duration::from_secs_f64(self.time()))
    }

    /// Frames needed to cover `duration` seconds
    pub fn frames_for(&self, duration: f64) -> u64 {
        (duration * self.fps as f64 - 1e-9).ceil().max(0.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_time_derives_from_frame_index() {
        let mut clock = FrameClock::new(60);
        assert_eq!(clock.time(), 0.0);

        let mut last = 0.0;
        for _ in 0..600 {
            last = clock.advance();
        }
        assert_eq!(last, 10.0);
        assert_eq!(clock.frame_index(), 600);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_are_paced() {
        let mut clock = FrameClock::new(50);
        let start = Instant::now();
        for _ in 0..5 {
            clock.wait_tick().await;
        }
        // First tick fires immediately, the rest every 20ms
        assert_eq!(start.elapsed(), Duration::from_millis(80));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrun_delays_instead_of_bursting() {
        let mut clock = FrameClock::new(10);
        clock.wait_tick().await;

        tokio::time::sleep(Duration::from_millis(350)).await;
        let before = Instant::now();
        clock.wait_tick().await;
        clock.wait_tick().await;
        assert!(before.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_for_duration() {
        let clock = FrameClock::new(60);
        assert_eq!(clock.frames_for(10.0), 600);
        assert_eq!(clock.frames_for(10.005), 601);
        assert_eq!(clock.frames_for(0.0), 0);
    }
}

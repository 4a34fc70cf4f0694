//! Frame clock with nanosecond resolution.

use std::time::{Duration, Instant};

/// Measures time since the last presented frame.
///
/// Camera movement is scaled by the time elapsed since the previous frame
/// finished, so the delta is read (`since_last_frame`) while input is
/// processed and reset (`mark_frame`) once the frame has been submitted.
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last_frame: Instant,
    frames: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_frame: now,
            frames: 0,
        }
    }

    /// Time since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time since the last [`mark_frame`](Self::mark_frame), without resetting it.
    pub fn since_last_frame(&self) -> Duration {
        self.last_frame.elapsed()
    }

    /// Nanoseconds since the last frame.
    pub fn since_last_frame_nanos(&self) -> u128 {
        self.since_last_frame().as_nanos()
    }

    /// Seconds since the last frame as `f32`, the unit camera speeds use.
    pub fn delta_secs(&self) -> f32 {
        self.since_last_frame().as_secs_f32()
    }

    /// Records the end of a frame and returns the duration it took.
    pub fn mark_frame(&mut self) -> Duration {
        let now = Instant::now();
        let frame_time = now - self.last_frame;
        self.last_frame = now;
        self.frames += 1;
        frame_time
    }

    /// Number of frames marked so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_frame_counts_and_resets_delta() {
        let mut clock = FrameClock::new();
        std::thread::sleep(Duration::from_millis(2));

        let before = clock.since_last_frame();
        assert!(before >= Duration::from_millis(2));

        let frame_time = clock.mark_frame();
        assert!(frame_time >= before);
        assert_eq!(clock.frame_count(), 1);
        assert!(clock.since_last_frame() < frame_time);
    }

    #[test]
    fn test_since_last_frame_does_not_reset() {
        let clock = FrameClock::new();
        std::thread::sleep(Duration::from_millis(1));
        let a = clock.since_last_frame_nanos();
        let b = clock.since_last_frame_nanos();
        assert!(b >= a);
        assert_eq!(clock.frame_count(), 0);
    }
}

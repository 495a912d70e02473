use std::sync::Mutex;
use std::time::Instant;

use crate::gsm_time::{frames_to_duration, Time, FRAMES_PER_HYPERFRAME};

/// The base-station master clock.
///
/// Tracks the current frame number against wall time at the 4.615 ms frame
/// cadence. Process-wide: the radio manager sets it from the transceiver's
/// reported time, every encoder reads it and throttles on `wait`.
pub struct BtsClock {
    state: Mutex<ClockState>,
}

struct ClockState {
    base_f: u32,
    base_at: Instant,
}

impl Default for BtsClock {
    fn default() -> Self {
        BtsClock::new()
    }
}

impl BtsClock {
    pub fn new() -> Self {
        BtsClock {
            state: Mutex::new(ClockState {
                base_f: 0,
                base_at: Instant::now(),
            }),
        }
    }

    /// Re-anchor the clock to frame `f` as of now.
    pub fn set(&self, f: u32) {
        let mut state = self.state.lock().expect("clock lock poisoned");
        state.base_f = f % FRAMES_PER_HYPERFRAME;
        state.base_at = Instant::now();
    }

    /// Current frame number.
    pub fn fn_now(&self) -> u32 {
        let state = self.state.lock().expect("clock lock poisoned");
        let elapsed_frames = (state.base_at.elapsed().as_micros() * 26 / 120_000) as u64;
        ((state.base_f as u64 + elapsed_frames) % FRAMES_PER_HYPERFRAME as u64) as u32
    }

    /// Current time, at frame granularity.
    pub fn time(&self) -> Time {
        Time::new(self.fn_now(), 0)
    }

    /// Block the caller until the clock reaches `target`'s frame.
    /// Returns immediately if the target frame is now or in the past.
    pub fn wait(&self, target: Time) {
        loop {
            let now = self.time();
            let ahead = target.delta_frames(now);
            if ahead <= 0 {
                return;
            }
            std::thread::sleep(frames_to_duration(ahead as u32));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let clock = BtsClock::new();
        clock.set(1000);
        let f0 = clock.fn_now();
        assert!(f0 >= 1000);
        std::thread::sleep(std::time::Duration::from_millis(15));
        let f1 = clock.fn_now();
        // 15 ms is at least 3 frames
        assert!(f1 >= f0 + 3, "clock did not advance: {} -> {}", f0, f1);
    }

    #[test]
    fn test_wait_past_target_returns() {
        let clock = BtsClock::new();
        clock.set(500);
        // Target already behind the clock: must not block.
        clock.wait(Time::new(100, 0));
    }

    #[test]
    fn test_wait_until_future_frame() {
        let clock = BtsClock::new();
        clock.set(0);
        clock.wait(Time::new(4, 0));
        assert!(clock.fn_now() >= 4);
    }
}

use core::fmt;
use std::time::Duration;

/// Frames per hyperframe (GSM 05.02 4.3.3): 2048 superframes of 26x51 frames.
pub const FRAMES_PER_HYPERFRAME: u32 = 2048 * 26 * 51;

/// Timeslots per TDMA frame.
pub const SLOTS_PER_FRAME: u32 = 8;

/// Value of the burst-count representation where it wraps back to 0.
pub const TIME_INT_WRAP: i64 = FRAMES_PER_HYPERFRAME as i64 * SLOTS_PER_FRAME as i64;

/// One TDMA frame is 120/26 ms (GSM 05.10).
pub fn frames_to_duration(frames: u32) -> Duration {
    Duration::from_micros(frames as u64 * 120_000 / 26)
}

/// Difference between two burst-count times, handling hyperframe wrap-around.
/// The result is signed towards the closer direction, range +/- half a hyperframe.
pub fn time_int_diff(a: i64, b: i64) -> i64 {
    let mut diff = a - b;
    while diff < -TIME_INT_WRAP / 2 {
        diff += TIME_INT_WRAP;
    }
    while diff >= TIME_INT_WRAP / 2 {
        diff -= TIME_INT_WRAP;
    }
    diff
}

/// A TDMA position: frame number within the hyperframe plus timeslot.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Time {
    /// Frame number, 0 to FRAMES_PER_HYPERFRAME-1
    pub f: u32,
    /// Timeslot number, 0 to 7
    pub t: u8,
}

impl Default for Time {
    fn default() -> Time {
        Time { f: 0, t: 0 }
    }
}

impl Time {
    pub fn new(f: u32, t: u8) -> Time {
        assert!(t < 8, "timeslot must be 0..7");
        Time { f: f % FRAMES_PER_HYPERFRAME, t }
    }

    /// Convert to a burst count within the hyperframe.
    pub fn to_int(self) -> i64 {
        self.f as i64 * SLOTS_PER_FRAME as i64 + self.t as i64
    }

    /// Add a number of frames, wrapping at the hyperframe.
    pub fn add_frames(self, frames: i32) -> Time {
        let f = (self.f as i64 + frames as i64).rem_euclid(FRAMES_PER_HYPERFRAME as i64) as u32;
        Time { f, t: self.t }
    }

    /// Advance the frame number to the next frame that is congruent to
    /// `target` modulo `modulus` (GSM 05.02 Clause 7 transmit scheduling).
    /// If the frame number already matches, the time is unchanged.
    pub fn roll_forward(&mut self, target: u32, modulus: u32) {
        assert!(modulus < FRAMES_PER_HYPERFRAME);
        let delta = (target + modulus - self.f % modulus) % modulus;
        self.f = (self.f + delta) % FRAMES_PER_HYPERFRAME;
    }

    /// Signed difference in bursts on the hyperframe ring.
    pub fn diff(self, other: Time) -> i64 {
        time_int_diff(self.to_int(), other.to_int())
    }

    /// Signed difference in whole frames on the hyperframe ring.
    pub fn delta_frames(self, other: Time) -> i32 {
        let mut diff = self.f as i64 - other.f as i64;
        let wrap = FRAMES_PER_HYPERFRAME as i64;
        while diff < -wrap / 2 {
            diff += wrap;
        }
        while diff >= wrap / 2 {
            diff -= wrap;
        }
        diff as i32
    }
}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.diff(*other).cmp(&0))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.f, self.t)
    }
}

impl fmt::Debug for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.f, self.t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roll_forward() {
        let mut t = Time::new(100, 2);
        t.roll_forward(100 % 51, 51);
        assert_eq!(t.f, 100);
        t.roll_forward(0, 51);
        assert_eq!(t.f, 102); // 102 % 51 == 0
        t.roll_forward(10, 51);
        assert_eq!(t.f, 112);
        assert_eq!(t.t, 2);
    }

    #[test]
    fn test_roll_forward_wraps_hyperframe() {
        let mut t = Time::new(FRAMES_PER_HYPERFRAME - 1, 0);
        t.roll_forward(3, 51);
        // FRAMES_PER_HYPERFRAME-1 = 2715647, 2715647 % 51 = 26, advance 28 frames
        assert_eq!(t.f, 27);
    }

    #[test]
    fn test_diff_ring() {
        let a = Time::new(0, 0);
        let b = Time::new(FRAMES_PER_HYPERFRAME - 1, 7);
        // a is one burst after b on the ring
        assert_eq!(a.diff(b), 1);
        assert_eq!(b.diff(a), -1);
        assert!(a > b);
    }

    #[test]
    fn test_diff_in_bursts() {
        let a = Time::new(10, 3);
        let b = Time::new(10, 0);
        assert_eq!(a.diff(b), 3);
        let c = Time::new(12, 0);
        assert_eq!(c.diff(b), 16);
    }

    #[test]
    fn test_delta_frames() {
        let a = Time::new(5, 0);
        let b = Time::new(FRAMES_PER_HYPERFRAME - 5, 0);
        assert_eq!(a.delta_frames(b), 10);
        assert_eq!(b.delta_frames(a), -10);
    }
}

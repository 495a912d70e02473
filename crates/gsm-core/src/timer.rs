use std::time::{Duration, Instant};

/// Millisecond countdown timer for the L1 channel state machines
/// (T3101, T3109, T3111 of GSM 04.08 11.1).
///
/// A timer is inactive until `set`, then runs towards expiry; `reset`
/// stops it. Expiry is observed lazily by the inspectors.
#[derive(Debug, Clone, Copy)]
pub struct CountdownTimer {
    limit: Duration,
    started: Option<Instant>,
}

impl CountdownTimer {
    pub fn new(limit_ms: u64) -> Self {
        CountdownTimer {
            limit: Duration::from_millis(limit_ms),
            started: None,
        }
    }

    /// Start (or restart) the countdown.
    pub fn set(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Stop the countdown.
    pub fn reset(&mut self) {
        self.started = None;
    }

    /// True if the timer is running or has expired.
    pub fn active(&self) -> bool {
        self.started.is_some()
    }

    /// True if the timer was set and its limit has passed.
    pub fn expired(&self) -> bool {
        match self.started {
            Some(at) => at.elapsed() >= self.limit,
            None => false,
        }
    }
}

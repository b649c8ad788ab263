//! Peak hold for meter displays
//!
//! Retains the highest reading seen and drops back to the floor exactly
//! `hold` after the last new peak. There is no gradual decay.

use std::time::{Duration, Instant};

use super::meter::{clamp_db, FLOOR_DB};

/// Default hold time
pub const DEFAULT_PEAK_HOLD: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone)]
pub struct PeakHold {
    hold: Duration,
    peak: f32,
    peak_set_at: Option<Instant>,
}

impl PeakHold {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            peak: FLOOR_DB,
            peak_set_at: None,
        }
    }

    /// Feed a reading taken at `now`; returns the held peak
    ///
    /// The returned peak is never below `reading`.
    pub fn update(&mut self, reading: f32, now: Instant) -> f32 {
        self.release_if_expired(now);

        let reading = clamp_db(reading);
        if reading > self.peak {
            self.peak = reading;
            self.peak_set_at = Some(now);
        }
        self.peak
    }

    /// Held peak at `now` without feeding a reading
    pub fn peak_at(&self, now: Instant) -> f32 {
        match self.peak_set_at {
            Some(set_at) if now.saturating_duration_since(set_at) < self.hold => self.peak,
            _ => FLOOR_DB,
        }
    }

    pub fn reset(&mut self) {
        self.peak = FLOOR_DB;
        self.peak_set_at = None;
    }

    fn release_if_expired(&mut self, now: Instant) {
        if let Some(set_at) = self.peak_set_at {
            if now.saturating_duration_since(set_at) >= self.hold {
                self.reset();
            }
        }
    }
}

impl Default for PeakHold {
    fn default() -> Self {
        Self::new(DEFAULT_PEAK_HOLD)
    }
}

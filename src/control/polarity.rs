//! Polarity scheduler: the two-state dwell timer behind the H-bridge.
//!
//! ```text
//!        elapsed >= forward_us            elapsed >= reverse_us
//!  FORWARD ─────────────────────▶ REVERSE ─────────────────────▶ FORWARD
//! ```
//!
//! Timing runs on the microsecond clock captured once per loop iteration.
//! The scheduler never touches hardware; [`PolarityScheduler::advance`]
//! returns the new direction and the caller drives the bridge within the
//! same iteration.

use serde::Serialize;

/// Direction of current through the cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn flipped(self) -> Self {
        match self {
            Self::Forward => Self::Reverse,
            Self::Reverse => Self::Forward,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PolarityScheduler {
    direction: Direction,
    last_flip_us: u64,
    forward_us: u64,
    reverse_us: u64,
}

impl PolarityScheduler {
    pub fn new(forward_ms: u32, reverse_ms: u32) -> Self {
        Self {
            direction: Direction::Forward,
            last_flip_us: 0,
            forward_us: u64::from(forward_ms) * 1000,
            reverse_us: u64::from(reverse_ms) * 1000,
        }
    }

    /// Restart the dwell timer in `Forward` at `now_us` (run start).
    pub fn start(&mut self, now_us: u64) {
        self.direction = Direction::Forward;
        self.last_flip_us = now_us;
    }

    /// Flip when the active direction's dwell has elapsed.
    ///
    /// Returns `Some(new_direction)` on a flip, `None` otherwise.  A clock
    /// reading older than the last flip is treated as zero elapsed time.
    pub fn advance(&mut self, now_us: u64) -> Option<Direction> {
        let elapsed = now_us.saturating_sub(self.last_flip_us);
        if elapsed < self.active_dwell_us() {
            return None;
        }
        self.direction = self.direction.flipped();
        self.last_flip_us = now_us;
        Some(self.direction)
    }

    /// Takes effect on the next `advance`; the running dwell is not restarted.
    pub fn set_forward_ms(&mut self, ms: u32) {
        self.forward_us = u64::from(ms) * 1000;
    }

    pub fn set_reverse_ms(&mut self, ms: u32) {
        self.reverse_us = u64::from(ms) * 1000;
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn last_flip_us(&self) -> u64 {
        self.last_flip_us
    }

    pub fn active_dwell_us(&self) -> u64 {
        match self.direction {
            Direction::Forward => self.forward_us,
            Direction::Reverse => self.reverse_us,
        }
    }
}

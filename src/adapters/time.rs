//! Monotonic clock.
//!
//! - **`target_os = "espidf"`**: `esp_timer_get_time()`, the ESP-IDF
//!   high-resolution timer (microseconds since boot).
//! - **host**: `std::time::Instant` captured at construction.
//!
//! The control loop reads the clock once per iteration and passes both
//! units down, so every decision in an iteration sees the same instant.

pub struct MonotonicClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Microseconds since boot.
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        // SAFETY: reads a free-running hardware counter.
        let us = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
        us.max(0) as u64
    }

    /// Microseconds since construction.
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX)
    }

    /// `(ms, us)` from a single read.
    pub fn now(&self) -> (u64, u64) {
        let us = self.uptime_us();
        (us / 1_000, us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ms_and_us_agree() {
        let clock = MonotonicClock::new();
        let (ms, us) = clock.now();
        assert_eq!(ms, us / 1_000);
        assert!(clock.uptime_us() >= us);
    }
}

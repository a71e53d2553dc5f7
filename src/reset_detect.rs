//! Provisioning-reset detectors.
//!
//! Two independent gestures request the same action (wipe saved networks
//! and identity, open the portal):
//!
//! | Detector              | Evidence                       | Fires when                  |
//! |-----------------------|--------------------------------|-----------------------------|
//! | [`PowerCycleDetector`]| boot counter in flash          | 3 boots, each < 10 s apart  |
//! | [`PressWindow`]       | ring of debounced press times  | 3 presses within 5 s        |
//!
//! Both discard their evidence when they fire so one gesture yields one
//! reset.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::StoragePort;
use crate::config;
use crate::error::StorageError;

/// Which gesture requested the reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetSource {
    PowerCycles,
    ButtonPresses,
}

// ───────────────────────────────────────────────────────────────
// Power-cycle counter
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct BootRecord {
    count: u32,
}

/// Result of the boot-time check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootCheck {
    /// Counting; the value is the number of quick boots so far.
    Counting(u32),
    Triggered,
}

/// Counts boots that happen before the previous boot survived the window.
///
/// The counter is incremented at boot and cleared once the device has been
/// up for [`config::POWER_CYCLE_WINDOW_MS`], so only rapid power cycling
/// accumulates.
#[derive(Debug, Clone)]
pub struct PowerCycleDetector {
    threshold: u32,
    window_ms: u64,
    armed: bool,
}

impl Default for PowerCycleDetector {
    fn default() -> Self {
        Self::new(config::POWER_CYCLE_RESET_COUNT, config::POWER_CYCLE_WINDOW_MS)
    }
}

impl PowerCycleDetector {
    pub fn new(threshold: u32, window_ms: u64) -> Self {
        Self {
            threshold,
            window_ms,
            armed: false,
        }
    }

    /// Call once per boot before anything else reads the network table.
    pub fn on_boot(&mut self, storage: &mut impl StoragePort) -> BootCheck {
        let mut record = read_record(storage);
        record.count = record.count.saturating_add(1);

        if record.count >= self.threshold {
            info!("Reset: {} rapid power cycles detected", record.count);
            clear_record(storage);
            self.armed = false;
            return BootCheck::Triggered;
        }

        match postcard::to_allocvec(&record) {
            Ok(bytes) => {
                if let Err(e) =
                    storage.write(config::STORAGE_NAMESPACE, config::POWER_CYCLE_KEY, &bytes)
                {
                    warn!("Reset: boot counter write failed ({})", e);
                }
            }
            Err(_) => warn!("Reset: boot counter encode failed"),
        }
        self.armed = true;
        BootCheck::Counting(record.count)
    }

    /// Clear the counter once the window has elapsed since boot.
    pub fn poll(&mut self, uptime_ms: u64, storage: &mut impl StoragePort) {
        if self.armed && uptime_ms >= self.window_ms {
            self.armed = false;
            clear_record(storage);
            info!("Reset: power-cycle window closed, counter cleared");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

fn read_record(storage: &impl StoragePort) -> BootRecord {
    let mut buf = [0u8; 16];
    match storage.read(config::STORAGE_NAMESPACE, config::POWER_CYCLE_KEY, &mut buf) {
        Ok(len) => postcard::from_bytes(&buf[..len]).unwrap_or_else(|_| {
            warn!("Reset: boot counter corrupt, restarting count");
            BootRecord::default()
        }),
        Err(StorageError::NotFound) => BootRecord::default(),
        Err(e) => {
            warn!("Reset: boot counter read failed ({})", e);
            BootRecord::default()
        }
    }
}

fn clear_record(storage: &mut impl StoragePort) {
    if let Err(e) = storage.delete(config::STORAGE_NAMESPACE, config::POWER_CYCLE_KEY) {
        warn!("Reset: boot counter clear failed ({})", e);
    }
}

// ───────────────────────────────────────────────────────────────
// Button press window
// ───────────────────────────────────────────────────────────────

/// Ring of the most recent debounced press timestamps.
#[derive(Debug, Clone)]
pub struct PressWindow {
    presses: [Option<u64>; config::BUTTON_RESET_COUNT],
    next: usize,
    window_ms: u64,
}

impl Default for PressWindow {
    fn default() -> Self {
        Self::new(config::BUTTON_RESET_WINDOW_MS)
    }
}

impl PressWindow {
    pub fn new(window_ms: u64) -> Self {
        Self {
            presses: [None; config::BUTTON_RESET_COUNT],
            next: 0,
            window_ms,
        }
    }

    /// Record a press at `now_ms`; `true` when the ring is full of presses
    /// inside the window.  The ring is emptied on trigger.
    pub fn record(&mut self, now_ms: u64) -> bool {
        self.presses[self.next] = Some(now_ms);
        self.next = (self.next + 1) % self.presses.len();

        let recent = self
            .presses
            .iter()
            .flatten()
            .filter(|&&t| now_ms.saturating_sub(t) <= self.window_ms)
            .count();

        if recent >= self.presses.len() {
            self.clear();
            return true;
        }
        false
    }

    /// Drop stale presses.
    pub fn expire(&mut self, now_ms: u64) {
        for slot in &mut self.presses {
            if slot.is_some_and(|t| now_ms.saturating_sub(t) > self.window_ms) {
                *slot = None;
            }
        }
    }

    pub fn clear(&mut self) {
        self.presses = [None; config::BUTTON_RESET_COUNT];
        self.next = 0;
    }

    pub fn pending(&self) -> usize {
        self.presses.iter().flatten().count()
    }
}

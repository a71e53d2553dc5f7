//! Task Watchdog Timer (TWDT) and loop budget monitor.
//!
//! [`Watchdog`] wraps the ESP-IDF TWDT so a wedged control loop resets the
//! device.  [`LoopBudget`] is the softer check: it warns when a single
//! iteration overruns the budget that keeps polarity timing on schedule.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use log::warn;

use crate::config;

/// Time without a feed before the TWDT panics.
const TWDT_TIMEOUT_MS: u32 = 5_000;

pub struct Watchdog {
    #[cfg(target_os = "espidf")]
    subscribed: bool,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog {
    /// Initialise and subscribe the current task to the TWDT.
    pub fn new() -> Self {
        #[cfg(target_os = "espidf")]
        {
            let cfg = esp_task_wdt_config_t {
                timeout_ms: TWDT_TIMEOUT_MS,
                idle_core_mask: 0,
                trigger_panic: true,
            };
            // SAFETY: plain FFI calls with a valid config; current task handle is null.
            let ret = unsafe { esp_task_wdt_reconfigure(&cfg) };
            if ret != ESP_OK {
                warn!("TWDT reconfigure returned {} (may already be configured)", ret);
            }
            let ret = unsafe { esp_task_wdt_add(core::ptr::null_mut()) };
            let subscribed = ret == ESP_OK;
            if subscribed {
                log::info!("Watchdog: subscribed ({} ms timeout, panic on trigger)", TWDT_TIMEOUT_MS);
            } else {
                warn!("Watchdog: failed to subscribe ({})", ret);
            }
            Self { subscribed }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            log::info!("Watchdog(sim): no-op ({} ms)", TWDT_TIMEOUT_MS);
            Self {}
        }
    }

    /// Feed the watchdog.  Called once per loop iteration.
    pub fn feed(&self) {
        #[cfg(target_os = "espidf")]
        {
            if self.subscribed {
                // SAFETY: the current task subscribed in `new`.
                unsafe {
                    esp_task_wdt_reset();
                }
            }
        }
    }
}

// ── Loop budget ───────────────────────────────────────────────

/// Warns about iterations slower than the budget, at most once per
/// `report_every_us`, with the number of overruns since the last report.
#[derive(Debug, Clone)]
pub struct LoopBudget {
    budget_us: u64,
    report_every_us: u64,
    last_report_us: Option<u64>,
    overruns: u32,
    worst_us: u64,
}

impl Default for LoopBudget {
    fn default() -> Self {
        Self::new(config::LOOP_BUDGET_US, 10_000_000)
    }
}

impl LoopBudget {
    pub fn new(budget_us: u64, report_every_us: u64) -> Self {
        Self {
            budget_us,
            report_every_us,
            last_report_us: None,
            overruns: 0,
            worst_us: 0,
        }
    }

    /// Record one iteration that ran from `start_us` to `end_us`.
    /// Returns `true` when a warning was logged.
    pub fn record(&mut self, start_us: u64, end_us: u64) -> bool {
        let took = end_us.saturating_sub(start_us);
        if took <= self.budget_us {
            return false;
        }
        self.overruns += 1;
        self.worst_us = self.worst_us.max(took);

        let due = self
            .last_report_us
            .is_none_or(|last| end_us.saturating_sub(last) >= self.report_every_us);
        if !due {
            return false;
        }
        warn!(
            "Loop: {} iteration(s) over {} us budget (worst {} us)",
            self.overruns, self.budget_us, self.worst_us
        );
        self.last_report_us = Some(end_us);
        self.overruns = 0;
        self.worst_us = 0;
        true
    }

    pub fn pending_overruns(&self) -> u32 {
        self.overruns
    }
}

//! Blackboard shared by every connectivity state handler.
//!
//! The connectivity service writes the inputs (time, link state, portal
//! submission, candidate plan) before each tick and drains the
//! [`NetRequest`] queue afterwards.  Handlers never call the radio or
//! flash themselves.

use log::warn;

use crate::config::{self, NameString};
use crate::credentials::{Credential, PortalSubmission, SsidString};

/// Last-used credential plus the whole table.
pub const PLAN_LEN: usize = config::MAX_NETWORKS + 1;
pub const REQUEST_QUEUE_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Reconnect backoff: `min(base · 2^failures, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    failures: u32,
    base_ms: u64,
    cap_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(config::RECONNECT_BASE_MS, config::RECONNECT_CAP_MS)
    }
}

impl Backoff {
    pub fn new(base_ms: u64, cap_ms: u64) -> Self {
        Self {
            failures: 0,
            base_ms,
            cap_ms,
        }
    }

    pub fn interval_ms(&self) -> u64 {
        let factor = 1u64.checked_shl(self.failures).unwrap_or(u64::MAX);
        self.base_ms.saturating_mul(factor).min(self.cap_ms)
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

// ---------------------------------------------------------------------------
// Attempts and requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOrigin {
    /// Index into the candidate plan.
    Plan(usize),
    /// Credentials typed into the provisioning portal.
    Submission { name: Option<NameString> },
}

/// One in-flight association attempt, abandoned at `deadline_ms`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub credential: Credential,
    pub deadline_ms: u64,
    pub origin: AttemptOrigin,
}

/// Side effects requested by state handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetRequest {
    /// Start a non-blocking association.
    Connect(Credential),
    Disconnect,
    StartPortal,
    StopPortal,
    /// Record a successful connection in the table and as last-used.
    Remember(Credential),
    /// Persist a new device display name.
    Rename(NameString),
}

// ---------------------------------------------------------------------------
// NetContext
// ---------------------------------------------------------------------------

pub struct NetContext {
    // -- Inputs (written by the service before each tick) --
    /// Uptime captured once for this loop iteration.
    pub now_ms: u64,
    /// Station link is associated and has an address.
    pub link_up: bool,
    /// Form posted to the provisioning portal, if any.
    pub submission: Option<PortalSubmission>,
    /// Candidates in attempt order: last-used first, then the table.
    pub plan: heapless::Vec<Credential, PLAN_LEN>,

    // -- State owned by handlers --
    /// Set at boot; cleared on the first connection or when the first
    /// cycle gives up and opens the portal.
    pub boot_cycle: bool,
    pub attempt: Option<Attempt>,
    pub backoff: Backoff,
    /// Earliest uptime for the next reconnect cycle.
    pub retry_at_ms: u64,
    pub portal_open: bool,
    pub connected_ssid: Option<SsidString>,

    // -- Outputs --
    pub requests: heapless::Deque<NetRequest, REQUEST_QUEUE_LEN>,
}

impl Default for NetContext {
    fn default() -> Self {
        Self::new()
    }
}

impl NetContext {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            link_up: false,
            submission: None,
            plan: heapless::Vec::new(),
            boot_cycle: true,
            attempt: None,
            backoff: Backoff::default(),
            retry_at_ms: 0,
            portal_open: false,
            connected_ssid: None,
            requests: heapless::Deque::new(),
        }
    }

    pub fn request(&mut self, req: NetRequest) {
        if let Err(dropped) = self.requests.push_back(req) {
            warn!("Net: request queue full, dropping {:?}", dropped);
        }
    }

    pub fn take_request(&mut self) -> Option<NetRequest> {
        self.requests.pop_front()
    }

    /// Begin attempting plan entry `idx`.  Returns `false` past the end.
    pub fn begin_plan_attempt(&mut self, idx: usize) -> bool {
        let Some(cred) = self.plan.get(idx).cloned() else {
            self.attempt = None;
            return false;
        };
        self.request(NetRequest::Connect(cred.clone()));
        self.attempt = Some(Attempt {
            credential: cred,
            deadline_ms: self.now_ms + config::CONNECT_ATTEMPT_TIMEOUT_MS,
            origin: AttemptOrigin::Plan(idx),
        });
        true
    }

    /// Handle an expired attempt: move to the next plan entry.
    /// Returns `true` when the whole plan has been tried.
    pub fn advance_after_timeout(&mut self) -> bool {
        let Some(attempt) = self.attempt.take() else {
            return true;
        };
        warn!(
            "Net: '{}' did not associate within {} ms",
            attempt.credential.ssid,
            config::CONNECT_ATTEMPT_TIMEOUT_MS
        );
        match attempt.origin {
            AttemptOrigin::Plan(idx) => !self.begin_plan_attempt(idx + 1),
            AttemptOrigin::Submission { .. } => true,
        }
    }

    pub fn attempt_expired(&self) -> bool {
        self.attempt
            .as_ref()
            .is_some_and(|a| self.now_ms >= a.deadline_ms)
    }

    /// Schedule the next reconnect cycle, never earlier than the boot
    /// stabilisation delay.
    pub fn schedule_retry(&mut self) {
        self.retry_at_ms = (self.now_ms + self.backoff.interval_ms()).max(config::BOOT_STABILIZATION_MS);
    }
}

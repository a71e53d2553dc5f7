//! Connectivity state handlers and table builder.
//!
//! ```text
//!  boot ──▶ CONNECTING_SAVED ──link up──▶ CONNECTED ──link lost──▶ DISCONNECTED
//!             │       ▲                      ▲                       │   │
//!  boot cycle │       └──────retry_at────────┼───────────────────────┘   │
//!  exhausted  ▼                              │ link up       table empty │
//!         PORTAL_ACTIVE ─────────────────────┘                           │
//!             ▲  ◀───────────────────────────────────────────────────────┘
//!             └── provisioning reset (forced from any state)
//!
//!  reconnect cycle exhausted: CONNECTING_SAVED ──▶ DISCONNECTED (backoff doubles)
//! ```
//!
//! Attempts never block: each one is a `Connect` request plus a deadline,
//! checked on later ticks.

use super::context::{Attempt, AttemptOrigin, NetContext, NetRequest};
use super::{StateDescriptor, StateId};
use crate::config;
use log::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        StateDescriptor {
            id: StateId::Disconnected,
            name: "Disconnected",
            on_enter: Some(disconnected_enter),
            on_exit: None,
            on_update: disconnected_update,
        },
        StateDescriptor {
            id: StateId::ConnectingSaved,
            name: "ConnectingSaved",
            on_enter: Some(connecting_enter),
            on_exit: None,
            on_update: connecting_update,
        },
        StateDescriptor {
            id: StateId::Connected,
            name: "Connected",
            on_enter: Some(connected_enter),
            on_exit: Some(connected_exit),
            on_update: connected_update,
        },
        StateDescriptor {
            id: StateId::PortalActive,
            name: "PortalActive",
            on_enter: Some(portal_enter),
            on_exit: Some(portal_exit),
            on_update: portal_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  DISCONNECTED: waiting out the backoff interval
// ═══════════════════════════════════════════════════════════════════════════

fn disconnected_enter(ctx: &mut NetContext) {
    ctx.attempt = None;
    ctx.schedule_retry();
    info!(
        "DISCONNECTED: retry at {} ms (backoff {} ms, {} failures)",
        ctx.retry_at_ms,
        ctx.backoff.interval_ms(),
        ctx.backoff.failures()
    );
}

fn disconnected_update(ctx: &mut NetContext) -> Option<StateId> {
    if ctx.link_up {
        return Some(StateId::Connected);
    }
    if ctx.plan.is_empty() {
        info!("DISCONNECTED: no saved networks, opening portal");
        return Some(StateId::PortalActive);
    }
    if ctx.now_ms >= ctx.retry_at_ms {
        return Some(StateId::ConnectingSaved);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTING_SAVED: walking the candidate plan
// ═══════════════════════════════════════════════════════════════════════════

fn connecting_enter(ctx: &mut NetContext) {
    info!("CONNECTING_SAVED: {} candidate(s)", ctx.plan.len());
    ctx.begin_plan_attempt(0);
}

fn connecting_update(ctx: &mut NetContext) -> Option<StateId> {
    if ctx.link_up {
        return Some(StateId::Connected);
    }

    let exhausted = if ctx.attempt.is_none() {
        true
    } else if ctx.attempt_expired() {
        ctx.advance_after_timeout()
    } else {
        false
    };
    if !exhausted {
        return None;
    }

    ctx.request(NetRequest::Disconnect);
    if ctx.boot_cycle {
        ctx.boot_cycle = false;
        warn!("CONNECTING_SAVED: no saved network reachable at boot");
        Some(StateId::PortalActive)
    } else {
        ctx.backoff.record_failure();
        warn!(
            "CONNECTING_SAVED: reconnect cycle failed ({} consecutive)",
            ctx.backoff.failures()
        );
        Some(StateId::Disconnected)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  CONNECTED
// ═══════════════════════════════════════════════════════════════════════════

fn connected_enter(ctx: &mut NetContext) {
    ctx.backoff.reset();
    ctx.boot_cycle = false;
    if let Some(Attempt {
        credential, origin, ..
    }) = ctx.attempt.take()
    {
        info!("CONNECTED: '{}'", credential.ssid);
        ctx.connected_ssid = Some(credential.ssid.clone());
        if let AttemptOrigin::Submission { name: Some(name) } = origin {
            ctx.request(NetRequest::Rename(name));
        }
        ctx.request(NetRequest::Remember(credential));
    } else {
        info!("CONNECTED: link up");
    }
}

fn connected_exit(ctx: &mut NetContext) {
    ctx.connected_ssid = None;
}

fn connected_update(ctx: &mut NetContext) -> Option<StateId> {
    if !ctx.link_up {
        warn!("CONNECTED: link lost");
        return Some(StateId::Disconnected);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  PORTAL_ACTIVE: access point open, saved networks retried in background
// ═══════════════════════════════════════════════════════════════════════════

fn portal_enter(ctx: &mut NetContext) {
    ctx.attempt = None;
    ctx.portal_open = true;
    ctx.request(NetRequest::StartPortal);
    ctx.schedule_retry();
    info!("PORTAL_ACTIVE: provisioning portal open");
}

fn portal_exit(ctx: &mut NetContext) {
    ctx.portal_open = false;
    ctx.request(NetRequest::StopPortal);
}

fn portal_update(ctx: &mut NetContext) -> Option<StateId> {
    if ctx.link_up {
        return Some(StateId::Connected);
    }

    if let Some(sub) = ctx.submission.take() {
        info!("PORTAL_ACTIVE: trying submitted network '{}'", sub.credential.ssid);
        ctx.request(NetRequest::Connect(sub.credential.clone()));
        ctx.attempt = Some(Attempt {
            credential: sub.credential,
            deadline_ms: ctx.now_ms + config::CONNECT_ATTEMPT_TIMEOUT_MS,
            origin: AttemptOrigin::Submission { name: sub.name },
        });
        return None;
    }

    if ctx.attempt_expired() {
        let from_plan = matches!(
            ctx.attempt.as_ref().map(|a| &a.origin),
            Some(AttemptOrigin::Plan(_))
        );
        if ctx.advance_after_timeout() {
            if from_plan {
                ctx.backoff.record_failure();
            }
            ctx.request(NetRequest::Disconnect);
            ctx.schedule_retry();
        }
        return None;
    }

    if ctx.attempt.is_none() && !ctx.plan.is_empty() && ctx.now_ms >= ctx.retry_at_ms {
        info!("PORTAL_ACTIVE: retrying saved networks");
        ctx.begin_plan_attempt(0);
    }
    None
}

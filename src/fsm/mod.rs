//! Function-pointer finite state machine engine for network connectivity.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                    │
//! │  ┌────────────────┬──────────┬──────────┬────────────────────┐ │
//! │  │ StateId        │ on_enter │ on_exit  │ on_update          │ │
//! │  ├────────────────┼──────────┼──────────┼────────────────────┤ │
//! │  │ Disconnected   │ fn(ctx)  │ -        │ fn(ctx)->Option<>  │ │
//! │  │ ConnectingSaved│ fn(ctx)  │ fn(ctx)  │ fn(ctx)->Option<>  │ │
//! │  │ Connected      │ fn(ctx)  │ -        │ fn(ctx)->Option<>  │ │
//! │  │ PortalActive   │ fn(ctx)  │ fn(ctx)  │ fn(ctx)->Option<>  │ │
//! │  └────────────────┴──────────┴──────────┴────────────────────┘ │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next_id)`, the engine runs `on_exit` for the
//! current state, then `on_enter` for the next, and updates the
//! current pointer.  Handlers only touch the [`NetContext`] blackboard;
//! side effects leave as [`context::NetRequest`]s that the connectivity
//! service applies to the radio and to flash afterwards.

pub mod context;
pub mod states;

use context::NetContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Connectivity states.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    Disconnected = 0,
    ConnectingSaved = 1,
    Connected = 2,
    PortalActive = 3,
}

impl StateId {
    pub const COUNT: usize = 4;

    /// Convert a table index back to `StateId`.  Out-of-range indices
    /// assert in debug builds and fall back to `Disconnected`.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Disconnected,
            1 => Self::ConnectingSaved,
            2 => Self::Connected,
            3 => Self::PortalActive,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Disconnected
            }
        }
    }

    /// Wire name used in snapshots and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::ConnectingSaved => "connecting",
            Self::Connected => "connected",
            Self::PortalActive => "portal",
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut NetContext);

/// Per-tick update handler: `Some(next)` requests a transition.
pub type StateUpdateFn = fn(&mut NetContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    current: usize,
    /// Uptime at which the current state was entered.
    entered_ms: u64,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
            entered_ms: 0,
        }
    }

    /// Run the initial `on_enter`.  Call once, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut NetContext) {
        info!("Net FSM starting in state: {}", self.table[self.current].name);
        self.entered_ms = ctx.now_ms;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance by one tick.  `ctx.now_ms` must already hold this
    /// iteration's timestamp.
    pub fn tick(&mut self, ctx: &mut NetContext) {
        let next = (self.table[self.current].on_update)(ctx);
        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
    }

    /// Jump straight to `next` (provisioning reset).  Forcing the current
    /// state re-runs its `on_exit` and `on_enter`, so a portal that is
    /// already up gets torn down and restarted.
    pub fn force_transition(&mut self, next: StateId, ctx: &mut NetContext) {
        self.transition(next, ctx);
    }

    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    /// Milliseconds spent in the current state as of `now_ms`.
    pub fn ms_in_current_state(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.entered_ms)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut NetContext) {
        let next_idx = next_id as usize;

        info!(
            "Net FSM transition: {} -> {} after {} ms",
            self.table[self.current].name,
            self.table[next_idx].name,
            self.ms_in_current_state(ctx.now_ms)
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.entered_ms = ctx.now_ms;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::context::NetContext;
    use super::*;
    use crate::credentials::Credential;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn portal_flag_tracks_portal_state(
            steps in proptest::collection::vec((0u64..20_000, any::<bool>()), 1..200),
            saved in 0usize..3,
        ) {
            let mut fsm = Fsm::new(states::build_state_table(), StateId::ConnectingSaved);
            let mut ctx = NetContext::new();
            for i in 0..saved {
                ctx.plan.push(Credential::new(&format!("net{i}"), "").unwrap()).unwrap();
            }
            fsm.start(&mut ctx);

            for (dt, link) in steps {
                ctx.now_ms += dt;
                ctx.link_up = link;
                fsm.tick(&mut ctx);
                while ctx.take_request().is_some() {}

                let state = fsm.current_state();
                prop_assert_eq!(ctx.portal_open, state == StateId::PortalActive);
                if state == StateId::Connected {
                    prop_assert_eq!(ctx.backoff.failures(), 0);
                }
            }
        }
    }
}

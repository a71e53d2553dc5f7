//! Connectivity service: drives the connection FSM against the radio and
//! the credential table.
//!
//! ```text
//!  WifiPort ──link/submission──▶ NetContext ──▶ Fsm ──▶ NetRequest queue
//!     ▲                                                     │
//!     └───────── Connect / Disconnect / Start|StopPortal ◀──┤
//!  StoragePort ◀──────────── Remember (table + last-used) ◀─┤
//!  AppService  ◀──────────── Rename (display name) ◀────────┘
//! ```
//!
//! The FSM handlers never see a port; this service feeds them inputs,
//! then applies whatever they asked for.  Storage failures are logged and
//! the in-memory table stays authoritative.

use log::{info, warn};

use super::events::NetworkSummary;
use super::ports::{StoragePort, WifiPort};
use crate::config::{self, MAX_NETWORKS, NameString};
use crate::credentials::{self, Credential, CredentialError, CredentialStore, SsidString};
use crate::fsm::context::{NetContext, NetRequest};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};

/// What one tick changed, for the caller to report or act on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetTick {
    /// `(from, to)` when the FSM moved.
    pub transition: Option<(StateId, StateId)>,
    /// Display name submitted with a credential that has now connected.
    pub rename: Option<NameString>,
}

pub struct Connectivity {
    fsm: Fsm,
    ctx: NetContext,
    store: CredentialStore,
    last_used: Option<Credential>,
    /// SSID of the provisioning access point.
    ap_ssid: NameString,
}

impl Connectivity {
    /// Load the table and last-used credential.  Does not touch the radio
    /// until [`start`](Self::start).
    pub fn new(storage: &impl StoragePort, ap_ssid: &str) -> Self {
        Self::with_store(
            CredentialStore::load(storage),
            credentials::load_last_used(storage),
            ap_ssid,
        )
    }

    pub fn with_store(store: CredentialStore, last_used: Option<Credential>, ap_ssid: &str) -> Self {
        let mut svc = Self {
            fsm: Fsm::new(build_state_table(), StateId::ConnectingSaved),
            ctx: NetContext::new(),
            store,
            last_used,
            ap_ssid: config::truncated(ap_ssid),
        };
        svc.refresh_plan();
        svc
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Begin the boot cycle: fast path first, then the table.
    pub fn start(&mut self, now_ms: u64, wifi: &mut impl WifiPort, storage: &mut impl StoragePort) -> NetTick {
        self.ctx.now_ms = now_ms;
        info!(
            "Net: boot cycle with {} candidate(s) (last-used: {})",
            self.ctx.plan.len(),
            self.last_used.as_ref().map_or("none", |c| c.ssid.as_str())
        );
        self.fsm.start(&mut self.ctx);
        self.apply_requests(wifi, storage)
    }

    /// Boot straight into the portal (power-cycle reset detected at boot).
    pub fn start_in_portal(
        &mut self,
        now_ms: u64,
        wifi: &mut impl WifiPort,
        storage: &mut impl StoragePort,
    ) -> NetTick {
        self.ctx.now_ms = now_ms;
        self.ctx.boot_cycle = false;
        self.fsm = Fsm::new(build_state_table(), StateId::PortalActive);
        self.fsm.start(&mut self.ctx);
        self.apply_requests(wifi, storage)
    }

    /// Poll the radio, advance the FSM, apply its requests.
    pub fn tick(&mut self, now_ms: u64, wifi: &mut impl WifiPort, storage: &mut impl StoragePort) -> NetTick {
        self.ctx.now_ms = now_ms;
        self.ctx.link_up = wifi.is_connected();
        if self.ctx.portal_open && self.ctx.submission.is_none() {
            self.ctx.submission = wifi.take_portal_submission();
            if let Some(sub) = &self.ctx.submission {
                info!("Net: portal submitted '{}'", sub.credential.ssid);
            }
        }

        let from = self.fsm.current_state();
        self.fsm.tick(&mut self.ctx);
        let to = self.fsm.current_state();

        let mut out = self.apply_requests(wifi, storage);
        if from != to {
            out.transition = Some((from, to));
        }
        out
    }

    /// Wipe saved networks and open the portal without rebooting.
    pub fn provisioning_reset(
        &mut self,
        now_ms: u64,
        ap_ssid: &str,
        wifi: &mut impl WifiPort,
        storage: &mut impl StoragePort,
    ) -> NetTick {
        self.ctx.now_ms = now_ms;
        self.forget_all(storage);
        self.ap_ssid = config::truncated(ap_ssid);

        self.ctx.attempt = None;
        self.ctx.submission = None;
        self.ctx.link_up = false;
        self.ctx.boot_cycle = false;
        self.ctx.backoff.reset();
        self.ctx.request(NetRequest::Disconnect);

        let from = self.fsm.current_state();
        self.fsm.force_transition(StateId::PortalActive, &mut self.ctx);
        let mut out = self.apply_requests(wifi, storage);
        if from != StateId::PortalActive {
            out.transition = Some((from, StateId::PortalActive));
        }
        out
    }

    // ── Table management ──────────────────────────────────────

    /// Saved networks, highest priority first.  Passwords are not exposed.
    pub fn list_networks(&self) -> heapless::Vec<NetworkSummary, MAX_NETWORKS> {
        self.store
            .sorted_by_priority()
            .iter()
            .map(|n| NetworkSummary {
                ssid: n.ssid.clone(),
                priority: n.priority,
                last_connected: n.last_connected,
            })
            .collect()
    }

    /// Erase the table and the fast-path record.  The FSM is not touched.
    pub fn forget_all(&mut self, storage: &mut impl StoragePort) {
        if let Err(e) = self.store.erase(storage) {
            warn!("Net: erasing saved networks failed ({}), cleared in memory", e);
        }
        self.last_used = None;
        self.refresh_plan();
    }

    /// Remove one saved network (and the fast-path record if it matches).
    pub fn forget_network(&mut self, ssid: &str, storage: &mut impl StoragePort) -> Result<(), CredentialError> {
        self.store.remove(ssid)?;
        if let Err(e) = self.store.save(storage) {
            warn!("Net: saving network table failed ({}), kept in memory", e);
        }
        if self.last_used.as_ref().is_some_and(|c| c.ssid == ssid) {
            self.last_used = None;
            if let Err(e) = storage.delete(config::STORAGE_NAMESPACE, config::LAST_NETWORK_KEY) {
                warn!("Net: clearing last-used network failed ({})", e);
            }
        }
        self.refresh_plan();
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn is_portal_active(&self) -> bool {
        self.ctx.portal_open
    }

    pub fn connected_ssid(&self) -> Option<&SsidString> {
        self.ctx.connected_ssid.as_ref()
    }

    /// Current reconnect interval.
    pub fn backoff_ms(&self) -> u64 {
        self.ctx.backoff.interval_ms()
    }

    pub fn retry_at_ms(&self) -> u64 {
        self.ctx.retry_at_ms
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn last_used(&self) -> Option<&Credential> {
        self.last_used.as_ref()
    }

    pub fn context(&self) -> &NetContext {
        &self.ctx
    }

    // ── Internal ──────────────────────────────────────────────

    /// Candidates in attempt order: last-used, then the table by priority,
    /// skipping duplicate SSIDs.
    fn refresh_plan(&mut self) {
        let plan = &mut self.ctx.plan;
        plan.clear();
        if let Some(last) = &self.last_used {
            let _ = plan.push(last.clone());
        }
        for entry in &self.store.sorted_by_priority() {
            if plan.iter().any(|c| c.ssid == entry.ssid) {
                continue;
            }
            if plan.push(entry.credential()).is_err() {
                break;
            }
        }
    }

    fn apply_requests(&mut self, wifi: &mut impl WifiPort, storage: &mut impl StoragePort) -> NetTick {
        let mut out = NetTick::default();
        while let Some(req) = self.ctx.take_request() {
            match req {
                NetRequest::Connect(cred) => {
                    info!("Net: connecting to '{}'", cred.ssid);
                    if let Err(e) = wifi.begin_connect(&cred) {
                        // The attempt deadline still runs; the FSM moves on when it expires.
                        warn!("Net: connect to '{}' failed to start ({})", cred.ssid, e);
                    }
                }
                NetRequest::Disconnect => wifi.disconnect(),
                NetRequest::StartPortal => {
                    info!("Net: opening provisioning portal '{}'", self.ap_ssid);
                    if let Err(e) = wifi.start_portal(&self.ap_ssid) {
                        warn!("Net: portal failed to start ({})", e);
                    }
                }
                NetRequest::StopPortal => {
                    info!("Net: closing provisioning portal");
                    wifi.stop_portal();
                }
                NetRequest::Remember(cred) => self.remember(cred, storage),
                NetRequest::Rename(name) => out.rename = Some(name),
            }
        }
        out
    }

    /// Record a successful connection: bump it in the table, persist the
    /// table and the fast-path record.
    fn remember(&mut self, cred: Credential, storage: &mut impl StoragePort) {
        if let Err(e) = self.store.add_or_update(&cred.ssid, &cred.password, self.ctx.now_ms) {
            warn!("Net: not adding '{}' to the table ({})", cred.ssid, e);
        }
        if let Err(e) = self.persist(&cred, storage) {
            warn!("Net: {}, networks kept in memory", e);
        }
        self.last_used = Some(cred);
        self.refresh_plan();
    }

    fn persist(&self, last: &Credential, storage: &mut impl StoragePort) -> crate::error::Result<()> {
        self.store.save(storage)?;
        credentials::save_last_used(storage, last)?;
        Ok(())
    }
}

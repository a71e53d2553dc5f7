//! Saved WiFi networks: a five-slot, priority-ordered credential table.
//!
//! ```text
//!   add_or_update(ssid) ──▶ known?  ── yes ──▶ priority += 1, lastConnected = now
//!                              │
//!                              no ──▶ free slot? ── no ──▶ evict lowest (priority, recency)
//!                                          │
//!                                          └──▶ insert with priority 1
//! ```
//!
//! The table only ever holds valid entries, so "empty slot" is simply
//! spare capacity in the backing `heapless::Vec`.  Mutations are pure;
//! the connectivity service writes the table through [`StoragePort`]
//! after every change.
//!
//! Persisted as `{"networks":[{"ssid":..,"password":..,"priority":..,"lastConnected":..}]}`.
//! The most recently used credential is kept separately under its own key
//! so the boot fast path survives table eviction.

use core::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::StoragePort;
use crate::config::{self, MAX_NETWORKS, NameString};
use crate::error::StorageError;

pub type SsidString = heapless::String<32>;
pub type PasswordString = heapless::String<63>;

/// Serialised table size bound (5 × worst-case entry plus framing).
const DOC_BUF_LEN: usize = 2048;

/// Serialised last-used credential bound.
const LAST_USED_BUF_LEN: usize = 256;

// ───────────────────────────────────────────────────────────────
// Errors
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    /// SSID empty, longer than 32 bytes or containing control characters.
    InvalidSsid,
    /// Password neither empty (open network) nor 8-63 printable ASCII bytes.
    InvalidPassword,
    /// No saved network with that SSID.
    NotFound,
    /// No slot could be freed for a new entry.
    TableFull,
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID must be 1-32 bytes without control characters"),
            Self::InvalidPassword => write!(f, "password must be empty or 8-63 printable ASCII characters"),
            Self::NotFound => write!(f, "network not saved"),
            Self::TableFull => write!(f, "network table full"),
        }
    }
}

pub fn validate_ssid(ssid: &str) -> Result<(), CredentialError> {
    if ssid.is_empty() || ssid.len() > 32 || ssid.chars().any(char::is_control) {
        return Err(CredentialError::InvalidSsid);
    }
    Ok(())
}

/// WPA2 passphrases are printable ASCII (0x20-0x7E); anything else would also
/// inflate the escaped JSON past the persisted document bounds.
pub fn validate_password(password: &str) -> Result<(), CredentialError> {
    let printable = password.bytes().all(|b| (0x20..=0x7E).contains(&b));
    if printable && (password.is_empty() || (8..=63).contains(&password.len())) {
        Ok(())
    } else {
        Err(CredentialError::InvalidPassword)
    }
}

// ───────────────────────────────────────────────────────────────
// Entries
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkCredential {
    pub ssid: SsidString,
    pub password: PasswordString,
    /// Higher is preferred.  Always at least 1.
    pub priority: u32,
    /// Uptime (ms) of the last add or successful connection.
    pub last_connected: u64,
}

impl NetworkCredential {
    pub fn new(ssid: &str, password: &str, now_ms: u64) -> Result<Self, CredentialError> {
        let pair = Credential::new(ssid, password)?;
        Ok(Self {
            ssid: pair.ssid,
            password: pair.password,
            priority: 1,
            last_connected: now_ms,
        })
    }

    pub fn credential(&self) -> Credential {
        Credential {
            ssid: self.ssid.clone(),
            password: self.password.clone(),
        }
    }
}

impl Credential {
    pub fn new(ssid: &str, password: &str) -> Result<Self, CredentialError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        Ok(Self {
            ssid: SsidString::try_from(ssid).map_err(|_| CredentialError::InvalidSsid)?,
            password: PasswordString::try_from(password)
                .map_err(|_| CredentialError::InvalidPassword)?,
        })
    }
}

/// Loose on-flash shape; entries are validated on the way in.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StoredNetwork {
    ssid: String,
    password: String,
    priority: u32,
    last_connected: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NetworkDoc {
    networks: Vec<StoredNetwork>,
}

#[derive(Serialize)]
struct NetworkDocRef<'a> {
    networks: &'a [NetworkCredential],
}

/// A bare SSID/password pair: the boot fast-path record and the unit the
/// connectivity machine attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub ssid: SsidString,
    pub password: PasswordString,
}

/// Network details posted to the provisioning portal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalSubmission {
    pub credential: Credential,
    /// Optional new device display name.
    pub name: Option<NameString>,
}

/// What `add_or_update` did to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    Updated,
    Inserted,
    /// Inserted after evicting the named entry.
    Evicted(SsidString),
}

// ───────────────────────────────────────────────────────────────
// Store
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    entries: heapless::Vec<NetworkCredential, MAX_NETWORKS>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh a known network, or insert a new one (evicting if full).
    ///
    /// An empty `password` on a known network keeps the stored one.
    pub fn add_or_update(
        &mut self,
        ssid: &str,
        password: &str,
        now_ms: u64,
    ) -> Result<Upsert, CredentialError> {
        validate_ssid(ssid)?;
        validate_password(password)?;

        if let Some(entry) = self.entries.iter_mut().find(|e| e.ssid == ssid) {
            if !password.is_empty() {
                entry.password =
                    PasswordString::try_from(password).map_err(|_| CredentialError::InvalidPassword)?;
            }
            entry.priority = entry.priority.saturating_add(1);
            entry.last_connected = now_ms;
            info!("Networks: updated '{}' (priority {})", ssid, entry.priority);
            return Ok(Upsert::Updated);
        }

        let fresh = NetworkCredential::new(ssid, password, now_ms)?;
        let mut outcome = Upsert::Inserted;
        if self.entries.is_full() {
            self.sort();
            if let Some(evicted) = self.entries.pop() {
                info!("Networks: table full, evicting '{}'", evicted.ssid);
                outcome = Upsert::Evicted(evicted.ssid);
            }
        }
        if self.entries.push(fresh).is_err() {
            warn!("Networks: no slot for '{}'", ssid);
            return Err(CredentialError::TableFull);
        }
        info!("Networks: added '{}'", ssid);
        Ok(outcome)
    }

    pub fn remove(&mut self, ssid: &str) -> Result<(), CredentialError> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.ssid == ssid)
            .ok_or(CredentialError::NotFound)?;
        self.entries.remove(idx);
        info!("Networks: removed '{}'", ssid);
        Ok(())
    }

    /// Entries ordered by priority, then recency, both descending.
    pub fn sorted_by_priority(&self) -> heapless::Vec<NetworkCredential, MAX_NETWORKS> {
        let mut out = self.entries.clone();
        sort_entries(&mut out);
        out
    }

    pub fn find(&self, ssid: &str) -> Option<&NetworkCredential> {
        self.entries.iter().find(|e| e.ssid == ssid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkCredential> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn sort(&mut self) {
        sort_entries(&mut self.entries);
    }

    // ── JSON document ─────────────────────────────────────────

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&NetworkDocRef {
            networks: &self.entries,
        })
    }

    /// Parse a stored document, keeping the first five valid, distinct
    /// entries.  Returns the table and the number of entries skipped.
    pub fn from_json(bytes: &[u8]) -> Result<(Self, usize), serde_json::Error> {
        let doc: NetworkDoc = serde_json::from_slice(bytes)?;
        let mut store = Self::new();
        let mut skipped = 0;
        for stored in doc.networks {
            if store.entries.is_full() || store.find(&stored.ssid).is_some() {
                skipped += 1;
                continue;
            }
            match NetworkCredential::new(&stored.ssid, &stored.password, stored.last_connected) {
                Ok(mut cred) => {
                    cred.priority = stored.priority.max(1);
                    // Capacity checked at the top of the loop.
                    let _ = store.entries.push(cred);
                }
                Err(_) => skipped += 1,
            }
        }
        Ok((store, skipped))
    }

    // ── Persistence ───────────────────────────────────────────

    /// Load the table, falling back to empty on any storage or parse error.
    pub fn load(storage: &impl StoragePort) -> Self {
        let mut buf = [0u8; DOC_BUF_LEN];
        let len = match storage.read(config::STORAGE_NAMESPACE, config::NETWORKS_KEY, &mut buf) {
            Ok(len) => len,
            Err(StorageError::NotFound) => {
                info!("Networks: none saved");
                return Self::new();
            }
            Err(e) => {
                warn!("Networks: read failed ({}), starting empty", e);
                return Self::new();
            }
        };
        match Self::from_json(&buf[..len]) {
            Ok((store, skipped)) => {
                if skipped > 0 {
                    warn!("Networks: skipped {} invalid entries", skipped);
                }
                info!("Networks: loaded {} saved network(s)", store.len());
                store
            }
            Err(e) => {
                warn!("Networks: stored document unreadable ({}), starting empty", e);
                Self::new()
            }
        }
    }

    /// Write the whole table.
    pub fn save(&self, storage: &mut impl StoragePort) -> Result<(), StorageError> {
        let bytes = self.to_json().map_err(|_| StorageError::IoError)?;
        storage.write(config::STORAGE_NAMESPACE, config::NETWORKS_KEY, &bytes)
    }

    /// Wipe the table and the last-used credential from flash.
    pub fn erase(&mut self, storage: &mut impl StoragePort) -> Result<(), StorageError> {
        self.entries.clear();
        storage.delete(config::STORAGE_NAMESPACE, config::NETWORKS_KEY)?;
        storage.delete(config::STORAGE_NAMESPACE, config::LAST_NETWORK_KEY)
    }
}

fn sort_entries(entries: &mut [NetworkCredential]) {
    entries.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(b.last_connected.cmp(&a.last_connected))
    });
}

// ───────────────────────────────────────────────────────────────
// Last-used credential
// ───────────────────────────────────────────────────────────────

pub fn load_last_used(storage: &impl StoragePort) -> Option<Credential> {
    let mut buf = [0u8; LAST_USED_BUF_LEN];
    let len = storage
        .read(config::STORAGE_NAMESPACE, config::LAST_NETWORK_KEY, &mut buf)
        .ok()?;
    match serde_json::from_slice::<Credential>(&buf[..len]) {
        Ok(last) if validate_ssid(&last.ssid).is_ok() => Some(last),
        _ => {
            warn!("Networks: last-used credential unreadable, ignoring");
            None
        }
    }
}

pub fn save_last_used(storage: &mut impl StoragePort, last: &Credential) -> Result<(), StorageError> {
    let bytes = serde_json::to_vec(last).map_err(|_| StorageError::IoError)?;
    storage.write(config::STORAGE_NAMESPACE, config::LAST_NETWORK_KEY, &bytes)
}

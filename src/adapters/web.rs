//! Web command channel and provisioning portal.
//!
//! HTTP handlers run on the server's own task.  They never touch control
//! state; everything crosses through a [`MessageBridge`]:
//!
//! ```text
//!  POST /cmd ──text──▶ commands ─────────▶ control loop (handle_message)
//!  POST /save ─form──▶ submission ───────▶ WifiPort::take_portal_submission
//!  GET /values ◀──── latest snapshot ◀───── WebEventSink (Snapshot events)
//!  GET /networks ◀── latest list ◀───────── WebEventSink (Networks events)
//! ```
//!
//! The form decoder ([`parse_portal_form`]) and the bridge are plain Rust
//! and tested on the host; only [`WebServer`] is device-specific.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use heapless::Deque;
use log::{debug, warn};

use super::log_sink::LogEventSink;
use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::config::{self, NameString};
use crate::credentials::{Credential, CredentialError, PortalSubmission};

/// Commands buffered between the HTTP task and the loop.
pub const COMMAND_QUEUE_LEN: usize = 8;
/// Longest accepted command text (`forgetNetwork:` plus a 32-byte SSID fits).
pub const MAX_COMMAND_LEN: usize = 64;

pub type CommandText = heapless::String<MAX_COMMAND_LEN>;

// ───────────────────────────────────────────────────────────────
// Message bridge
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeError {
    /// The loop has not drained the queue yet.
    QueueFull,
    /// Text longer than [`MAX_COMMAND_LEN`].
    TooLong,
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => write!(f, "command queue full"),
            Self::TooLong => write!(f, "command too long"),
        }
    }
}

/// Shared between the HTTP handlers and the control loop.
#[derive(Debug, Default)]
pub struct MessageBridge {
    commands: Mutex<Deque<CommandText, COMMAND_QUEUE_LEN>>,
    snapshot: Mutex<Option<String>>,
    networks: Mutex<Option<String>>,
    submission: Mutex<Option<PortalSubmission>>,
    portal_active: AtomicBool,
}

/// A panicking handler must not wedge the loop.
fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MessageBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one command message (HTTP side).
    pub fn push_command(&self, text: &str) -> Result<(), BridgeError> {
        let text = CommandText::try_from(text.trim()).map_err(|()| BridgeError::TooLong)?;
        locked(&self.commands)
            .push_back(text)
            .map_err(|_| BridgeError::QueueFull)
    }

    /// Oldest queued command (loop side).
    pub fn pop_command(&self) -> Option<CommandText> {
        locked(&self.commands).pop_front()
    }

    pub fn publish_snapshot(&self, json: String) {
        *locked(&self.snapshot) = Some(json);
    }

    pub fn latest_snapshot(&self) -> Option<String> {
        locked(&self.snapshot).clone()
    }

    pub fn publish_networks(&self, json: String) {
        *locked(&self.networks) = Some(json);
    }

    pub fn latest_networks(&self) -> Option<String> {
        locked(&self.networks).clone()
    }

    /// Store a portal form (HTTP side).  A newer form replaces an
    /// unclaimed older one.
    pub fn submit(&self, submission: PortalSubmission) {
        *locked(&self.submission) = Some(submission);
    }

    /// Claim the pending portal form (loop side).
    pub fn take_submission(&self) -> Option<PortalSubmission> {
        locked(&self.submission).take()
    }

    pub fn set_portal_active(&self, active: bool) {
        self.portal_active.store(active, Ordering::Release);
    }

    pub fn portal_active(&self) -> bool {
        self.portal_active.load(Ordering::Acquire)
    }
}

// ───────────────────────────────────────────────────────────────
// Event sink
// ───────────────────────────────────────────────────────────────

/// Logs every event and publishes snapshots and network lists to the
/// bridge for the HTTP side to serve.
pub struct WebEventSink<'a> {
    bridge: &'a MessageBridge,
    log: LogEventSink,
}

impl<'a> WebEventSink<'a> {
    pub fn new(bridge: &'a MessageBridge) -> Self {
        Self {
            bridge,
            log: LogEventSink::new(),
        }
    }
}

impl EventSink for WebEventSink<'_> {
    fn emit(&mut self, event: &AppEvent) {
        self.log.emit(event);
        match event {
            AppEvent::Started(s) | AppEvent::Snapshot(s) => match s.to_json() {
                Ok(json) => self.bridge.publish_snapshot(json),
                Err(e) => warn!("Web: snapshot encode failed ({})", e),
            },
            AppEvent::Networks(list) => match serde_json::to_string(list) {
                Ok(json) => self.bridge.publish_networks(json),
                Err(e) => warn!("Web: network list encode failed ({})", e),
            },
            _ => {}
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Portal form
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormError {
    /// Bad `%XX` escape or the decoded bytes are not UTF-8.
    Malformed,
    /// No `ssid` field.
    MissingSsid,
    /// SSID or password failed validation.
    Credential(CredentialError),
}

impl fmt::Display for FormError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed form encoding"),
            Self::MissingSsid => write!(f, "ssid is required"),
            Self::Credential(e) => write!(f, "{e}"),
        }
    }
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decode one `application/x-www-form-urlencoded` component.
pub fn url_decode(input: &str) -> Result<String, FormError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let hi = bytes.get(i + 1).copied().and_then(hex_val);
                let lo = bytes.get(i + 2).copied().and_then(hex_val);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => out.push(hi << 4 | lo),
                    _ => return Err(FormError::Malformed),
                }
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8(out).map_err(|_| FormError::Malformed)
}

/// Decode the `POST /save` body: `ssid`, `password`, optional `name`.
///
/// Unknown fields are ignored.  An empty or absent `name` leaves the
/// display name unchanged; a long one is truncated at a char boundary.
pub fn parse_portal_form(body: &str) -> Result<PortalSubmission, FormError> {
    let mut ssid = None;
    let mut password = String::new();
    let mut name = None;

    for pair in body.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match key {
            "ssid" => ssid = Some(url_decode(value)?),
            "password" => password = url_decode(value)?,
            "name" => {
                let decoded = url_decode(value)?;
                let trimmed = decoded.trim();
                if !trimmed.is_empty() {
                    name = Some(config::truncated(trimmed));
                }
            }
            other => debug!("Portal: ignoring field '{}'", other),
        }
    }

    let ssid = ssid.ok_or(FormError::MissingSsid)?;
    let credential = Credential::new(&ssid, &password).map_err(FormError::Credential)?;
    Ok(PortalSubmission {
        credential,
        name: name.filter(|n: &NameString| !n.is_empty()),
    })
}

const PORTAL_PAGE: &str = r#"<!DOCTYPE html>
<html><head><meta charset="utf-8"><meta name="viewport" content="width=device-width">
<title>ElectroOxidizer Setup</title></head><body>
<h1>ElectroOxidizer WiFi Setup</h1>
<form method="post" action="/save">
<label>Network (SSID)<br><input name="ssid" maxlength="32" required></label><br>
<label>Password<br><input name="password" type="password" maxlength="63"></label><br>
<label>Device name (optional)<br><input name="name" maxlength="32"></label><br>
<input type="submit" value="Save &amp; Connect">
</form></body></html>"#;

const SAVED_PAGE: &str = "<!DOCTYPE html><html><body><p>Saved. Connecting...</p></body></html>";

// ───────────────────────────────────────────────────────────────
// HTTP server (device)
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct WebServer {
    _server: esp_idf_svc::http::server::EspHttpServer<'static>,
}

#[cfg(target_os = "espidf")]
impl WebServer {
    /// Register every route.  The portal routes answer 404 while the
    /// portal is closed.
    pub fn start(bridge: std::sync::Arc<MessageBridge>) -> anyhow::Result<Self> {
        use esp_idf_svc::http::Method;
        use esp_idf_svc::http::server::{Configuration, EspHttpServer};
        use esp_idf_svc::io::{Read, Write};

        /// Read at most `N` bytes of request body.
        fn read_body<R: Read, const N: usize>(req: &mut R) -> Result<String, R::Error> {
            let mut buf = [0u8; N];
            let mut total = 0;
            while total < buf.len() {
                let n = req.read(&mut buf[total..])?;
                if n == 0 {
                    break;
                }
                total += n;
            }
            Ok(String::from_utf8_lossy(&buf[..total]).into_owned())
        }

        let mut server = EspHttpServer::new(&Configuration {
            stack_size: 10_240,
            ..Default::default()
        })?;

        let b = bridge.clone();
        server.fn_handler::<anyhow::Error, _>("/cmd", Method::Post, move |mut req| {
            let body = read_body::<_, 128>(&mut req)?;
            let (status, msg) = match b.push_command(&body) {
                Ok(()) => (202, "queued"),
                Err(BridgeError::QueueFull) => (503, "busy"),
                Err(BridgeError::TooLong) => (413, "too long"),
            };
            let mut resp = req.into_response(status, None, &[("Content-Type", "text/plain")])?;
            resp.write_all(msg.as_bytes())?;
            Ok(())
        })?;

        let b = bridge.clone();
        server.fn_handler::<anyhow::Error, _>("/values", Method::Get, move |req| {
            let json = b.latest_snapshot().unwrap_or_else(|| "{}".into());
            let mut resp = req.into_response(200, None, &[("Content-Type", "application/json")])?;
            resp.write_all(json.as_bytes())?;
            Ok(())
        })?;

        let b = bridge.clone();
        server.fn_handler::<anyhow::Error, _>("/networks", Method::Get, move |req| {
            let json = b.latest_networks().unwrap_or_else(|| "[]".into());
            let mut resp = req.into_response(200, None, &[("Content-Type", "application/json")])?;
            resp.write_all(json.as_bytes())?;
            Ok(())
        })?;

        let b = bridge.clone();
        server.fn_handler::<anyhow::Error, _>("/", Method::Get, move |req| {
            if !b.portal_active() {
                req.into_status_response(404)?;
                return Ok(());
            }
            let mut resp = req.into_ok_response()?;
            resp.write_all(PORTAL_PAGE.as_bytes())?;
            Ok(())
        })?;

        let b = bridge;
        server.fn_handler::<anyhow::Error, _>("/save", Method::Post, move |mut req| {
            if !b.portal_active() {
                req.into_status_response(404)?;
                return Ok(());
            }
            let body = read_body::<_, 512>(&mut req)?;
            match parse_portal_form(&body) {
                Ok(sub) => {
                    log::info!("Portal: form received for '{}'", sub.credential.ssid);
                    b.submit(sub);
                    let mut resp = req.into_ok_response()?;
                    resp.write_all(SAVED_PAGE.as_bytes())?;
                }
                Err(e) => {
                    warn!("Portal: rejected form ({})", e);
                    let mut resp = req.into_response(400, None, &[("Content-Type", "text/plain")])?;
                    resp.write_all(e.to_string().as_bytes())?;
                }
            }
            Ok(())
        })?;

        log::info!("Web server started on port 80");
        Ok(Self { _server: server })
    }
}

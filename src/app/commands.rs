//! Inbound commands to the application service.
//!
//! The web UI speaks a terse text protocol.  Each message is decoded once,
//! here at the transport boundary, into a [`Command`]; nothing past this
//! point ever looks at the raw text again.
//!
//! | Wire text              | Command                    | Bounds        |
//! |------------------------|----------------------------|---------------|
//! | `toggle`               | [`Command::Toggle`]        |               |
//! | `1F<volts>`            | [`Command::SetVoltage`]    | 0–24 V        |
//! | `2F<ms>`               | [`Command::SetForwardTime`]| 10–60000 ms   |
//! | `2R<ms>`               | [`Command::SetReverseTime`]| 10–60000 ms   |
//! | `resetPeakCurrent`     | [`Command::ResetPeaks`]    |               |
//! | `getValues`            | [`Command::Query`]         |               |
//! | `listNetworks`         | [`Command::ListNetworks`]  |               |
//! | `forgetNetwork:<ssid>` | [`Command::ForgetNetwork`] | 1–32 bytes    |

use core::fmt;

use crate::config::{self, dwell_in_range};
use crate::credentials::{SsidString, validate_ssid};

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Flip the run state.
    Toggle,
    /// Set the supply target voltage.
    SetVoltage(f64),
    /// Set the forward dwell time in milliseconds.
    SetForwardTime(u32),
    /// Set the reverse dwell time in milliseconds.
    SetReverseTime(u32),
    /// Zero the peak trackers and accumulators.
    ResetPeaks,
    /// Publish a snapshot now.
    Query,
    /// Publish the saved network table (SSIDs and priorities only).
    ListNetworks,
    /// Remove one saved network.
    ForgetNetwork(SsidString),
}

/// Why a message was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// No command matches the text.
    Unrecognized,
    /// The numeric argument did not parse.
    InvalidNumber,
    /// The argument parsed but is outside its bounds.
    OutOfRange,
    /// The H-bridge is faulted; the run state cannot change.
    Faulted,
    /// `forgetNetwork` named an SSID that is not saved.
    UnknownNetwork,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unrecognized => write!(f, "unrecognized command"),
            Self::InvalidNumber => write!(f, "invalid number"),
            Self::OutOfRange => write!(f, "value out of range"),
            Self::Faulted => write!(f, "output faulted"),
            Self::UnknownNetwork => write!(f, "network not saved"),
        }
    }
}

impl Command {
    /// Decode one wire message.  Surrounding whitespace is ignored; the
    /// command token must match exactly.
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let text = text.trim();
        match text {
            "toggle" => return Ok(Self::Toggle),
            "resetPeakCurrent" => return Ok(Self::ResetPeaks),
            "getValues" => return Ok(Self::Query),
            "listNetworks" => return Ok(Self::ListNetworks),
            _ => {}
        }

        if let Some(arg) = text.strip_prefix("forgetNetwork:") {
            validate_ssid(arg).map_err(|_| CommandError::OutOfRange)?;
            let ssid = SsidString::try_from(arg).map_err(|()| CommandError::OutOfRange)?;
            return Ok(Self::ForgetNetwork(ssid));
        }
        if let Some(arg) = text.strip_prefix("1F") {
            let volts = parse_f64(arg)?;
            if !(f64::from(config::VOLTAGE_MIN)..=f64::from(config::VOLTAGE_MAX)).contains(&volts) {
                return Err(CommandError::OutOfRange);
            }
            return Ok(Self::SetVoltage(volts));
        }
        if let Some(arg) = text.strip_prefix("2F") {
            return parse_dwell(arg).map(Self::SetForwardTime);
        }
        if let Some(arg) = text.strip_prefix("2R") {
            return parse_dwell(arg).map(Self::SetReverseTime);
        }
        Err(CommandError::Unrecognized)
    }

    /// Commands that change what the loop does (as opposed to queries).
    pub fn mutates(&self) -> bool {
        !matches!(self, Self::Query | Self::ListNetworks)
    }
}

fn parse_f64(arg: &str) -> Result<f64, CommandError> {
    let arg = arg.trim();
    // `f64::from_str` accepts "inf" and "NaN"; the wire format does not.
    let numeric = |b: u8| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E');
    if arg.is_empty() || !arg.bytes().all(numeric) {
        return Err(CommandError::InvalidNumber);
    }
    arg.parse::<f64>().map_err(|_| CommandError::InvalidNumber)
}

fn parse_dwell(arg: &str) -> Result<u32, CommandError> {
    let arg = arg.trim();
    if arg.is_empty() || !arg.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CommandError::InvalidNumber);
    }
    // All-digit input only fails to parse on overflow, which is a range problem.
    let ms = arg.parse::<u32>().map_err(|_| CommandError::OutOfRange)?;
    if dwell_in_range(ms) {
        Ok(ms)
    } else {
        Err(CommandError::OutOfRange)
    }
}

//! LED pattern engine with priority-based pattern selection.
//!
//! Generates time-varying RGB values for the status LED.  The control
//! loop calls `tick()` each iteration and feeds the result to
//! [`StatusLed::set_colour`](super::status_led::StatusLed::set_colour)
//! through the actuator port.
//!
//! ## Priority hierarchy (highest first)
//!
//! 1. **Fault**: rapid red flash
//! 2. **Provisioning**: portal open, or a reset in progress
//! 3. **Run state**: solid red while the bridge is driving the cell
//! 4. **Connectivity**: overlay when nothing above is active
//!
//! ## Pattern types
//!
//! | Pattern      | Description                      | Rate   |
//! |-------------|----------------------------------|--------|
//! | Solid        | Constant colour                  | -      |
//! | SlowPulse    | Triangular brightness fade       | 1 Hz   |
//! | FastBlink    | On/off square wave               | 4 Hz   |
//! | DoubleBlink  | Two quick flashes, then pause    | 1 Hz   |
//! | RapidFlash   | Very fast on/off                 | 8 Hz   |

/// Colour as (R, G, B) tuple, each 0–255.
pub type Rgb = (u8, u8, u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternId {
    Solid,
    SlowPulse,
    FastBlink,
    DoubleBlink,
    RapidFlash,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Fault,
    Provisioning,
    Run,
    Connectivity,
}

#[derive(Debug, Clone, Copy)]
struct PatternRequest {
    colour: Rgb,
    pattern: PatternId,
    layer: Layer,
}

/// LED pattern engine.  Stack-allocated, no heap.
#[derive(Debug, Clone)]
pub struct LedPatternEngine {
    phase_ms: u64,
    active: Option<PatternRequest>,
    fault: bool,
    provisioning: Option<PatternRequest>,
    run: Option<PatternRequest>,
    connectivity: Option<PatternRequest>,
}

impl Default for LedPatternEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LedPatternEngine {
    pub fn new() -> Self {
        Self {
            phase_ms: 0,
            active: None,
            fault: false,
            provisioning: None,
            run: None,
            connectivity: None,
        }
    }

    pub fn set_fault(&mut self, active: bool) {
        self.fault = active;
    }

    pub fn set_provisioning(&mut self, request: Option<(Rgb, PatternId)>) {
        self.provisioning = request.map(|(colour, pattern)| PatternRequest {
            colour,
            pattern,
            layer: Layer::Provisioning,
        });
    }

    pub fn set_running(&mut self, running: bool) {
        self.run = running.then_some(PatternRequest {
            colour: COLOUR_RUNNING,
            pattern: PatternId::Solid,
            layer: Layer::Run,
        });
    }

    pub fn set_connectivity(&mut self, colour: Rgb, pattern: PatternId) {
        self.connectivity = Some(PatternRequest {
            colour,
            pattern,
            layer: Layer::Connectivity,
        });
    }

    /// Clear all patterns: LED will be off.
    pub fn clear_all(&mut self) {
        *self = Self::new();
    }

    /// Advance the pattern phase by `delta_ms` and return the RGB output.
    pub fn tick(&mut self, delta_ms: u64) -> Rgb {
        self.phase_ms = self.phase_ms.wrapping_add(delta_ms);

        let selected = self.select_active();
        let restart = match (&self.active, &selected) {
            (Some(prev), Some(next)) => {
                prev.layer != next.layer || prev.pattern != next.pattern || prev.colour != next.colour
            }
            (None, Some(_)) => true,
            _ => false,
        };
        if restart {
            self.phase_ms = 0;
        }
        self.active = selected;

        match &self.active {
            Some(req) => self.generate(req.colour, req.pattern),
            None => (0, 0, 0),
        }
    }

    fn select_active(&self) -> Option<PatternRequest> {
        let fault = self.fault.then_some(PatternRequest {
            colour: COLOUR_FAULT,
            pattern: PatternId::RapidFlash,
            layer: Layer::Fault,
        });
        fault.or(self.provisioning).or(self.run).or(self.connectivity)
    }

    fn generate(&self, colour: Rgb, pattern: PatternId) -> Rgb {
        let on = match pattern {
            PatternId::Solid => return colour,
            PatternId::Off => return (0, 0, 0),
            PatternId::SlowPulse => return scale(colour, triangle(self.phase_ms, 1000)),
            PatternId::FastBlink => self.phase_ms % 250 < 125,
            PatternId::DoubleBlink => {
                let cycle = self.phase_ms % 1000;
                cycle < 100 || (200..300).contains(&cycle)
            }
            PatternId::RapidFlash => self.phase_ms % 125 < 63,
        };
        if on { colour } else { (0, 0, 0) }
    }
}

/// Triangular brightness ramp 0→255→0 over `period_ms`.
fn triangle(phase_ms: u64, period_ms: u64) -> u8 {
    let pos = phase_ms % period_ms;
    let half = period_ms / 2;
    if pos < half {
        ((pos * 255) / half) as u8
    } else {
        (((period_ms - pos) * 255) / half) as u8
    }
}

fn scale((r, g, b): Rgb, brightness: u8) -> Rgb {
    let br = u16::from(brightness);
    (
        ((u16::from(r) * br) / 255) as u8,
        ((u16::from(g) * br) / 255) as u8,
        ((u16::from(b) * br) / 255) as u8,
    )
}

// ── Colours ──────────────────────────────────────────────────

pub const COLOUR_RUNNING: Rgb = (128, 0, 0);
pub const COLOUR_FAULT: Rgb = (255, 0, 0);
pub const COLOUR_PORTAL: Rgb = (128, 0, 128);
pub const COLOUR_RESETTING: Rgb = (128, 0, 128);
pub const COLOUR_CONNECTING: Rgb = (0, 0, 255);
pub const COLOUR_CONNECTED: Rgb = (0, 128, 0);

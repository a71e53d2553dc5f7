//! ElectroOxidizer firmware: main entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareAdapter         NvsAdapter        WifiAdapter         │
//! │  (Adc+Actuator+Input)    (Config+Storage)  (WifiPort)          │
//! │  WebEventSink ─ MessageBridge ─ WebServer (HTTP task)          │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  Polarity · Conditioner · Connectivity FSM · Resets    │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The control loop runs on the main task: drain queued commands, one
//! `AppService::tick`, feed the watchdog, yield one RTOS tick.
//!
//! Only the current-sense ADC is required to boot.  A missing H-bridge
//! reads as a permanent fault, the supply PWM is retried from the loop,
//! storage falls back to RAM and the device runs without WiFi or the web
//! channel when those fail.
#![deny(unused_must_use)]

use std::sync::Arc;

use anyhow::{Result, anyhow};
use log::{debug, error, info, warn};

use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyInputPin, AnyOutputPin, PinDriver, Pull};
use esp_idf_hal::ledc::{CHANNEL0, LedcDriver, LedcTimerDriver, Resolution, TIMER0, config::TimerConfig};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::rmt::{TxRmtDriver, config::TransmitConfig};
use esp_idf_hal::units::Hertz;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::wifi::EspWifi;

use electrooxidizer::adapters::device_id;
use electrooxidizer::adapters::hardware::{ContinuousAdc, HardwareAdapter};
use electrooxidizer::adapters::nvs::NvsAdapter;
use electrooxidizer::adapters::time::MonotonicClock;
use electrooxidizer::adapters::web::{MessageBridge, WebEventSink, WebServer};
use electrooxidizer::adapters::wifi::WifiAdapter;
use electrooxidizer::app::ports::ActuatorPort;
use electrooxidizer::app::service::AppService;
use electrooxidizer::config;
use electrooxidizer::drivers::button::Button;
use electrooxidizer::drivers::hbridge::HBridge;
use electrooxidizer::drivers::hw_init;
use electrooxidizer::drivers::led_patterns::COLOUR_FAULT;
use electrooxidizer::drivers::status_led::StatusLed;
use electrooxidizer::drivers::supply::SupplyDriver;
use electrooxidizer::drivers::watchdog::{LoopBudget, Watchdog};
use electrooxidizer::error::ActuatorError;
use electrooxidizer::pins;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  ElectroOxidizer v{}              ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let p = Peripherals::take()?;
    let watchdog = Watchdog::new();

    // ── 2. Status LED first, so later failures can be shown ──
    // SAFETY: the LED pin is not claimed anywhere else.
    let led_pin = unsafe { AnyOutputPin::new(pins::RGB_LED_GPIO) };
    let mut led = match TxRmtDriver::new(p.rmt.channel0, led_pin, &TransmitConfig::new().clock_divider(1)) {
        Ok(rmt) => StatusLed::new(rmt),
        Err(e) => {
            warn!("Status LED unavailable ({e}), running dark");
            StatusLed::detached()
        }
    };

    // ── 3. Power stage, ADC, button ───────────────────────────
    let bridge = init_bridge()
        .map_err(|e| error!("H-bridge unavailable ({e:#}), output stays off"))
        .ok();
    let mut supply = SupplyDriver::deferred(Box::new(attach_supply_pwm));
    if let Err(e) = supply.set_voltage(0.0) {
        debug!("Supply: {e} at boot");
    }
    let button = pulled_up_input(pins::BUTTON_GPIO)
        .map(Button::new)
        .map_err(|e| warn!("Button unavailable ({e:#})"))
        .ok();
    // Current sensing is required to run at all.
    let adc = match init_adc() {
        Ok(adc) => adc,
        Err(e) => halt(&watchdog, &e, |r, g, b| led.set_colour(r, g, b)),
    };
    let mut hw = HardwareAdapter::new(bridge, supply, button, led, adc);

    // ── 4. Storage and identity ───────────────────────────────
    let mut nvs = NvsAdapter::open();
    let name = device_id::default_name(&device_id::read_mac());
    info!("Device identity: {}", name);

    let mut app = match AppService::load(&nvs, &name) {
        Ok(app) => app,
        Err(e) => halt(&watchdog, &anyhow!("{e}"), |r, g, b| hw.set_led(r, g, b)),
    };

    // ── 5. Radio and web channel ──────────────────────────────
    let messages = Arc::new(MessageBridge::new());
    let radio = EspSystemEventLoop::take().and_then(|sysloop| EspWifi::new(p.modem, sysloop, None));
    let mut wifi = match radio {
        Ok(esp_wifi) => WifiAdapter::new(esp_wifi, Arc::clone(&messages)),
        Err(e) => {
            error!("WiFi unavailable ({e}), running offline");
            WifiAdapter::offline(Arc::clone(&messages))
        }
    };
    let _server = WebServer::start(Arc::clone(&messages))
        .map_err(|e| error!("Web server unavailable ({e:#}), commands disabled"))
        .ok();
    let mut sink = WebEventSink::new(&messages);

    // ── 6. Control loop ───────────────────────────────────────
    let clock = MonotonicClock::new();
    let mut budget = LoopBudget::default();
    let (now_ms, now_us) = clock.now();
    app.start(now_ms, now_us, &mut hw, &mut nvs, &mut wifi, &mut sink);

    loop {
        let (now_ms, now_us) = clock.now();
        while let Some(text) = messages.pop_command() {
            if let Err(e) = app.handle_message(now_ms, now_us, &text, &mut hw, &mut nvs, &mut sink) {
                debug!("Command '{}' not applied: {}", text.trim(), e);
            }
        }
        app.tick(now_ms, now_us, &mut hw, &mut nvs, &mut wifi, &mut sink);

        budget.record(now_us, clock.uptime_us());
        watchdog.feed();
        FreeRtos::delay_ms(1);
    }
}

type Bridge = HBridge<
    PinDriver<'static, AnyOutputPin, esp_idf_hal::gpio::Output>,
    PinDriver<'static, AnyOutputPin, esp_idf_hal::gpio::Output>,
    PinDriver<'static, AnyOutputPin, esp_idf_hal::gpio::Output>,
    PinDriver<'static, AnyOutputPin, esp_idf_hal::gpio::Output>,
    PinDriver<'static, AnyInputPin, esp_idf_hal::gpio::Input>,
>;

fn output(gpio: i32) -> Result<PinDriver<'static, AnyOutputPin, esp_idf_hal::gpio::Output>> {
    // SAFETY: each GPIO number in `pins` is claimed exactly once, here.
    Ok(PinDriver::output(unsafe { AnyOutputPin::new(gpio) })?)
}

fn pulled_up_input(gpio: i32) -> Result<PinDriver<'static, AnyInputPin, esp_idf_hal::gpio::Input>> {
    // SAFETY: as above.
    let mut pin = PinDriver::input(unsafe { AnyInputPin::new(gpio) })?;
    pin.set_pull(Pull::Up)?;
    Ok(pin)
}

fn init_bridge() -> Result<Bridge> {
    HBridge::new(
        output(pins::BRIDGE_EN_GPIO)?,
        output(pins::BRIDGE_PH_GPIO)?,
        output(pins::BRIDGE_NSLEEP_GPIO)?,
        output(pins::BRIDGE_DRVOFF_GPIO)?,
        pulled_up_input(pins::BRIDGE_NFAULT_GPIO)?,
    )
    .map_err(|e| anyhow!("H-bridge: {e}"))
}

/// Claim LEDC timer 0 and channel 0 for the supply.  Runs again from the
/// loop after a failure.
fn attach_supply_pwm() -> core::result::Result<LedcDriver<'static>, ActuatorError> {
    let unavailable = |e: esp_idf_svc::sys::EspError| {
        debug!("Supply: LEDC setup failed ({e})");
        ActuatorError::PwmUnavailable
    };
    // SAFETY: TIMER0, CHANNEL0 and the supply pin are only claimed here, and
    // a failed attempt has dropped its drivers before the next one starts.
    let timer = LedcTimerDriver::new(
        unsafe { TIMER0::new() },
        &TimerConfig::new()
            .frequency(Hertz(config::SUPPLY_PWM_FREQ_HZ))
            .resolution(Resolution::Bits10),
    )
    .map_err(unavailable)?;
    // SAFETY: as above.
    LedcDriver::new(unsafe { CHANNEL0::new() }, timer, unsafe {
        AnyOutputPin::new(pins::SUPPLY_PWM_GPIO)
    })
    .map_err(unavailable)
}

fn init_adc() -> Result<ContinuousAdc> {
    let handle = hw_init::init_continuous_adc().map_err(|e| anyhow!("{e}"))?;
    ContinuousAdc::new(handle).map_err(|e| anyhow!("{e}"))
}

/// Latch the fault colour and stop; the watchdog is fed so the fault
/// stays visible instead of boot-looping.
fn halt(watchdog: &Watchdog, e: &anyhow::Error, mut paint: impl FnMut(u8, u8, u8)) -> ! {
    error!("Init failed: {e:#}; control loop halted");
    let (r, g, b) = COLOUR_FAULT;
    loop {
        paint(r, g, b);
        watchdog.feed();
        FreeRtos::delay_ms(1_000);
    }
}

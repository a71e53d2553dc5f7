//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements                     | Connects to               |
//! |-------------|--------------------------------|---------------------------|
//! | `hardware`  | AdcPort, ActuatorPort, InputPort | H-bridge, supply PWM, ADC, button, LED |
//! | `log_sink`  | EventSink                      | Serial log output         |
//! | `nvs`       | ConfigPort, StoragePort        | NVS / in-memory store     |
//! | `web`       | EventSink                      | HTTP command channel, portal |
//! | `wifi`      | WifiPort                       | ESP-IDF WiFi STA + AP     |
//! | `time`      |                                | ESP32 high-resolution timer |
//! | `device_id` |                                | eFuse MAC                 |

pub mod device_id;
pub mod hardware;
pub mod log_sink;
pub mod nvs;
pub mod time;
pub mod web;
pub mod wifi;

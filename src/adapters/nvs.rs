//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements both [`ConfigPort`] and [`StoragePort`].
//!
//! | Key (namespace `eox`) | Contents                         | Encoding  |
//! |-----------------------|----------------------------------|-----------|
//! | `settings`            | [`Settings`]                     | JSON      |
//! | `networks`            | credential table                 | JSON      |
//! | `net_last`            | last-used credential             | JSON      |
//! | `pwr_cycles`          | power-cycle counter              | postcard  |
//!
//! On the device every call opens the namespace, does one blob operation,
//! commits and closes.  The RAM backend is a plain map keyed
//! `namespace::key`: it is the host backend, and the device falls back to
//! it when the flash partition cannot be brought up, so the firmware keeps
//! running with settings that only last until the next reset.

use std::collections::HashMap;

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort, StoragePort};
use crate::config::{self, Settings};
use crate::error::StorageError;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Largest settings document accepted on load.
const SETTINGS_BUF_LEN: usize = 512;

enum Backend {
    #[cfg(target_os = "espidf")]
    Flash,
    Memory(HashMap<String, Vec<u8>>),
}

pub struct NvsAdapter {
    backend: Backend,
}

impl NvsAdapter {
    /// Initialise NVS flash.
    ///
    /// A partition with no free pages or written by a newer IDF is erased
    /// and re-initialised; saved networks and settings are lost in that
    /// case.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called once from main() before any other NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                let ret = unsafe { nvs_flash_erase() };
                if ret != ESP_OK {
                    return Err(StorageError::IoError);
                }
                let ret = unsafe { nvs_flash_init() };
                if ret != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
            Ok(Self {
                backend: Backend::Flash,
            })
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("NvsAdapter: simulation backend");
            Ok(Self::volatile())
        }
    }

    /// RAM-only storage.  Nothing written survives a reset.
    pub fn volatile() -> Self {
        Self {
            backend: Backend::Memory(HashMap::new()),
        }
    }

    /// [`new`](Self::new), or [`volatile`](Self::volatile) when flash
    /// cannot be initialised.
    pub fn open() -> Self {
        match Self::new() {
            Ok(nvs) => nvs,
            Err(e) => {
                warn!("NvsAdapter: flash unavailable ({}), settings will not persist", e);
                Self::volatile()
            }
        }
    }

    pub fn is_persistent(&self) -> bool {
        !matches!(self.backend, Backend::Memory(_))
    }

    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// NUL-terminated copy of an NVS name (15 bytes max).
    #[cfg(target_os = "espidf")]
    fn c_name(name: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let bytes = name.as_bytes();
        let len = bytes.len().min(15);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    /// Open a namespace, run `f` with the handle, then close it.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = Self::c_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        // SAFETY: `ns` is NUL-terminated and outlives the call.
        let ret = unsafe { nvs_open(ns.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }
        let result = f(handle);
        // SAFETY: `handle` was opened above and is not used after this.
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn flash_read(namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let key = Self::c_name(key);
        let result = Self::with_nvs_handle(namespace, false, |handle| {
            let mut size = buf.len();
            // SAFETY: `buf` is valid for `size` bytes; NVS writes at most that.
            let ret = unsafe {
                nvs_get_blob(handle, key.as_ptr() as *const _, buf.as_mut_ptr() as *mut _, &mut size)
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(size)
        });
        match result {
            Ok(size) => Ok(size),
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
            Err(e) if e == ESP_ERR_NVS_INVALID_LENGTH => Err(StorageError::TooLarge),
            Err(e) => {
                warn!("NvsAdapter: read error {}", e);
                Err(StorageError::IoError)
            }
        }
    }

    #[cfg(target_os = "espidf")]
    fn flash_write(namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let key = Self::c_name(key);
        let result = Self::with_nvs_handle(namespace, true, |handle| {
            // SAFETY: `data` is valid for its length for the duration of the call.
            let ret = unsafe {
                nvs_set_blob(handle, key.as_ptr() as *const _, data.as_ptr() as *const _, data.len())
            };
            if ret != ESP_OK {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        result.map_err(|e| match e {
            e if e == ESP_ERR_NVS_NOT_ENOUGH_SPACE => StorageError::Full,
            e => {
                warn!("NvsAdapter: write error {}", e);
                StorageError::IoError
            }
        })
    }

    #[cfg(target_os = "espidf")]
    fn flash_delete(namespace: &str, key: &str) -> Result<(), StorageError> {
        let key = Self::c_name(key);
        let result = Self::with_nvs_handle(namespace, true, |handle| {
            // SAFETY: `key` is NUL-terminated.
            let ret = unsafe { nvs_erase_key(handle, key.as_ptr() as *const _) };
            if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                return Err(ret);
            }
            let ret = unsafe { nvs_commit(handle) };
            if ret != ESP_OK {
                return Err(ret);
            }
            Ok(())
        });
        match result {
            Ok(()) => Ok(()),
            // The namespace has never been written, so the key cannot exist.
            Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Ok(()),
            Err(_) => Err(StorageError::IoError),
        }
    }

    #[cfg(target_os = "espidf")]
    fn flash_exists(namespace: &str, key: &str) -> bool {
        let key = Self::c_name(key);
        Self::with_nvs_handle(namespace, false, |handle| {
            // SAFETY: `key` is NUL-terminated; the type out-pointer may be null.
            let ret = unsafe { nvs_find_key(handle, key.as_ptr() as *const _, core::ptr::null_mut()) };
            Ok(ret == ESP_OK)
        })
        .unwrap_or(false)
    }
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<Settings, ConfigError> {
        let mut buf = [0u8; SETTINGS_BUF_LEN];
        let len = self.read(config::STORAGE_NAMESPACE, config::SETTINGS_KEY, &mut buf)?;
        let mut settings: Settings =
            serde_json::from_slice(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
        let repaired = settings.sanitize();
        if repaired > 0 {
            warn!("NvsAdapter: {} stored setting(s) out of range, defaulted", repaired);
        }
        info!("NvsAdapter: loaded settings ({} bytes)", len);
        Ok(settings)
    }

    fn save(&mut self, settings: &Settings) -> Result<(), ConfigError> {
        settings.validate().map_err(ConfigError::ValidationFailed)?;
        let bytes = serde_json::to_vec(settings).map_err(|_| ConfigError::Corrupted)?;
        self.write(config::STORAGE_NAMESPACE, config::SETTINGS_KEY, &bytes)?;
        info!("NvsAdapter: settings saved ({} bytes)", bytes.len());
        Ok(())
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        match &self.backend {
            Backend::Memory(map) => {
                let data = map
                    .get(&Self::composite_key(namespace, key))
                    .ok_or(StorageError::NotFound)?;
                if data.len() > buf.len() {
                    return Err(StorageError::TooLarge);
                }
                buf[..data.len()].copy_from_slice(data);
                Ok(data.len())
            }
            #[cfg(target_os = "espidf")]
            Backend::Flash => Self::flash_read(namespace, key, buf),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        match &mut self.backend {
            Backend::Memory(map) => {
                map.insert(Self::composite_key(namespace, key), data.to_vec());
                Ok(())
            }
            #[cfg(target_os = "espidf")]
            Backend::Flash => Self::flash_write(namespace, key, data),
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        match &mut self.backend {
            Backend::Memory(map) => {
                map.remove(&Self::composite_key(namespace, key));
                Ok(())
            }
            #[cfg(target_os = "espidf")]
            Backend::Flash => Self::flash_delete(namespace, key),
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        match &self.backend {
            Backend::Memory(map) => map.contains_key(&Self::composite_key(namespace, key)),
            #[cfg(target_os = "espidf")]
            Backend::Flash => Self::flash_exists(namespace, key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_missing_on_first_boot() {
        let nvs = NvsAdapter::new().unwrap();
        assert_eq!(nvs.load(), Err(ConfigError::NotFound));
    }

    #[test]
    fn settings_round_trip_as_json() {
        let mut nvs = NvsAdapter::new().unwrap();
        let settings = Settings {
            target_voltage: 18.5,
            forward_time_ms: 2_000,
            ..Settings::default()
        };
        nvs.save(&settings).unwrap();
        assert_eq!(nvs.load().unwrap(), settings);

        let mut buf = [0u8; 512];
        let len = nvs
            .read(config::STORAGE_NAMESPACE, config::SETTINGS_KEY, &mut buf)
            .unwrap();
        let text = core::str::from_utf8(&buf[..len]).unwrap();
        assert!(text.contains("\"targetVoltage\":18.5"));
    }

    #[test]
    fn invalid_settings_are_rejected_not_clamped() {
        let mut nvs = NvsAdapter::new().unwrap();
        let bad = Settings {
            reverse_time_ms: 5,
            ..Settings::default()
        };
        assert!(matches!(nvs.save(&bad), Err(ConfigError::ValidationFailed(_))));
        assert!(!nvs.exists(config::STORAGE_NAMESPACE, config::SETTINGS_KEY));
    }

    #[test]
    fn out_of_range_stored_fields_fall_back_individually() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write(
            config::STORAGE_NAMESPACE,
            config::SETTINGS_KEY,
            br#"{"targetVoltage":99.0,"forwardTimeMs":500}"#,
        )
        .unwrap();
        let s = nvs.load().unwrap();
        assert_eq!(s.target_voltage, config::DEFAULT_TARGET_VOLTAGE);
        assert_eq!(s.forward_time_ms, 500);
    }

    #[test]
    fn garbage_settings_are_corrupted() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write(config::STORAGE_NAMESPACE, config::SETTINGS_KEY, b"\xff\x00{")
            .unwrap();
        assert_eq!(nvs.load(), Err(ConfigError::Corrupted));
    }

    #[test]
    fn storage_round_trip() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write("test_ns", "greeting", b"hello NVS").unwrap();
        assert!(nvs.exists("test_ns", "greeting"));

        let mut buf = [0u8; 64];
        let len = nvs.read("test_ns", "greeting", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"hello NVS");

        nvs.delete("test_ns", "greeting").unwrap();
        assert!(!nvs.exists("test_ns", "greeting"));
        assert_eq!(nvs.read("test_ns", "greeting", &mut buf), Err(StorageError::NotFound));
    }

    #[test]
    fn short_buffer_is_too_large_not_truncated() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write("ns", "k", &[7u8; 32]).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(nvs.read("ns", "k", &mut buf), Err(StorageError::TooLarge));
    }

    #[test]
    fn volatile_backend_serves_the_same_ports() {
        let mut nvs = NvsAdapter::volatile();
        assert!(!nvs.is_persistent());
        assert_eq!(nvs.load(), Err(ConfigError::NotFound));
        nvs.save(&Settings::default()).unwrap();
        assert_eq!(nvs.load().unwrap(), Settings::default());
        nvs.delete(config::STORAGE_NAMESPACE, config::SETTINGS_KEY).unwrap();
        assert!(!nvs.exists(config::STORAGE_NAMESPACE, config::SETTINGS_KEY));
    }

    #[test]
    fn open_always_yields_usable_storage() {
        let mut nvs = NvsAdapter::open();
        nvs.write("ns", "k", b"v").unwrap();
        assert!(nvs.exists("ns", "k"));
    }

    #[test]
    fn namespace_isolation() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write("ns_a", "key", b"alpha").unwrap();
        nvs.write("ns_b", "key", b"bravo").unwrap();

        let mut buf = [0u8; 64];
        let len = nvs.read("ns_a", "key", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"alpha");
        let len = nvs.read("ns_b", "key", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"bravo");
    }
}

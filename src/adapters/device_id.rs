//! Device identity derived from the ESP32 factory MAC address.
//!
//! The default name is `OrinTech-XXXXXXXX`: the low 32 bits of the eFuse
//! MAC, read as the little-endian integer the ROM reports, in upper-case
//! hex.  It serves as display name, hostname and provisioning AP SSID
//! until the operator renames the device.

use core::fmt::Write;

use crate::config::NameString;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: `mac` is 6 bytes, the size the call writes.
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Low 32 bits of the MAC as a little-endian integer.
pub fn chip_id(mac: &MacAddress) -> u32 {
    u32::from_le_bytes([mac[0], mac[1], mac[2], mac[3]])
}

/// `OrinTech-XXXXXXXX`.
pub fn default_name(mac: &MacAddress) -> NameString {
    let mut name = NameString::new();
    // 17 bytes always fit in 32.
    let _ = write!(name, "OrinTech-{:08X}", chip_id(mac));
    name
}

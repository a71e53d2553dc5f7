//! Continuous-mode ADC bring-up and frame reads.
//!
//! The current-sense amplifier is sampled by ADC1 in continuous (DMA)
//! mode using raw ESP-IDF sys calls.  The conversion-done callback runs in
//! ISR context and only bumps [`ADC_FRAMES_READY`]; the control loop
//! drains frames with a zero timeout so a read never blocks.
//!
//! ```text
//!  ADC1 ─DMA─▶ driver pool ─on_conv_done (ISR)─▶ ADC_FRAMES_READY.notify()
//!                   │      └─on_pool_ovf  (ISR)─▶ ADC_POOL_OVERFLOWED.notify()
//!                   │
//!                   └──────── adc_read_frames(timeout 0) ◀── control loop
//! ```
//!
//! [`ADC_FRAMES_READY`]: crate::sensors::current::ADC_FRAMES_READY

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

#[cfg(target_os = "espidf")]
use crate::{config, pins, sensors::current::TYPE2_RESULT_BYTES};

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    AdcHandleFailed(i32),
    AdcConfigFailed(i32),
    AdcCallbackFailed(i32),
    AdcStartFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AdcHandleFailed(rc) => write!(f, "ADC continuous handle failed (rc={})", rc),
            Self::AdcConfigFailed(rc) => write!(f, "ADC continuous config failed (rc={})", rc),
            Self::AdcCallbackFailed(rc) => write!(f, "ADC callback registration failed (rc={})", rc),
            Self::AdcStartFailed(rc) => write!(f, "ADC continuous start failed (rc={})", rc),
        }
    }
}

/// Frames the driver buffers between loop iterations.
pub const ADC_FRAMES_IN_POOL: usize = 4;

/// Bytes per DMA frame: one loop batch worth of conversions.
pub const ADC_FRAME_BYTES: usize = crate::config::ADC_BATCH_SAMPLES * 4;

// ── Continuous ADC ────────────────────────────────────────────

/// Owned continuous-mode ADC1 handle.
#[cfg(target_os = "espidf")]
pub struct ContinuousAdcHandle(adc_continuous_handle_t);

// SAFETY: the handle is an opaque driver pointer; every call through it
// happens from the control-loop task that owns this value.
#[cfg(target_os = "espidf")]
unsafe impl Send for ContinuousAdcHandle {}

/// Conversion-done callback.  ISR context: no logging, no allocation.
#[cfg(target_os = "espidf")]
unsafe extern "C" fn on_conv_done(
    _handle: adc_continuous_handle_t,
    _edata: *const adc_continuous_evt_data_t,
    _user_data: *mut core::ffi::c_void,
) -> bool {
    crate::sensors::current::ADC_FRAMES_READY.notify();
    false
}

/// Pool-overflow callback: the driver dropped results because the loop
/// fell behind.  ISR context.
#[cfg(target_os = "espidf")]
unsafe extern "C" fn on_pool_ovf(
    _handle: adc_continuous_handle_t,
    _edata: *const adc_continuous_evt_data_t,
    _user_data: *mut core::ffi::c_void,
) -> bool {
    crate::sensors::current::ADC_POOL_OVERFLOWED.notify();
    false
}

#[cfg(target_os = "espidf")]
pub fn init_continuous_adc() -> Result<ContinuousAdcHandle, HwInitError> {
    let mut handle: adc_continuous_handle_t = core::ptr::null_mut();

    let handle_cfg = adc_continuous_handle_cfg_t {
        max_store_buf_size: (ADC_FRAME_BYTES * ADC_FRAMES_IN_POOL) as u32,
        conv_frame_size: ADC_FRAME_BYTES as u32,
        ..Default::default()
    };
    // SAFETY: called once from main() before the control loop starts.
    let ret = unsafe { adc_continuous_new_handle(&handle_cfg, &mut handle) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::AdcHandleFailed(ret));
    }

    let mut pattern = [adc_digi_pattern_config_t {
        atten: adc_atten_t_ADC_ATTEN_DB_12 as u8,
        channel: pins::CURRENT_ADC_CHANNEL as u8,
        unit: adc_unit_t_ADC_UNIT_1 as u8,
        bit_width: SOC_ADC_DIGI_MAX_BITWIDTH as u8,
    }];
    let dig_cfg = adc_continuous_config_t {
        pattern_num: pattern.len() as u32,
        adc_pattern: pattern.as_mut_ptr(),
        sample_freq_hz: config::ADC_SAMPLE_RATE_HZ,
        conv_mode: adc_digi_convert_mode_t_ADC_CONV_SINGLE_UNIT_1,
        format: adc_digi_output_format_t_ADC_DIGI_OUTPUT_FORMAT_TYPE2,
    };
    // SAFETY: `pattern` outlives the call; the driver copies it.
    let ret = unsafe { adc_continuous_config(handle, &dig_cfg) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::AdcConfigFailed(ret));
    }

    let cbs = adc_continuous_evt_cbs_t {
        on_conv_done: Some(on_conv_done),
        on_pool_ovf: Some(on_pool_ovf),
    };
    // SAFETY: both callbacks are plain `extern "C"` fns with no captured state.
    let ret = unsafe { adc_continuous_register_event_callbacks(handle, &cbs, core::ptr::null_mut()) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::AdcCallbackFailed(ret));
    }

    // SAFETY: handle configured above.
    let ret = unsafe { adc_continuous_start(handle) };
    if ret != ESP_OK as i32 {
        return Err(HwInitError::AdcStartFailed(ret));
    }

    info!(
        "hw_init: ADC1 CH{} continuous at {} Hz ({} B frames)",
        pins::CURRENT_ADC_CHANNEL,
        config::ADC_SAMPLE_RATE_HZ,
        ADC_FRAME_BYTES
    );
    Ok(ContinuousAdcHandle(handle))
}

/// Copy whatever conversion bytes are ready into `buf` without waiting.
///
/// Returns `Ok(0)` when the pool is empty.
#[cfg(target_os = "espidf")]
pub fn adc_read_frames(adc: &mut ContinuousAdcHandle, buf: &mut [u8]) -> Result<usize, i32> {
    let mut out_len: u32 = 0;
    let len = (buf.len() / TYPE2_RESULT_BYTES * TYPE2_RESULT_BYTES) as u32;
    // SAFETY: `buf` is valid for `len` bytes; timeout 0 never blocks.
    let ret = unsafe { adc_continuous_read(adc.0, buf.as_mut_ptr(), len, &mut out_len, 0) };
    match ret {
        r if r == ESP_OK as i32 => Ok(out_len as usize),
        r if r == ESP_ERR_TIMEOUT as i32 => Ok(0),
        r => Err(r),
    }
}

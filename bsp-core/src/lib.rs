#![cfg_attr(not(any(test, feature = "std")), no_std)]

//! # BSP Core
//!
//! Board-support core for the ESP32-S3 handheld: a debounced key manager
//! fed from GPIO interrupts, a mutex-guarded buzzer tone player with
//! blocking and deferred-stop playback, and the power latch that keeps the
//! board switched on.

#[macro_use]
mod fmt;

pub mod types;
pub mod hal;
pub mod keys;
pub mod tone;
pub mod power;


pub use types::*;
pub use hal::{
    GpioController, GpioNum, HalError, InterruptTrigger, PinConfig, PinMode, PwmChannelConfig, PwmClock,
    PwmPeripheral, PwmTimerConfig,
};
pub use keys::*;
pub use tone::*;
pub use power::PowerLatch;
pub use embedded_hal::digital::PinState;

/// BSP library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Key manager settings used on the handheld (35 ms debounce)
pub fn default_key_config() -> KeyConfig {
    KeyConfig {
        debounce_ms: DEFAULT_DEBOUNCE_MS,
    }
}

/// Buzzer settings used on the handheld (GPIO42, 12-bit, 200..=2700 Hz)
pub fn default_tone_config() -> ToneConfig {
    ToneConfig::default()
}

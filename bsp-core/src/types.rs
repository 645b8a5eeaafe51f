//! Core data types for the key manager and tone player

use crate::hal::{GpioNum, HalError, PwmChannelConfig, PwmClock, PwmTimerConfig};
use embassy_time::Duration;

/// Key table capacity
pub const MAX_KEYS: usize = 4;

/// Interrupt → worker queue depth
pub const KEY_QUEUE_DEPTH: usize = 10;

/// Settle time between an edge and the level sample
pub const DEFAULT_DEBOUNCE_MS: u64 = 35;

/// Buzzer output pin
pub const BUZZER_GPIO: GpioNum = 42;

/// Debounced key transition delivered to handlers
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Hash))]
pub enum KeyEvent {
    /// Key went from released to pressed
    Press,
    /// Key went from pressed to released
    Release,
}

impl KeyEvent {
    /// Event produced when the debounced state becomes `pressed`
    pub const fn from_pressed(pressed: bool) -> Self {
        if pressed {
            KeyEvent::Press
        } else {
            KeyEvent::Release
        }
    }

    pub const fn is_press(&self) -> bool {
        matches!(self, KeyEvent::Press)
    }
}

/// Key manager configuration
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KeyConfig {
    /// Debounce window in milliseconds
    pub debounce_ms: u64,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl KeyConfig {
    /// Create a new configuration with validation
    pub fn new(debounce_ms: u64) -> Result<Self, &'static str> {
        if debounce_ms > 1000 {
            return Err("Debounce must be <= 1000ms");
        }
        Ok(Self { debounce_ms })
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Tone player configuration
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ToneConfig {
    /// Buzzer output pin
    pub gpio: GpioNum,
    /// PWM duty resolution in bits
    pub resolution_bits: u8,
    /// Lowest accepted frequency (inclusive)
    pub min_hz: u32,
    /// Highest accepted frequency (inclusive); also the timer's initial frequency
    pub max_hz: u32,
    /// Bounded wait for the peripheral lock
    pub lock_timeout_ms: u64,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            gpio: BUZZER_GPIO,
            resolution_bits: 12,
            min_hz: 200,
            max_hz: 2700,
            lock_timeout_ms: 100,
        }
    }
}

impl ToneConfig {
    /// Create a new configuration with validation
    pub fn new(
        gpio: GpioNum,
        resolution_bits: u8,
        min_hz: u32,
        max_hz: u32,
        lock_timeout_ms: u64,
    ) -> Result<Self, &'static str> {
        if gpio > 48 {
            return Err("GPIO must be between 0 and 48");
        }
        if resolution_bits == 0 || resolution_bits > 14 {
            return Err("Resolution must be between 1 and 14 bits");
        }
        if min_hz == 0 || min_hz > max_hz {
            return Err("Frequency band must be non-empty and above 0 Hz");
        }
        if lock_timeout_ms == 0 {
            return Err("Lock timeout must be > 0ms");
        }

        Ok(Self {
            gpio,
            resolution_bits,
            min_hz,
            max_hz,
            lock_timeout_ms,
        })
    }

    /// 50% duty at the configured resolution
    ///
    /// Zero for a resolution outside 1..=32 bits.
    pub const fn duty_on(&self) -> u32 {
        match self.resolution_bits {
            1..=32 => 1 << (self.resolution_bits - 1),
            _ => 0,
        }
    }

    pub const fn accepts(&self, hz: u32) -> bool {
        hz >= self.min_hz && hz <= self.max_hz
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn timer_config(&self) -> PwmTimerConfig {
        PwmTimerConfig {
            resolution_bits: self.resolution_bits,
            frequency_hz: self.max_hz,
            clock: PwmClock::Auto,
        }
    }

    /// Channel starts silent
    pub fn channel_config(&self) -> PwmChannelConfig {
        PwmChannelConfig {
            gpio: self.gpio,
            initial_duty: 0,
        }
    }
}

/// Errors returned by the key manager and tone player
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BspError {
    /// Component not initialized, or already claimed
    InvalidState,
    /// Argument out of range
    InvalidArgument,
    /// GPIO was never added
    NotFound,
    /// GPIO already has a key entry
    AlreadyRegistered,
    /// Key table is full
    TableFull,
    /// Worker or timer could not be started
    NoResource,
    /// Bounded lock wait expired; retry
    Timeout,
    /// Underlying peripheral call failed
    Hal(HalError),
}

impl From<HalError> for BspError {
    fn from(error: HalError) -> Self {
        BspError::Hal(error)
    }
}

impl core::fmt::Display for BspError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BspError::InvalidState => write!(f, "Invalid state"),
            BspError::InvalidArgument => write!(f, "Invalid argument"),
            BspError::NotFound => write!(f, "Key not registered"),
            BspError::AlreadyRegistered => write!(f, "Key already registered"),
            BspError::TableFull => write!(f, "Key table full"),
            BspError::NoResource => write!(f, "No resource"),
            BspError::Timeout => write!(f, "Lock timeout"),
            BspError::Hal(e) => write!(f, "HAL error: {}", e),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BspError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BspError::Hal(e) => Some(e),
            _ => None,
        }
    }
}

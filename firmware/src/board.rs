//! Handheld board wiring

use bsp_core::{GpioNum, PinState};

/// Pin assignments
pub mod pins {
    use super::*;

    /// Regulator enable; must stay high while running
    pub const POWER_HOLD: GpioNum = 40;

    /// Piezo buzzer, LEDC channel 1
    pub const BUZZER: GpioNum = 42;

    /// BOOT strap button, external pull-up
    pub const KEY_BOOT: GpioNum = 0;

    /// Side button to ground
    pub const KEY_SIDE: GpioNum = 1;

    /// Keys and the level that means pressed
    pub const KEYS: [(GpioNum, PinState); 2] = [(KEY_BOOT, PinState::Low), (KEY_SIDE, PinState::Low)];
}

/// Worker thread parameters
pub mod threads {
    pub const KEY_STACK_SIZE: usize = 4096;
    pub const KEY_PRIORITY: u8 = 10;

    pub const TONE_STACK_SIZE: usize = 3072;
    pub const TONE_PRIORITY: u8 = 5;
}

/// Feedback tones
pub mod tones {
    pub const BOOT_CHIME: [(u32, u32); 2] = [(1000, 80), (2000, 80)];
    pub const KEY_BEEP_HZ: u32 = 2000;
    pub const KEY_BEEP_MS: u32 = 60;
}

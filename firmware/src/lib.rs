//! Firmware library: ESP32-S3 bindings, board wiring and worker threads

pub use static_cell::StaticCell;

pub use bsp_core::*;

pub use crate::esp32s3_hardware::*;
pub use crate::tasks::*;

/// Tone player as instantiated on the board
pub type BoardPlayer = TonePlayer<EspLedc>;

pub mod board;
pub mod esp32s3_hardware;
pub mod tasks;

/// Buzzer configuration for this board
pub fn board_tone_config() -> ToneConfig {
    ToneConfig {
        gpio: board::pins::BUZZER,
        ..default_tone_config()
    }
}

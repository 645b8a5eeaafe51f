//! Hardware Abstraction Layer for the key manager and tone player
//!
//! Both components talk to the SoC through two narrow traits: a GPIO
//! controller (levels, interrupt triggers, ISR routing) and a single PWM
//! channel driving the buzzer. The board crate implements them on top of
//! the vendor drivers; `mock` provides host-side doubles.

/// Hardware pin number (ESP32-S3: 0..=48)
pub type GpioNum = u8;

/// Error types for HAL operations
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HalError {
    /// GPIO operation failed
    GpioError,
    /// PWM timer or channel operation failed
    PwmError,
    /// Interrupt configuration failed
    InterruptError,
    /// Global ISR service was installed earlier
    AlreadyInstalled,
    /// Hardware not initialized
    NotInitialized,
    /// Invalid configuration
    InvalidConfig,
    /// Vendor driver error code, passed through unchanged
    Platform(i32),
}

impl core::fmt::Display for HalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HalError::GpioError => write!(f, "GPIO operation failed"),
            HalError::PwmError => write!(f, "PWM operation failed"),
            HalError::InterruptError => write!(f, "Interrupt configuration failed"),
            HalError::AlreadyInstalled => write!(f, "ISR service already installed"),
            HalError::NotInitialized => write!(f, "Hardware not initialized"),
            HalError::InvalidConfig => write!(f, "Invalid configuration"),
            HalError::Platform(code) => write!(f, "Platform driver error {}", code),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HalError {}

/// Pin direction
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinMode {
    Disabled,
    Input,
    Output,
    InputOutput,
}

/// Condition that raises a GPIO interrupt
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InterruptTrigger {
    Disabled,
    RisingEdge,
    FallingEdge,
    /// Both edges; what the key manager uses
    AnyEdge,
    LowLevel,
    HighLevel,
}

/// Full pin configuration, applied in one call
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PinConfig {
    pub mode: PinMode,
    pub pull_up: bool,
    pub pull_down: bool,
    pub trigger: InterruptTrigger,
}

impl PinConfig {
    /// Floating input, no interrupt
    pub const fn input() -> Self {
        Self {
            mode: PinMode::Input,
            pull_up: false,
            pull_down: false,
            trigger: InterruptTrigger::Disabled,
        }
    }

    /// Push-pull output, no pulls, no interrupt
    pub const fn output() -> Self {
        Self {
            mode: PinMode::Output,
            pull_up: false,
            pull_down: false,
            trigger: InterruptTrigger::Disabled,
        }
    }

    pub const fn with_pull_up(mut self) -> Self {
        self.pull_up = true;
        self.pull_down = false;
        self
    }

    pub const fn with_pull_down(mut self) -> Self {
        self.pull_down = true;
        self.pull_up = false;
        self
    }

    pub const fn with_trigger(mut self, trigger: InterruptTrigger) -> Self {
        self.trigger = trigger;
        self
    }
}

/// Trait for the SoC GPIO matrix
///
/// All methods take `&self`: the debounce worker samples levels while the
/// interrupt handler is live on the same controller.
pub trait GpioController {
    /// Apply mode, pulls and trigger to a pin
    fn configure(&self, pin: GpioNum, config: &PinConfig) -> Result<(), HalError>;

    /// Sample the current electrical level
    fn level(&self, pin: GpioNum) -> Result<embedded_hal::digital::PinState, HalError>;

    /// Drive an output pin
    fn set_level(&self, pin: GpioNum, level: embedded_hal::digital::PinState) -> Result<(), HalError>;

    /// Change only the interrupt trigger of a pin
    fn set_interrupt_trigger(&self, pin: GpioNum, trigger: InterruptTrigger) -> Result<(), HalError>;

    /// Install the per-pin interrupt dispatch service.
    ///
    /// Returns `HalError::AlreadyInstalled` when another driver got there
    /// first; callers treat that as success.
    fn install_isr_service(&self) -> Result<(), HalError>;

    /// Route interrupts of `pin` to the key manager's interrupt entry point
    fn attach_isr(&self, pin: GpioNum) -> Result<(), HalError>;
}

/// PWM timer clock selection
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PwmClock {
    /// Let the driver pick a source that can reach the frequency
    Auto,
    Apb,
    Xtal,
}

/// PWM timer parameters
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PwmTimerConfig {
    /// Duty resolution in bits
    pub resolution_bits: u8,
    pub frequency_hz: u32,
    pub clock: PwmClock,
}

/// PWM channel parameters
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PwmChannelConfig {
    /// Output pin driven by the channel
    pub gpio: GpioNum,
    pub initial_duty: u32,
}

/// Trait for one PWM channel bound to its own timer
///
/// Duty writes are staged by `set_duty` and take effect on `update_duty`.
pub trait PwmPeripheral {
    fn configure_timer(&mut self, config: &PwmTimerConfig) -> Result<(), HalError>;

    fn configure_channel(&mut self, config: &PwmChannelConfig) -> Result<(), HalError>;

    /// Retune the timer without touching the duty
    fn set_frequency(&mut self, hz: u32) -> Result<(), HalError>;

    /// Stage a new duty value
    fn set_duty(&mut self, duty: u32) -> Result<(), HalError>;

    /// Latch the staged duty into the output
    fn update_duty(&mut self) -> Result<(), HalError>;
}

impl<T: GpioController + ?Sized> GpioController for &T {
    fn configure(&self, pin: GpioNum, config: &PinConfig) -> Result<(), HalError> {
        (**self).configure(pin, config)
    }

    fn level(&self, pin: GpioNum) -> Result<embedded_hal::digital::PinState, HalError> {
        (**self).level(pin)
    }

    fn set_level(&self, pin: GpioNum, level: embedded_hal::digital::PinState) -> Result<(), HalError> {
        (**self).set_level(pin, level)
    }

    fn set_interrupt_trigger(&self, pin: GpioNum, trigger: InterruptTrigger) -> Result<(), HalError> {
        (**self).set_interrupt_trigger(pin, trigger)
    }

    fn install_isr_service(&self) -> Result<(), HalError> {
        (**self).install_isr_service()
    }

    fn attach_isr(&self, pin: GpioNum) -> Result<(), HalError> {
        (**self).attach_isr(pin)
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    //! Mock implementations for testing
    //!
    //! Each mock is a cheap handle onto shared state: keep a clone to poke
    //! input levels or inspect the PWM output after handing the original
    //! to a component.

    use super::*;
    use embedded_hal::digital::PinState;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex, MutexGuard};
    use std::vec::Vec;

    #[derive(Default)]
    struct GpioState {
        levels: HashMap<GpioNum, PinState>,
        configs: HashMap<GpioNum, PinConfig>,
        triggers: HashMap<GpioNum, InterruptTrigger>,
        attached: Vec<GpioNum>,
        isr_service_installs: u32,
        isr_service_preinstalled: bool,
        fail_isr_service: Option<HalError>,
        fail_attach: Option<HalError>,
        fail_level: Option<HalError>,
    }

    /// GPIO matrix double; unset pins read low
    #[derive(Clone, Default)]
    pub struct MockGpio {
        state: Arc<Mutex<GpioState>>,
    }

    impl MockGpio {
        pub fn new() -> Self {
            Self::default()
        }

        fn state(&self) -> MutexGuard<'_, GpioState> {
            self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        /// Drive an input from outside, as a button or signal generator would
        pub fn drive(&self, pin: GpioNum, level: PinState) {
            self.state().levels.insert(pin, level);
        }

        /// Behave as if another driver already installed the ISR service
        pub fn preinstall_isr_service(&self) {
            self.state().isr_service_preinstalled = true;
        }

        pub fn fail_isr_service(&self, error: HalError) {
            self.state().fail_isr_service = Some(error);
        }

        pub fn fail_attach(&self, error: Option<HalError>) {
            self.state().fail_attach = error;
        }

        pub fn fail_level(&self, error: Option<HalError>) {
            self.state().fail_level = error;
        }

        pub fn isr_service_installs(&self) -> u32 {
            self.state().isr_service_installs
        }

        pub fn trigger(&self, pin: GpioNum) -> Option<InterruptTrigger> {
            self.state().triggers.get(&pin).copied()
        }

        pub fn config(&self, pin: GpioNum) -> Option<PinConfig> {
            self.state().configs.get(&pin).copied()
        }

        pub fn is_attached(&self, pin: GpioNum) -> bool {
            self.state().attached.contains(&pin)
        }

        pub fn output_level(&self, pin: GpioNum) -> PinState {
            self.state().levels.get(&pin).copied().unwrap_or(PinState::Low)
        }
    }

    impl GpioController for MockGpio {
        fn configure(&self, pin: GpioNum, config: &PinConfig) -> Result<(), HalError> {
            let mut state = self.state();
            state.configs.insert(pin, *config);
            state.triggers.insert(pin, config.trigger);
            Ok(())
        }

        fn level(&self, pin: GpioNum) -> Result<PinState, HalError> {
            let state = self.state();
            if let Some(error) = state.fail_level {
                return Err(error);
            }
            Ok(state.levels.get(&pin).copied().unwrap_or(PinState::Low))
        }

        fn set_level(&self, pin: GpioNum, level: PinState) -> Result<(), HalError> {
            self.state().levels.insert(pin, level);
            Ok(())
        }

        fn set_interrupt_trigger(&self, pin: GpioNum, trigger: InterruptTrigger) -> Result<(), HalError> {
            self.state().triggers.insert(pin, trigger);
            Ok(())
        }

        fn install_isr_service(&self) -> Result<(), HalError> {
            let mut state = self.state();
            if let Some(error) = state.fail_isr_service {
                return Err(error);
            }
            if state.isr_service_preinstalled || state.isr_service_installs > 0 {
                return Err(HalError::AlreadyInstalled);
            }
            state.isr_service_installs += 1;
            Ok(())
        }

        fn attach_isr(&self, pin: GpioNum) -> Result<(), HalError> {
            let mut state = self.state();
            if let Some(error) = state.fail_attach {
                return Err(error);
            }
            if !state.attached.contains(&pin) {
                state.attached.push(pin);
            }
            Ok(())
        }
    }

    /// PWM driver call, recorded in order
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub enum PwmOp {
        ConfigureTimer,
        ConfigureChannel,
        SetFrequency(u32),
        SetDuty(u32),
        UpdateDuty,
    }

    impl PwmOp {
        fn kind(&self) -> u8 {
            match self {
                PwmOp::ConfigureTimer => 0,
                PwmOp::ConfigureChannel => 1,
                PwmOp::SetFrequency(_) => 2,
                PwmOp::SetDuty(_) => 3,
                PwmOp::UpdateDuty => 4,
            }
        }
    }

    #[derive(Default)]
    struct PwmState {
        timer: Option<PwmTimerConfig>,
        channel: Option<PwmChannelConfig>,
        frequency_hz: u32,
        staged_duty: u32,
        duty: u32,
        ops: Vec<PwmOp>,
        fail_once: Option<(PwmOp, HalError)>,
    }

    /// Buzzer PWM double recording every driver call
    #[derive(Clone, Default)]
    pub struct MockPwm {
        state: Arc<Mutex<PwmState>>,
    }

    impl MockPwm {
        pub fn new() -> Self {
            Self::default()
        }

        fn state(&self) -> MutexGuard<'_, PwmState> {
            self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        /// Make the next call of the same kind as `op` fail with `error`
        pub fn fail_next(&self, op: PwmOp, error: HalError) {
            self.state().fail_once = Some((op, error));
        }

        /// Duty currently latched on the output
        pub fn duty(&self) -> u32 {
            self.state().duty
        }

        pub fn frequency(&self) -> u32 {
            self.state().frequency_hz
        }

        pub fn timer_config(&self) -> Option<PwmTimerConfig> {
            self.state().timer
        }

        pub fn channel_config(&self) -> Option<PwmChannelConfig> {
            self.state().channel
        }

        pub fn ops(&self) -> Vec<PwmOp> {
            self.state().ops.clone()
        }

        pub fn clear_ops(&self) {
            self.state().ops.clear();
        }

        fn record(&self, op: PwmOp) -> Result<MutexGuard<'_, PwmState>, HalError> {
            let mut state = self.state();
            if let Some((failing, error)) = state.fail_once {
                if failing.kind() == op.kind() {
                    state.fail_once = None;
                    return Err(error);
                }
            }
            state.ops.push(op);
            Ok(state)
        }
    }

    impl PwmPeripheral for MockPwm {
        fn configure_timer(&mut self, config: &PwmTimerConfig) -> Result<(), HalError> {
            let mut state = self.record(PwmOp::ConfigureTimer)?;
            state.timer = Some(*config);
            state.frequency_hz = config.frequency_hz;
            Ok(())
        }

        fn configure_channel(&mut self, config: &PwmChannelConfig) -> Result<(), HalError> {
            let mut state = self.record(PwmOp::ConfigureChannel)?;
            state.channel = Some(*config);
            state.staged_duty = config.initial_duty;
            state.duty = config.initial_duty;
            Ok(())
        }

        fn set_frequency(&mut self, hz: u32) -> Result<(), HalError> {
            let mut state = self.record(PwmOp::SetFrequency(hz))?;
            if state.timer.is_none() {
                return Err(HalError::NotInitialized);
            }
            state.frequency_hz = hz;
            Ok(())
        }

        fn set_duty(&mut self, duty: u32) -> Result<(), HalError> {
            let mut state = self.record(PwmOp::SetDuty(duty))?;
            state.staged_duty = duty;
            Ok(())
        }

        fn update_duty(&mut self) -> Result<(), HalError> {
            let mut state = self.record(PwmOp::UpdateDuty)?;
            state.duty = state.staged_duty;
            Ok(())
        }
    }
}

//! ESP32-S3 hardware implementation
//!
//! GPIO matrix and LEDC bindings over the ESP-IDF C drivers.

use core::ffi::c_void;
use std::sync::OnceLock;

use bsp_core::hal::{
    GpioController, GpioNum, HalError, InterruptTrigger, PinConfig, PinMode, PwmChannelConfig, PwmClock,
    PwmPeripheral, PwmTimerConfig,
};
use bsp_core::{BspError, KeyManager, PinState};
use esp_idf_svc::sys::{self, esp, EspError};

/// Key manager as instantiated on the board
pub type BoardKeys = KeyManager<'static, EspGpio>;

/// Key manager that receives GPIO interrupts
static KEY_SINK: OnceLock<&'static BoardKeys> = OnceLock::new();

/// Pass an ESP-IDF error code through unchanged
pub fn platform(error: EspError) -> HalError {
    HalError::Platform(error.code())
}

fn gpio_num(pin: GpioNum) -> Result<sys::gpio_num_t, HalError> {
    let num = sys::gpio_num_t::from(pin);
    if num >= sys::gpio_num_t_GPIO_NUM_MAX {
        return Err(HalError::InvalidConfig);
    }
    Ok(num)
}

fn intr_type(trigger: InterruptTrigger) -> sys::gpio_int_type_t {
    match trigger {
        InterruptTrigger::Disabled => sys::gpio_int_type_t_GPIO_INTR_DISABLE,
        InterruptTrigger::RisingEdge => sys::gpio_int_type_t_GPIO_INTR_POSEDGE,
        InterruptTrigger::FallingEdge => sys::gpio_int_type_t_GPIO_INTR_NEGEDGE,
        InterruptTrigger::AnyEdge => sys::gpio_int_type_t_GPIO_INTR_ANYEDGE,
        InterruptTrigger::LowLevel => sys::gpio_int_type_t_GPIO_INTR_LOW_LEVEL,
        InterruptTrigger::HighLevel => sys::gpio_int_type_t_GPIO_INTR_HIGH_LEVEL,
    }
}

/// Route GPIO interrupts to `keys`. Can only be done once.
pub fn route_key_interrupts(keys: &'static BoardKeys) -> Result<(), BspError> {
    KEY_SINK.set(keys).map_err(|_| BspError::InvalidState)
}

/// Shared per-pin handler; `arg` carries the pin number
unsafe extern "C" fn key_isr(arg: *mut c_void) {
    if let Some(keys) = KEY_SINK.get() {
        keys.on_interrupt(arg as usize as GpioNum);
    }
}

/// GPIO matrix through the ESP-IDF GPIO driver
#[derive(Debug, Default, Clone, Copy)]
pub struct EspGpio;

impl GpioController for EspGpio {
    fn configure(&self, pin: GpioNum, config: &PinConfig) -> Result<(), HalError> {
        let io_conf = sys::gpio_config_t {
            pin_bit_mask: 1u64 << gpio_num(pin)?,
            mode: match config.mode {
                PinMode::Disabled => sys::gpio_mode_t_GPIO_MODE_DISABLE,
                PinMode::Input => sys::gpio_mode_t_GPIO_MODE_INPUT,
                PinMode::Output => sys::gpio_mode_t_GPIO_MODE_OUTPUT,
                PinMode::InputOutput => sys::gpio_mode_t_GPIO_MODE_INPUT_OUTPUT,
            },
            pull_up_en: if config.pull_up {
                sys::gpio_pullup_t_GPIO_PULLUP_ENABLE
            } else {
                sys::gpio_pullup_t_GPIO_PULLUP_DISABLE
            },
            pull_down_en: if config.pull_down {
                sys::gpio_pulldown_t_GPIO_PULLDOWN_ENABLE
            } else {
                sys::gpio_pulldown_t_GPIO_PULLDOWN_DISABLE
            },
            intr_type: intr_type(config.trigger),
            ..Default::default()
        };

        esp!(unsafe { sys::gpio_config(&io_conf) }).map_err(|e| {
            log::error!("GPIO{} config failed: {}", pin, e);
            platform(e)
        })
    }

    fn level(&self, pin: GpioNum) -> Result<PinState, HalError> {
        let raw = unsafe { sys::gpio_get_level(gpio_num(pin)?) };
        Ok(PinState::from(raw != 0))
    }

    fn set_level(&self, pin: GpioNum, level: PinState) -> Result<(), HalError> {
        let raw = u32::from(level == PinState::High);
        esp!(unsafe { sys::gpio_set_level(gpio_num(pin)?, raw) }).map_err(platform)
    }

    fn set_interrupt_trigger(&self, pin: GpioNum, trigger: InterruptTrigger) -> Result<(), HalError> {
        esp!(unsafe { sys::gpio_set_intr_type(gpio_num(pin)?, intr_type(trigger)) }).map_err(platform)
    }

    fn install_isr_service(&self) -> Result<(), HalError> {
        let err = unsafe { sys::gpio_install_isr_service(0) };
        if err == sys::ESP_ERR_INVALID_STATE as sys::esp_err_t {
            return Err(HalError::AlreadyInstalled);
        }
        esp!(err).map_err(platform)
    }

    fn attach_isr(&self, pin: GpioNum) -> Result<(), HalError> {
        let num = gpio_num(pin)?;
        esp!(unsafe { sys::gpio_isr_handler_add(num, Some(key_isr), usize::from(pin) as *mut c_void) })
            .map_err(|e| {
                log::error!("GPIO{} ISR attach failed: {}", pin, e);
                HalError::InterruptError
            })
    }
}

const LEDC_MODE: sys::ledc_mode_t = sys::ledc_mode_t_LEDC_LOW_SPEED_MODE;

/// Buzzer channel: LEDC channel 1 on timer 0, low-speed group
#[derive(Debug)]
pub struct EspLedc {
    timer: sys::ledc_timer_t,
    channel: sys::ledc_channel_t,
}

impl EspLedc {
    pub const fn new() -> Self {
        Self {
            timer: sys::ledc_timer_t_LEDC_TIMER_0,
            channel: sys::ledc_channel_t_LEDC_CHANNEL_1,
        }
    }
}

impl Default for EspLedc {
    fn default() -> Self {
        Self::new()
    }
}

impl PwmPeripheral for EspLedc {
    fn configure_timer(&mut self, config: &PwmTimerConfig) -> Result<(), HalError> {
        let timer_conf = sys::ledc_timer_config_t {
            speed_mode: LEDC_MODE,
            duty_resolution: sys::ledc_timer_bit_t::from(config.resolution_bits),
            timer_num: self.timer,
            freq_hz: config.frequency_hz,
            clk_cfg: match config.clock {
                PwmClock::Auto => sys::soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
                PwmClock::Apb => sys::soc_periph_ledc_clk_src_legacy_t_LEDC_USE_APB_CLK,
                PwmClock::Xtal => sys::soc_periph_ledc_clk_src_legacy_t_LEDC_USE_XTAL_CLK,
            },
            ..Default::default()
        };
        esp!(unsafe { sys::ledc_timer_config(&timer_conf) }).map_err(platform)
    }

    fn configure_channel(&mut self, config: &PwmChannelConfig) -> Result<(), HalError> {
        let channel_conf = sys::ledc_channel_config_t {
            gpio_num: gpio_num(config.gpio)?,
            speed_mode: LEDC_MODE,
            channel: self.channel,
            intr_type: sys::ledc_intr_type_t_LEDC_INTR_DISABLE,
            timer_sel: self.timer,
            duty: config.initial_duty,
            hpoint: 0,
            ..Default::default()
        };
        esp!(unsafe { sys::ledc_channel_config(&channel_conf) }).map_err(platform)
    }

    fn set_frequency(&mut self, hz: u32) -> Result<(), HalError> {
        esp!(unsafe { sys::ledc_set_freq(LEDC_MODE, self.timer, hz) }).map_err(platform)
    }

    fn set_duty(&mut self, duty: u32) -> Result<(), HalError> {
        esp!(unsafe { sys::ledc_set_duty(LEDC_MODE, self.channel, duty) }).map_err(platform)
    }

    fn update_duty(&mut self) -> Result<(), HalError> {
        esp!(unsafe { sys::ledc_update_duty(LEDC_MODE, self.channel) }).map_err(platform)
    }
}

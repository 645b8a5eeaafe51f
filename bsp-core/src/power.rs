//! Soft power latch
//!
//! The handheld's regulator stays enabled only while the MCU drives the
//! hold line. Firmware asserts it first thing at boot and releases it to
//! power the board off.

use embedded_hal::digital::OutputPin;

use crate::hal::HalError;

pub struct PowerLatch<P> {
    pin: P,
    active_high: bool,
    held: bool,
}

impl<P> PowerLatch<P>
where
    P: OutputPin,
{
    /// `active_high` is the pin level that keeps the board powered
    pub fn new(pin: P, active_high: bool) -> Self {
        Self {
            pin,
            active_high,
            held: false,
        }
    }

    /// Keep the board powered
    pub fn hold(&mut self) -> Result<(), HalError> {
        self.drive(true)?;
        self.held = true;
        info!("Power latch held");
        Ok(())
    }

    /// Let the regulator switch off. On battery this cuts our own supply.
    pub fn release(&mut self) -> Result<(), HalError> {
        self.drive(false)?;
        self.held = false;
        info!("Power latch released");
        Ok(())
    }

    /// Last successfully driven state
    pub fn is_held(&self) -> bool {
        self.held
    }

    fn drive(&mut self, hold: bool) -> Result<(), HalError> {
        let high = hold == self.active_high;
        if high {
            self.pin.set_high().map_err(|_| HalError::GpioError)
        } else {
            self.pin.set_low().map_err(|_| HalError::GpioError)
        }
    }

    /// Give the pin back
    pub fn free(self) -> P {
        self.pin
    }
}

use std::thread;
use std::time::Duration;

use crate::error::Result;

// Use rppal in production
#[cfg(not(test))]
use rppal::gpio::{Gpio, InputPin, Level};

#[cfg(test)]
// This is only used in testing, not compiled in release.
use crate::mocks::mock_gpio::{Gpio, InputPin, Level};

/// Time for the internal pull-up to charge the line after configuration.
const PULL_UP_SETTLE: Duration = Duration::from_millis(100);

/// Momentary push button wired between the pin and ground.
///
/// The pin uses the internal pull-up, so an idle button reads High and a
/// pressed one reads Low.
pub struct ModeButton {
    pin: InputPin,
    pin_number: u8,
}

impl ModeButton {
    pub fn new(gpio: &Gpio, pin_number: u8) -> Result<Self> {
        let pin = gpio.get(pin_number)?.into_input_pullup();

        thread::sleep(PULL_UP_SETTLE);

        Ok(Self { pin, pin_number })
    }

    pub fn pin_number(&self) -> u8 {
        self.pin_number
    }

    /// Raw level, no debouncing.
    pub fn is_pressed(&self) -> bool {
        self.pin.read() == Level::Low
    }
}

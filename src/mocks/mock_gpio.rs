// This file is only compiled during tests

use std::cell::RefCell;
use std::collections::HashMap;

use rppal::gpio::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Level {
    Low,
    High,
}

thread_local! {
    static MOCK_PINS: RefCell<HashMap<u8, Level>> = RefCell::new(HashMap::new());
    static MOCK_SOFT_PWM: RefCell<HashMap<u8, (f64, f64)>> = RefCell::new(HashMap::new());
}

pub struct InputPin {
    pin: u8,
}

impl InputPin {
    pub fn read(&self) -> Level {
        MOCK_PINS.with(|pins| *pins.borrow().get(&self.pin).unwrap_or(&Level::High))
    }
}

pub struct OutputPin {
    pin: u8,
}

impl OutputPin {
    pub fn set_pwm_frequency(&mut self, frequency: f64, duty_cycle: f64) -> Result<(), Error> {
        MOCK_SOFT_PWM.with(|pwm| {
            pwm.borrow_mut().insert(self.pin, (frequency, duty_cycle));
        });
        Ok(())
    }

    pub fn clear_pwm(&mut self) -> Result<(), Error> {
        MOCK_SOFT_PWM.with(|pwm| {
            pwm.borrow_mut().remove(&self.pin);
        });
        Ok(())
    }
}

pub struct Gpio;

impl Gpio {
    pub fn new() -> Result<Self, Error> {
        Ok(Gpio)
    }

    pub fn get(&self, pin: u8) -> Result<Pin, Error> {
        Ok(Pin { pin })
    }
}

pub struct Pin {
    pin: u8,
}

impl Pin {
    pub fn into_input_pullup(self) -> InputPin {
        MOCK_PINS.with(|pins| {
            pins.borrow_mut().insert(self.pin, Level::High);
        });
        InputPin { pin: self.pin }
    }

    pub fn into_output_low(self) -> OutputPin {
        MOCK_PINS.with(|pins| {
            pins.borrow_mut().insert(self.pin, Level::Low);
        });
        OutputPin { pin: self.pin }
    }
}

// test helper function to set pin levels
pub fn set_mock_pin_level(pin: u8, level: Level) {
    MOCK_PINS.with(|pins| {
        pins.borrow_mut().insert(pin, level);
    });
}

// test helper: (frequency, duty) of a software PWM pin, if running
pub fn get_mock_soft_pwm(pin: u8) -> Option<(f64, f64)> {
    MOCK_SOFT_PWM.with(|pwm| pwm.borrow().get(&pin).copied())
}

// test helper to reset all pins
pub fn reset_mock_pins() {
    MOCK_PINS.with(|pins| {
        pins.borrow_mut().clear();
    });
    MOCK_SOFT_PWM.with(|pwm| {
        pwm.borrow_mut().clear();
    });
}

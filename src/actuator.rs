use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::aim::AngleState;
use crate::config::HardwareSettings;
use crate::error::Result;
use crate::gpio_input::ModeButton;
use crate::servo::{PulseProfile, Servo, hardware_channel_index};

#[cfg(not(test))]
use rppal::gpio::Gpio;

#[cfg(test)]
use crate::mocks::mock_gpio::Gpio;

/// Output side of the turret: two servos and the mode button.
pub trait Actuator {
    /// Drive pan (x) and tilt (y) to the given angles in degrees.
    fn set_angles(&mut self, angles: AngleState) -> Result<()>;

    /// Current button level, true while held.
    fn button_pressed(&mut self) -> bool;

    /// Stop PWM and release pins. Safe to call twice.
    fn close(&mut self) -> Result<()>;
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn set_angles(&mut self, angles: AngleState) -> Result<()> {
        (**self).set_angles(angles)
    }

    fn button_pressed(&mut self) -> bool {
        (**self).button_pressed()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Pan/tilt bracket on the Raspberry Pi header.
///
/// Each servo gets a hardware PWM channel when its pin has one and the
/// channel is not already taken by the other axis. Anything else falls
/// back to software PWM.
pub struct PanTiltRig {
    pan: Servo,
    tilt: Servo,
    button: ModeButton,
    settle: Duration,
    closed: bool,
}

impl PanTiltRig {
    pub fn new(settings: &HardwareSettings) -> Result<Self> {
        let gpio = Gpio::new()?;
        let profile = PulseProfile::from_settings(settings);

        let pan_channel = hardware_channel_index(settings.servo_x_pin);
        let tilt_channel =
            hardware_channel_index(settings.servo_y_pin).filter(|ch| Some(*ch) != pan_channel);

        let pan = match pan_channel {
            Some(ch) => Servo::hardware(settings.servo_x_pin, ch, profile)?,
            None => Servo::software(&gpio, settings.servo_x_pin, profile)?,
        };
        let tilt = match tilt_channel {
            Some(ch) => Servo::hardware(settings.servo_y_pin, ch, profile)?,
            None => Servo::software(&gpio, settings.servo_y_pin, profile)?,
        };
        let button = ModeButton::new(&gpio, settings.button_pin)?;

        info!(
            "Servos: pan GPIO {} ({}), tilt GPIO {} ({}), button GPIO {}",
            pan.pin(),
            if pan.is_hardware() { "hardware PWM" } else { "software PWM" },
            tilt.pin(),
            if tilt.is_hardware() { "hardware PWM" } else { "software PWM" },
            button.pin_number(),
        );

        Ok(Self {
            pan,
            tilt,
            button,
            settle: Duration::from_millis(settings.settle_ms),
            closed: false,
        })
    }

    pub fn pan(&self) -> &Servo {
        &self.pan
    }

    pub fn tilt(&self) -> &Servo {
        &self.tilt
    }
}

impl Actuator for PanTiltRig {
    fn set_angles(&mut self, angles: AngleState) -> Result<()> {
        self.pan.set_angle(angles.ang_x)?;
        self.tilt.set_angle(angles.ang_y)?;
        if !self.settle.is_zero() {
            thread::sleep(self.settle);
        }
        Ok(())
    }

    fn button_pressed(&mut self) -> bool {
        self.button.is_pressed()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pan.disable()?;
        self.tilt.disable()?;
        debug!("Servo PWM stopped");
        Ok(())
    }
}

impl Drop for PanTiltRig {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Records every write and plays back a scripted button.
///
/// The button script is consumed one entry per poll; once it runs out the
/// button reads released.
#[derive(Debug, Default)]
pub struct MockActuator {
    writes: Vec<AngleState>,
    button_script: VecDeque<bool>,
    polls: u64,
    closed: bool,
}

impl MockActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_button_script(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            button_script: script.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn writes(&self) -> &[AngleState] {
        &self.writes
    }

    pub fn last_write(&self) -> Option<AngleState> {
        self.writes.last().copied()
    }

    pub fn button_polls(&self) -> u64 {
        self.polls
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Actuator for MockActuator {
    fn set_angles(&mut self, angles: AngleState) -> Result<()> {
        self.writes.push(angles);
        Ok(())
    }

    fn button_pressed(&mut self) -> bool {
        self.polls += 1;
        self.button_script.pop_front().unwrap_or(false)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

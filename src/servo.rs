use log::debug;

use crate::config::HardwareSettings;
use crate::error::Result;

// Use rppal in production
#[cfg(not(test))]
use rppal::gpio::{Gpio, OutputPin};
#[cfg(not(test))]
use rppal::pwm::{Channel, Polarity, Pwm};

// Mock PWM for testing
#[cfg(test)]
use crate::mocks::mock_gpio::{Gpio, OutputPin};
#[cfg(test)]
use crate::mocks::mock_pwm::{Channel, Polarity, Pwm};

/// Servo angle range (degrees).
pub const SERVO_MIN_ANGLE: f64 = 0.0;
pub const SERVO_MAX_ANGLE: f64 = 180.0;

/// Hardware PWM channel index for a BCM pin.
/// Hardware PWM is available on:
/// - GPIO 12 (PWM0)
/// - GPIO 13 (PWM1)
/// - GPIO 18 (PWM0)
/// - GPIO 19 (PWM1)
pub fn hardware_channel_index(pin: u8) -> Option<u8> {
    match pin {
        12 | 18 => Some(0),
        13 | 19 => Some(1),
        _ => None,
    }
}

fn channel_for_index(index: u8) -> Channel {
    if index == 0 { Channel::Pwm0 } else { Channel::Pwm1 }
}

/// Maps an angle to a pulse width and a duty cycle for one servo.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseProfile {
    pub frequency_hz: f64,
    pub min_pulse_us: f64,
    pub max_pulse_us: f64,
}

impl PulseProfile {
    pub fn from_settings(settings: &HardwareSettings) -> Self {
        Self {
            frequency_hz: settings.pwm_hz,
            min_pulse_us: settings.pulse_min_us,
            max_pulse_us: settings.pulse_max_us,
        }
    }

    pub fn period_us(&self) -> f64 {
        1_000_000.0 / self.frequency_hz
    }

    /// 0° → min pulse, 180° → max pulse, linear in between.
    pub fn pulse_width_us(&self, angle: f64) -> f64 {
        let clamped = angle.clamp(SERVO_MIN_ANGLE, SERVO_MAX_ANGLE);
        self.min_pulse_us + (clamped / SERVO_MAX_ANGLE) * (self.max_pulse_us - self.min_pulse_us)
    }

    /// Fraction of the PWM period the line is held high.
    pub fn duty_cycle(&self, angle: f64) -> f64 {
        (self.pulse_width_us(angle) / self.period_us()).clamp(0.0, 1.0)
    }
}

enum PwmOutput {
    Hardware(Pwm),
    Software(OutputPin),
}

/// One positional servo driven either by a hardware PWM channel or by
/// software PWM on a plain output pin.
pub struct Servo {
    pin: u8,
    output: PwmOutput,
    profile: PulseProfile,
    enabled: bool,
}

impl Servo {
    /// Drive `pin` from hardware PWM channel `channel` (0 or 1).
    pub fn hardware(pin: u8, channel: u8, profile: PulseProfile) -> Result<Self> {
        let pwm = Pwm::with_frequency(
            channel_for_index(channel),
            profile.frequency_hz,
            0.0,
            Polarity::Normal,
            true, // enabled
        )?;
        debug!("Servo on GPIO {pin}: hardware PWM{channel}");

        Ok(Self {
            pin,
            output: PwmOutput::Hardware(pwm),
            profile,
            enabled: true,
        })
    }

    /// Drive `pin` with software PWM.
    pub fn software(gpio: &Gpio, pin: u8, profile: PulseProfile) -> Result<Self> {
        let output = gpio.get(pin)?.into_output_low();
        debug!("Servo on GPIO {pin}: software PWM");

        Ok(Self {
            pin,
            output: PwmOutput::Software(output),
            profile,
            enabled: true,
        })
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    pub fn is_hardware(&self) -> bool {
        matches!(self.output, PwmOutput::Hardware(_))
    }

    /// Set servo position (0° to 180°). Out-of-range angles are clamped.
    pub fn set_angle(&mut self, angle: f64) -> Result<()> {
        let duty = self.profile.duty_cycle(angle);
        match &mut self.output {
            PwmOutput::Hardware(pwm) => pwm.set_duty_cycle(duty)?,
            PwmOutput::Software(pin) => pin.set_pwm_frequency(self.profile.frequency_hz, duty)?,
        }
        Ok(())
    }

    /// Stop the pulse train. Idempotent.
    pub fn disable(&mut self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.enabled = false;
        match &mut self.output {
            PwmOutput::Hardware(pwm) => pwm.disable()?,
            PwmOutput::Software(pin) => pin.clear_pwm()?,
        }
        Ok(())
    }
}

impl Drop for Servo {
    fn drop(&mut self) {
        // Ensure PWM is disabled when dropped
        let _ = self.disable();
    }
}

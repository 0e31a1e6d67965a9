// This file is only compiled during tests

use std::cell::RefCell;
use std::collections::HashMap;

use rppal::pwm::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Pwm0,
    Pwm1,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Polarity {
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelState {
    pub frequency: f64,
    pub duty_cycle: f64,
    pub enabled: bool,
}

thread_local! {
    static MOCK_CHANNELS: RefCell<HashMap<Channel, ChannelState>> = RefCell::new(HashMap::new());
}

pub struct Pwm {
    channel: Channel,
}

impl Pwm {
    pub fn with_frequency(
        channel: Channel,
        frequency: f64,
        duty_cycle: f64,
        _polarity: Polarity,
        enabled: bool,
    ) -> Result<Self, Error> {
        MOCK_CHANNELS.with(|channels| {
            channels.borrow_mut().insert(
                channel,
                ChannelState {
                    frequency,
                    duty_cycle,
                    enabled,
                },
            );
        });
        Ok(Pwm { channel })
    }

    pub fn set_duty_cycle(&self, duty_cycle: f64) -> Result<(), Error> {
        MOCK_CHANNELS.with(|channels| {
            if let Some(state) = channels.borrow_mut().get_mut(&self.channel) {
                state.duty_cycle = duty_cycle;
            }
        });
        Ok(())
    }

    pub fn disable(&self) -> Result<(), Error> {
        MOCK_CHANNELS.with(|channels| {
            if let Some(state) = channels.borrow_mut().get_mut(&self.channel) {
                state.enabled = false;
            }
        });
        Ok(())
    }
}

// Test helper
pub fn get_mock_channel(channel: Channel) -> Option<ChannelState> {
    MOCK_CHANNELS.with(|channels| channels.borrow().get(&channel).copied())
}

pub fn reset_mock_channels() {
    MOCK_CHANNELS.with(|channels| channels.borrow_mut().clear());
}

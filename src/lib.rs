pub mod actuator;
pub mod aim;
pub mod ballistic;
pub mod camera;
pub mod config;
pub mod control_loop;
pub mod detection;
#[cfg(feature = "display")]
pub mod display;
pub mod error;
pub mod gpio_input;
pub mod mode;
pub mod overlay;
pub mod servo;
pub mod shutdown;

// Re-export commonly used types
pub use aim::{AimController, AngleState};
pub use config::TurretConfig;
pub use control_loop::ControlLoop;
pub use error::{Result, TurretError};
pub use mode::Mode;

#[cfg(test)]
pub(crate) mod mocks;

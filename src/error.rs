use thiserror::Error;

/// Errors surfaced at startup or when a hardware write fails mid-loop.
///
/// Per-tick conditions such as a missing frame or an absent target are not
/// errors and never show up here.
#[derive(Error, Debug)]
pub enum TurretError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Gpio(#[from] rppal::gpio::Error),
    #[error(transparent)]
    Pwm(#[from] rppal::pwm::Error),
    #[error("camera error: {0}")]
    Camera(String),
    #[error("detector error: {0}")]
    Detector(String),
    #[error("display error: {0}")]
    Display(String),
    #[error("overlay error: {0}")]
    Overlay(String),
    #[error("signal handler error: {0}")]
    Signal(String),
}

pub type Result<T> = std::result::Result<T, TurretError>;

//! Camera abstraction.
//!
//! The control loop only needs the most recent frame, or nothing when the
//! camera has none ready. Backends are chosen once at startup.

pub mod mock;
#[cfg(feature = "camera")]
pub mod v4l2;

use image::RgbImage;

#[cfg(feature = "camera")]
use log::{info, warn};

#[cfg(feature = "camera")]
use crate::config::CameraSettings;
#[cfg(feature = "camera")]
use crate::error::Result;

pub use mock::MockCamera;

/// One 8-bit RGB frame, owned by the loop for a single tick.
pub type Frame = RgbImage;

/// Frame source used by the control loop.
pub trait Camera {
    /// The latest frame, or `None` if no frame is available this tick.
    fn get_frame(&mut self) -> Option<Frame>;

    /// Stop streaming and release the device. Safe to call more than once.
    fn close(&mut self);

    fn backend_name(&self) -> &'static str;
}

impl<C: Camera + ?Sized> Camera for Box<C> {
    fn get_frame(&mut self) -> Option<Frame> {
        (**self).get_frame()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}

/// Open the sensor-module backend when requested and available, falling
/// back to a generic webcam otherwise.
#[cfg(feature = "camera")]
pub fn open_camera(settings: &CameraSettings) -> Result<v4l2::V4l2Camera> {
    if settings.use_sensor_module {
        match v4l2::V4l2Camera::open_sensor_module(settings) {
            Ok(camera) => {
                info!("Using sensor module on {}", settings.sensor_device);
                return Ok(camera);
            }
            Err(e) => warn!("Sensor module unavailable ({e}), falling back to webcam"),
        }
    }
    let camera = v4l2::V4l2Camera::open_webcam(settings)?;
    info!("Using webcam on {}", settings.webcam_device);
    Ok(camera)
}

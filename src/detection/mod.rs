//! Target detection strategies.
//!
//! Both strategies share one contract: given a frame, return the target's
//! pixel position or nothing. "No target" is a normal outcome, not an error.
//! The strategy is chosen once at startup and dispatched through an enum.

pub mod color_blob;
pub mod fiducial;

use crate::camera::Frame;
use crate::config::{DetectionMode, DetectionSettings};
use crate::error::Result;

pub use color_blob::ColorBlobDetector;
#[cfg(feature = "fiducial")]
pub use fiducial::FiducialDetector;
pub use fiducial::{DistanceEstimator, MarkerQuad};

/// Anything the control loop can ask for a target each tick.
///
/// Implemented statically by [`TargetDetector`]; the loop is generic over
/// it so no virtual call sits in the tick path.
pub trait TargetLocator {
    fn locate(&mut self, frame: &Frame) -> Option<Detection>;

    fn name(&self) -> &'static str;
}

/// One located target, produced fresh every tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x: i32,
    pub y: i32,
    /// Enclosing radius for a blob, observed side length for a marker.
    pub extent: i32,
    /// Only fiducial detections carry a distance.
    pub distance_cm: Option<f64>,
}

impl Detection {
    /// Offset of the target from `center`, positive right and down.
    pub fn error_from(&self, center: (i32, i32)) -> (i32, i32) {
        (self.x - center.0, self.y - center.1)
    }
}

pub enum TargetDetector {
    ColorBlob(ColorBlobDetector),
    #[cfg(feature = "fiducial")]
    Fiducial(FiducialDetector),
}

impl TargetDetector {
    pub fn from_settings(settings: &DetectionSettings) -> Result<Self> {
        match settings.mode {
            DetectionMode::Color => Ok(Self::ColorBlob(ColorBlobDetector::from_settings(settings))),
            #[cfg(feature = "fiducial")]
            DetectionMode::Fiducial => Ok(Self::Fiducial(FiducialDetector::from_settings(settings)?)),
            #[cfg(not(feature = "fiducial"))]
            DetectionMode::Fiducial => Err(crate::error::TurretError::Config(
                "fiducial detection requires the `fiducial` feature".to_string(),
            )),
        }
    }

    pub fn detect(&mut self, frame: &Frame) -> Option<Detection> {
        match self {
            Self::ColorBlob(detector) => detector.detect(frame),
            #[cfg(feature = "fiducial")]
            Self::Fiducial(detector) => detector.detect(frame),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ColorBlob(_) => "color blob",
            #[cfg(feature = "fiducial")]
            Self::Fiducial(_) => "fiducial marker",
        }
    }
}

impl TargetLocator for TargetDetector {
    fn locate(&mut self, frame: &Frame) -> Option<Detection> {
        self.detect(frame)
    }

    fn name(&self) -> &'static str {
        TargetDetector::name(self)
    }
}

//! Square fiducial markers with a pinhole distance estimate.
//!
//! Quads come from the AprilTag detector. Among all markers in view the one
//! with the largest enclosed area is taken as the target; its apparent side
//! length gives the distance.

#[cfg(feature = "fiducial")]
use log::{debug, warn};

use super::Detection;
use crate::config::MIN_MARKER_SIDE_PX;
#[cfg(feature = "fiducial")]
use crate::camera::Frame;
#[cfg(feature = "fiducial")]
use crate::config::DetectionSettings;
#[cfg(feature = "fiducial")]
use crate::error::{Result, TurretError};

/// One detected marker, corners in image pixels in detector order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerQuad {
    pub id: usize,
    pub corners: [[f64; 2]; 4],
}

impl MarkerQuad {
    /// Enclosed area (shoelace).
    pub fn area(&self) -> f64 {
        let c = &self.corners;
        let twice: f64 = (0..4)
            .map(|i| {
                let j = (i + 1) % 4;
                c[i][0] * c[j][1] - c[j][0] * c[i][1]
            })
            .sum();
        twice.abs() / 2.0
    }

    /// Mean of the four corners.
    pub fn centroid(&self) -> [f64; 2] {
        let (sx, sy) = self
            .corners
            .iter()
            .fold((0.0, 0.0), |(sx, sy), c| (sx + c[0], sy + c[1]));
        [sx / 4.0, sy / 4.0]
    }

    /// Length of the edge between the first two corners.
    pub fn side_px(&self) -> f64 {
        let [a, b] = [self.corners[0], self.corners[1]];
        ((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2)).sqrt()
    }
}

/// Pinhole range estimate from a marker of known size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceEstimator {
    pub focal_length_px: f64,
    pub marker_size_cm: f64,
    /// Observed sides at or below this are treated as degenerate. Never
    /// lower than one pixel, whatever the setting.
    pub min_side_px: f64,
}

impl DistanceEstimator {
    /// `focal_length_px * marker_size_cm / side_px`, or `None` for a
    /// degenerate side.
    pub fn distance_cm(&self, side_px: f64) -> Option<f64> {
        if !side_px.is_finite() || side_px <= self.min_side_px.max(MIN_MARKER_SIDE_PX) {
            return None;
        }
        let distance = self.focal_length_px * self.marker_size_cm / side_px;
        distance.is_finite().then_some(distance)
    }
}

/// The marker with the largest enclosed area. Ties keep the first seen.
pub fn largest_marker(markers: &[MarkerQuad]) -> Option<&MarkerQuad> {
    let mut largest: Option<(&MarkerQuad, f64)> = None;
    for marker in markers {
        let area = marker.area();
        if largest.is_none_or(|(_, best)| area > best) {
            largest = Some((marker, area));
        }
    }
    largest.map(|(marker, _)| marker)
}

/// Focal length implied by a marker of `marker_size_cm` seen `side_px`
/// wide at a measured `distance_cm`. Inverse of the pinhole range estimate.
pub fn focal_length_from_observation(side_px: f64, distance_cm: f64, marker_size_cm: f64) -> Option<f64> {
    if !(side_px > 0.0) || !(distance_cm > 0.0) || !(marker_size_cm > 0.0) {
        return None;
    }
    let focal = side_px * distance_cm / marker_size_cm;
    focal.is_finite().then_some(focal)
}

/// Pick the largest marker and turn it into a detection.
///
/// Returns `None` when no marker is present or the chosen marker is too
/// small to range.
pub fn locate_target(markers: &[MarkerQuad], estimator: &DistanceEstimator) -> Option<Detection> {
    let marker = largest_marker(markers)?;
    let side = marker.side_px();
    let distance_cm = estimator.distance_cm(side)?;
    let [cx, cy] = marker.centroid();

    Some(Detection {
        x: cx as i32,
        y: cy as i32,
        extent: side as i32,
        distance_cm: Some(distance_cm),
    })
}

/// Build an AprilTag family by name.
#[cfg(feature = "fiducial")]
pub fn family_by_name(name: &str) -> Result<apriltag::Family> {
    match name {
        "tag16h5" => Ok(apriltag::Family::tag_16h5()),
        "tag25h9" => Ok(apriltag::Family::tag_25h9()),
        "tag36h11" => Ok(apriltag::Family::tag_36h11()),
        "tagStandard41h12" => Ok(apriltag::Family::tag_standard_41h12()),
        other => Err(TurretError::Config(format!(
            "unknown marker family '{other}' (expected tag16h5, tag25h9, tag36h11 or tagStandard41h12)"
        ))),
    }
}

/// AprilTag quad finder.
#[cfg(feature = "fiducial")]
pub struct MarkerFinder {
    detector: apriltag::Detector,
}

#[cfg(feature = "fiducial")]
impl MarkerFinder {
    pub fn new(family_name: &str) -> Result<Self> {
        let detector = apriltag::Detector::builder()
            .add_family_bits(family_by_name(family_name)?, 2)
            .build()
            .map_err(|e| TurretError::Detector(format!("{e:?}")))?;
        Ok(Self { detector })
    }

    /// All markers visible in the frame. A frame the detector cannot
    /// ingest yields no markers.
    pub fn find(&mut self, frame: &Frame) -> Vec<MarkerQuad> {
        let gray = image::imageops::grayscale(frame);
        let (width, height) = (gray.width() as usize, gray.height() as usize);

        let mut tag_image = match unsafe { apriltag::Image::new_uinit_with_stride(width, height, width) } {
            Ok(img) => img,
            Err(e) => {
                warn!("Could not allocate detector image: {e:?}");
                return Vec::new();
            }
        };
        let gray_data = gray.as_raw();
        unsafe {
            std::ptr::copy_nonoverlapping(
                gray_data.as_ptr(),
                tag_image.as_mut().as_mut_ptr(),
                width * height,
            );
        }

        self.detector
            .detect(&tag_image)
            .into_iter()
            .map(|det| MarkerQuad {
                id: det.id(),
                corners: det.corners(),
            })
            .collect()
    }
}

#[cfg(feature = "fiducial")]
pub struct FiducialDetector {
    finder: MarkerFinder,
    estimator: DistanceEstimator,
}

#[cfg(feature = "fiducial")]
impl FiducialDetector {
    pub fn from_settings(settings: &DetectionSettings) -> Result<Self> {
        Ok(Self {
            finder: MarkerFinder::new(&settings.marker_family)?,
            estimator: DistanceEstimator {
                focal_length_px: settings.focal_length_px,
                marker_size_cm: settings.marker_size_cm,
                min_side_px: settings.min_marker_side_px,
            },
        })
    }

    pub fn detect(&mut self, frame: &Frame) -> Option<Detection> {
        let markers = self.finder.find(frame);
        if markers.is_empty() {
            return None;
        }
        let detection = locate_target(&markers, &self.estimator);
        if detection.is_none() {
            debug!("{} marker(s) seen but none could be ranged", markers.len());
        }
        detection
    }
}

//! Illustrative drop-compensation curve for the secondary visual mode.
//!
//! This is a cosmetic quadratic, not a trajectory model. It only shifts the
//! aim point in image space so the overlay can show a compensating arc.

use crate::config::BallisticSettings;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallisticOffsetModel {
    gain: f64,
    max_offset_px: i32,
}

impl BallisticOffsetModel {
    pub fn new(gain: f64, max_offset_px: i32) -> Self {
        Self {
            gain,
            max_offset_px: max_offset_px.abs(),
        }
    }

    pub fn from_settings(settings: &BallisticSettings) -> Self {
        Self::new(settings.gravity_demo_gain, settings.max_offset_px)
    }

    /// Vertical offset in pixels for an estimated distance.
    ///
    /// `gain * d²`, clamped to `±max_offset_px` and truncated toward zero.
    /// No distance means no offset.
    pub fn offset_px(&self, distance_cm: Option<f64>) -> i32 {
        let Some(distance) = distance_cm else {
            return 0;
        };
        let limit = self.max_offset_px as f64;
        let offset = self.gain * distance * distance;
        if offset.is_nan() {
            return 0;
        }
        offset.clamp(-limit, limit) as i32
    }

    pub fn max_offset_px(&self) -> i32 {
        self.max_offset_px
    }
}

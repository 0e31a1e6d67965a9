use std::fmt;

use crate::config::ControlSettings;

/// Absolute pan/tilt angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleState {
    pub ang_x: f64,
    pub ang_y: f64,
}

impl AngleState {
    pub fn new(ang_x: f64, ang_y: f64) -> Self {
        Self { ang_x, ang_y }
    }
}

impl fmt::Display for AngleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pan {:.1}°, tilt {:.1}°", self.ang_x, self.ang_y)
    }
}

/// Proportional pixel-error controller with per-tick slew limiting and
/// absolute range clamping.
///
/// The angle pair is the controller's only memory. It is never reset
/// between ticks and every write goes through `clamp_angle`.
#[derive(Debug, Clone)]
pub struct AimController {
    angles: AngleState,
    tolerance_px: i32,
    kp_x: f64,
    kp_y: f64,
    limit_min: f64,
    limit_max: f64,
    max_step: f64,
}

impl AimController {
    pub fn new(settings: &ControlSettings) -> Self {
        let mut controller = Self {
            angles: AngleState {
                ang_x: settings.home_deg,
                ang_y: settings.home_deg,
            },
            tolerance_px: settings.center_tolerance_px.abs(),
            kp_x: settings.kp_deg_per_px_x,
            kp_y: settings.kp_deg_per_px_y,
            limit_min: settings.limit_deg_min,
            limit_max: settings.limit_deg_max,
            max_step: settings.max_step_deg.abs(),
        };
        controller.set_angles(controller.angles);
        controller
    }

    pub fn angles(&self) -> AngleState {
        self.angles
    }

    /// Force the pose, clamped into the configured range.
    pub fn set_angles(&mut self, angles: AngleState) {
        self.angles = AngleState {
            ang_x: self.clamp_angle(angles.ang_x),
            ang_y: self.clamp_angle(angles.ang_y),
        };
    }

    pub fn tolerance_px(&self) -> i32 {
        self.tolerance_px
    }

    /// Whether a pixel error lies inside the deadband on both axes.
    pub fn within_deadband(&self, err_x_px: i32, err_y_px: i32) -> bool {
        err_x_px.abs() <= self.tolerance_px && err_y_px.abs() <= self.tolerance_px
    }

    /// Apply one tick of correction for the target's offset from frame centre.
    ///
    /// Positive `err_x` (target right of centre) decreases pan; positive
    /// `err_y` (target below centre) increases tilt. Flip the gains' sign if
    /// the servos are mounted the other way round.
    pub fn update(&mut self, err_x_px: i32, err_y_px: i32) -> AngleState {
        if self.within_deadband(err_x_px, err_y_px) {
            return self.angles;
        }

        let d_ang_x = self.slew_limit(-self.kp_x * err_x_px as f64);
        let d_ang_y = self.slew_limit(self.kp_y * err_y_px as f64);

        self.angles = AngleState {
            ang_x: self.clamp_angle(self.angles.ang_x + d_ang_x),
            ang_y: self.clamp_angle(self.angles.ang_y + d_ang_y),
        };
        self.angles
    }

    fn slew_limit(&self, delta: f64) -> f64 {
        delta.clamp(-self.max_step, self.max_step)
    }

    fn clamp_angle(&self, angle: f64) -> f64 {
        angle.clamp(self.limit_min, self.limit_max)
    }
}

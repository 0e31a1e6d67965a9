use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TurretError};

// ** CAMERA CONFIGURATION ** //

pub const DEFAULT_RESOLUTION: [u32; 2] = [640, 480];
pub const DEFAULT_FRAMERATE: u32 = 30;
pub const DEFAULT_VIDEO_DEVICE: &str = "/dev/video0";

// ** DETECTION CONFIGURATION ** //

/// Blobs with a smaller enclosing radius are treated as speckle noise.
pub const DEFAULT_MIN_RADIUS_PX: f64 = 5.0;
/// Rough focal length of a 640px-wide sensor module, in pixels.
/// Run the `calibrate` binary to measure the real value.
pub const DEFAULT_FOCAL_LENGTH_PX: f64 = 700.0;
pub const DEFAULT_MARKER_SIZE_CM: f64 = 5.0;
pub const DEFAULT_MEDIAN_KERNEL: usize = 3;
/// Markers seen this small or smaller cannot be ranged.
pub const MIN_MARKER_SIDE_PX: f64 = 1.0;

// ** CONTROL CONFIGURATION ** //

pub const DEFAULT_CENTER_TOLERANCE_PX: i32 = 12;
pub const DEFAULT_KP_DEG_PER_PX: f64 = 0.02;
pub const DEFAULT_LIMIT_DEG_MIN: f64 = 10.0;
pub const DEFAULT_LIMIT_DEG_MAX: f64 = 170.0;
/// Largest angle change applied to either axis in one tick (degrees)
pub const DEFAULT_MAX_STEP_DEG: f64 = 2.5;
pub const DEFAULT_HOME_DEG: f64 = 90.0;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 10;
pub const DEFAULT_STATUS_INTERVAL_SECS: u64 = 5;

//  ** SERVO CONFIGURATION ** //

/// Pan servo on GPIO 18 (PWM0), tilt servo on GPIO 13 (PWM1)
pub const DEFAULT_SERVO_X_PIN: u8 = 18;
pub const DEFAULT_SERVO_Y_PIN: u8 = 13;
/// Mode button, wired to ground (active low, internal pull-up)
pub const DEFAULT_BUTTON_PIN: u8 = 17;
/// Standard servo PWM frequency (Hz)
pub const DEFAULT_PWM_HZ: f64 = 50.0;
/// SG90-style pulse range: 500μs at 0°, 2500μs at 180°
pub const DEFAULT_PULSE_MIN_US: f64 = 500.0;
pub const DEFAULT_PULSE_MAX_US: f64 = 2500.0;
/// Time the servo gets to move after each write
pub const DEFAULT_SETTLE_MS: u64 = 20;

// ** BALLISTIC DEMO CONFIGURATION ** //

pub const DEFAULT_GRAVITY_DEMO_GAIN: f64 = 0.002;
pub const DEFAULT_MAX_OFFSET_PX: i32 = 80;

fn default_true() -> bool {
    true
}

fn default_video_device() -> String {
    DEFAULT_VIDEO_DEVICE.to_string()
}

fn default_median_kernel() -> usize {
    DEFAULT_MEDIAN_KERNEL
}

fn default_focal_length_px() -> f64 {
    DEFAULT_FOCAL_LENGTH_PX
}

fn default_min_marker_side_px() -> f64 {
    MIN_MARKER_SIDE_PX
}

fn default_home_deg() -> f64 {
    DEFAULT_HOME_DEG
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

fn default_status_interval_secs() -> u64 {
    DEFAULT_STATUS_INTERVAL_SECS
}

fn default_settle_ms() -> u64 {
    DEFAULT_SETTLE_MS
}

/// Top-level configuration document, read once at startup.
///
/// Every group and every key is required unless it carries its own serde
/// default. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TurretConfig {
    pub camera: CameraSettings,
    pub detection: DetectionSettings,
    pub control: ControlSettings,
    pub hardware: HardwareSettings,
    pub ballistic_demo: BallisticSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CameraSettings {
    /// Requested `[width, height]` in pixels.
    pub resolution: [u32; 2],
    pub framerate: u32,
    /// No on-screen window when true.
    #[serde(default)]
    pub headless: bool,
    /// Prefer the sensor-module backend over a generic webcam.
    #[serde(alias = "use_picamera2", default = "default_true")]
    pub use_sensor_module: bool,
    #[serde(default = "default_video_device")]
    pub sensor_device: String,
    #[serde(default = "default_video_device")]
    pub webcam_device: String,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            framerate: DEFAULT_FRAMERATE,
            headless: false,
            use_sensor_module: true,
            sensor_device: DEFAULT_VIDEO_DEVICE.to_string(),
            webcam_device: DEFAULT_VIDEO_DEVICE.to_string(),
        }
    }
}

impl CameraSettings {
    pub fn width(&self) -> u32 {
        self.resolution[0]
    }

    pub fn height(&self) -> u32 {
        self.resolution[1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    /// Largest blob inside the configured HSV bands.
    Color,
    /// Largest square fiducial marker, with a distance estimate.
    #[serde(alias = "aruco")]
    Fiducial,
}

/// Inclusive HSV band. Hue uses the 0..=179 half-degree scale,
/// saturation and value use 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| hsv[c] >= self.lower[c] && hsv[c] <= self.upper[c])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectionSettings {
    pub mode: DetectionMode,
    /// Union of two bands, so a red hue can wrap around 0.
    pub color_ranges: [HsvRange; 2],
    /// Side of the median filter applied to the color mask (odd).
    #[serde(default = "default_median_kernel")]
    pub median_kernel: usize,
    pub min_radius_px: f64,
    #[serde(alias = "marker_dictionary")]
    pub marker_family: String,
    #[serde(alias = "aruco_marker_size_cm")]
    pub marker_size_cm: f64,
    #[serde(default = "default_focal_length_px")]
    pub focal_length_px: f64,
    /// Markers with a shorter observed side are ignored. At least 1 px.
    #[serde(default = "default_min_marker_side_px")]
    pub min_marker_side_px: f64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            mode: DetectionMode::Color,
            color_ranges: [
                HsvRange {
                    lower: [0, 120, 70],
                    upper: [10, 255, 255],
                },
                HsvRange {
                    lower: [170, 120, 70],
                    upper: [179, 255, 255],
                },
            ],
            median_kernel: DEFAULT_MEDIAN_KERNEL,
            min_radius_px: DEFAULT_MIN_RADIUS_PX,
            marker_family: "tag36h11".to_string(),
            marker_size_cm: DEFAULT_MARKER_SIZE_CM,
            focal_length_px: DEFAULT_FOCAL_LENGTH_PX,
            min_marker_side_px: MIN_MARKER_SIDE_PX,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlSettings {
    pub center_tolerance_px: i32,
    pub kp_deg_per_px_x: f64,
    pub kp_deg_per_px_y: f64,
    pub limit_deg_min: f64,
    pub limit_deg_max: f64,
    pub max_step_deg: f64,
    #[serde(default = "default_home_deg")]
    pub home_deg: f64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            center_tolerance_px: DEFAULT_CENTER_TOLERANCE_PX,
            kp_deg_per_px_x: DEFAULT_KP_DEG_PER_PX,
            kp_deg_per_px_y: DEFAULT_KP_DEG_PER_PX,
            limit_deg_min: DEFAULT_LIMIT_DEG_MIN,
            limit_deg_max: DEFAULT_LIMIT_DEG_MAX,
            max_step_deg: DEFAULT_MAX_STEP_DEG,
            home_deg: DEFAULT_HOME_DEG,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            status_interval_secs: DEFAULT_STATUS_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HardwareSettings {
    pub servo_x_pin: u8,
    pub servo_y_pin: u8,
    pub button_pin: u8,
    pub pwm_hz: f64,
    pub pulse_min_us: f64,
    pub pulse_max_us: f64,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for HardwareSettings {
    fn default() -> Self {
        Self {
            servo_x_pin: DEFAULT_SERVO_X_PIN,
            servo_y_pin: DEFAULT_SERVO_Y_PIN,
            button_pin: DEFAULT_BUTTON_PIN,
            pwm_hz: DEFAULT_PWM_HZ,
            pulse_min_us: DEFAULT_PULSE_MIN_US,
            pulse_max_us: DEFAULT_PULSE_MAX_US,
            settle_ms: DEFAULT_SETTLE_MS,
        }
    }
}

impl HardwareSettings {
    pub fn period_us(&self) -> f64 {
        1_000_000.0 / self.pwm_hz
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BallisticSettings {
    pub enabled: bool,
    pub gravity_demo_gain: f64,
    pub max_offset_px: i32,
}

impl Default for BallisticSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            gravity_demo_gain: DEFAULT_GRAVITY_DEMO_GAIN,
            max_offset_px: DEFAULT_MAX_OFFSET_PX,
        }
    }
}

impl TurretConfig {
    /// Load and validate a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Reject parameter combinations the control loop cannot honour.
    pub fn validate(&self) -> Result<()> {
        let cam = &self.camera;
        if cam.width() == 0 || cam.height() == 0 {
            return invalid("camera.resolution must be non-zero");
        }

        let det = &self.detection;
        if det.median_kernel == 0 || det.median_kernel % 2 == 0 {
            return invalid("detection.median_kernel must be odd");
        }
        for range in &det.color_ranges {
            if range.upper[0] > 179 {
                return invalid("detection.color_ranges hue must be within 0..=179");
            }
            if (0..3).any(|c| range.lower[c] > range.upper[c]) {
                return invalid("detection.color_ranges lower bound exceeds upper bound");
            }
        }
        if !(det.min_radius_px >= 0.0) {
            return invalid("detection.min_radius_px must be >= 0");
        }
        if !(det.marker_size_cm > 0.0) || !(det.focal_length_px > 0.0) {
            return invalid("detection.marker_size_cm and focal_length_px must be > 0");
        }
        if !(det.min_marker_side_px >= MIN_MARKER_SIDE_PX) {
            return invalid("detection.min_marker_side_px must be >= 1");
        }

        let ctl = &self.control;
        if ctl.center_tolerance_px < 0 {
            return invalid("control.center_tolerance_px must be >= 0");
        }
        if !(0.0..=180.0).contains(&ctl.limit_deg_min)
            || !(0.0..=180.0).contains(&ctl.limit_deg_max)
            || ctl.limit_deg_min >= ctl.limit_deg_max
        {
            return invalid("control limits must satisfy 0 <= limit_deg_min < limit_deg_max <= 180");
        }
        if !(ctl.max_step_deg > 0.0) || !ctl.max_step_deg.is_finite() {
            return invalid("control.max_step_deg must be a positive number");
        }
        if !ctl.kp_deg_per_px_x.is_finite()
            || !ctl.kp_deg_per_px_y.is_finite()
            || !ctl.home_deg.is_finite()
        {
            return invalid("control gains and home angle must be finite");
        }

        let hw = &self.hardware;
        if !(hw.pwm_hz > 0.0) {
            return invalid("hardware.pwm_hz must be > 0");
        }
        if !(hw.pulse_min_us >= 0.0) || hw.pulse_min_us >= hw.pulse_max_us {
            return invalid("hardware.pulse_min_us must be below pulse_max_us");
        }
        if hw.pulse_max_us > hw.period_us() {
            return invalid("hardware.pulse_max_us exceeds the PWM period");
        }
        if hw.servo_x_pin == hw.servo_y_pin
            || hw.servo_x_pin == hw.button_pin
            || hw.servo_y_pin == hw.button_pin
        {
            return invalid("hardware pins must be distinct");
        }

        let bal = &self.ballistic_demo;
        if bal.max_offset_px < 0 {
            return invalid("ballistic_demo.max_offset_px must be >= 0");
        }
        if !bal.gravity_demo_gain.is_finite() {
            return invalid("ballistic_demo.gravity_demo_gain must be finite");
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> Result<()> {
    Err(TurretError::Config(msg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(TurretConfig::default().validate().is_ok());
    }

    #[test]
    fn test_shipped_config_parses() {
        let cfg = TurretConfig::from_json_str(include_str!("../configs/turret.json")).unwrap();
        assert_eq!(cfg.detection.mode, DetectionMode::Color);
        assert_eq!(cfg.hardware.servo_x_pin, DEFAULT_SERVO_X_PIN);
        assert_eq!(cfg.control.center_tolerance_px, DEFAULT_CENTER_TOLERANCE_PX);
    }

    fn shipped_json() -> serde_json::Value {
        serde_json::from_str(include_str!("../configs/turret.json")).unwrap()
    }

    fn parse(doc: &serde_json::Value) -> Result<TurretConfig> {
        TurretConfig::from_json_str(&doc.to_string())
    }

    #[test]
    fn test_empty_document_is_rejected() {
        let err = TurretConfig::from_json_str("{}").unwrap_err();
        assert!(matches!(err, TurretError::Json(_)));
    }

    #[test]
    fn test_missing_group_is_rejected() {
        let mut doc = shipped_json();
        doc.as_object_mut().unwrap().remove("hardware");
        let err = parse(&doc).unwrap_err();
        assert!(err.to_string().contains("hardware"), "{err}");
    }

    #[test]
    fn test_missing_required_key_is_rejected() {
        let mut doc = shipped_json();
        doc["control"].as_object_mut().unwrap().remove("kp_deg_per_px_x");
        let err = parse(&doc).unwrap_err();
        assert!(matches!(err, TurretError::Json(_)));
        assert!(err.to_string().contains("kp_deg_per_px_x"), "{err}");
    }

    #[test]
    fn test_misspelled_key_is_rejected() {
        let mut doc = shipped_json();
        let control = doc["control"].as_object_mut().unwrap();
        let kp = control.remove("kp_deg_per_px_x").unwrap();
        control.insert("kp_deg_px_x".to_string(), kp);
        let err = parse(&doc).unwrap_err();
        assert!(err.to_string().contains("kp_deg_px_x"), "{err}");
    }

    #[test]
    fn test_unknown_group_is_rejected() {
        let mut doc = shipped_json();
        doc["telemetry"] = serde_json::json!({ "enabled": true });
        assert!(matches!(parse(&doc), Err(TurretError::Json(_))));
    }

    #[test]
    fn test_optional_keys_fall_back_to_defaults() {
        let mut doc = shipped_json();
        for key in ["headless", "use_sensor_module", "sensor_device", "webcam_device"] {
            doc["camera"].as_object_mut().unwrap().remove(key);
        }
        for key in ["median_kernel", "focal_length_px", "min_marker_side_px"] {
            doc["detection"].as_object_mut().unwrap().remove(key);
        }
        for key in ["home_deg", "tick_interval_ms", "status_interval_secs"] {
            doc["control"].as_object_mut().unwrap().remove(key);
        }
        doc["hardware"].as_object_mut().unwrap().remove("settle_ms");

        let cfg = parse(&doc).unwrap();
        assert!(!cfg.camera.headless);
        assert!(cfg.camera.use_sensor_module);
        assert_eq!(cfg.camera.webcam_device, DEFAULT_VIDEO_DEVICE);
        assert_eq!(cfg.detection.median_kernel, DEFAULT_MEDIAN_KERNEL);
        assert_eq!(cfg.detection.focal_length_px, DEFAULT_FOCAL_LENGTH_PX);
        assert_eq!(cfg.detection.min_marker_side_px, MIN_MARKER_SIDE_PX);
        assert_eq!(cfg.control.home_deg, DEFAULT_HOME_DEG);
        assert_eq!(cfg.control.tick_interval_ms, DEFAULT_TICK_INTERVAL_MS);
        assert_eq!(cfg.control.status_interval_secs, DEFAULT_STATUS_INTERVAL_SECS);
        assert_eq!(cfg.hardware.settle_ms, DEFAULT_SETTLE_MS);
    }

    #[test]
    fn test_source_key_aliases() {
        let mut doc = shipped_json();
        let camera = doc["camera"].as_object_mut().unwrap();
        camera.remove("use_sensor_module");
        camera.insert("use_picamera2".to_string(), false.into());
        let detection = doc["detection"].as_object_mut().unwrap();
        detection.remove("marker_family");
        detection.remove("marker_size_cm");
        detection.insert("marker_dictionary".to_string(), "tag16h5".into());
        detection.insert("aruco_marker_size_cm".to_string(), 10.0.into());
        detection.insert("mode".to_string(), "aruco".into());

        let cfg = parse(&doc).unwrap();
        assert!(!cfg.camera.use_sensor_module);
        assert_eq!(cfg.detection.marker_family, "tag16h5");
        assert_eq!(cfg.detection.marker_size_cm, 10.0);
        assert_eq!(cfg.detection.mode, DetectionMode::Fiducial);
    }

    #[test]
    fn test_sub_pixel_marker_floor_is_rejected() {
        let mut cfg = TurretConfig::default();
        cfg.detection.min_marker_side_px = 0.0;
        assert!(matches!(cfg.validate(), Err(TurretError::Config(_))));
        cfg.detection.min_marker_side_px = MIN_MARKER_SIDE_PX;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let err = TurretConfig::from_json_str("{ \"control\": ").unwrap_err();
        assert!(matches!(err, TurretError::Json(_)));
    }

    #[test]
    fn test_inverted_limits_are_rejected() {
        let mut cfg = TurretConfig::default();
        cfg.control.limit_deg_min = 150.0;
        cfg.control.limit_deg_max = 30.0;
        assert!(matches!(cfg.validate(), Err(TurretError::Config(_))));
    }

    #[test]
    fn test_pulse_longer_than_period_is_rejected() {
        let mut cfg = TurretConfig::default();
        cfg.hardware.pwm_hz = 1000.0; // 1000μs period
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_shared_pins_are_rejected() {
        let mut cfg = TurretConfig::default();
        cfg.hardware.button_pin = cfg.hardware.servo_x_pin;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_even_median_kernel_is_rejected() {
        let mut cfg = TurretConfig::default();
        cfg.detection.median_kernel = 4;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_hsv_range_contains_is_inclusive() {
        let range = HsvRange {
            lower: [0, 120, 70],
            upper: [10, 255, 255],
        };
        assert!(range.contains([0, 120, 70]));
        assert!(range.contains([10, 255, 255]));
        assert!(!range.contains([11, 200, 200]));
        assert!(!range.contains([5, 119, 200]));
    }

    #[test]
    fn test_load_json_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("turret.json");
        let mut cfg = TurretConfig::default();
        cfg.hardware.button_pin = 22;
        cfg.write_json(&path).unwrap();

        let loaded = TurretConfig::load_json(&path).unwrap();
        assert_eq!(loaded.hardware.button_pin, 22);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = TurretConfig::load_json("/nonexistent/turret.json").unwrap_err();
        assert!(matches!(err, TurretError::Io(_)));
    }
}

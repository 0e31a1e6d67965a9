use std::sync::atomic::AtomicBool;

use approx::assert_abs_diff_eq;
use image::{Rgb, RgbImage};

use turret_rs::actuator::MockActuator;
use turret_rs::camera::MockCamera;
use turret_rs::config::{DetectionMode, TurretConfig};
use turret_rs::control_loop::ControlLoop;
use turret_rs::detection::TargetDetector;
use turret_rs::{AngleState, Mode, Result, TurretError};

const RED: Rgb<u8> = Rgb([220, 20, 20]);
const BACKGROUND: Rgb<u8> = Rgb([30, 60, 30]);

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn frame_with_disc(cx: i32, cy: i32, r: i32) -> RgbImage {
    let mut frame = RgbImage::from_pixel(320, 240, BACKGROUND);
    for y in (cy - r)..=(cy + r) {
        for x in (cx - r)..=(cx + r) {
            if (x - cx).pow(2) + (y - cy).pow(2) <= r * r {
                frame.put_pixel(x as u32, y as u32, RED);
            }
        }
    }
    frame
}

fn config() -> TurretConfig {
    let mut config = TurretConfig::default();
    config.camera.resolution = [320, 240];
    config.detection.mode = DetectionMode::Color;
    config.control.center_tolerance_px = 8;
    config.control.tick_interval_ms = 0;
    config.hardware.settle_ms = 0;
    config
}

fn color_loop(
    camera: MockCamera,
    actuator: MockActuator,
    config: &TurretConfig,
) -> ControlLoop<MockCamera, MockActuator, TargetDetector> {
    let detector = TargetDetector::from_settings(&config.detection).unwrap();
    ControlLoop::new(camera, actuator, detector, config)
}

#[test]
fn test_tracks_target_up_and_right() -> Result<()> {
    init_logger();
    let config = config();
    // Centre is (160, 120); target 60 px right and 50 px up.
    let camera = MockCamera::new_repeating(frame_with_disc(220, 70, 15));
    let mut control = color_loop(camera, MockActuator::new(), &config);

    let stop = AtomicBool::new(false);
    let stats = control.run(&stop, 10, |_, _| true)?;
    assert_eq!(stats.ticks, 10);
    assert_eq!(stats.detections, 10);

    let writes = control.actuator().writes();
    assert_eq!(writes[0], AngleState::new(90.0, 90.0));
    assert_eq!(writes.len(), 11);

    let last = control.angles();
    assert!(last.ang_x < 90.0, "pan should turn toward a target on the right");
    assert!(last.ang_y < 90.0, "tilt should follow a target above centre");

    for pair in writes.windows(2) {
        let step = config.control.max_step_deg + 1e-9;
        assert!((pair[1].ang_x - pair[0].ang_x).abs() <= step);
        assert!((pair[1].ang_y - pair[0].ang_y).abs() <= step);
    }
    Ok(())
}

#[test]
fn test_centred_target_holds_position() -> Result<()> {
    init_logger();
    let config = config();
    let camera = MockCamera::new_repeating(frame_with_disc(163, 118, 15));
    let mut control = color_loop(camera, MockActuator::new(), &config);

    let stop = AtomicBool::new(false);
    let stats = control.run(&stop, 20, |_, _| true)?;

    assert_eq!(stats.detections, 20);
    assert_eq!(stats.commands, 1);
    assert_eq!(control.actuator().writes(), &[AngleState::new(90.0, 90.0)]);
    Ok(())
}

#[test]
fn test_pinned_against_limit_stops_writing() -> Result<()> {
    init_logger();
    let mut config = config();
    config.control.kp_deg_per_px_x = 0.05;
    config.control.kp_deg_per_px_y = 0.05;
    // Far left and far down: pan rises, tilt rises, both to the upper limit.
    let camera = MockCamera::new_repeating(frame_with_disc(20, 225, 12));
    let mut control = color_loop(camera, MockActuator::new(), &config);

    let stop = AtomicBool::new(false);
    control.run(&stop, 200, |_, _| true)?;

    let max = config.control.limit_deg_max;
    assert_eq!(control.angles(), AngleState::new(max, max));
    for angles in control.actuator().writes() {
        assert!(angles.ang_x <= max && angles.ang_y <= max);
        assert!(angles.ang_x >= config.control.limit_deg_min);
    }
    // Home plus ceil(80 / 2.5) slewing steps, then nothing new to send.
    assert_eq!(control.actuator().writes().len(), 1 + 32);
    Ok(())
}

#[test]
fn test_press_during_camera_hiccup_toggles_once() -> Result<()> {
    init_logger();
    let config = config();
    let frame = frame_with_disc(160, 120, 15);
    let camera = MockCamera::new(vec![Some(frame.clone()), None, None, Some(frame)]);
    let actuator = MockActuator::with_button_script([false, true, true, false]);
    let mut control = color_loop(camera, actuator, &config);

    let mut toggles = Vec::new();
    for _ in 0..4 {
        let tick = control.tick()?;
        if let Some(toggle) = tick.report.toggle {
            toggles.push(toggle.mode);
        }
    }

    assert_eq!(toggles, vec![Mode::BallisticVisual]);
    assert_eq!(control.mode(), Mode::BallisticVisual);
    assert_eq!(control.stats().frames, 2);
    assert_eq!(control.actuator().button_polls(), 4);
    Ok(())
}

fn shipped_config() -> serde_json::Value {
    serde_json::from_str(include_str!("../configs/turret.json")).unwrap()
}

#[test]
fn test_loop_from_config_file() -> Result<()> {
    init_logger();
    let mut doc = shipped_config();
    doc["camera"]["resolution"] = serde_json::json!([320, 240]);
    doc["camera"]["headless"] = true.into();
    doc["control"]["center_tolerance_px"] = 4.into();
    doc["control"]["tick_interval_ms"] = 0.into();
    doc["control"]["max_step_deg"] = 1.0.into();
    doc["hardware"]["settle_ms"] = 0.into();
    doc["ballistic_demo"]["enabled"] = false.into();

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("turret.json");
    std::fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
    let config = TurretConfig::load_json(&path)?;

    let camera = MockCamera::new_repeating(frame_with_disc(100, 120, 10));
    let mut control = color_loop(camera, MockActuator::new(), &config);
    let stop = AtomicBool::new(false);
    control.run(&stop, 3, |_, _| true)?;

    // 60 px left of centre at 0.02 deg/px = 1.2 deg, slew-limited to 1.0
    let angles = control.angles();
    assert_eq!(angles.ang_x, 93.0);
    assert_abs_diff_eq!(angles.ang_y, 90.0, epsilon = 0.1);
    control.shutdown()?;
    assert!(control.actuator().is_closed());
    assert!(control.camera().is_closed());
    Ok(())
}

#[test]
fn test_incomplete_config_file_is_fatal() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let partial = dir.path().join("partial.json");
    std::fs::write(
        &partial,
        r#"{ "camera": { "resolution": [320, 240] }, "detection": { "mode": "color" } }"#,
    )?;
    assert!(matches!(TurretConfig::load_json(&partial), Err(TurretError::Json(_))));

    let mut doc = shipped_config();
    doc["control"]["kp_x"] = 0.5.into();
    let typo = dir.path().join("typo.json");
    std::fs::write(&typo, doc.to_string())?;
    assert!(matches!(TurretConfig::load_json(&typo), Err(TurretError::Json(_))));
    Ok(())
}

//! The per-tick aiming pipeline.
//!
//! One tick: grab a frame, poll the button, detect, shift the aim point in
//! ballistic mode, turn the pixel error into new angles and write them out
//! if they moved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info};

use crate::actuator::Actuator;
use crate::aim::{AimController, AngleState};
use crate::ballistic::BallisticOffsetModel;
use crate::camera::{Camera, Frame};
use crate::config::TurretConfig;
use crate::detection::{Detection, TargetLocator};
use crate::error::Result;
use crate::mode::{Mode, ModeStateMachine, ModeToggle};

/// What happened during one tick. Feeds the HUD and the status line.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub mode: Mode,
    pub toggle: Option<ModeToggle>,
    /// `None` when the camera had no frame and the tick was skipped.
    pub frame_center: Option<(i32, i32)>,
    pub detection: Option<Detection>,
    /// Detection position after the ballistic shift.
    pub aim_point: Option<(i32, i32)>,
    pub offset_px: i32,
    pub angles: AngleState,
    pub command_sent: bool,
}

impl TickReport {
    pub fn skipped(&self) -> bool {
        self.frame_center.is_none()
    }
}

/// A finished tick together with the frame it processed, if any.
pub struct Tick {
    pub report: TickReport,
    pub frame: Option<Frame>,
}

/// Running counters for the status line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub frames: u64,
    pub detections: u64,
    pub commands: u64,
    pub toggles: u64,
}

/// Owns every collaborator for the lifetime of the loop and releases the
/// camera and actuator when dropped.
pub struct ControlLoop<C: Camera, A: Actuator, D: TargetLocator> {
    camera: C,
    actuator: A,
    detector: D,
    modes: ModeStateMachine,
    ballistic: Option<BallisticOffsetModel>,
    controller: AimController,
    last_sent: Option<AngleState>,
    stats: LoopStats,
    tick_interval: Duration,
    status_interval: Duration,
    closed: bool,
}

impl<C: Camera, A: Actuator, D: TargetLocator> ControlLoop<C, A, D> {
    pub fn new(camera: C, actuator: A, detector: D, config: &TurretConfig) -> Self {
        let ballistic = config
            .ballistic_demo
            .enabled
            .then(|| BallisticOffsetModel::from_settings(&config.ballistic_demo));

        Self {
            camera,
            actuator,
            detector,
            modes: ModeStateMachine::default(),
            ballistic,
            controller: AimController::new(&config.control),
            last_sent: None,
            stats: LoopStats::default(),
            tick_interval: Duration::from_millis(config.control.tick_interval_ms),
            status_interval: Duration::from_secs(config.control.status_interval_secs),
            closed: false,
        }
    }

    pub fn mode(&self) -> Mode {
        self.modes.mode()
    }

    pub fn angles(&self) -> AngleState {
        self.controller.angles()
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn tolerance_px(&self) -> i32 {
        self.controller.tolerance_px()
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    /// Write the current (home) pose so the rig starts from a known place.
    pub fn home(&mut self) -> Result<()> {
        let angles = self.controller.angles();
        info!("Homing to {angles}");
        self.emit(angles)
    }

    /// Run one tick.
    ///
    /// Only an actuator write failure is an error; a missing frame or an
    /// absent target just produce a report with nothing to do.
    pub fn tick(&mut self) -> Result<Tick> {
        self.stats.ticks += 1;

        let frame = self.camera.get_frame();

        // The button is polled even without a frame so a press during a
        // camera hiccup is not lost.
        let toggle = self.modes.update(self.actuator.button_pressed());
        if let Some(ModeToggle { mode }) = toggle {
            self.stats.toggles += 1;
            info!("Mode: {mode}");
        }

        let Some(frame) = frame else {
            debug!("No frame, tick skipped");
            return Ok(Tick {
                report: self.report(toggle, None, None, None, 0, false),
                frame: None,
            });
        };
        self.stats.frames += 1;

        let center = (frame.width() as i32 / 2, frame.height() as i32 / 2);

        let Some(detection) = self.detector.locate(&frame) else {
            return Ok(Tick {
                report: self.report(toggle, Some(center), None, None, 0, false),
                frame: Some(frame),
            });
        };
        self.stats.detections += 1;

        let offset_px = match (self.modes.mode(), &self.ballistic) {
            (Mode::BallisticVisual, Some(model)) => model.offset_px(detection.distance_cm),
            _ => 0,
        };
        let aim = Detection {
            y: detection.y - offset_px,
            ..detection
        };
        let (err_x, err_y) = aim.error_from(center);
        let angles = self.controller.update(err_x, err_y);

        debug!(
            "Target at ({}, {}) extent {} dist {:?}, offset {offset_px}, error ({err_x}, {err_y}) -> {angles}",
            detection.x, detection.y, detection.extent, detection.distance_cm
        );

        let command_sent = if self.last_sent != Some(angles) {
            self.emit(angles)?;
            true
        } else {
            false
        };

        Ok(Tick {
            report: self.report(
                toggle,
                Some(center),
                Some(detection),
                Some((aim.x, aim.y)),
                offset_px,
                command_sent,
            ),
            frame: Some(frame),
        })
    }

    /// Tick until `stop` is set, `max_ticks` ticks have run (0 = no limit),
    /// `on_tick` returns false, or the actuator fails.
    ///
    /// `on_tick` sees every tick and may draw on the frame; it has no say
    /// in control beyond asking the loop to stop.
    pub fn run<F>(&mut self, stop: &AtomicBool, max_ticks: u64, mut on_tick: F) -> Result<LoopStats>
    where
        F: FnMut(&mut Tick, &LoopStats) -> bool,
    {
        if self.last_sent.is_none() {
            self.home()?;
        }

        info!(
            "Control loop started: {} detector, {} camera, tolerance {} px",
            self.detector.name(),
            self.camera.backend_name(),
            self.controller.tolerance_px()
        );

        let mut last_status = Instant::now();
        let mut ran = 0u64;

        while !stop.load(Ordering::Relaxed) {
            if max_ticks > 0 && ran >= max_ticks {
                info!("Reached {max_ticks} ticks");
                break;
            }
            ran += 1;

            let mut tick = match self.tick() {
                Ok(tick) => tick,
                Err(e) => {
                    error!("Actuator write failed: {e}");
                    return Err(e);
                }
            };

            if !on_tick(&mut tick, &self.stats) {
                info!("Quit requested");
                break;
            }

            if last_status.elapsed() >= self.status_interval {
                self.log_status();
                last_status = Instant::now();
            }

            if !self.tick_interval.is_zero() {
                thread::sleep(self.tick_interval);
            }
        }

        if stop.load(Ordering::Relaxed) {
            info!("Interrupted");
        }
        self.log_status();
        Ok(self.stats)
    }

    /// Release the camera and the actuator. Safe to call more than once.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.camera.close();
        self.actuator.close()?;
        info!("Camera and actuator released");
        Ok(())
    }

    /// Shut down after `run` and hand back its outcome. A loop error takes
    /// precedence; a shutdown error is logged and only returned when the
    /// loop itself finished cleanly.
    pub fn finish(&mut self, outcome: Result<LoopStats>) -> Result<LoopStats> {
        let released = self.shutdown();
        if let Err(e) = &released {
            error!("Shutdown failed: {e}");
        }
        let stats = outcome?;
        released?;
        Ok(stats)
    }

    fn emit(&mut self, angles: AngleState) -> Result<()> {
        self.actuator.set_angles(angles)?;
        self.last_sent = Some(angles);
        self.stats.commands += 1;
        Ok(())
    }

    fn log_status(&self) {
        let s = &self.stats;
        info!(
            "Status: {} ticks, {} frames, {} detections, {} commands | {} | mode {}",
            s.ticks,
            s.frames,
            s.detections,
            s.commands,
            self.controller.angles(),
            self.modes.mode()
        );
    }

    fn report(
        &self,
        toggle: Option<ModeToggle>,
        frame_center: Option<(i32, i32)>,
        detection: Option<Detection>,
        aim_point: Option<(i32, i32)>,
        offset_px: i32,
        command_sent: bool,
    ) -> TickReport {
        TickReport {
            mode: self.modes.mode(),
            toggle,
            frame_center,
            detection,
            aim_point,
            offset_px,
            angles: self.controller.angles(),
            command_sent,
        }
    }
}

impl<C: Camera, A: Actuator, D: TargetLocator> Drop for ControlLoop<C, A, D> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Shutdown failed: {e}");
        }
    }
}

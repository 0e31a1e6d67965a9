use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use log::{info, warn};

use turret_rs::actuator::PanTiltRig;
use turret_rs::camera::open_camera;
use turret_rs::config::{CameraSettings, TurretConfig};
use turret_rs::control_loop::{ControlLoop, Tick};
use turret_rs::detection::TargetDetector;
use turret_rs::shutdown::install_shutdown_handler;

#[cfg(feature = "display")]
use turret_rs::display::HudWindow;
#[cfg(feature = "display")]
use turret_rs::overlay::{self, HudRenderer};

#[derive(Parser, Debug)]
#[command(name = "turret-rs", version, about = "Visual-servo pan/tilt aiming loop")]
struct Args {
    /// JSON configuration file
    #[arg(long, default_value = "configs/turret.json")]
    config: PathBuf,

    /// Stop after this many ticks (0 = run until interrupted)
    #[arg(long, default_value_t = 0)]
    max_ticks: u64,
}

/// Optional preview window. Falls back to headless if the window cannot be
/// opened or stops working.
struct Preview {
    #[cfg(feature = "display")]
    window: Option<HudWindow>,
    #[cfg(feature = "display")]
    hud: HudRenderer,
}

impl Preview {
    #[cfg(feature = "display")]
    fn open(settings: &CameraSettings) -> Self {
        if settings.headless {
            info!("Headless: no preview window");
            return Self {
                window: None,
                hud: HudRenderer::new(),
            };
        }
        let window = match HudWindow::open("turret-rs", settings.width(), settings.height()) {
            Ok(window) => Some(window),
            Err(e) => {
                warn!("Display unavailable, running headless: {e}");
                None
            }
        };
        Self {
            window,
            hud: HudRenderer::new(),
        }
    }

    #[cfg(not(feature = "display"))]
    fn open(settings: &CameraSettings) -> Self {
        if !settings.headless {
            warn!("Built without the `display` feature, running headless");
        }
        Self {}
    }

    /// Returns `false` when the operator asked to quit.
    #[cfg(feature = "display")]
    fn on_tick(&mut self, tick: &mut Tick, tolerance_px: i32) -> bool {
        let shown = match (self.window.as_mut(), tick.frame.as_mut()) {
            (Some(window), Some(frame)) => {
                if let Err(e) = self.hud.draw(frame, &tick.report, tolerance_px) {
                    warn!("HUD not drawn: {e}");
                }
                Some(window.show(frame, &overlay::hud_title(&tick.report)))
            }
            _ => None,
        };
        match shown {
            Some(Ok(keep_running)) => keep_running,
            Some(Err(e)) => {
                warn!("Display failed, continuing headless: {e}");
                self.window = None;
                true
            }
            None => true,
        }
    }

    #[cfg(not(feature = "display"))]
    fn on_tick(&mut self, _tick: &mut Tick, _tolerance_px: i32) -> bool {
        true
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    info!("Starting turret...");
    let config = TurretConfig::load_json(&args.config)?;
    info!("Loaded {}", args.config.display());

    let stop = install_shutdown_handler()?;

    let detector = TargetDetector::from_settings(&config.detection)?;
    info!("Detection: {}", detector.name());

    // Any failure from here to the loop is fatal; whatever was already
    // opened is released as it goes out of scope.
    let camera = open_camera(&config.camera)?;
    let rig = PanTiltRig::new(&config.hardware)?;
    let mut preview = Preview::open(&config.camera);

    let mut control = ControlLoop::new(camera, rig, detector, &config);
    let tolerance_px = control.tolerance_px();

    let result = control.run(&stop, args.max_ticks, |tick, _| {
        preview.on_tick(tick, tolerance_px)
    });
    let stats = control.finish(result)?;
    info!(
        "Stopped after {} ticks ({} frames, {} detections, {} commands, {} mode toggles)",
        stats.ticks, stats.frames, stats.detections, stats.commands, stats.toggles
    );
    Ok(())
}

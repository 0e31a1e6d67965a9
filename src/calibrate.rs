use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use clap::Parser;

use turret_rs::camera::{Camera, open_camera};
use turret_rs::config::TurretConfig;
use turret_rs::detection::fiducial::{MarkerFinder, focal_length_from_observation, largest_marker};
use turret_rs::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "calibrate", about = "Estimate the camera focal length from a marker at a known distance")]
struct Args {
    /// JSON configuration file (camera and marker settings)
    #[arg(long, default_value = "configs/turret.json")]
    config: PathBuf,

    /// Measured distance from the camera to the marker, in cm
    #[arg(long)]
    distance_cm: f64,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    if !(args.distance_cm > 0.0) {
        return Err("--distance-cm must be positive".into());
    }

    let config = TurretConfig::load_json(&args.config)?;
    let detection = &config.detection;

    println!("╔══════════════════════════════════════════════════════╗");
    println!("║     Focal Length Calibration Tool                    ║");
    println!("╚══════════════════════════════════════════════════════╝\n");

    println!("Instructions:");
    println!(
        "1. Hold a {} marker ({:.1} cm side) square to the camera",
        detection.marker_family, detection.marker_size_cm
    );
    println!("2. Keep it exactly {:.1} cm from the lens", args.distance_cm);
    println!("3. Hold still while samples accumulate");
    println!("4. Press Ctrl+C when done\n");

    let stop = install_shutdown_handler()?;
    let mut camera = open_camera(&config.camera)?;
    let mut finder = MarkerFinder::new(&detection.marker_family)?;

    let mut sample_count = 0u64;
    let mut focal_sum = 0.0;

    println!(
        "{:^8} | {:^6} | {:^12} | {:^14} | {:^14}",
        "Sample", "ID", "Side (px)", "Focal (px)", "Mean (px)"
    );
    println!("{:-<8}-+-{:-<6}-+-{:-<12}-+-{:-<14}-+-{:-<14}", "", "", "", "", "");

    while !stop.load(Ordering::Relaxed) {
        let Some(frame) = camera.get_frame() else {
            thread::sleep(Duration::from_millis(10));
            continue;
        };

        let markers = finder.find(&frame);
        let Some(marker) = largest_marker(&markers) else {
            continue;
        };

        let side_px = marker.side_px();
        let Some(focal) =
            focal_length_from_observation(side_px, args.distance_cm, detection.marker_size_cm)
        else {
            continue;
        };

        sample_count += 1;
        focal_sum += focal;
        let mean = focal_sum / sample_count as f64;

        // Print update every 10 samples
        if sample_count % 10 == 1 {
            println!(
                "{:^8} | {:^6} | {:>12.1} | {:>14.1} | {:>14.1}",
                sample_count, marker.id, side_px, focal, mean
            );
        }
    }

    camera.close();

    if sample_count == 0 {
        println!("\nNo markers seen. Check the marker family and lighting.");
        return Ok(());
    }

    let mean = focal_sum / sample_count as f64;
    println!("\n✓ {sample_count} samples");
    println!("  Estimated focal length: {mean:.1} px");
    println!("\nSet in {}:", args.config.display());
    println!("  \"detection\": {{ \"focal_length_px\": {mean:.1} }}");

    Ok(())
}

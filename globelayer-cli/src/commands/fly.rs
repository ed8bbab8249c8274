//! Fly command - stream the configured layer under a descending camera.
//!
//! Stands in for a renderer: each frame places a nadir-looking camera over a
//! fixed point, lowers it geometrically from the start to the end altitude,
//! and asks the pyramid for a draw list. Per-frame traversal stats and the
//! final fetch metrics are printed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use globelayer::config::{format_size, ConfigFile};
use globelayer::geo::{LatLon, SphericalGlobe};
use globelayer::logging::init_logging;
use globelayer::store::{FileStore, LocalStore, MemoryStore};
use globelayer::traversal::ViewSnapshot;
use globelayer::TilePyramidBuilder;

use crate::error::CliError;

/// How long to wait for running fetches after the last frame.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Arguments for the fly command.
#[derive(Debug, Args)]
pub struct FlyArgs {
    /// Latitude of the camera target in degrees
    #[arg(long, allow_negative_numbers = true)]
    pub lat: f64,

    /// Longitude of the camera target in degrees
    #[arg(long, allow_negative_numbers = true)]
    pub lon: f64,

    /// Camera altitude at the first frame, in metres
    #[arg(long, default_value_t = 20_000_000.0)]
    pub start_altitude: f64,

    /// Camera altitude at the last frame, in metres
    #[arg(long, default_value_t = 1_000.0)]
    pub end_altitude: f64,

    /// Number of frames to render
    #[arg(long, default_value_t = 120)]
    pub frames: u32,

    /// Frame interval in milliseconds
    #[arg(long, default_value_t = 50)]
    pub frame_ms: u64,

    /// Camera field of view in degrees
    #[arg(long, default_value_t = 60.0)]
    pub fov: f64,

    /// Use only tiles already in the tile store
    #[arg(long)]
    pub offline: bool,
}

/// Run the fly command.
pub fn run(args: FlyArgs) -> Result<(), CliError> {
    validate(&args)?;

    let config = ConfigFile::load()?;
    let _logging = init_logging(&config.logging)?;

    let level_set = config.layer.level_set()?;
    let mut pyramid_config = config.pyramid_config();
    if args.offline {
        pyramid_config.network_enabled = false;
    } else if config.layer.url_template.trim().is_empty() {
        println!("No layer.url_template configured; reading from the tile store only.");
        println!("Set one with: globelayer config set layer.url_template <template>");
        println!();
        pyramid_config.network_enabled = false;
    }

    let store: Arc<dyn LocalStore> = if config.cache.persist {
        Arc::new(FileStore::new(config.cache.directory.clone()))
    } else {
        Arc::new(MemoryStore::new())
    };

    println!("GlobeLayer Fly v{}", globelayer::VERSION);
    println!("==================");
    println!();
    println!(
        "Layer:      {} ({} levels, {})",
        config.layer.name,
        level_set.num_levels(),
        level_set.projection().name()
    );
    println!("Target:     {}", LatLon::new(args.lat, args.lon));
    println!(
        "Altitude:   {:.0} m -> {:.0} m over {} frames",
        args.start_altitude, args.end_altitude, args.frames
    );
    println!("Memory:     {}", format_size(pyramid_config.memory_cache_bytes));
    if config.cache.persist {
        println!("Tile store: {}", config.cache.directory.display());
    } else {
        println!("Tile store: in memory");
    }
    let network = if pyramid_config.network_enabled {
        "enabled"
    } else {
        "disabled"
    };
    println!("Network:    {}", network);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let pyramid = TilePyramidBuilder::new(level_set)
        .config(pyramid_config)
        .store(store)
        .user_agent(config.fetch.user_agent.clone())
        .build()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::SeqCst);
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let globe = SphericalGlobe::default();
    let target = LatLon::new(args.lat, args.lon);
    let frame_interval = Duration::from_millis(args.frame_ms);

    for index in 0..args.frames {
        if shutdown.load(Ordering::SeqCst) {
            println!();
            println!("Interrupted.");
            break;
        }
        let started = Instant::now();

        let altitude = altitude_at(args.start_altitude, args.end_altitude, index, args.frames);
        let view = ViewSnapshot::nadir(&globe, target, altitude, args.fov);
        let frame = pyramid.assemble_frame(&globe, &view);

        println!("[{:>4}] {:>12.0} m | {}", index, altitude, frame.stats);
        tracing::debug!(frame = index, altitude, stats = %frame.stats, "Frame");

        if let Some(rest) = frame_interval.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    pyramid.shutdown();
    let deadline = Instant::now() + DRAIN_TIMEOUT;
    while pyramid.in_flight() > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }

    println!();
    println!("Session Summary");
    println!("───────────────");
    println!("  Fetch:  {}", pyramid.metrics().snapshot());
    println!("  Cache:  {}", pyramid.cache().stats());
    println!("  Absent: {} tiles", pyramid.absent().len());
    if pyramid.in_flight() > 0 {
        println!("  {} fetches still running at exit", pyramid.in_flight());
    }
    Ok(())
}

fn validate(args: &FlyArgs) -> Result<(), CliError> {
    if !(-90.0..=90.0).contains(&args.lat) || !(-180.0..=180.0).contains(&args.lon) {
        return Err(CliError::Config(format!(
            "Target {}, {} is outside the globe",
            args.lat, args.lon
        )));
    }
    if args.start_altitude <= 0.0 || args.end_altitude <= 0.0 {
        return Err(CliError::Config("Altitudes must be positive".to_string()));
    }
    if !(0.0 < args.fov && args.fov < 180.0) {
        return Err(CliError::Config(format!("Invalid field of view {}", args.fov)));
    }
    Ok(())
}

/// Altitude of frame `index`, interpolated geometrically so each frame zooms
/// by the same factor.
fn altitude_at(start: f64, end: f64, index: u32, frames: u32) -> f64 {
    if frames <= 1 {
        return start;
    }
    let t = index as f64 / (frames - 1) as f64;
    start * (end / start).powf(t)
}

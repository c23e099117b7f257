//! camnoded - camera uplink daemon
//!
//! This daemon:
//! 1. Opens the configured camera source (synthetic or spool directory)
//! 2. Engages the flash and captures one frame per interval
//! 3. Encodes the frame into a multipart form body, sized up front
//! 4. POSTs it to the collection server, one shot, no retry
//! 5. Releases the frame and turns the flash off on every exit path

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use facility_node::{flash, CamNodeConfig, CameraSource, CaptureScheduler, HttpTransport};

const LOOP_TICK: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about = "Camera uplink daemon for facility edge nodes")]
struct Args {
    /// Path to the JSON config file.
    #[arg(long, env = "CAMNODE_CONFIG")]
    config: Option<PathBuf>,

    /// Run a single capture cycle immediately, then exit (nonzero on failure).
    #[arg(long)]
    once: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = CamNodeConfig::load_from(args.config.as_deref())?;

    let mut camera = CameraSource::open(&config.camera_spec)?;
    camera.connect()?;
    let mut transport = HttpTransport::new(config.http_connect_timeout, config.http_timeout);
    let mut flash = flash::open(config.flash_gpio_path.as_deref());

    let mut scheduler = CaptureScheduler::new(config.uplink_settings(), Instant::now());

    log::info!("camnoded running. uploading to {}", config.upload_url);
    log::info!(
        "camera={} interval={}s prefix={}",
        config.camera_spec,
        config.capture_interval.as_secs(),
        config.filename_prefix
    );

    if args.once {
        let result = scheduler.run_now(
            Instant::now(),
            &mut camera,
            &mut transport,
            flash.as_mut(),
        );
        if !result.is_success() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    let mut cycles = 0u64;
    let mut failures = 0u64;
    let mut last_status_log = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            log::info!("shutdown signal received, stopping");
            break;
        }

        if let Some(result) =
            scheduler.tick(Instant::now(), &mut camera, &mut transport, flash.as_mut())
        {
            cycles += 1;
            if !result.is_success() {
                failures += 1;
            }
        }

        if last_status_log.elapsed() >= config.status_log_interval {
            let stats = camera.stats();
            log::info!(
                "camera health={} cycles={} failures={} frames={} source={}",
                camera.is_healthy(),
                cycles,
                failures,
                stats.frames_captured,
                stats.source
            );
            last_status_log = Instant::now();
        }

        std::thread::sleep(LOOP_TICK);
    }

    Ok(())
}

//! sensornoded - sensor/actuator relay daemon
//!
//! This daemon:
//! 1. Connects to the MQTT broker and subscribes to its command topic
//! 2. Applies incoming commands to named actuator channels
//! 3. Samples sensor channels on the telemetry interval
//! 4. Publishes one JSON telemetry document per interval

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use facility_node::gpio::{ActuatorBank, SensorBank};
use facility_node::relay::{commands, telemetry_topic, CommandRelay};
use facility_node::SensorNodeConfig;

const LOOP_TICK: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(author, version, about = "Sensor/actuator relay daemon for facility edge nodes")]
struct Args {
    /// Path to the JSON config file.
    #[arg(long, env = "SENSORNODE_CONFIG")]
    config: Option<PathBuf>,
}

/// One telemetry document, published as JSON.
#[derive(Serialize)]
struct TelemetryReport<'a> {
    node: &'a str,
    uptime_s: u64,
    sensors: BTreeMap<String, f64>,
    actuators: BTreeMap<String, bool>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = SensorNodeConfig::load_from(args.config.as_deref())?;

    let mut sensors = SensorBank::from_specs(&config.sensors);
    let mut actuators = ActuatorBank::from_specs(&config.actuators);
    let mut relay = CommandRelay::connect(&config)?;

    log::info!(
        "sensornoded running. node={} telemetry on {} every {}s",
        config.node_id,
        telemetry_topic(&config.topic_prefix, &config.node_id),
        config.telemetry_interval.as_secs()
    );
    log::info!(
        "{} sensor channel(s), {} actuator channel(s)",
        sensors.len(),
        actuators.len()
    );

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    let started_at = Instant::now();
    let mut commands_handled = 0u64;
    let mut reports_published = 0u64;
    let mut last_telemetry = Instant::now();
    let mut last_status_log = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            log::info!("shutdown signal received, stopping");
            break;
        }

        while let Some(line) = relay.poll_command() {
            if commands::dispatch(&line, &mut actuators) {
                commands_handled += 1;
            }
        }

        if last_telemetry.elapsed() >= config.telemetry_interval {
            let report = TelemetryReport {
                node: &config.node_id,
                uptime_s: started_at.elapsed().as_secs(),
                sensors: sensors
                    .sample()
                    .into_iter()
                    .map(|reading| (reading.name, reading.value))
                    .collect(),
                actuators: actuators.states().into_iter().collect(),
            };
            relay.broadcast(&serde_json::to_vec(&report)?)?;
            reports_published += 1;
            last_telemetry = Instant::now();
        }

        if last_status_log.elapsed() >= config.status_log_interval {
            log::info!(
                "relay commands={} reports={} uptime={}s",
                commands_handled,
                reports_published,
                started_at.elapsed().as_secs()
            );
            last_status_log = Instant::now();
        }

        std::thread::sleep(LOOP_TICK);
    }

    relay.shutdown()?;
    Ok(())
}

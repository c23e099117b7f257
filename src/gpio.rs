//! Sensor and actuator channels for the sensor/actuator node.
//!
//! Each channel picks its backend from a spec string:
//! - `stub://<name>`: in-memory backend for tests and dev runs
//! - a filesystem path: sysfs-style value file (numeric text for sensors,
//!   `1`/`0` writes for actuators)
//!
//! Sensor read errors are per-sample and recoverable; the telemetry loop
//! logs and skips them. Actuator write errors surface to the command
//! dispatcher, which reports the command as failed.

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use crate::config::ChannelSpec;

pub trait Sensor {
    fn name(&self) -> &str;
    /// Take one reading.
    fn read(&mut self) -> Result<f64>;
}

pub trait Actuator {
    fn name(&self) -> &str;
    fn set_state(&mut self, on: bool) -> Result<()>;
    /// Last state driven through this channel.
    fn state(&self) -> bool;
}

// ----------------------------------------------------------------------------
// Sysfs backends
// ----------------------------------------------------------------------------

/// Numeric sensor behind a sysfs value file (IIO raw channels, hwmon, ...).
pub struct SysfsSensor {
    name: String,
    path: PathBuf,
}

impl SysfsSensor {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

impl Sensor for SysfsSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<f64> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("read sensor {} from {}", self.name, self.path.display()))?;
        raw.trim()
            .parse()
            .map_err(|_| anyhow!("sensor {} produced non-numeric value {:?}", self.name, raw.trim()))
    }
}

/// On/off actuator behind a sysfs value file (GPIO value, relay driver).
pub struct SysfsActuator {
    name: String,
    path: PathBuf,
    on: bool,
}

impl SysfsActuator {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            on: false,
        }
    }
}

impl Actuator for SysfsActuator {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_state(&mut self, on: bool) -> Result<()> {
        let value: &[u8] = if on { b"1" } else { b"0" };
        fs::write(&self.path, value).with_context(|| {
            format!("drive actuator {} via {}", self.name, self.path.display())
        })?;
        self.on = on;
        Ok(())
    }

    fn state(&self) -> bool {
        self.on
    }
}

// ----------------------------------------------------------------------------
// Stub backends (stub://)
// ----------------------------------------------------------------------------

/// Deterministic ramp sensor.
pub struct StubSensor {
    name: String,
    step: u64,
}

impl StubSensor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            step: 0,
        }
    }
}

impl Sensor for StubSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self) -> Result<f64> {
        self.step += 1;
        Ok((self.step % 100) as f64)
    }
}

/// In-memory actuator.
pub struct StubActuator {
    name: String,
    on: bool,
}

impl StubActuator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on: false,
        }
    }
}

impl Actuator for StubActuator {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_state(&mut self, on: bool) -> Result<()> {
        self.on = on;
        Ok(())
    }

    fn state(&self) -> bool {
        self.on
    }
}

// ----------------------------------------------------------------------------
// Channel banks
// ----------------------------------------------------------------------------

pub fn open_sensor(channel: &ChannelSpec) -> Box<dyn Sensor> {
    match channel.spec.strip_prefix("stub://") {
        Some(_) => Box::new(StubSensor::new(&channel.name)),
        None => Box::new(SysfsSensor::new(&channel.name, &channel.spec)),
    }
}

pub fn open_actuator(channel: &ChannelSpec) -> Box<dyn Actuator> {
    match channel.spec.strip_prefix("stub://") {
        Some(_) => Box::new(StubActuator::new(&channel.name)),
        None => Box::new(SysfsActuator::new(&channel.name, &channel.spec)),
    }
}

/// One successful sensor sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub name: String,
    pub value: f64,
}

/// All sensor channels of the node.
pub struct SensorBank {
    sensors: Vec<Box<dyn Sensor>>,
}

impl SensorBank {
    pub fn from_specs(channels: &[ChannelSpec]) -> Self {
        Self {
            sensors: channels.iter().map(|c| open_sensor(c)).collect(),
        }
    }

    /// Sample every channel. Failing channels are logged and skipped so one
    /// broken sensor never blocks the others.
    pub fn sample(&mut self) -> Vec<Reading> {
        let mut readings = Vec::with_capacity(self.sensors.len());
        for sensor in &mut self.sensors {
            match sensor.read() {
                Ok(value) => readings.push(Reading {
                    name: sensor.name().to_string(),
                    value,
                }),
                Err(err) => log::warn!("sensor {} read failed: {err:#}", sensor.name()),
            }
        }
        readings
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

/// All actuator channels of the node, addressed by name.
pub struct ActuatorBank {
    actuators: Vec<Box<dyn Actuator>>,
}

impl ActuatorBank {
    pub fn from_specs(channels: &[ChannelSpec]) -> Self {
        Self {
            actuators: channels.iter().map(|c| open_actuator(c)).collect(),
        }
    }

    pub fn set(&mut self, name: &str, on: bool) -> Result<()> {
        let actuator = self
            .actuators
            .iter_mut()
            .find(|actuator| actuator.name() == name)
            .ok_or_else(|| anyhow!("no actuator named {}", name))?;
        actuator.set_state(on)
    }

    pub fn states(&self) -> Vec<(String, bool)> {
        self.actuators
            .iter()
            .map(|actuator| (actuator.name().to_string(), actuator.state()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.actuators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actuators.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

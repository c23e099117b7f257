use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::scheduler::UplinkSettings;

const DEFAULT_UPLOAD_URL: &str = "http://127.0.0.1:5000/upload";
const DEFAULT_CAPTURE_INTERVAL_SECS: u64 = 5;
const DEFAULT_FILENAME_PREFIX: &str = "image_";
const DEFAULT_CAMERA_SPEC: &str = "stub://cam0";
const DEFAULT_FLASH_WARMUP_MS: u64 = 100;
const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
const DEFAULT_STATUS_LOG_INTERVAL_SECS: u64 = 60;

const DEFAULT_MQTT_URL: &str = "mqtt://127.0.0.1:1883";
const DEFAULT_NODE_ID: &str = "node0";
const DEFAULT_TOPIC_PREFIX: &str = "facility";
const DEFAULT_TELEMETRY_INTERVAL_SECS: u64 = 1;

// ----------------------------------------------------------------------------
// Camera node
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct CamNodeConfigFile {
    upload: Option<UploadConfigFile>,
    camera: Option<CameraConfigFile>,
    flash: Option<FlashConfigFile>,
    http: Option<HttpConfigFile>,
    status_log_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct UploadConfigFile {
    url: Option<String>,
    interval_secs: Option<u64>,
    filename_prefix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    spec: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct FlashConfigFile {
    gpio_path: Option<PathBuf>,
    warmup_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct HttpConfigFile {
    connect_timeout_secs: Option<u64>,
    timeout_secs: Option<u64>,
}

/// Resolved camera node configuration. Read once at startup, never mutated
/// afterwards.
#[derive(Debug, Clone)]
pub struct CamNodeConfig {
    pub upload_url: String,
    pub capture_interval: Duration,
    pub filename_prefix: String,
    pub camera_spec: String,
    pub flash_gpio_path: Option<PathBuf>,
    pub flash_warmup: Duration,
    pub http_connect_timeout: Duration,
    pub http_timeout: Duration,
    pub status_log_interval: Duration,
}

impl CamNodeConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CAMNODE_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load with an explicit config-file path (the daemons pass their
    /// `--config` argument here).
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file::<CamNodeConfigFile>(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CamNodeConfigFile) -> Self {
        let upload_url = file
            .upload
            .as_ref()
            .and_then(|upload| upload.url.clone())
            .unwrap_or_else(|| DEFAULT_UPLOAD_URL.to_string());
        let capture_interval = Duration::from_secs(
            file.upload
                .as_ref()
                .and_then(|upload| upload.interval_secs)
                .unwrap_or(DEFAULT_CAPTURE_INTERVAL_SECS),
        );
        let filename_prefix = file
            .upload
            .and_then(|upload| upload.filename_prefix)
            .unwrap_or_else(|| DEFAULT_FILENAME_PREFIX.to_string());
        let camera_spec = file
            .camera
            .and_then(|camera| camera.spec)
            .unwrap_or_else(|| DEFAULT_CAMERA_SPEC.to_string());
        let flash_gpio_path = file.flash.as_ref().and_then(|flash| flash.gpio_path.clone());
        let flash_warmup = Duration::from_millis(
            file.flash
                .and_then(|flash| flash.warmup_ms)
                .unwrap_or(DEFAULT_FLASH_WARMUP_MS),
        );
        let http_connect_timeout = Duration::from_secs(
            file.http
                .as_ref()
                .and_then(|http| http.connect_timeout_secs)
                .unwrap_or(DEFAULT_HTTP_CONNECT_TIMEOUT_SECS),
        );
        let http_timeout = Duration::from_secs(
            file.http
                .and_then(|http| http.timeout_secs)
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        );
        let status_log_interval = Duration::from_secs(
            file.status_log_interval_secs
                .unwrap_or(DEFAULT_STATUS_LOG_INTERVAL_SECS),
        );
        Self {
            upload_url,
            capture_interval,
            filename_prefix,
            camera_spec,
            flash_gpio_path,
            flash_warmup,
            http_connect_timeout,
            http_timeout,
            status_log_interval,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("CAMNODE_UPLOAD_URL") {
            if !url.trim().is_empty() {
                self.upload_url = url;
            }
        }
        if let Ok(interval) = std::env::var("CAMNODE_CAPTURE_INTERVAL_SECS") {
            let seconds: u64 = interval.parse().map_err(|_| {
                anyhow!("CAMNODE_CAPTURE_INTERVAL_SECS must be an integer number of seconds")
            })?;
            self.capture_interval = Duration::from_secs(seconds);
        }
        if let Ok(prefix) = std::env::var("CAMNODE_FILENAME_PREFIX") {
            if !prefix.trim().is_empty() {
                self.filename_prefix = prefix;
            }
        }
        if let Ok(spec) = std::env::var("CAMNODE_CAMERA") {
            if !spec.trim().is_empty() {
                self.camera_spec = spec;
            }
        }
        if let Ok(path) = std::env::var("CAMNODE_FLASH_GPIO") {
            if !path.trim().is_empty() {
                self.flash_gpio_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.upload_url)
            .map_err(|e| anyhow!("invalid upload url {}: {}", self.upload_url, e))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(anyhow!(
                "upload url must use http or https, got {}",
                url.scheme()
            ));
        }
        if self.capture_interval.as_secs() == 0 {
            return Err(anyhow!("capture interval must be at least one second"));
        }
        validate_filename_prefix(&self.filename_prefix)?;
        if self.camera_spec.trim().is_empty() {
            return Err(anyhow!("camera spec must not be empty"));
        }
        Ok(())
    }

    /// Scheduler view of this configuration.
    pub fn uplink_settings(&self) -> UplinkSettings {
        UplinkSettings {
            upload_url: self.upload_url.clone(),
            capture_interval: self.capture_interval,
            filename_prefix: self.filename_prefix.clone(),
            flash_warmup: self.flash_warmup,
        }
    }
}

/// The prefix ends up inside a multipart header, so it is restricted to
/// characters that need no escaping there.
fn validate_filename_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(anyhow!("filename prefix must not be empty"));
    }
    let valid = prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(anyhow!(
            "filename prefix may only contain ascii letters, digits, '-', '_' and '.'"
        ));
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Sensor/actuator node
// ----------------------------------------------------------------------------

/// Named backend spec for one sensor or actuator channel,
/// e.g. `{"name": "door", "spec": "stub://door"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelSpec {
    pub name: String,
    pub spec: String,
}

#[derive(Debug, Deserialize, Default)]
struct SensorNodeConfigFile {
    mqtt: Option<MqttConfigFile>,
    node_id: Option<String>,
    topic_prefix: Option<String>,
    telemetry_interval_secs: Option<u64>,
    sensors: Option<Vec<ChannelSpec>>,
    actuators: Option<Vec<ChannelSpec>>,
    status_log_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    url: Option<String>,
}

/// Resolved sensor/actuator node configuration.
#[derive(Debug, Clone)]
pub struct SensorNodeConfig {
    pub mqtt_url: String,
    pub node_id: String,
    pub topic_prefix: String,
    pub telemetry_interval: Duration,
    pub sensors: Vec<ChannelSpec>,
    pub actuators: Vec<ChannelSpec>,
    pub status_log_interval: Duration,
}

impl SensorNodeConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENSORNODE_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file::<SensorNodeConfigFile>(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SensorNodeConfigFile) -> Self {
        Self {
            mqtt_url: file
                .mqtt
                .and_then(|mqtt| mqtt.url)
                .unwrap_or_else(|| DEFAULT_MQTT_URL.to_string()),
            node_id: file.node_id.unwrap_or_else(|| DEFAULT_NODE_ID.to_string()),
            topic_prefix: file
                .topic_prefix
                .unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.to_string()),
            telemetry_interval: Duration::from_secs(
                file.telemetry_interval_secs
                    .unwrap_or(DEFAULT_TELEMETRY_INTERVAL_SECS),
            ),
            sensors: file.sensors.unwrap_or_else(default_sensors),
            actuators: file.actuators.unwrap_or_else(default_actuators),
            status_log_interval: Duration::from_secs(
                file.status_log_interval_secs
                    .unwrap_or(DEFAULT_STATUS_LOG_INTERVAL_SECS),
            ),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SENSORNODE_MQTT_URL") {
            if !url.trim().is_empty() {
                self.mqtt_url = url;
            }
        }
        if let Ok(node_id) = std::env::var("SENSORNODE_NODE_ID") {
            if !node_id.trim().is_empty() {
                self.node_id = node_id;
            }
        }
        if let Ok(prefix) = std::env::var("SENSORNODE_TOPIC_PREFIX") {
            if !prefix.trim().is_empty() {
                self.topic_prefix = prefix;
            }
        }
        if let Ok(interval) = std::env::var("SENSORNODE_TELEMETRY_INTERVAL_SECS") {
            let seconds: u64 = interval.parse().map_err(|_| {
                anyhow!("SENSORNODE_TELEMETRY_INTERVAL_SECS must be an integer number of seconds")
            })?;
            self.telemetry_interval = Duration::from_secs(seconds);
        }
        if let Ok(sensors) = std::env::var("SENSORNODE_SENSORS") {
            let parsed = parse_channel_list(&sensors)?;
            if !parsed.is_empty() {
                self.sensors = parsed;
            }
        }
        if let Ok(actuators) = std::env::var("SENSORNODE_ACTUATORS") {
            let parsed = parse_channel_list(&actuators)?;
            if !parsed.is_empty() {
                self.actuators = parsed;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        crate::relay::parse_mqtt_endpoint(&self.mqtt_url)?;
        if self.node_id.trim().is_empty() {
            return Err(anyhow!("node id must not be empty"));
        }
        if self.topic_prefix.trim().is_empty() || self.topic_prefix.contains('/') {
            return Err(anyhow!("topic prefix must be a single non-empty segment"));
        }
        if self.telemetry_interval.as_secs() == 0 {
            return Err(anyhow!("telemetry interval must be at least one second"));
        }
        for channel in self.sensors.iter().chain(self.actuators.iter()) {
            if channel.name.trim().is_empty() || channel.spec.trim().is_empty() {
                return Err(anyhow!("sensor/actuator channels need a name and a spec"));
            }
        }
        Ok(())
    }
}

fn default_sensors() -> Vec<ChannelSpec> {
    vec![ChannelSpec {
        name: "light".to_string(),
        spec: "stub://light".to_string(),
    }]
}

fn default_actuators() -> Vec<ChannelSpec> {
    ["door", "lamp", "socket"]
        .into_iter()
        .map(|name| ChannelSpec {
            name: name.to_string(),
            spec: format!("stub://{name}"),
        })
        .collect()
}

// ----------------------------------------------------------------------------
// Shared helpers
// ----------------------------------------------------------------------------

fn read_config_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

/// Parse `name=spec,name=spec` channel lists from environment overrides.
fn parse_channel_list(value: &str) -> Result<Vec<ChannelSpec>> {
    split_csv(value)
        .into_iter()
        .map(|entry| {
            let (name, spec) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("channel entry '{}' must look like name=spec", entry))?;
            Ok(ChannelSpec {
                name: name.trim().to_string(),
                spec: spec.trim().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_list_parses_pairs() {
        let parsed = parse_channel_list("door=stub://door, light=/sys/bus/iio/raw").unwrap();
        assert_eq!(
            parsed,
            vec![
                ChannelSpec {
                    name: "door".to_string(),
                    spec: "stub://door".to_string(),
                },
                ChannelSpec {
                    name: "light".to_string(),
                    spec: "/sys/bus/iio/raw".to_string(),
                },
            ]
        );
    }

    #[test]
    fn channel_list_rejects_bare_entries() {
        assert!(parse_channel_list("door").is_err());
    }

    #[test]
    fn filename_prefix_rules() {
        assert!(validate_filename_prefix("image_").is_ok());
        assert!(validate_filename_prefix("cam-7.").is_ok());
        assert!(validate_filename_prefix("").is_err());
        assert!(validate_filename_prefix("a/b").is_err());
        assert!(validate_filename_prefix("a\"b").is_err());
        assert!(validate_filename_prefix("a b").is_err());
    }

    #[test]
    fn uplink_settings_mirror_config() {
        let cfg = CamNodeConfig::from_file(CamNodeConfigFile::default());
        let settings = cfg.uplink_settings();
        assert_eq!(settings.upload_url, cfg.upload_url);
        assert_eq!(settings.capture_interval, cfg.capture_interval);
        assert_eq!(settings.filename_prefix, cfg.filename_prefix);
        assert_eq!(settings.flash_warmup, cfg.flash_warmup);
    }
}

//! MQTT relay for the sensor/actuator node.
//!
//! One broker connection carries both directions:
//! - outbound telemetry on `{prefix}/{node}/telemetry`
//! - inbound commands on `{prefix}/{node}/command`
//! - retained availability on `{prefix}/{node}/status` (`online`/`offline`,
//!   with a last-will `offline` if the node drops off)
//!
//! The connection event loop runs on a dedicated reader thread that forwards
//! command payloads into an mpsc channel; the node's main loop drains the
//! channel with [`CommandRelay::poll_command`] so command handling stays on
//! the single cooperative thread.

pub mod commands;

pub use commands::Command;

use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use rumqttc::v5::mqttbytes::v5::{LastWill, Packet};
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, MqttOptions};
use rumqttc::Transport;

use crate::config::SensorNodeConfig;

const CLIENT_ID_PREFIX: &str = "sensornode";
const KEEP_ALIVE: Duration = Duration::from_secs(60);
const REQUEST_QUEUE_DEPTH: usize = 10;
const PAYLOAD_ONLINE: &str = "online";
const PAYLOAD_OFFLINE: &str = "offline";

const DEFAULT_PORT: u16 = 1883;
const DEFAULT_TLS_PORT: u16 = 8883;

// ----------------------------------------------------------------------------
// Broker endpoint
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

/// Parse a broker address of the form `[scheme://]host[:port]`.
///
/// `mqtt`/`tcp` select plaintext, `mqtts`/`ssl` select TLS with the platform
/// trust roots. The port defaults per scheme when omitted.
pub fn parse_mqtt_endpoint(addr: &str) -> Result<MqttEndpoint> {
    let mut use_tls = false;
    let mut remainder = addr.trim();
    if remainder.is_empty() {
        return Err(anyhow!("mqtt broker address is empty"));
    }

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported mqtt scheme: {}", other)),
        }
        remainder = rest;
    }

    let (host, port) = split_host_port(remainder, if use_tls { DEFAULT_TLS_PORT } else { DEFAULT_PORT })?;
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str, default_port: u16) -> Result<(String, u16)> {
    // Bracketed IPv6 first so colons inside the address are not mistaken
    // for the port separator.
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid mqtt address: {}", addr))?;
        if host.is_empty() {
            return Err(anyhow!("invalid mqtt address: {}", addr));
        }
        let port = match rest.strip_prefix(':') {
            Some(port) => port.parse().context("invalid mqtt port")?,
            None => default_port,
        };
        return Ok((host.to_string(), port));
    }

    match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port: u16 = port.parse().context("invalid mqtt port")?;
            Ok((host.to_string(), port))
        }
        Some(_) => Err(anyhow!("invalid mqtt address: {}", addr)),
        None => Ok((addr.to_string(), default_port)),
    }
}

// ----------------------------------------------------------------------------
// Topics
// ----------------------------------------------------------------------------

pub fn telemetry_topic(prefix: &str, node_id: &str) -> String {
    format!("{}/{}/telemetry", prefix, node_id)
}

pub fn command_topic(prefix: &str, node_id: &str) -> String {
    format!("{}/{}/command", prefix, node_id)
}

pub fn status_topic(prefix: &str, node_id: &str) -> String {
    format!("{}/{}/status", prefix, node_id)
}

// ----------------------------------------------------------------------------
// Relay runtime
// ----------------------------------------------------------------------------

/// Live broker connection plus the reader thread that drives it.
pub struct CommandRelay {
    client: Client,
    telemetry_topic: String,
    status_topic: String,
    commands: mpsc::Receiver<String>,
    reader: Option<JoinHandle<()>>,
}

impl CommandRelay {
    /// Connect, subscribe to the command topic and mark the node online.
    pub fn connect(config: &SensorNodeConfig) -> Result<Self> {
        let endpoint = parse_mqtt_endpoint(&config.mqtt_url)?;
        let telemetry_topic = telemetry_topic(&config.topic_prefix, &config.node_id);
        let command_topic = command_topic(&config.topic_prefix, &config.node_id);
        let status_topic = status_topic(&config.topic_prefix, &config.node_id);

        let client_id = format!("{}-{}", CLIENT_ID_PREFIX, config.node_id);
        let mut options = MqttOptions::new(client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_start(true);
        options.set_last_will(LastWill::new(
            &status_topic,
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
            None,
        ));
        if endpoint.use_tls {
            options.set_transport(Transport::tls_with_default_config());
        }

        let (client, connection) = Client::new(options, REQUEST_QUEUE_DEPTH);
        let (sender, commands) = mpsc::channel();
        let reader = spawn_reader(connection, sender);

        client
            .subscribe(&command_topic, QoS::AtLeastOnce)
            .with_context(|| format!("subscribe to {}", command_topic))?;
        client
            .publish(
                &status_topic,
                QoS::AtLeastOnce,
                true,
                PAYLOAD_ONLINE.as_bytes().to_vec(),
            )
            .context("publish online status")?;

        log::info!(
            "relay: connected to {}:{} (tls: {}), commands on {}",
            endpoint.host,
            endpoint.port,
            endpoint.use_tls,
            command_topic
        );

        Ok(Self {
            client,
            telemetry_topic,
            status_topic,
            commands,
            reader: Some(reader),
        })
    }

    /// Next pending command line, if any. Never blocks.
    pub fn poll_command(&mut self) -> Option<String> {
        self.commands.try_recv().ok()
    }

    /// Publish one telemetry document.
    pub fn broadcast(&self, payload: &[u8]) -> Result<()> {
        self.client
            .publish(
                &self.telemetry_topic,
                QoS::AtLeastOnce,
                false,
                payload.to_vec(),
            )
            .context("publish telemetry")?;
        Ok(())
    }

    /// Mark the node offline and tear the connection down.
    pub fn shutdown(mut self) -> Result<()> {
        // Best effort: the broker's last will covers us if this never flushes.
        let _ = self.client.publish(
            &self.status_topic,
            QoS::AtLeastOnce,
            true,
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
        );
        self.client.disconnect()?;
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

fn spawn_reader(mut connection: Connection, sender: mpsc::Sender<String>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(packet)) => {
                    if let Packet::Publish(publish) = packet {
                        let command = String::from_utf8_lossy(&publish.payload)
                            .trim()
                            .to_string();
                        if command.is_empty() {
                            continue;
                        }
                        if sender.send(command).is_err() {
                            break;
                        }
                    }
                }
                Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    log::warn!("relay: connection error: {}", e);
                    break;
                }
            }
        }
    })
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_parses_schemes_and_default_ports() {
        assert_eq!(
            parse_mqtt_endpoint("mqtt://127.0.0.1:1883").unwrap(),
            MqttEndpoint {
                host: "127.0.0.1".to_string(),
                port: 1883,
                use_tls: false,
            }
        );
        assert_eq!(
            parse_mqtt_endpoint("mqtts://broker.local").unwrap(),
            MqttEndpoint {
                host: "broker.local".to_string(),
                port: 8883,
                use_tls: true,
            }
        );
        assert_eq!(
            parse_mqtt_endpoint("broker.local").unwrap(),
            MqttEndpoint {
                host: "broker.local".to_string(),
                port: 1883,
                use_tls: false,
            }
        );
    }

    #[test]
    fn endpoint_handles_bracketed_ipv6() {
        let endpoint = parse_mqtt_endpoint("mqtt://[::1]:2883").unwrap();
        assert_eq!(endpoint.host, "::1");
        assert_eq!(endpoint.port, 2883);

        let endpoint = parse_mqtt_endpoint("[fe80::2]").unwrap();
        assert_eq!(endpoint.host, "fe80::2");
        assert_eq!(endpoint.port, 1883);
    }

    #[test]
    fn endpoint_rejects_malformed_addresses() {
        assert!(parse_mqtt_endpoint("").is_err());
        assert!(parse_mqtt_endpoint("ws://broker:1883").is_err());
        assert!(parse_mqtt_endpoint("broker:notaport").is_err());
        assert!(parse_mqtt_endpoint("[::1").is_err());
    }

    #[test]
    fn topics_follow_prefix_node_layout() {
        assert_eq!(telemetry_topic("facility", "node3"), "facility/node3/telemetry");
        assert_eq!(command_topic("facility", "node3"), "facility/node3/command");
        assert_eq!(status_topic("facility", "node3"), "facility/node3/status");
    }
}

//! Textual command set accepted on the command topic.
//!
//! Commands are single lowercase words mapping onto one named actuator and a
//! target state. Unknown words are logged and dropped, never an error: a bad
//! publish on the command topic must not disturb the telemetry loop.

use crate::gpio::ActuatorBank;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    OpenDoor,
    CloseDoor,
    LampOn,
    LampOff,
    SocketOn,
    SocketOff,
}

impl Command {
    /// Parse one command word. Case-sensitive, surrounding whitespace ignored.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "open_door" => Some(Self::OpenDoor),
            "close_door" => Some(Self::CloseDoor),
            "turn_on_lamp" => Some(Self::LampOn),
            "turn_off_lamp" => Some(Self::LampOff),
            "turn_on_socket" => Some(Self::SocketOn),
            "turn_off_socket" => Some(Self::SocketOff),
            _ => None,
        }
    }

    /// Actuator channel this command drives, and the state it drives it to.
    pub fn target(&self) -> (&'static str, bool) {
        match self {
            Self::OpenDoor => ("door", true),
            Self::CloseDoor => ("door", false),
            Self::LampOn => ("lamp", true),
            Self::LampOff => ("lamp", false),
            Self::SocketOn => ("socket", true),
            Self::SocketOff => ("socket", false),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenDoor => "open_door",
            Self::CloseDoor => "close_door",
            Self::LampOn => "turn_on_lamp",
            Self::LampOff => "turn_off_lamp",
            Self::SocketOn => "turn_on_socket",
            Self::SocketOff => "turn_off_socket",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse and apply one command line. Returns true when a known command was
/// applied to its actuator.
pub fn dispatch(line: &str, bank: &mut ActuatorBank) -> bool {
    let Some(command) = Command::parse(line) else {
        log::warn!("relay: ignoring unknown command {:?}", line.trim());
        return false;
    };

    let (name, on) = command.target();
    match bank.set(name, on) {
        Ok(()) => {
            log::info!("relay: {} -> {} {}", command, name, if on { "on" } else { "off" });
            true
        }
        Err(err) => {
            log::warn!("relay: {} failed: {err:#}", command);
            false
        }
    }
}

//! Client commands, and how they become device lines.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{device::DeviceLine, error::Error};

/// A message as sent by a client, before it is known to be a valid command.
///
/// On the wire: `{"command": "move", "position": 500}`.
/// Fields a command does not use are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientMessage {
    /// Which command, e.g. `"jog_cw"`.
    pub command: String,

    /// Target position for `move`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,

    /// Speed for the jog commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<i64>,
}

impl ClientMessage {
    fn new(command: &str) -> Self {
        Self {
            command: command.into(),
            position: None,
            speed: None,
        }
    }

    /// Reset the actuator.
    pub fn reset() -> Self {
        Self::new("reset")
    }

    /// Move to an absolute position.
    pub fn move_to(position: i64) -> Self {
        Self {
            position: Some(position),
            ..Self::new("move")
        }
    }

    /// Jog clockwise. No speed means full speed.
    pub fn jog_cw(speed: Option<i64>) -> Self {
        Self {
            speed,
            ..Self::new("jog_cw")
        }
    }

    /// Jog counterclockwise. No speed means full speed.
    pub fn jog_ccw(speed: Option<i64>) -> Self {
        Self {
            speed,
            ..Self::new("jog_ccw")
        }
    }

    /// Stop jogging.
    pub fn stop_jog() -> Self {
        Self::new("stop_jog")
    }

    /// Decode a client's JSON text.
    pub fn decode(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::MalformedMessage {
            message: text.into(),
            problem: e.to_string(),
        })
    }

    /// Turn the message into JSON text.
    pub fn serialize(&self) -> String {
        serde_json::to_string(self).expect("Should serialize well")
    }
}

/// What the device can be told to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Reset the actuator.
    Reset,

    /// Move to an absolute position.
    Move {
        /// Where to go. Range checking is left to the device.
        target_position: i64,
    },

    /// Jog clockwise until stopped.
    JogClockwise {
        /// If absent the device uses its maximum speed.
        speed: Option<i64>,
    },

    /// Jog counterclockwise until stopped.
    JogCounterclockwise {
        /// If absent the device uses its maximum speed.
        speed: Option<i64>,
    },

    /// Stop jogging.
    StopJog,
}

impl TryFrom<&ClientMessage> for DeviceCommand {
    type Error = Error;

    fn try_from(message: &ClientMessage) -> Result<Self, Self::Error> {
        let command = match message.command.as_str() {
            "reset" => Self::Reset,
            "move" => Self::Move {
                target_position: message.position.ok_or_else(|| Error::MissingField {
                    command: message.command.clone(),
                    field: "position".into(),
                })?,
            },
            "jog_cw" => Self::JogClockwise {
                speed: message.speed,
            },
            "jog_ccw" => Self::JogCounterclockwise {
                speed: message.speed,
            },
            "stop_jog" => Self::StopJog,
            other => return Err(Error::UnknownCommand(other.into())),
        };

        Ok(command)
    }
}

impl Display for DeviceCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceCommand::Reset => write!(f, "RESET"),
            DeviceCommand::Move { target_position } => write!(f, "MOVE {target_position}"),
            DeviceCommand::JogClockwise { speed: Some(speed) } => write!(f, "JOG_CW {speed}"),
            DeviceCommand::JogClockwise { speed: None } => write!(f, "JOG_CW"),
            DeviceCommand::JogCounterclockwise { speed: Some(speed) } => {
                write!(f, "JOG_CCW {speed}")
            }
            DeviceCommand::JogCounterclockwise { speed: None } => write!(f, "JOG_CCW"),
            DeviceCommand::StopJog => write!(f, "STOP_JOG"),
        }
    }
}

impl From<DeviceCommand> for DeviceLine {
    fn from(command: DeviceCommand) -> Self {
        DeviceLine::new(command.to_string())
    }
}

impl FromStr for DeviceCommand {
    type Err = Error;

    /// Parse a line of the device's command vocabulary.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let unknown = || Error::UnknownCommand(line.into());

        let mut words = line.split_whitespace();
        let name = words.next().ok_or_else(unknown)?;
        let argument = words
            .next()
            .map(|word| word.parse::<i64>().map_err(|_| unknown()))
            .transpose()?;

        if words.next().is_some() {
            return Err(unknown());
        }

        let command = match (name, argument) {
            ("RESET", None) => Self::Reset,
            ("MOVE", Some(target_position)) => Self::Move { target_position },
            ("JOG_CW", speed) => Self::JogClockwise { speed },
            ("JOG_CCW", speed) => Self::JogCounterclockwise { speed },
            ("STOP_JOG", None) => Self::StopJog,
            _ => return Err(unknown()),
        };

        Ok(command)
    }
}

/// Translate a decoded client message into the one line the device should receive.
pub fn translate(message: &ClientMessage) -> Result<DeviceLine, Error> {
    DeviceCommand::try_from(message).map(DeviceLine::from)
}

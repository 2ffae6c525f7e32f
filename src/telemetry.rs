use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{device::DeviceLine, error::Error};

const POSITION_PREFIX: &str = "POS:";
const SPEED_PREFIX: &str = "SPEED:";

/// A status report from the device.
///
/// Serializes into what clients receive, `{"position":500}` or `{"speed":80}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// Current actuator position.
    Position(i64),

    /// Current actuator speed.
    Speed(i64),
}

impl TelemetryEvent {
    /// Parse a device line, explaining why it is not telemetry if it isn't.
    pub fn try_parse(line: &str) -> Result<Self, Error> {
        let skip = || Error::TelemetryParseSkip(line.into());

        let (make, value): (fn(i64) -> Self, &str) =
            if let Some(value) = line.strip_prefix(POSITION_PREFIX) {
                (Self::Position, value)
            } else if let Some(value) = line.strip_prefix(SPEED_PREFIX) {
                (Self::Speed, value)
            } else {
                return Err(skip());
            };

        value.trim().parse().map(make).map_err(|_| skip())
    }

    /// Serialize into the client message format.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("Should serialize well")
    }
}

/// Parse a device line into telemetry.
/// Anything unrecognized, including a malformed number, is no event.
pub fn parse(line: &str) -> Option<TelemetryEvent> {
    TelemetryEvent::try_parse(line).ok()
}

impl Display for TelemetryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryEvent::Position(value) => write!(f, "{POSITION_PREFIX}{value}"),
            TelemetryEvent::Speed(value) => write!(f, "{SPEED_PREFIX}{value}"),
        }
    }
}

impl From<TelemetryEvent> for DeviceLine {
    fn from(event: TelemetryEvent) -> Self {
        DeviceLine::new(event.to_string())
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that may occur in this library.
///
/// None of these are fatal to the bridge.
/// They are logged, recorded as events, and the offending message is dropped.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum Error {
    /// Bad json.
    #[error("The message `{message}` could not be deserialized. Problem: {problem}")]
    MalformedMessage {
        /// The problematic message.
        message: String,

        /// The deserialization issue.
        problem: String,
    },

    /// The message was well formed but named a command we don't know.
    #[error("Unknown command `{0}`")]
    UnknownCommand(String),

    /// A command was missing a parameter it needs.
    #[error("The command `{command}` requires the field `{field}`")]
    MissingField {
        /// The command which was sent.
        command: String,

        /// The field which was absent.
        field: String,
    },

    /// Writing a line to the device failed.
    #[error("Could not write to the device. Problem: {0}")]
    DeviceWrite(String),

    /// A device line was not recognized as telemetry.
    #[error("Ignored device line `{0}`")]
    TelemetryParseSkip(String),

    /// The configuration is not valid.
    #[error("Bad configuration: {0}")]
    BadConfig(String),

    /// Something went wrong on the inside.
    #[error("Internal issue: {0}")]
    InternalIssue(String),
}

impl Error {
    /// Returns the inner problem description if this is [`Error::BadConfig`].
    pub fn try_into_bad_config(self) -> Result<String, Self> {
        if let Self::BadConfig(v) = self {
            Ok(v)
        } else {
            Err(self)
        }
    }
}

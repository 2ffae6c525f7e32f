use std::io;

use thiserror::Error;

use crate::error::Error;

/// Errors local to talking with the device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// IO related errors.
    #[error("Underlying IO problem: {0}")]
    IO(#[from] io::Error),

    /// Could not open the device.
    #[error("Could not open `{path}`: {problem}")]
    Open {
        /// Where we tried to open.
        path: String,

        /// Why it did not work.
        problem: String,
    },

    /// The device is not open right now.
    #[error("Device is closed")]
    Closed,

    /// The task driving the device is gone.
    #[error("Device task has stopped")]
    Stopped,
}

impl From<DeviceError> for Error {
    fn from(e: DeviceError) -> Self {
        Error::DeviceWrite(e.to_string())
    }
}

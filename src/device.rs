use std::{collections::VecDeque, fmt::Display, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{info_span, Instrument};

use crate::{
    config::DeviceConfig,
    device::{
        codecs::lines::LinesCodec,
        driver::{DeviceIo, Source, WriteRequest},
        error::DeviceError,
    },
    error::Error,
};

/// Device related errors.
pub mod error;

/// Codecs for encoding/decoding lines to/from wire.
pub mod codecs;

/// The task owning the device connection.
pub(crate) mod driver;

/// A simulated actuator.
pub(crate) mod simulator;

/// A single line of device text.
///
/// Never contains a newline.
/// The terminator is added by [`LinesCodec`] when the line is put on the wire.
#[derive(Debug, PartialEq, Eq, Clone, Hash, Deserialize, Serialize)]
pub struct DeviceLine(String);

impl DeviceLine {
    /// Create a line. A trailing line terminator is removed.
    pub fn new<S: Into<String>>(line: S) -> Self {
        let mut line = line.into();
        let content = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(content);

        Self(line)
    }

    /// Create a line from bytes, ignoring any bad utf8 bytes.
    pub fn new_lossy<B: AsRef<[u8]>>(bytes: B) -> Self {
        Self::new(String::from_utf8_lossy(bytes.as_ref()))
    }

    /// Borrowed form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The line as it appears on the wire, terminator included.
    pub fn to_wire(&self) -> String {
        format!("{}\n", self.0)
    }
}

impl From<&str> for DeviceLine {
    fn from(line: &str) -> Self {
        Self::new(line)
    }
}

impl From<String> for DeviceLine {
    fn from(line: String) -> Self {
        Self::new(line)
    }
}

impl Display for DeviceLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.0.chars().take(48).collect::<String>();

        write!(f, "{}", s.trim())
    }
}

/// Things the device task reports, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The device connection is open.
    Opened,

    /// A complete line arrived from the device.
    Line(DeviceLine),

    /// The device connection closed, for the given reason.
    Closed(String),
}

/// The receiving end of [`DeviceEvent`]s.
pub type DeviceEvents = mpsc::UnboundedReceiver<DeviceEvent>;

/// A handle for writing lines to the device.
///
/// Cheap to clone. All clones share the single device task,
/// which performs writes one at a time in the order they were requested.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    requests: mpsc::UnboundedSender<WriteRequest>,
}

impl DeviceHandle {
    /// Put a line on the wire.
    ///
    /// Resolves when the line has been flushed to the device,
    /// or with [`Error::DeviceWrite`] if the device is closed or the write failed.
    pub async fn write(&self, line: DeviceLine) -> Result<(), Error> {
        let (reply, response) = oneshot::channel();

        self.requests
            .send(WriteRequest { line, reply })
            .map_err(|_| DeviceError::Stopped)?;

        response.await.map_err(|_| DeviceError::Stopped)??;

        Ok(())
    }
}

/// Builder for a [`DeviceHandle`].
#[derive(Debug, Default)]
pub struct DeviceBuilder {
    reopen_interval: Option<Duration>,
    codec: Option<LinesCodec>,
}

impl DeviceBuilder {
    /// Start a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// If the device closes, try opening it again this often.
    pub fn set_reopen_interval(mut self, interval: Duration) -> Self {
        self.reopen_interval = Some(interval);
        self
    }

    /// Set the [LinesCodec] to use.
    pub fn set_line_codec(mut self, codec: LinesCodec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Open the device described by the configuration.
    ///
    /// A device which can't be opened right away does not stop the bridge.
    /// It starts out closed: [`DeviceEvent::Closed`] is reported and writes fail.
    /// With a reopen interval the device task keeps trying in the background.
    pub fn open(self, config: &DeviceConfig) -> (DeviceHandle, DeviceEvents) {
        let builder = match config {
            DeviceConfig::Serial(serial) => match serial.reopen_interval() {
                Some(interval) => self.set_reopen_interval(interval),
                None => self,
            },
            DeviceConfig::Simulated(_) => self,
        };

        let mut source = Source::from(config);
        let first = source.open();

        builder.spawn(source, first)
    }

    /// Run the device protocol over an already connected transport.
    ///
    /// When the transport closes the device stays closed.
    pub fn attach<T>(self, io: T) -> (DeviceHandle, DeviceEvents)
    where
        T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
    {
        let builder = Self {
            reopen_interval: None,
            ..self
        };

        let io: DeviceIo = Box::pin(io);

        builder.spawn(Source::Attached(VecDeque::new()), Ok(io))
    }

    fn spawn(
        self,
        source: Source,
        first: Result<DeviceIo, DeviceError>,
    ) -> (DeviceHandle, DeviceEvents) {
        let (requests_sender, requests_receiver) = mpsc::unbounded_channel();
        let (events_sender, events_receiver) = mpsc::unbounded_channel();

        let span = info_span!("Device", %source);

        tokio::spawn(
            driver::run(
                source,
                first,
                self.reopen_interval,
                self.codec.unwrap_or_default(),
                requests_receiver,
                events_sender,
            )
            .instrument(span),
        );

        (
            DeviceHandle {
                requests: requests_sender,
            },
            events_receiver,
        )
    }
}

use std::{collections::VecDeque, fmt::Display, pin::Pin, time::Duration};

use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot},
};
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::Decoder;
use tracing::{debug, error, info, trace, warn};

use crate::{
    config::{DeviceConfig, SerialConfig, SimulatorConfig},
    device::{codecs::lines::LinesCodec, error::DeviceError, simulator, DeviceEvent, DeviceLine},
};

pub(crate) trait AsyncReadWrite: AsyncRead + AsyncWrite + Send {}

impl<T: AsyncRead + AsyncWrite + Send> AsyncReadWrite for T {}

/// Whatever transport the device is reached through.
pub(crate) type DeviceIo = Pin<Box<dyn AsyncReadWrite>>;

#[derive(Debug)]
pub(crate) struct WriteRequest {
    pub(crate) line: DeviceLine,
    pub(crate) reply: oneshot::Sender<Result<(), DeviceError>>,
}

/// Where device connections come from.
pub(crate) enum Source {
    Serial(SerialConfig),
    Simulated(SimulatorConfig),

    /// Handed to us already open.
    /// Reopening takes the next spare, if any are left.
    Attached(VecDeque<DeviceIo>),
}

impl From<&DeviceConfig> for Source {
    fn from(config: &DeviceConfig) -> Self {
        match config {
            DeviceConfig::Serial(serial) => Self::Serial(serial.clone()),
            DeviceConfig::Simulated(simulator) => Self::Simulated(simulator.clone()),
        }
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Serial(serial) => write!(f, "{}@{}", serial.path, serial.baud),
            Source::Simulated(_) => write!(f, "simulator"),
            Source::Attached(_) => write!(f, "attached"),
        }
    }
}

impl Source {
    pub(crate) fn open(&mut self) -> Result<DeviceIo, DeviceError> {
        match self {
            Source::Serial(serial) => {
                let stream = tokio_serial::new(&serial.path, serial.baud)
                    .data_bits(tokio_serial::DataBits::Eight)
                    .parity(tokio_serial::Parity::None)
                    .stop_bits(tokio_serial::StopBits::One)
                    .flow_control(serial.flow_control)
                    .open_native_async()
                    .map_err(|e| DeviceError::Open {
                        path: serial.path.clone(),
                        problem: e.to_string(),
                    })?;

                Ok(Box::pin(stream))
            }
            Source::Simulated(settings) => Ok(simulator::spawn(settings.clone())),
            Source::Attached(spares) => spares.pop_front().ok_or(DeviceError::Closed),
        }
    }
}

enum SessionEnd {
    /// The connection is gone.
    Closed(String),

    /// Nobody holds a handle anymore.
    Shutdown,
}

fn report(events: &mpsc::UnboundedSender<DeviceEvent>, event: DeviceEvent) {
    if events.send(event).is_err() {
        trace!("Nobody listens to device events");
    }
}

/// Drive one open connection until it closes.
async fn session(
    io: DeviceIo,
    codec: LinesCodec,
    requests: &mut mpsc::UnboundedReceiver<WriteRequest>,
    events: &mpsc::UnboundedSender<DeviceEvent>,
) -> SessionEnd {
    // Sink: Send things (to device), stream: receive things (from device)
    let (mut sink, mut stream) = codec.framed(io).split();

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(line)) => {
                    trace!(%line, "From device");
                    report(events, DeviceEvent::Line(line));
                }
                Some(Err(e)) => {
                    error!(?e, "Device read error");
                    return SessionEnd::Closed(e.to_string());
                }
                None => {
                    return SessionEnd::Closed("end of stream".into());
                }
            },
            request = requests.recv() => match request {
                Some(WriteRequest { line, reply }) => {
                    debug!(%line, "To device");

                    let result = sink.send(line).await;
                    let problem = result.as_ref().err().map(ToString::to_string);

                    if reply.send(result).is_err() {
                        trace!("Writer did not wait for the result");
                    }

                    if let Some(problem) = problem {
                        error!(%problem, "Device write error");
                        return SessionEnd::Closed(problem);
                    }
                }
                None => return SessionEnd::Shutdown,
            },
        }
    }
}

/// Wait while closed, turning away writes.
/// Returns `false` if there are no more handles.
async fn wait_closed(
    interval: Duration,
    requests: &mut mpsc::UnboundedReceiver<WriteRequest>,
) -> bool {
    let sleep = tokio::time::sleep(interval);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            request = requests.recv() => match request {
                Some(WriteRequest { line, reply }) => {
                    debug!(%line, "Device closed, refusing write");
                    let _ = reply.send(Err(DeviceError::Closed));
                }
                None => return false,
            },
        }
    }
}

/// Own the device until every handle is dropped.
///
/// If `first` failed to open the device starts out closed.
pub(crate) async fn run(
    mut source: Source,
    first: Result<DeviceIo, DeviceError>,
    reopen_interval: Option<Duration>,
    codec: LinesCodec,
    mut requests: mpsc::UnboundedReceiver<WriteRequest>,
    events: mpsc::UnboundedSender<DeviceEvent>,
) {
    let mut next = match first {
        Ok(io) => Some(io),
        Err(e) => {
            warn!(%e, "Device could not be opened");
            report(&events, DeviceEvent::Closed(e.to_string()));
            None
        }
    };

    loop {
        if let Some(io) = next.take() {
            info!("Device open");
            report(&events, DeviceEvent::Opened);

            match session(io, codec.clone(), &mut requests, &events).await {
                SessionEnd::Closed(reason) => {
                    warn!(%reason, "Device closed");
                    report(&events, DeviceEvent::Closed(reason));
                }
                SessionEnd::Shutdown => {
                    debug!("No more device handles, stopping");
                    return;
                }
            }
        }

        let interval = match reopen_interval {
            Some(interval) => interval,
            None => break,
        };

        if !wait_closed(interval, &mut requests).await {
            return;
        }

        match source.open() {
            Ok(io) => next = Some(io),
            Err(e) => debug!(%e, "Reopen failed"),
        }
    }

    info!("Device stays closed");

    while let Some(WriteRequest { line, reply }) = requests.recv().await {
        debug!(%line, "Device closed, refusing write");
        let _ = reply.send(Err(DeviceError::Closed));
    }
}

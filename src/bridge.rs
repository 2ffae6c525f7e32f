//! The bridge wires clients, the device, and telemetry together.
//!
//! Two lifelines run independently:
//!
//! - Commands: client text is decoded, translated, and written to the device.
//!   Each client's commands are handled in the order it sent them.
//! - Telemetry: device lines are parsed and broadcast via the [`HubHandle`],
//!   in the order they arrived.
//!
//! Neither waits on the other. A slow client never holds up the device,
//! and a slow device never holds up broadcasts.

use tokio::sync::broadcast;
use tracing::{debug, info_span, trace, Instrument};

use crate::{
    command::{self, ClientMessage},
    config::Config,
    device::{DeviceBuilder, DeviceEvent, DeviceEvents, DeviceHandle, DeviceLine},
    error::Error,
    events::{Event, Events, TimestampedEvent},
    hub::{ClientId, HubHandle, Outbox},
    telemetry::TelemetryEvent,
};

/// How many recent events the bridge remembers.
const EVENT_LOG_SIZE: usize = 256;

/// A handle to a running bridge.
///
/// Cheap to clone, each connection gets one.
#[derive(Debug, Clone)]
pub struct Bridge {
    device: DeviceHandle,
    hub: HubHandle,
    events: Events,
}

impl Bridge {
    /// Open the configured device and start routing.
    pub fn new(config: &Config) -> Result<Self, Error> {
        config.validate()?;

        let (device, device_events) = DeviceBuilder::new().open(&config.device);

        Ok(Self::with_device(
            device,
            device_events,
            HubHandle::new(config.client_buffer),
        ))
    }

    /// Start routing with a device which is already set up.
    pub fn with_device(device: DeviceHandle, device_events: DeviceEvents, hub: HubHandle) -> Self {
        let events = Events::new(EVENT_LOG_SIZE);

        tokio::spawn(
            route_telemetry(device_events, hub.clone(), events.clone())
                .instrument(info_span!("Telemetry")),
        );

        Self {
            device,
            hub,
            events,
        }
    }

    /// A client connected. Its telemetry arrives on the returned [`Outbox`].
    pub fn connect(&self, client: ClientId) -> Outbox {
        let outbox = self.hub.join(client);
        self.events.send_event(Event::ClientConnected(client));

        outbox
    }

    /// A client disconnected.
    pub fn disconnect(&self, client: ClientId) {
        self.hub.leave(client);
        self.events.send_event(Event::ClientDisconnected(client));
    }

    /// Handle one message from a client.
    ///
    /// On success the line which was written to the device is returned.
    /// Errors are recorded as [`Event::CommandRejected`]; the caller need not do more than log them.
    /// The client stays connected either way.
    pub async fn handle_client_message(
        &self,
        client: ClientId,
        text: &str,
    ) -> Result<DeviceLine, Error> {
        match self.send_command(text).await {
            Ok(line) => {
                self.events.send_event(Event::CommandSent {
                    client,
                    line: line.clone(),
                });
                Ok(line)
            }
            Err(error) => {
                self.events.send_event(Event::CommandRejected {
                    client,
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    async fn send_command(&self, text: &str) -> Result<DeviceLine, Error> {
        let message = ClientMessage::decode(text)?;
        let line = command::translate(&message)?;

        self.device.write(line.clone()).await?;

        Ok(line)
    }

    /// Subscribe to what the bridge does.
    pub fn subscribe(&self) -> broadcast::Receiver<TimestampedEvent> {
        self.events.subscribe()
    }

    /// The most recent events, newest first.
    pub fn recent_events(&self) -> Vec<TimestampedEvent> {
        self.events.recent()
    }

    /// The hub this bridge broadcasts through.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }
}

async fn route_telemetry(mut device_events: DeviceEvents, hub: HubHandle, events: Events) {
    while let Some(device_event) = device_events.recv().await {
        match device_event {
            DeviceEvent::Line(line) => match TelemetryEvent::try_parse(line.as_str()) {
                Ok(telemetry) => {
                    hub.broadcast(telemetry);
                    events.send_event(Event::TelemetryBroadcast(telemetry));
                }
                Err(e) => {
                    trace!(%e, "Not telemetry");
                    events.send_event(Event::TelemetryIgnored(line));
                }
            },
            DeviceEvent::Opened => events.send_event(Event::DeviceOpened),
            DeviceEvent::Closed(reason) => events.send_event(Event::DeviceClosed(reason)),
        }
    }

    debug!("Device task gone, no more telemetry");
}

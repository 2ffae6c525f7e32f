use std::{
    collections::VecDeque,
    fmt::Display,
    sync::{Arc, Mutex},
};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{device::DeviceLine, error::Error, hub::ClientId, telemetry::TelemetryEvent};

/// Things the bridge did, or refused to do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Event {
    /// A client has connected.
    ClientConnected(ClientId),

    /// A client has disconnected.
    ClientDisconnected(ClientId),

    /// A client's command was put on the wire as this line.
    CommandSent {
        /// Who sent it.
        client: ClientId,

        /// What the device got.
        line: DeviceLine,
    },

    /// A client's message was dropped.
    CommandRejected {
        /// Who sent it.
        client: ClientId,

        /// Why it was dropped.
        error: Error,
    },

    /// Telemetry was handed to the connected clients.
    TelemetryBroadcast(TelemetryEvent),

    /// A device line which is not telemetry.
    TelemetryIgnored(DeviceLine),

    /// The device connection opened.
    DeviceOpened,

    /// The device connection closed.
    DeviceClosed(String),
}

impl Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::ClientConnected(client) => write!(f, "{client} connected"),
            Event::ClientDisconnected(client) => write!(f, "{client} disconnected"),
            Event::CommandSent { client, line } => write!(f, "{client} sent: {line}"),
            Event::CommandRejected { client, error } => {
                write!(f, "{client} rejected: {error}")
            }
            Event::TelemetryBroadcast(event) => write!(f, "broadcast: {event}"),
            Event::TelemetryIgnored(line) => write!(f, "ignored: {line}"),
            Event::DeviceOpened => write!(f, "device opened"),
            Event::DeviceClosed(reason) => write!(f, "device closed: {reason}"),
        }
    }
}

/// An event and when it happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimestampedEvent {
    /// The event.
    pub inner: Event,

    /// When the event happened.
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl TimestampedEvent {
    /// Stamp an event with the current time.
    pub fn new(event: Event) -> Self {
        Self {
            inner: event,
            timestamp: chrono::Utc::now(),
        }
    }
}

impl Display for TimestampedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

/// An event logger and broadcaster.
///
/// Cheap to clone, clones share the log.
#[derive(Debug, Clone)]
pub struct Events {
    log: Arc<Mutex<VecDeque<TimestampedEvent>>>,
    log_size: usize,

    tx: broadcast::Sender<TimestampedEvent>,
}

impl Events {
    /// Create a new events handler.
    /// It will keep a log of at most `log_size` events.
    /// It may be subscribed to to receive any events it sees.
    pub fn new(log_size: usize) -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            tx,
            log: Arc::new(Mutex::new(VecDeque::new())),
            log_size,
        }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> broadcast::Receiver<TimestampedEvent> {
        self.tx.subscribe()
    }

    /// Send an event. This will append it to the log and broadcast it to any subscribers.
    pub fn send_event(&self, event: Event) {
        let event = TimestampedEvent::new(event);

        match &event.inner {
            Event::CommandRejected { .. } | Event::DeviceClosed(_) => warn!(%event, "Event"),
            Event::TelemetryBroadcast(_) | Event::TelemetryIgnored(_) => debug!(%event, "Event"),
            _ => info!(%event, "Event"),
        }

        match self.log.lock() {
            Ok(mut log) => {
                log.push_front(event.clone());

                // Keep a log of at most this number recent events.
                // Truncate removes from the back, which means older events are split off first.
                log.truncate(self.log_size);
            }
            Err(_) => warn!("Event log poisoned"),
        }

        // No subscribers is fine.
        let _ = self.tx.send(event);
    }

    /// The most recent events, newest first.
    pub fn recent(&self) -> Vec<TimestampedEvent> {
        match self.log.lock() {
            Ok(log) => log.iter().cloned().collect(),
            Err(_) => vec![],
        }
    }
}

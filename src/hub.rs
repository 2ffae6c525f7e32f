//! The hub knows which clients are connected,
//! and hands telemetry to each of them.
//!
//! Delivery is best effort.
//! A client which still has [`crate::config::DEFAULT_CLIENT_BUFFER`] (or whatever was configured)
//! messages pending is considered busy, and simply misses the event.
//! A client whose connection is gone is removed.
//!
//! "Not writable" means the connection is closed, which removes the client.
//! A full outbox only skips the event, the client stays a member.

use std::{collections::HashMap, fmt::Display, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, info_span, trace, Instrument};

use crate::telemetry::TelemetryEvent;

/// Identifies a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(uuid::Uuid);

impl ClientId {
    /// A new unique id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serialized telemetry, ready to be written to a client.
pub type Outgoing = Arc<str>;

/// Where a member's telemetry arrives.
pub type Outbox = mpsc::Receiver<Outgoing>;

/// What happened when an event was broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Members the event was handed to.
    pub delivered: usize,

    /// Members which were busy, so the event was dropped for them.
    pub skipped: Vec<ClientId>,

    /// Members which were gone, and are now removed.
    pub removed: Vec<ClientId>,
}

#[derive(Debug)]
enum HubRequest {
    Join {
        client: ClientId,
        outbox: mpsc::Sender<Outgoing>,
    },
    Leave(ClientId),
    Broadcast {
        event: TelemetryEvent,
        reply: Option<oneshot::Sender<Delivery>>,
    },
    Members(oneshot::Sender<Vec<ClientId>>),
}

struct Hub {
    requests: mpsc::UnboundedReceiver<HubRequest>,
    members: HashMap<ClientId, mpsc::Sender<Outgoing>>,
}

impl Hub {
    async fn run(mut self) {
        while let Some(request) = self.requests.recv().await {
            match request {
                HubRequest::Join { client, outbox } => {
                    info!(%client, "Joined");
                    self.members.insert(client, outbox);
                }
                HubRequest::Leave(client) => {
                    if self.members.remove(&client).is_some() {
                        info!(%client, "Left");
                    }
                }
                HubRequest::Broadcast { event, reply } => {
                    let delivery = self.broadcast(event);

                    if let Some(reply) = reply {
                        let _ = reply.send(delivery);
                    }
                }
                HubRequest::Members(reply) => {
                    let mut members = self.members.keys().copied().collect::<Vec<_>>();
                    members.sort();
                    let _ = reply.send(members);
                }
            }
        }

        debug!("No more hub handles");
    }

    fn broadcast(&mut self, event: TelemetryEvent) -> Delivery {
        let message: Outgoing = event.to_json().into();
        let mut delivery = Delivery::default();

        for (client, outbox) in &self.members {
            match outbox.try_send(message.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    trace!(%client, %event, "Client busy, skipped");
                    delivery.skipped.push(*client);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    delivery.removed.push(*client);
                }
            }
        }

        for client in &delivery.removed {
            info!(%client, "Connection gone, removed");
            self.members.remove(client);
        }

        trace!(
            %event,
            delivered = delivery.delivered,
            skipped = delivery.skipped.len(),
            "Broadcast"
        );

        delivery
    }
}

/// A handle to the broadcast hub.
///
/// Cheap to clone.
/// Membership changes and broadcasts are applied in the order they are requested.
#[derive(Debug, Clone)]
pub struct HubHandle {
    requests: mpsc::UnboundedSender<HubRequest>,
    client_buffer: usize,
}

impl HubHandle {
    /// Start a hub.
    /// Each member may have at most `client_buffer` messages pending.
    pub fn new(client_buffer: usize) -> Self {
        let (requests, receiver) = mpsc::unbounded_channel();

        let hub = Hub {
            requests: receiver,
            members: HashMap::new(),
        };

        tokio::spawn(hub.run().instrument(info_span!("Hub")));

        Self {
            requests,
            client_buffer: client_buffer.max(1),
        }
    }

    fn request(&self, request: HubRequest) {
        if self.requests.send(request).is_err() {
            debug!("Hub is gone");
        }
    }

    /// Add a member. Broadcasts requested after this returns will reach it.
    ///
    /// Dropping the returned [`Outbox`] makes the member leave on the next broadcast.
    pub fn join(&self, client: ClientId) -> Outbox {
        let (outbox, receiver) = mpsc::channel(self.client_buffer);

        self.request(HubRequest::Join { client, outbox });

        receiver
    }

    /// Remove a member.
    pub fn leave(&self, client: ClientId) {
        self.request(HubRequest::Leave(client));
    }

    /// Hand an event to every member. Does not wait for anything.
    pub fn broadcast(&self, event: TelemetryEvent) {
        self.request(HubRequest::Broadcast { event, reply: None });
    }

    /// Like [`HubHandle::broadcast`], but wait for the outcome.
    pub async fn broadcast_and_report(&self, event: TelemetryEvent) -> Delivery {
        let (reply, outcome) = oneshot::channel();

        self.request(HubRequest::Broadcast {
            event,
            reply: Some(reply),
        });

        outcome.await.unwrap_or_default()
    }

    /// The current members, sorted.
    pub async fn members(&self) -> Vec<ClientId> {
        let (reply, members) = oneshot::channel();

        self.request(HubRequest::Members(reply));

        members.await.unwrap_or_default()
    }
}

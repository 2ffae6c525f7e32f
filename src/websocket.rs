use std::net::SocketAddr;

use futures::{sink::Sink, stream::Stream, SinkExt, StreamExt};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, WebSocketUpgrade,
    },
    response::IntoResponse,
    Extension, TypedHeader,
};

use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::{
    bridge::Bridge,
    hub::{ClientId, Outbox},
};

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    user_agent: Option<TypedHeader<headers::UserAgent>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(bridge): Extension<Bridge>,
) -> impl IntoResponse {
    if let Some(TypedHeader(user_agent)) = user_agent {
        info!("`{}`@`{addr}` connected", user_agent.as_str());
    }

    ws.on_upgrade(move |socket| {
        let client = ClientId::new();

        let span = info_span!("Client", %client, %addr);

        handle_websocket(socket, client, bridge).instrument(span)
    })
}

async fn handle_text(bridge: &Bridge, client: ClientId, text: &str) {
    trace!(%text, "client message");

    // Already recorded by the bridge, the client is not told.
    if let Err(e) = bridge.handle_client_message(client, text).await {
        debug!(%e, "Message dropped");
    }
}

pub(crate) async fn read<S>(mut receiver: S, client: ClientId, bridge: Bridge)
where
    S: Unpin,
    S: Stream<Item = Result<Message, axum::Error>>,
{
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => handle_text(&bridge, client, &text).await,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => handle_text(&bridge, client, &text).await,
                Err(_) => debug!("client sent non-utf8 binary data"),
            },
            Message::Ping(_) => {
                debug!("socket ping");
            }
            Message::Pong(_) => {
                debug!("socket pong");
            }
            Message::Close(_) => {
                debug!("client disconnected");
            }
        }
    }

    debug!("no more stuff");
}

pub(crate) async fn write(mut sender: impl Sink<Message> + Unpin, mut outbox: Outbox) {
    while let Some(message) = outbox.recv().await {
        if sender.send(Message::Text(message.to_string())).await.is_err() {
            // Dropping the outbox lets the hub know.
            debug!("client disconnected");
            return;
        }
        trace!("Telemetry flushed");
    }
}

pub(crate) async fn handle_websocket(websocket: WebSocket, client: ClientId, bridge: Bridge) {
    let (stream_sender, stream_receiver) = websocket.split();

    let outbox = bridge.connect(client);

    let read_handle = tokio::spawn(
        read(stream_receiver, client, bridge.clone()).instrument(info_span!("Read")),
    );
    let write_handle = tokio::spawn(write(stream_sender, outbox).instrument(info_span!("Write")));

    match read_handle.await {
        Ok(()) => debug!("Read task joined"),
        Err(e) => warn!("Read task join error: {e:?}"),
    }

    bridge.disconnect(client);

    debug!("Aborting write task");
    // This ensures the underlying TCP connection gets closed,
    // which signals the peer that the session is over.
    write_handle.abort();
}

#![allow(dead_code)]

use std::time::Duration;

use axum::http::StatusCode;
use color_eyre::Result;
use futures::SinkExt;
use futures::StreamExt;
use joystick_bridge::{
    bridge::Bridge,
    config::Config,
    device::DeviceBuilder,
    events::{Event, TimestampedEvent},
    hub::HubHandle,
    telemetry::TelemetryEvent,
};
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::info;

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// A bridge served on some port, with a fake device on the other end.
pub struct TestBridge {
    pub port: u16,
    pub bridge: Bridge,
    pub device: DuplexStream,
}

pub async fn start_bridge() -> TestBridge {
    start_bridge_with_buffer(32).await
}

pub async fn start_bridge_with_buffer(client_buffer: usize) -> TestBridge {
    let (bridge_side, device) = tokio::io::duplex(4096);
    let (handle, device_events) = DeviceBuilder::new().attach(bridge_side);
    let bridge = Bridge::with_device(handle, device_events, HubHandle::new(client_buffer));

    let (port_tx, port_rx) = oneshot::channel();

    let served = bridge.clone();
    tokio::spawn(async move {
        joystick_bridge::server::serve_any_port(served, Config::default(), port_tx).await
    });

    let port = port_rx
        .await
        .expect("Server should reply with allocated port");

    TestBridge {
        port,
        bridge,
        device,
    }
}

pub async fn start_simulated_server() -> u16 {
    let (port_tx, port_rx) = oneshot::channel();

    tokio::spawn(async move {
        joystick_bridge::server::run_any_port(Config::simulated(), port_tx).await
    });
    port_rx
        .await
        .expect("Server should reply with allocated port")
}

pub async fn connect(port: u16) -> Result<Client> {
    info!("Connecting to server on port {port}");
    let (stream, http_response) =
        tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}/")).await?;

    assert_eq!(http_response.status(), StatusCode::SWITCHING_PROTOCOLS);

    Ok(stream)
}

/// Connect, and wait until the bridge has registered the client.
pub async fn connect_and_join(test: &TestBridge) -> Result<Client> {
    let before = test.bridge.hub().members().await.len();
    let client = connect(test.port).await?;

    timeout(TIMEOUT, async {
        while test.bridge.hub().members().await.len() <= before {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;

    Ok(client)
}

pub async fn send(client: &mut Client, text: &str) -> Result<()> {
    client
        .send(tungstenite::Message::Text(text.to_owned()))
        .await?;
    Ok(())
}

pub async fn receive(client: &mut Client) -> Result<TelemetryEvent> {
    let response = timeout(TIMEOUT, client.next())
        .await?
        .ok_or_else(|| color_eyre::eyre::eyre!("Stream closed"))??;

    let response = response.to_text()?;
    let response = serde_json::from_str(response)?;

    Ok(response)
}

pub async fn receive_text(client: &mut Client) -> Result<String> {
    let response = timeout(TIMEOUT, client.next())
        .await?
        .ok_or_else(|| color_eyre::eyre::eyre!("Stream closed"))??;

    Ok(response.to_text()?.to_owned())
}

/// Read exactly `expected.len()` bytes from the fake device.
pub async fn device_receives(device: &mut DuplexStream, expected: &str) -> Result<()> {
    let mut buffer = vec![0u8; expected.len()];
    timeout(TIMEOUT, device.read_exact(&mut buffer)).await??;

    assert_eq!(String::from_utf8(buffer)?, expected);

    Ok(())
}

/// Skip events until one matches.
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<TimestampedEvent>,
    mut wanted: F,
) -> Result<Event>
where
    F: FnMut(&Event) -> bool,
{
    timeout(TIMEOUT, async {
        loop {
            let event = events.recv().await?.inner;
            if wanted(&event) {
                return Ok::<_, color_eyre::Report>(event);
            }
        }
    })
    .await?
}

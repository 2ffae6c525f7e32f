use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use tungstenite::Message;

use crate::{command::ClientMessage, error::Error, telemetry::TelemetryEvent};

fn issue<E: std::fmt::Display>(e: E) -> Error {
    Error::InternalIssue(e.to_string())
}

/// A websocket client of the bridge.
pub struct BridgeClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl BridgeClient {
    /// Connect to a bridge at the given address.
    pub async fn connect(address: &str, port: u16) -> Result<Self, Error> {
        let url = format!("ws://{address}:{port}/");
        info!(%url, "Connecting");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(issue)?;

        Ok(Self { stream })
    }

    /// Send a command.
    pub async fn send(&mut self, message: &ClientMessage) -> Result<(), Error> {
        self.send_text(message.serialize()).await
    }

    /// Send arbitrary text, well formed or not.
    pub async fn send_text<S: Into<String>>(&mut self, text: S) -> Result<(), Error> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(issue)
    }

    /// Wait for the next telemetry broadcast.
    pub async fn next_telemetry(&mut self) -> Result<TelemetryEvent, Error> {
        while let Some(message) = self.stream.next().await {
            match message.map_err(issue)? {
                Message::Text(text) => {
                    return serde_json::from_str(&text).map_err(|e| Error::MalformedMessage {
                        message: text,
                        problem: e.to_string(),
                    })
                }
                Message::Close(_) => break,
                other => debug!(?other, "Not telemetry"),
            }
        }

        Err(Error::InternalIssue("Connection closed".into()))
    }

    /// Close the connection.
    pub async fn close(mut self) -> Result<(), Error> {
        self.stream.close(None).await.map_err(issue)
    }
}

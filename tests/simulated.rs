use std::time::Duration;

use color_eyre::Result;
use joystick_bridge::{client::BridgeClient, command::ClientMessage, telemetry::TelemetryEvent};

mod common;
use common::*;

/// The client joins the hub some time after the upgrade,
/// so early telemetry may not reach it. Keep asking until it does.
async fn send_until(
    client: &mut BridgeClient,
    message: ClientMessage,
    wanted: TelemetryEvent,
) -> Result<()> {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            client.send(&message).await?;

            let attempt = tokio::time::timeout(Duration::from_millis(500), async {
                loop {
                    if client.next_telemetry().await? == wanted {
                        return Ok::<_, color_eyre::Report>(());
                    }
                }
            })
            .await;

            if let Ok(result) = attempt {
                return result;
            }
        }
    })
    .await?
}

#[tokio::test]
async fn move_is_reported_back() -> Result<()> {
    let port = start_simulated_server().await;
    let mut client = BridgeClient::connect("127.0.0.1", port).await?;

    send_until(
        &mut client,
        ClientMessage::move_to(300),
        TelemetryEvent::Position(300),
    )
    .await?;

    client.close().await?;

    Ok(())
}

#[tokio::test]
async fn jog_reports_speed_then_stops() -> Result<()> {
    let port = start_simulated_server().await;
    let mut client = BridgeClient::connect("127.0.0.1", port).await?;

    send_until(
        &mut client,
        ClientMessage::jog_cw(Some(40)),
        TelemetryEvent::Speed(40),
    )
    .await?;

    send_until(&mut client, ClientMessage::stop_jog(), TelemetryEvent::Speed(0)).await?;

    client.close().await?;

    Ok(())
}

#[tokio::test]
async fn bad_text_keeps_the_connection() -> Result<()> {
    let port = start_simulated_server().await;
    let mut client = BridgeClient::connect("127.0.0.1", port).await?;

    client.send_text("not json").await?;
    client.send_text(r#"{"command": "fly"}"#).await?;

    send_until(&mut client, ClientMessage::reset(), TelemetryEvent::Position(0)).await?;

    Ok(())
}

use std::time::Duration;

use color_eyre::Result;
use joystick_bridge::telemetry::TelemetryEvent;
use pretty_assertions::assert_eq;
use tokio::io::AsyncWriteExt;

mod common;
use common::*;

#[tokio::test]
async fn position_reaches_every_client() -> Result<()> {
    let mut test = start_bridge().await;

    let mut clients = vec![];
    for _ in 0..3 {
        clients.push(connect_and_join(&test).await?);
    }

    test.device.write_all(b"POS:500\n").await?;

    for client in &mut clients {
        assert_eq!(receive_text(client).await?, r#"{"position":500}"#);
    }

    Ok(())
}

#[tokio::test]
async fn telemetry_keeps_device_order() -> Result<()> {
    let mut test = start_bridge().await;
    let mut client = connect_and_join(&test).await?;

    test.device
        .write_all(b"POS:1\nSPEED:2\nPOS:-3\r\nSPEED:4\n")
        .await?;

    assert_eq!(receive(&mut client).await?, TelemetryEvent::Position(1));
    assert_eq!(receive(&mut client).await?, TelemetryEvent::Speed(2));
    assert_eq!(receive(&mut client).await?, TelemetryEvent::Position(-3));
    assert_eq!(receive(&mut client).await?, TelemetryEvent::Speed(4));

    Ok(())
}

#[tokio::test]
async fn lines_split_across_reads() -> Result<()> {
    let mut test = start_bridge().await;
    let mut client = connect_and_join(&test).await?;

    test.device.write_all(b"PO").await?;
    test.device.flush().await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    test.device.write_all(b"S:7").await?;
    test.device.flush().await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    test.device.write_all(b"\n").await?;

    assert_eq!(receive(&mut client).await?, TelemetryEvent::Position(7));

    Ok(())
}

#[tokio::test]
async fn other_lines_are_not_broadcast() -> Result<()> {
    let mut test = start_bridge().await;
    let mut client = connect_and_join(&test).await?;

    test.device
        .write_all(b"hello\nPOS:abc\n\nTEMP:40\nSPEED:10\n")
        .await?;

    assert_eq!(receive(&mut client).await?, TelemetryEvent::Speed(10));

    Ok(())
}

#[tokio::test]
async fn gone_client_is_removed() -> Result<()> {
    let mut test = start_bridge().await;
    let mut staying = connect_and_join(&test).await?;
    let mut leaving = connect_and_join(&test).await?;

    leaving.close(None).await?;

    tokio::time::timeout(TIMEOUT, async {
        while test.bridge.hub().members().await.len() != 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;

    test.device.write_all(b"SPEED:1\n").await?;
    assert_eq!(receive(&mut staying).await?, TelemetryEvent::Speed(1));

    Ok(())
}

#[tokio::test]
async fn late_client_gets_only_new_telemetry() -> Result<()> {
    let mut test = start_bridge().await;
    let mut early = connect_and_join(&test).await?;

    test.device.write_all(b"POS:1\n").await?;
    assert_eq!(receive(&mut early).await?, TelemetryEvent::Position(1));

    let mut late = connect_and_join(&test).await?;
    test.device.write_all(b"POS:2\n").await?;

    assert_eq!(receive(&mut early).await?, TelemetryEvent::Position(2));
    assert_eq!(receive(&mut late).await?, TelemetryEvent::Position(2));

    Ok(())
}

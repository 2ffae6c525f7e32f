//! A simulated actuator controller.
//! It reads command lines and answers with telemetry lines,
//! just like the firmware on the other end of a serial port would.
//!
//! Useful for running the bridge, and testing clients,
//! without the actual hardware.

use futures::{SinkExt, StreamExt};
use tokio::{io::DuplexStream, time::MissedTickBehavior};
use tokio_util::codec::{Decoder, Framed};
use tracing::{debug, info_span, trace, warn, Instrument};

use crate::{
    command::DeviceCommand,
    config::SimulatorConfig,
    device::{codecs::lines::LinesCodec, driver::DeviceIo, DeviceLine},
    telemetry::TelemetryEvent,
};

const DUPLEX_BUFFER: usize = 1024;

/// Start a simulator, returning the end of the connection the bridge should use.
pub(crate) fn spawn(settings: SimulatorConfig) -> DeviceIo {
    let (bridge_side, device_side) = tokio::io::duplex(DUPLEX_BUFFER);

    tokio::spawn(
        Simulator::new(settings)
            .run(LinesCodec::default().framed(device_side))
            .instrument(info_span!("Simulator")),
    );

    Box::pin(bridge_side)
}

#[derive(Debug)]
pub(crate) struct Simulator {
    settings: SimulatorConfig,
    position: i64,
    speed: i64,

    /// 1 clockwise, -1 counterclockwise, 0 still.
    direction: i64,
}

impl Simulator {
    pub(crate) fn new(settings: SimulatorConfig) -> Self {
        Self {
            settings,
            position: 0,
            speed: 0,
            direction: 0,
        }
    }

    fn jog(&mut self, direction: i64, speed: Option<i64>) -> Vec<TelemetryEvent> {
        self.direction = direction;
        self.speed = speed.unwrap_or(self.settings.max_speed);

        vec![TelemetryEvent::Speed(self.speed)]
    }

    /// The telemetry the actuator reports in reply to a line.
    pub(crate) fn respond(&mut self, line: &DeviceLine) -> Vec<TelemetryEvent> {
        let command = match line.as_str().parse::<DeviceCommand>() {
            Ok(command) => command,
            Err(e) => {
                debug!(%e, "Simulator ignores line");
                return vec![];
            }
        };

        match command {
            DeviceCommand::Reset => {
                self.position = 0;
                self.speed = 0;
                self.direction = 0;

                vec![TelemetryEvent::Speed(0), TelemetryEvent::Position(0)]
            }
            DeviceCommand::Move { target_position } => {
                self.direction = 0;
                self.position = target_position;

                vec![TelemetryEvent::Position(self.position)]
            }
            DeviceCommand::JogClockwise { speed } => self.jog(1, speed),
            DeviceCommand::JogCounterclockwise { speed } => self.jog(-1, speed),
            DeviceCommand::StopJog => {
                self.direction = 0;
                self.speed = 0;

                vec![TelemetryEvent::Speed(0)]
            }
        }
    }

    /// Advance a jogging actuator by one tick.
    pub(crate) fn tick(&mut self) -> Option<TelemetryEvent> {
        if self.direction == 0 {
            return None;
        }

        self.position = self
            .position
            .saturating_add(self.direction.saturating_mul(self.speed));

        Some(TelemetryEvent::Position(self.position))
    }

    async fn run(mut self, mut wire: Framed<DuplexStream, LinesCodec>) {
        let mut ticker = tokio::time::interval(self.settings.tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let replies = tokio::select! {
                incoming = wire.next() => match incoming {
                    Some(Ok(line)) => {
                        trace!(%line, "Simulator got");
                        self.respond(&line)
                    }
                    Some(Err(e)) => {
                        warn!(?e, "Simulator read error");
                        return;
                    }
                    None => {
                        debug!("Bridge hung up");
                        return;
                    }
                },
                _ = ticker.tick(), if self.direction != 0 => self.tick().into_iter().collect(),
            };

            for reply in replies {
                if wire.send(DeviceLine::from(reply)).await.is_err() {
                    debug!("Bridge hung up");
                    return;
                }
            }
        }
    }
}

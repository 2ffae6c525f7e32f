use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

use crate::{
    command::ClientMessage,
    config::{Config, DeviceConfig, SerialConfig, SimulatorConfig},
    telemetry::TelemetryEvent,
};

/// The command line interface for the joystick bridge.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file
    pub config: Option<PathBuf>,

    /// Port to accept websocket clients on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Serial port of the device, e.g. /dev/ttyACM0 or COM3
    #[arg(short, long)]
    pub device: Option<String>,

    /// Baud rate of the device
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Use a simulated actuator instead of a serial port
    #[arg(long, conflicts_with_all = ["device", "baud"])]
    pub simulate: bool,

    /// Log level on stdout, unless RUST_LOG is set
    #[arg(long, default_value = "info")]
    pub log_level: Level,

    /// Also log to daily rotated files in this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Apply command line overrides on top of a configuration.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(port) = self.port {
            config.port = port;
        }

        if self.simulate {
            config.device = DeviceConfig::Simulated(SimulatorConfig::default());
        }

        if self.device.is_some() || self.baud.is_some() {
            let mut serial = match config.device {
                DeviceConfig::Serial(serial) => serial,
                DeviceConfig::Simulated(_) => SerialConfig::default(),
            };

            if let Some(path) = &self.device {
                serial.path = path.clone();
            }
            if let Some(baud) = self.baud {
                serial.baud = baud;
            }

            config.device = DeviceConfig::Serial(serial);
        }

        config
    }
}

/// Commands available in the command line interface.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Examples for user convenience.
    #[clap(subcommand)]
    Examples(Examples),
}

/// Helpful examples for users.
#[derive(Subcommand, Debug, Clone)]
pub enum Examples {
    /// Show an example of a configuration file's contents.
    Config,

    /// Show the JSON messages clients may send.
    Commands,

    /// Show the JSON messages clients receive.
    Telemetry,
}

/// Print what the command asks for.
pub fn handle_command(command: Commands) {
    match command {
        Commands::Examples(Examples::Config) => {
            println!("{}", Config::example().serialize_pretty());
        }
        Commands::Examples(Examples::Commands) => {
            for message in [
                ClientMessage::reset(),
                ClientMessage::move_to(500),
                ClientMessage::jog_cw(None),
                ClientMessage::jog_cw(Some(80)),
                ClientMessage::jog_ccw(Some(80)),
                ClientMessage::stop_jog(),
            ] {
                println!("{}", message.serialize());
            }
        }
        Commands::Examples(Examples::Telemetry) => {
            for event in [TelemetryEvent::Position(500), TelemetryEvent::Speed(80)] {
                println!("{}", event.to_json());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("joystick-bridge").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn no_overrides_keeps_config() {
        let cli = parse(&[]);

        assert_eq!(cli.apply(Config::example()), Config::example());
        assert_eq!(cli.log_level, Level::INFO);
    }

    #[test]
    fn serial_overrides() {
        let cli = parse(&["--port", "9001", "--device", "/dev/ttyUSB3", "--baud", "115200"]);
        let config = cli.apply(Config::simulated());

        assert_eq!(config.port, 9001);
        match config.device {
            DeviceConfig::Serial(serial) => {
                assert_eq!(serial.path, "/dev/ttyUSB3");
                assert_eq!(serial.baud, 115200);
            }
            other => panic!("Expected serial, got {other:?}"),
        }
    }

    #[test]
    fn simulate_override() {
        let cli = parse(&["--simulate"]);

        assert!(matches!(
            cli.apply(Config::default()).device,
            DeviceConfig::Simulated(_)
        ));
    }

    #[test]
    fn simulate_conflicts_with_device() {
        assert!(Cli::try_parse_from(["joystick-bridge", "--simulate", "--device", "COM1"]).is_err());
    }

    #[test]
    fn config_path_and_subcommand() {
        let cli = parse(&["bridge.ron"]);
        assert_eq!(cli.config, Some(PathBuf::from("bridge.ron")));

        let cli = parse(&["examples", "config"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Examples(Examples::Config))
        ));
    }
}

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The default port to serve websockets on.
pub const DEFAULT_PORT: u16 = 8080;

/// The default baud rate of the device.
pub const DEFAULT_BAUD: u32 = 9600;

/// The default number of outgoing messages a client may have pending
/// before it is considered busy, and broadcasts skip it.
pub const DEFAULT_CLIENT_BUFFER: usize = 32;

#[cfg(unix)]
const DEFAULT_DEVICE_PATH: &str = "/dev/ttyACM0";

#[cfg(not(unix))]
const DEFAULT_DEVICE_PATH: &str = "COM3";

/// A serial port connected to the actuator controller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerialConfig {
    /// The path to the port.
    /// Likely "/dev/ttyACMx" or "COMx".
    pub path: String,

    /// Baud rate.
    pub baud: u32,

    /// Flow control.
    #[serde(default = "default_flow_control")]
    pub flow_control: serialport::FlowControl,

    /// If the port closes or fails, try opening it again this often.
    /// If not set, the device stays closed.
    #[serde(default)]
    pub reopen_interval_ms: Option<u64>,
}

fn default_flow_control() -> serialport::FlowControl {
    serialport::FlowControl::None
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DEVICE_PATH.into(),
            baud: DEFAULT_BAUD,
            flow_control: default_flow_control(),
            reopen_interval_ms: None,
        }
    }
}

impl SerialConfig {
    /// See [`SerialConfig::reopen_interval_ms`].
    pub fn reopen_interval(&self) -> Option<Duration> {
        self.reopen_interval_ms.map(Duration::from_millis)
    }
}

/// An in-process actuator which speaks the device protocol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimulatorConfig {
    /// How often a jogging actuator reports its position, in milliseconds.
    pub tick_ms: u64,

    /// The speed used when a jog command has no speed.
    pub max_speed: i64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            max_speed: 255,
        }
    }
}

impl SimulatorConfig {
    /// See [`SimulatorConfig::tick_ms`].
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// Which device the bridge talks to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DeviceConfig {
    /// A real serial port.
    Serial(SerialConfig),

    /// A simulated actuator, no hardware needed.
    Simulated(SimulatorConfig),
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::Serial(SerialConfig::default())
    }
}

/// The configuration used for running the bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// The port to accept websocket clients on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// The device.
    #[serde(default)]
    pub device: DeviceConfig,

    /// See [`DEFAULT_CLIENT_BUFFER`].
    #[serde(default = "default_client_buffer")]
    pub client_buffer: usize,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_client_buffer() -> usize {
    DEFAULT_CLIENT_BUFFER
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            device: DeviceConfig::default(),
            client_buffer: DEFAULT_CLIENT_BUFFER,
        }
    }
}

impl Config {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents.
    pub fn deserialize(input: &str) -> Result<Self, Error> {
        Self::ron()
            .from_str::<Config>(input)
            .map_err(|e| Error::BadConfig(format!("Not valid RON: {e}")))
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            port: DEFAULT_PORT,
            device: DeviceConfig::Serial(SerialConfig {
                path: DEFAULT_DEVICE_PATH.into(),
                baud: DEFAULT_BAUD,
                flow_control: serialport::FlowControl::None,
                reopen_interval_ms: Some(3000),
            }),
            client_buffer: DEFAULT_CLIENT_BUFFER,
        }
    }

    /// A configuration using the simulated device.
    pub fn simulated() -> Self {
        Self {
            device: DeviceConfig::Simulated(SimulatorConfig::default()),
            ..Default::default()
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> String {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .unwrap_or_else(|e| format!("Could not serialize config: {e}"))
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let p = p.as_ref();
        let s = std::fs::read_to_string(p)
            .map_err(|e| Error::BadConfig(format!("Could not read {p:?}: {e}")))?;

        Self::deserialize(&s)
    }

    /// Check the configuration makes sense.
    pub fn validate(&self) -> Result<(), Error> {
        if self.client_buffer == 0 {
            return Err(Error::BadConfig(
                "The client buffer must hold at least one message".into(),
            ));
        }

        match &self.device {
            DeviceConfig::Serial(serial) => {
                if serial.path.trim().is_empty() {
                    return Err(Error::BadConfig("The device path is empty".into()));
                }
                if serial.baud == 0 {
                    return Err(Error::BadConfig(format!(
                        "The baud rate of `{}` must be non-zero",
                        serial.path
                    )));
                }
                if serial.reopen_interval_ms == Some(0) {
                    return Err(Error::BadConfig(
                        "A reopen interval of zero would spin, leave it out to never reopen"
                            .into(),
                    ));
                }
            }
            DeviceConfig::Simulated(simulator) => {
                if simulator.tick_ms == 0 {
                    return Err(Error::BadConfig(
                        "The simulator tick must be non-zero".into(),
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize() {
        let c = Config::example();

        println!("{}", c.serialize_pretty());
    }

    #[test]
    fn example_survives_serialization() {
        let c = Config::example();

        let back = Config::deserialize(&c.serialize_pretty()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn deserialize() {
        let input = r#"
(
    port: 9000,
    device: Serial((
        path: "/dev/ttyUSB0",
        baud: 115200,
        flow_control: Hardware,
        reopen_interval_ms: 500,
    )),
    client_buffer: 4,
)
"#;
        let config = Config::deserialize(input).unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.client_buffer, 4);

        match config.device {
            DeviceConfig::Serial(serial) => {
                assert_eq!(serial.path, "/dev/ttyUSB0");
                assert_eq!(serial.baud, 115200);
                assert_eq!(serial.flow_control, serialport::FlowControl::Hardware);
                assert_eq!(serial.reopen_interval(), Some(Duration::from_millis(500)));
            }
            other => panic!("Expected a serial device, got {other:?}"),
        }
    }

    #[test]
    fn deserialize_fills_defaults() {
        let config = Config::deserialize("(device: Simulated((tick_ms: 10, max_speed: 3)))").unwrap();

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.client_buffer, DEFAULT_CLIENT_BUFFER);
        assert_eq!(
            config.device,
            DeviceConfig::Simulated(SimulatorConfig {
                tick_ms: 10,
                max_speed: 3
            })
        );
    }

    #[test]
    fn garbage_is_bad_config() {
        let err = Config::deserialize("port: [").unwrap_err();

        assert!(err.try_into_bad_config().is_ok());
    }

    #[test]
    fn bad_config_zero_buffer() {
        let c = Config {
            client_buffer: 0,
            ..Default::default()
        };

        let err = c.validate().unwrap_err().try_into_bad_config().unwrap();
        assert!(err.contains("client buffer"));
    }

    #[test]
    fn bad_config_zero_baud() {
        let c = Config {
            device: DeviceConfig::Serial(SerialConfig {
                path: "COM7".into(),
                baud: 0,
                ..Default::default()
            }),
            ..Default::default()
        };

        let err = c.validate().unwrap_err().try_into_bad_config().unwrap();

        // The error message should point at the offending port.
        assert!(err.contains("COM7"));
    }

    #[test]
    fn bad_config_empty_path() {
        let c = Config {
            device: DeviceConfig::Serial(SerialConfig {
                path: "  ".into(),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert!(c.validate().is_err());
    }

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
        Config::example().validate().unwrap();
        Config::simulated().validate().unwrap();
    }
}

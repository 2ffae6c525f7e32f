#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

/// Client commands, and how they become device lines.
pub mod command;

/// Telemetry reported by the device, and how clients see it.
pub mod telemetry;

/// Talking to the device: line framing, the device task, and a simulator.
pub mod device;

/// The set of connected clients, and broadcasting telemetry to them.
pub mod hub;

/// Wires clients, the device, and telemetry together.
pub mod bridge;

/// Code relating to setting up the server which accepts clients.
pub mod server;

/// Handles incoming websockets.
pub(crate) mod websocket;

/// A client for talking to a bridge.
pub mod client;

/// The command line interface.
pub mod cli;

/// Relates to config files.
pub mod config;

/// Possible errors in this library.
pub mod error;

/// Logging/tracing setup.
pub mod logging;

/// Events the bridge emits.
pub mod events;

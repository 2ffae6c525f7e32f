use clap::{Parser, Subcommand};
use color_eyre::Result;
use joystick_bridge::{client::BridgeClient, command::ClientMessage, server::DEFAULT_PORT};
use tracing::{error, info, Level};

/// Sends a command to a joystick bridge, then prints the telemetry it broadcasts.
#[derive(Parser, Debug)]
struct Args {
    /// Server address.
    #[arg(short, long, default_value = "localhost")]
    address: String,

    /// Server port.
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Stop after this many telemetry messages.
    /// Runs until Ctrl-C if not set.
    #[arg(short, long)]
    count: Option<usize>,

    /// What to tell the actuator.
    /// Just watch telemetry if not set.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reset the actuator.
    Reset,

    /// Move to an absolute position.
    Move {
        /// Target position.
        #[arg(allow_negative_numbers = true)]
        position: i64,
    },

    /// Jog clockwise until stopped.
    JogCw {
        /// Speed, full speed if not set.
        speed: Option<i64>,
    },

    /// Jog counterclockwise until stopped.
    JogCcw {
        /// Speed, full speed if not set.
        speed: Option<i64>,
    },

    /// Stop jogging.
    StopJog,
}

impl From<Command> for ClientMessage {
    fn from(command: Command) -> Self {
        match command {
            Command::Reset => ClientMessage::reset(),
            Command::Move { position } => ClientMessage::move_to(position),
            Command::JogCw { speed } => ClientMessage::jog_cw(speed),
            Command::JogCcw { speed } => ClientMessage::jog_ccw(speed),
            Command::StopJog => ClientMessage::stop_jog(),
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut client = BridgeClient::connect(&args.address, args.port).await?;

    if let Some(command) = args.command {
        let message = ClientMessage::from(command);
        info!(message = %message.serialize(), "Sending");
        client.send(&message).await?;
    }

    let mut received = 0;
    while args.count.map_or(true, |count| received < count) {
        let telemetry = client.next_telemetry().await?;
        println!("{}", telemetry.to_json());
        received += 1;
    }

    client.close().await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    joystick_bridge::logging::init(Level::INFO, None).await;

    let args = Args::parse();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        result = run(args) => {
            if let Err(e) = &result {
                error!(%e, "Client stopped");
            }
            return result;
        }
    }

    Ok(())
}

use clap::Parser;
use color_eyre::Result;
use joystick_bridge::{cli, config::Config, logging, server};

use tracing::{debug, error, info};

#[cfg(unix)]
async fn hangup() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    signal(SignalKind::hangup())?.recv().await;

    Ok(())
}

#[cfg(not(unix))]
async fn hangup() -> Result<()> {
    std::future::pending().await
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = cli::Cli::parse();

    if let Some(command) = cli.command.clone() {
        cli::handle_command(command);

        return Ok(());
    }

    logging::init(
        cli.log_level,
        cli.log_dir.clone().map(|dir| (cli.log_level, dir)),
    )
    .await;

    let config = if let Some(config_path) = &cli.config {
        debug!(?config_path, "Config from path");
        Config::new_from_path(config_path)?
    } else {
        debug!("Default config");
        Config::default()
    };

    let config = cli.apply(config);
    config.validate()?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C, quitting")
        }
        result = hangup() => {
            result?;
            info!("Told to hang up, quitting")
        }
        result = server::run_on_port(config) => {
            error!(?result, "Server returned");
            logging::shutdown();
            result?;
            return Err(color_eyre::eyre::eyre!("Server stopped unexpectedly"));
        }
    }

    logging::shutdown();

    Ok(())
}

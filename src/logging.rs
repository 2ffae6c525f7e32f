use std::path::PathBuf;
use std::sync::Mutex;

use tokio::sync::RwLock;
use tracing::{debug, info, warn, Level};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{prelude::*, EnvFilter};

/// The prefix of log files, which are suffixed by date.
pub const LOG_FILE_PREFIX: &str = "bridge.log";

/// Keeps the file writer alive. Dropping it flushes what is left.
static FILE_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

fn do_init(stdout_level: Level, file_logging: Option<(Level, PathBuf)>) {
    // RUST_LOG wins if it is set.
    let stdout_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(stdout_level.as_str()));

    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(stdout_filter);

    let (maybe_file_layer, guard) = match &file_logging {
        Some((level, output_dir)) => {
            let file_appender =
                RollingFileAppender::new(Rotation::DAILY, output_dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(file_appender);

            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(tracing::metadata::LevelFilter::from(*level));

            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(maybe_file_layer)
        .init();

    match FILE_GUARD.lock() {
        Ok(mut slot) => *slot = guard,
        Err(_) => warn!("Log file guard poisoned, file logging may lose its tail"),
    }

    match file_logging {
        Some((_, dir)) => debug!(?dir, "Logging to stdout and file"),
        None => debug!("Logging to stdout"),
    }
}

/// Initialize tracing.
///
/// Only the first call has an effect, so tests may call this.
pub async fn init(stdout_level: Level, file_logging: Option<(Level, PathBuf)>) {
    static INITIALIZED: RwLock<bool> = RwLock::const_new(false);

    let mut initialized = INITIALIZED.write().await;
    if *initialized {
        return;
    }

    do_init(stdout_level, file_logging);
    *initialized = true;

    info!("Logging initialized");
}

/// Flush file logging. Call before exiting.
///
/// Logging to file stops after this.
pub fn shutdown() {
    debug!("Shutting down logging");

    let guard = match FILE_GUARD.lock() {
        Ok(mut slot) => slot.take(),
        Err(_) => None,
    };

    drop(guard);
}

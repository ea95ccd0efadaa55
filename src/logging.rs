use std::path::PathBuf;

use anyhow::Context;
use soundbot::infrastructure::environment::{self, parse_bool};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_FILTER: &str = "warn,soundbot=info";
const LOG_FILE_PREFIX: &str = "soundbot.log";

/// Loads `.env` and installs the global subscriber.
///
/// The returned guard flushes the log file writer when dropped and must be held for the lifetime of the process.
pub fn init_logger() -> anyhow::Result<Option<WorkerGuard>> {
    let env_file = load_env_file();
    let guard = init_tracing()?;
    info!("Starting soundbot...");
    log_env_file_result(env_file);
    Ok(guard)
}

fn get_log_path_var() -> Result<bool, String> {
    match std::env::var(environment::LOG_PATH) {
        Ok(value) => parse_bool(&value).ok_or(value),
        Err(_) => Ok(false),
    }
}

fn init_tracing() -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_env(environment::LOG_LEVEL)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let ansi = !matches!(
        std::env::var(environment::LOG_STYLE).as_deref(),
        Ok("never")
    );
    let log_path = get_log_path_var();
    let with_source = *log_path.as_ref().unwrap_or(&false);

    let stdout_layer = fmt::layer()
        .with_ansi(ansi)
        .with_file(with_source)
        .with_line_number(with_source);

    let (file_layer, guard) = match std::env::var(environment::LOG_DIRECTORY) {
        Ok(directory) => {
            let appender = tracing_appender::rolling::daily(directory, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_file(with_source)
                .with_line_number(with_source)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    if let Err(value) = log_path {
        warn!(
            "Failed to parse {}={:?}, expected a boolean",
            environment::LOG_PATH,
            value
        );
    }
    Ok(guard)
}

fn load_env_file() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

fn log_env_file_result(env_file: Option<PathBuf>) {
    if let Some(path) = env_file {
        info!("Loaded environment variables from {}", path.display());
    } else {
        info!("No .env file found, proceeding with system environment variables.");
    }
}

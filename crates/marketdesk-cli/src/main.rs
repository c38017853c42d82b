//! marketdesk - a terminal administrative console for the marketplace backend.
//!
//! Log in once, then open protected views (businesses, professionals, ads,
//! users, roles, reports, notifications). The session is kept on disk or in
//! the OS keychain and expires on its own schedule.

mod app;
mod console;

use std::io;

use anyhow::Result;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use marketdesk_core::Config;

use app::App;
use console::{Command, HELP};

/// Log file name prefix inside the data directory
const LOG_FILE_PREFIX: &str = "marketdesk.log";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the log file on drop and must be kept alive.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.data_dir() {
        Ok(dir) if config.log_to_file => {
            let appender = tracing_appender::rolling::daily(dir.join("logs"), LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: {:#}; using defaults", e);
            let mut config = Config::default();
            config.apply_env();
            config
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = load_config();
    let _log_guard = init_tracing(&config);
    info!(api = %config.api_base_url, "marketdesk starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    if matches!(args.first().map(String::as_str), Some("-h" | "--help")) {
        println!("Usage: marketdesk [command]\n\nWith no command, starts the interactive console.\n\n{}", HELP);
        return Ok(());
    }

    let mut app = App::new(config).await?;

    let result = if args.is_empty() || args[0] == "console" {
        console::run(&mut app).await
    } else {
        match Command::parse(&args.join(" ")) {
            Ok(Some(command)) => console::execute(&mut app, command, true).await.map(|_| ()),
            Ok(None) => Ok(()),
            Err(message) => Err(anyhow::anyhow!(message)),
        }
    };

    if let Err(ref e) = result {
        warn!(error = %e, "Command failed");
    }

    info!("marketdesk shutting down");
    result
}

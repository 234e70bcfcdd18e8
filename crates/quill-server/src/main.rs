//! Quill binary: loads configuration, initializes logging and dispatches
//! to the requested command (`serve`, `init-db`).

use quill_server::cli::{self, CommandError};
use quill_server::config::{self, LoggingConfig};
use quill_server::App;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr so command output on stdout stays clean.
    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let (config_path, config_source) = cli::resolve_config_path(&args);

    let config = match config::load_config(Some(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.logging);

    tracing::info!(
        source = config_source,
        path = %config_path.display(),
        "resolved startup configuration path"
    );

    let app = App::new(config, config::app_root(Some(&config_path)));

    match app.run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CommandError::Usage(e)) => e.exit(),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

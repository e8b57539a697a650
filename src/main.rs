use tracing::{error, info};
use tracing_subscriber::prelude::*;

use hornbot::config::Config;
use hornbot::scanner::Scanner;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "hornbot.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.storage_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("hornbot.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let level = config.log_level.parse::<tracing::Level>();
    let effective_level = level.as_ref().copied().unwrap_or(tracing::Level::INFO);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(effective_level.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(effective_level.into()),
                ),
        )
        .init();

    if level.is_err() {
        error!(
            "unrecognized log_level '{}'; using INFO",
            config.log_level
        );
    }

    info!("🚀 Starting hornbot...");
    info!("Loaded config from {config_path}");
    info!("Instance: {}", config.mastodon_instance);
    if config.dry_run {
        info!("DRY RUN mode enabled");
    }

    let mut scanner = Scanner::new(&config);
    if let Err(e) = scanner.run().await {
        error!("scanner stopped: {e}");
        std::process::exit(1);
    }
}

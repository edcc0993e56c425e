// Waymark roadmap negotiation
// Main entry point for the waymark binary

use clap::Parser;
use waymark_engine::cli::{Cli, Command};
use waymark_engine::config::Config;
use waymark_engine::handlers::{handle_history, handle_negotiate, handle_show, OutputFormat};
use waymark_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let mut config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    if let Some(level) = cli.log {
        config.core.log_level = level;
        config.validate()?;
    }

    // RUST_LOG still wins over the configured level
    init_telemetry_with_level(&config.core.log_level);

    tracing::debug!("Waymark v{}", env!("CARGO_PKG_VERSION"));

    // Handle commands
    match cli.command {
        Command::Negotiate {
            roadmap,
            conversation,
            utterance,
        } => {
            tracing::info!("Negotiating roadmap {}", roadmap);
            handle_negotiate(roadmap, conversation, utterance, &config, format).await
        }

        Command::History {
            conversation,
            limit,
        } => {
            tracing::info!("Showing last {} entries of {}", limit, conversation);
            handle_history(conversation, limit, &config, format).await
        }

        Command::Show { roadmap_id } => handle_show(roadmap_id, &config, format).await,
    }
}

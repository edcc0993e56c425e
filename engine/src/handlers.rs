//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - negotiate: Run one negotiation turn against a roadmap
//! - history: Show the stored transcript of a conversation
//! - show: Print a roadmap and its steps

use anyhow::{Context, Result};
use sdk::errors::{NegotiationError, WaymarkErrorExt};
use sdk::types::{CorrelationId, NegotiationReply};
use serde_json::json;
use std::sync::Arc;

use crate::config::Config;
use crate::db::Database;
use crate::llm::ollama::OllamaGateway;
use crate::llm::openai::OpenAIGateway;
use crate::llm::ModelGateway;
use crate::negotiation::{HistoryStore, NegotiationEngine, NegotiationSettings, RoadmapStore};
use crate::secrets::SecretManager;

/// Keychain service holding Waymark credentials
const KEYCHAIN_SERVICE: &str = "waymark";

/// Keychain entry for the OpenAI API key
const OPENAI_KEY_NAME: &str = "openai_api_key";

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Run one negotiation turn
///
/// The conversation defaults to the roadmap's own thread (`roadmap:<id>`).
pub async fn handle_negotiate(
    roadmap_id: i64,
    conversation: Option<String>,
    utterance: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let correlation_id = resolve_conversation(roadmap_id, conversation)?;
    let gateway = build_gateway(config)?;

    // Fail on a missing key before touching the database
    gateway
        .check_credentials()
        .map_err(NegotiationError::from)
        .map_err(|e| report_failure(e, format))?;

    let database = open_database(config).await?;
    let engine = NegotiationEngine::new(
        Arc::new(database.history(config.negotiation.history_cap)),
        Arc::new(database.roadmaps()),
        gateway,
        NegotiationSettings {
            history_window: config.negotiation.history_window,
            request_timeout: config.llm.request_timeout(),
        },
    );

    let outcome = engine
        .negotiate_roadmap_edit(&utterance, roadmap_id, &correlation_id)
        .await;

    // Checkpoint and close even when the turn failed
    database.close().await?;

    let reply = outcome.map_err(|e| report_failure(e, format))?;
    print_reply(&reply, &correlation_id, format)
}

/// Show the last `limit` entries of a conversation
pub async fn handle_history(
    conversation: String,
    limit: usize,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let correlation_id = CorrelationId::new(conversation)?;
    let database = open_database(config).await?;

    let history = database.history(config.negotiation.history_cap);
    let entries = history
        .load_recent(&correlation_id, limit)
        .await
        .context("Failed to fetch conversation history")?;

    match format {
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No history for {}", correlation_id);
                return Ok(());
            }

            println!(
                "History for {} (last {} of at most {}):",
                correlation_id,
                entries.len(),
                history.cap()
            );
            println!();

            for entry in &entries {
                println!(
                    "#{} {} [{}]",
                    entry.turn_index,
                    entry.author,
                    timestamp(entry.created_at)
                );
                println!("  {}", entry.text);
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "conversation": correlation_id,
                "entries": entries,
                "count": entries.len(),
                "limit": limit
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Print a roadmap with its steps
pub async fn handle_show(roadmap_id: i64, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;

    let roadmap = database
        .roadmaps()
        .get_roadmap_with_steps(roadmap_id)
        .await
        .context("Failed to fetch roadmap")?
        .ok_or(NegotiationError::NotFound(roadmap_id))?;

    match format {
        OutputFormat::Text => {
            println!("Roadmap {}: {}", roadmap.id, roadmap.name);
            if !roadmap.description.is_empty() {
                println!("  {}", roadmap.description);
            }
            println!("  Updated: {}", timestamp(roadmap.updated_at));
            println!();

            if roadmap.steps.is_empty() {
                println!("No steps");
            }
            for (i, step) in roadmap.steps.iter().enumerate() {
                let mark = if step.completed { "x" } else { " " };
                println!("{:>3}. [{}] {}", i + 1, mark, step.name);
                if !step.description.is_empty() {
                    println!("       {}", step.description);
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&roadmap)?);
        }
    }

    Ok(())
}

/// Gateway for the configured provider, with its credential resolved up front
pub fn build_gateway(config: &Config) -> Result<Arc<dyn ModelGateway>> {
    let timeout = config.llm.request_timeout();

    let gateway: Arc<dyn ModelGateway> = match config.llm.default_provider.as_str() {
        "ollama" => Arc::new(OllamaGateway::new(
            config.llm.ollama.base_url.clone(),
            config.llm.ollama.model.clone(),
            timeout,
        )?),
        "openai" => {
            let api_key = SecretManager::new(KEYCHAIN_SERVICE)
                .resolve(&config.llm.openai.api_key_env, OPENAI_KEY_NAME);
            Arc::new(OpenAIGateway::new(
                config.llm.openai.clone(),
                api_key,
                timeout,
            )?)
        }
        other => anyhow::bail!("Unsupported provider '{}'", other),
    };

    tracing::debug!(
        "Using {} gateway with model {}",
        gateway.name(),
        gateway.model()
    );
    Ok(gateway)
}

/// Explicit conversation id, or the roadmap's own thread
fn resolve_conversation(roadmap_id: i64, conversation: Option<String>) -> Result<CorrelationId> {
    match conversation {
        Some(cid) => Ok(CorrelationId::new(cid)?),
        None => Ok(CorrelationId::for_roadmap(roadmap_id)),
    }
}

async fn open_database(config: &Config) -> Result<Database> {
    Database::new(&config.database_path())
        .await
        .context("Failed to open database")
}

fn print_reply(
    reply: &NegotiationReply,
    correlation_id: &CorrelationId,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Text => match (&reply.question, &reply.roadmap) {
            (Some(question), _) => {
                println!("? {}", question);
                println!();
                println!("  Reply with: waymark negotiate --conversation {} ...", correlation_id);
            }
            (None, Some(roadmap)) => {
                println!("✓ Roadmap updated: {}", roadmap.name);
                for (i, step) in roadmap.steps.iter().enumerate() {
                    println!("{:>3}. {}", i + 1, step.name);
                }
            }
            (None, None) => println!("(empty reply)"),
        },
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(reply)?);
        }
    }
    Ok(())
}

/// Print a failed turn and hand the error back for the exit code
fn report_failure(err: NegotiationError, format: OutputFormat) -> anyhow::Error {
    match format {
        OutputFormat::Text => {
            eprintln!("✗ {}", err);
            eprintln!("  {}", err.user_hint());
        }
        OutputFormat::Json => {
            let output = json!({
                "status": "failed",
                "kind": err.kind(),
                "class": format!("{:?}", err.class()),
                "field": err.offending_field(),
                "hint": err.user_hint(),
                "error": err.to_string()
            });
            match serde_json::to_string_pretty(&output) {
                Ok(s) => println!("{}", s),
                Err(e) => eprintln!("Failed to render error: {}", e),
            }
        }
    }
    err.into()
}

fn timestamp(unix: i64) -> String {
    chrono::DateTime::from_timestamp(unix, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

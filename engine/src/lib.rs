//! Waymark Engine Library
//!
//! This library provides the roadmap negotiation engine and its concrete
//! collaborators. It is used by both the `waymark` binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// Database persistence module
pub mod db;

/// Generative service gateway layer
pub mod llm;

/// Roadmap negotiation pipeline
pub mod negotiation;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;

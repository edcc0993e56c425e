//! Telemetry and Observability
//!
//! Sets up `tracing-subscriber` for the `waymark` binary. The configured level
//! applies to the engine's own targets and to dependencies alike; `RUST_LOG`
//! replaces it entirely. Debug builds print human-readable lines, release
//! builds emit JSON with the current span attached.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive used when `RUST_LOG` is unset
fn default_filter(log_level: &str) -> String {
    // sqlx logs every statement at info; keep it one notch quieter
    format!(
        "{level},waymark_engine={level},sqlx=warn",
        level = log_level
    )
}

/// Initialize the tracing subscriber with the given log level from config.
///
/// Priority: `RUST_LOG` env var > `log_level` parameter.
/// Calling it twice is harmless; the second call is ignored.
pub fn init_telemetry_with_level(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}

pub mod string;

pub use string::SecretString;

use keyring::Entry;
use regex::Regex;
use std::sync::OnceLock;

/// SecretManager looks up the generative-service credential.
///
/// Lookup order:
/// 1. the configured environment variable (e.g. `OPENAI_API_KEY`)
/// 2. the OS keychain entry `<service>/<key>`
///    - macOS: Keychain
///    - Windows: Credential Manager
///    - Linux: Secret Service (libsecret)
///
/// The lookup never prompts. A missing credential is reported as `None` and the
/// gateway turns it into a credential error before any request is sent.
pub struct SecretManager {
    service_name: String,
}

/// Regex patterns for detecting credentials echoed back in service diagnostics.
static SECRET_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

/// Initializes and returns the secret detection patterns.
///
/// Patterns match:
/// - OpenAI API keys: sk-[a-zA-Z0-9-_]{20,}
/// - Google API keys: AIza[0-9A-Za-z-_]{35}
/// - Bearer tokens: Bearer\s+[^\s]{20,}
fn get_secret_patterns() -> &'static Vec<Regex> {
    SECRET_PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"sk-[a-zA-Z0-9\-_]{20,}").expect("Invalid OpenAI pattern"),
            Regex::new(r"AIza[0-9A-Za-z\-_]{35}").expect("Invalid Google pattern"),
            Regex::new(r"Bearer\s+[^\s]{20,}").expect("Invalid Bearer pattern"),
        ]
    })
}

impl SecretManager {
    /// Creates a new SecretManager namespaced under `service_name` in the keychain.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    /// Resolve a secret from `env_var`, falling back to the keychain entry `key`.
    ///
    /// Blank values count as missing.
    pub fn resolve(&self, env_var: &str, key: &str) -> Option<SecretString> {
        if let Ok(value) = std::env::var(env_var) {
            if !value.trim().is_empty() {
                tracing::debug!("Using secret '{}' from environment", key);
                return Some(SecretString::new(value.trim()));
            }
        }

        self.from_keychain(key)
    }

    /// Reads a secret from the OS keychain without prompting.
    fn from_keychain(&self, key: &str) -> Option<SecretString> {
        let entry = match Entry::new(&self.service_name, key) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Keychain unavailable for '{}': {}", key, e);
                return None;
            }
        };

        match entry.get_password() {
            Ok(secret) if !secret.trim().is_empty() => {
                tracing::debug!("Retrieved secret '{}' from keychain", key);
                Some(SecretString::new(secret))
            }
            Ok(_) | Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                tracing::warn!("Failed to read secret '{}' from keychain: {}", key, e);
                None
            }
        }
    }
}

/// Replaces anything that looks like a credential with `[REDACTED]`.
///
/// Used on diagnostic text returned by the generative service before it is
/// logged or handed to callers.
pub fn scrub_secrets(text: &str) -> String {
    let mut result = text.to_string();

    for pattern in get_secret_patterns() {
        result = pattern.replace_all(&result, "[REDACTED]").to_string();
    }

    result
}

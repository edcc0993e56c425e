//! Negotiation turn pipeline
//!
//! One call to [`NegotiationEngine::negotiate_roadmap_edit`] runs one turn:
//!
//! 1. Validate input and credentials (no network yet)
//! 2. Lock the correlation id so turns of one conversation never interleave
//! 3. Load the roadmap and the recent transcript
//! 4. Build the prompt and query the model under a timeout
//! 5. Parse the answer; asking ends the turn, finalizing replaces the roadmap
//! 6. Record the user utterance and the raw answer in history as one exchange
//!
//! A turn that fails after the model call leaves history untouched.

use sdk::errors::NegotiationError;
use sdk::types::{CorrelationId, NegotiationReply, NegotiationResult, RoadmapSnapshot};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use super::history::HistoryStore;
use super::parser;
use super::prompt::PromptBuilder;
use super::sync::{RoadmapStore, RoadmapSynchronizer};
use crate::llm::schema::negotiation_schema;
use crate::llm::{GenerationRequest, LLMError, ModelGateway};

type Result<T> = std::result::Result<T, NegotiationError>;

/// Tunables for the turn pipeline
#[derive(Debug, Clone)]
pub struct NegotiationSettings {
    /// Most recent history entries replayed to the model
    pub history_window: usize,

    /// Upper bound for the model call
    pub request_timeout: Duration,
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            history_window: 10,
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Drives negotiation turns against a history store, a roadmap store and a model
pub struct NegotiationEngine {
    history: Arc<dyn HistoryStore>,
    roadmaps: Arc<dyn RoadmapStore>,
    gateway: Arc<dyn ModelGateway>,
    synchronizer: RoadmapSynchronizer,
    prompt: PromptBuilder,
    settings: NegotiationSettings,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl NegotiationEngine {
    pub fn new(
        history: Arc<dyn HistoryStore>,
        roadmaps: Arc<dyn RoadmapStore>,
        gateway: Arc<dyn ModelGateway>,
        settings: NegotiationSettings,
    ) -> Self {
        Self {
            history,
            synchronizer: RoadmapSynchronizer::new(Arc::clone(&roadmaps)),
            roadmaps,
            gateway,
            prompt: PromptBuilder::new(),
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run one negotiation turn for `roadmap_id` within conversation `correlation_id`
    ///
    /// # Errors
    ///
    /// `Input`, `Credential` and `NotFound` are returned before the model is
    /// contacted. `Service`, `Parse` and `SchemaViolation` come from the model
    /// call and leave history unchanged. `Storage` wraps store failures.
    pub async fn negotiate_roadmap_edit(
        &self,
        utterance: &str,
        roadmap_id: i64,
        correlation_id: &CorrelationId,
    ) -> Result<NegotiationReply> {
        if utterance.trim().is_empty() {
            return Err(NegotiationError::Input("utterance is empty".to_string()));
        }
        if roadmap_id <= 0 {
            return Err(NegotiationError::Input(format!(
                "roadmap id must be positive, got {}",
                roadmap_id
            )));
        }
        self.gateway.check_credentials()?;

        let lock = self.lock_for(correlation_id);
        let result = {
            let _guard = lock.lock().await;
            self.run_turn(utterance, roadmap_id, correlation_id).await
        };
        drop(lock);
        self.prune_locks();

        result
    }

    async fn run_turn(
        &self,
        utterance: &str,
        roadmap_id: i64,
        correlation_id: &CorrelationId,
    ) -> Result<NegotiationReply> {
        let current = self
            .roadmaps
            .get_roadmap_with_steps(roadmap_id)
            .await
            .map_err(storage)?
            .ok_or(NegotiationError::NotFound(roadmap_id))?
            .snapshot();

        let history = self
            .history
            .load_recent(correlation_id, self.settings.history_window)
            .await
            .map_err(storage)?;
        debug!(
            "Loaded {} history entries for {} (window {})",
            history.len(),
            correlation_id,
            self.settings.history_window
        );

        let request = GenerationRequest {
            messages: self
                .prompt
                .build(correlation_id, &current, &history, utterance),
            schema: negotiation_schema(),
        };

        let start = std::time::Instant::now();
        let raw = tokio::time::timeout(self.settings.request_timeout, self.gateway.query(&request))
            .await
            .map_err(|_| NegotiationError::from(LLMError::Timeout))??;
        debug!(
            "{} answered in {:.1}s ({} chars)",
            self.gateway.name(),
            start.elapsed().as_secs_f64(),
            raw.len()
        );

        let result = match parser::parse(&raw) {
            Ok(result) => result,
            Err(e) => {
                warn!("Rejected model answer for {}: {}", correlation_id, e);
                return Err(e.into());
            }
        };

        match &result {
            NegotiationResult::Asking { question } => {
                info!("Turn for {} is asking: {}", correlation_id, question);
            }
            NegotiationResult::Finalizing { roadmap } => {
                let removed = removed_steps(&current, roadmap);
                if !removed.is_empty() {
                    warn!(
                        "Finalized roadmap {} drops steps {:?}; confirmation is left to the conversation",
                        roadmap_id, removed
                    );
                }
                self.synchronizer.apply(roadmap, roadmap_id).await?;
                info!("Turn for {} finalized roadmap {}", correlation_id, roadmap_id);
            }
        }

        if let Err(e) = self
            .history
            .append_exchange(correlation_id, utterance, &raw)
            .await
        {
            if !result.is_asking() {
                error!(
                    "Roadmap {} was replaced but the exchange for {} was not recorded: {:#}",
                    roadmap_id, correlation_id, e
                );
            }
            return Err(storage(e));
        }

        Ok(result.into())
    }

    fn lock_for(&self, correlation_id: &CorrelationId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            locks
                .entry(correlation_id.as_str().to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Drop locks nobody is holding or waiting on
    fn prune_locks(&self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

fn storage(err: anyhow::Error) -> NegotiationError {
    NegotiationError::Storage(format!("{:#}", err))
}

/// Names of steps in `before` that no longer appear in `after`
fn removed_steps(before: &RoadmapSnapshot, after: &RoadmapSnapshot) -> Vec<String> {
    let kept: HashSet<&str> = after.steps.iter().map(|s| s.name.as_str()).collect();
    before
        .steps
        .iter()
        .filter(|s| !kept.contains(s.name.as_str()))
        .map(|s| s.name.clone())
        .collect()
}

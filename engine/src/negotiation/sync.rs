//! Roadmap synchronization
//!
//! A finalized roadmap replaces the stored one wholesale: name and
//! description are overwritten, every existing step is deleted and the new
//! steps are inserted in order. Completion marks of the old steps are lost.

use anyhow::Result;
use async_trait::async_trait;
use sdk::errors::NegotiationError;
use sdk::types::{PersistedRoadmap, RoadmapSnapshot};
use std::sync::Arc;
use tracing::info;

/// Roadmap persistence as seen by the engine
#[async_trait]
pub trait RoadmapStore: Send + Sync {
    /// Roadmap with its steps ordered by position, or `None` if the id is unknown
    async fn get_roadmap_with_steps(&self, roadmap_id: i64) -> Result<Option<PersistedRoadmap>>;

    /// Overwrite fields and steps in one transaction
    ///
    /// Returns `false`, writing nothing, when the roadmap does not exist.
    async fn replace_contents(&self, roadmap_id: i64, roadmap: &RoadmapSnapshot) -> Result<bool>;
}

/// Applies finalized roadmaps to the store
#[derive(Clone)]
pub struct RoadmapSynchronizer {
    store: Arc<dyn RoadmapStore>,
}

impl RoadmapSynchronizer {
    pub fn new(store: Arc<dyn RoadmapStore>) -> Self {
        Self { store }
    }

    /// Replace the stored roadmap `roadmap_id` with `roadmap`
    pub async fn apply(
        &self,
        roadmap: &RoadmapSnapshot,
        roadmap_id: i64,
    ) -> std::result::Result<(), NegotiationError> {
        let replaced = self
            .store
            .replace_contents(roadmap_id, roadmap)
            .await
            .map_err(|e| NegotiationError::Storage(format!("{:#}", e)))?;

        if !replaced {
            return Err(NegotiationError::NotFound(roadmap_id));
        }

        info!(
            "Replaced roadmap {} with '{}' ({} steps)",
            roadmap_id,
            roadmap.name,
            roadmap.steps.len()
        );
        Ok(())
    }
}

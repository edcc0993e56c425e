/// Roadmap persistence operations
///
/// This module persists roadmaps and their ordered steps. All queries use
/// parameterized statements. The negotiation engine only ever reads a roadmap
/// and replaces its contents; creation and completion marks belong to other
/// flows and are exposed here for them.
use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::types::{PersistedRoadmap, PersistedStep, RoadmapSnapshot, StepDraft};
use sqlx::{Row, SqliteConnection, SqlitePool};

use super::unix_now;
use crate::negotiation::sync::RoadmapStore;

/// Roadmap repository for database operations
pub struct RoadmapRepository {
    pool: SqlitePool,
}

impl RoadmapRepository {
    /// Create a new roadmap repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a roadmap with its initial steps
    pub async fn create_roadmap(
        &self,
        name: &str,
        description: &str,
        steps: &[StepDraft],
    ) -> Result<PersistedRoadmap> {
        let now = unix_now()?;
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin roadmap transaction")?;

        let result = sqlx::query(
            "INSERT INTO roadmaps (name, description, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(description)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create roadmap")?;

        let roadmap_id = result.last_insert_rowid();
        insert_step_rows(&mut tx, roadmap_id, steps, now).await?;

        tx.commit()
            .await
            .context("Failed to commit roadmap creation")?;

        self.get_roadmap_with_steps(roadmap_id)
            .await?
            .context("Roadmap vanished right after creation")
    }

    /// Overwrite a roadmap's name and description
    ///
    /// Returns `false` if no roadmap has this id.
    pub async fn update_roadmap_fields(
        &self,
        roadmap_id: i64,
        name: &str,
        description: &str,
    ) -> Result<bool> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        update_fields(&mut conn, roadmap_id, name, description, unix_now()?).await
    }

    /// Delete every step owned by a roadmap
    pub async fn delete_all_steps(&self, roadmap_id: i64) -> Result<u64> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        delete_steps(&mut conn, roadmap_id).await
    }

    /// Append steps to a roadmap, keeping slice order as position order
    pub async fn insert_steps(&self, roadmap_id: i64, steps: &[StepDraft]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin step transaction")?;
        insert_step_rows(&mut tx, roadmap_id, steps, unix_now()?).await?;
        tx.commit().await.context("Failed to commit step insert")?;
        Ok(())
    }

    /// Mark a step as done (or undo it)
    pub async fn set_step_completed(&self, step_id: i64, completed: bool) -> Result<bool> {
        let completed_at = if completed { Some(unix_now()?) } else { None };

        let result =
            sqlx::query("UPDATE roadmap_steps SET completed = ?, completed_at = ? WHERE id = ?")
                .bind(completed)
                .bind(completed_at)
                .bind(step_id)
                .execute(&self.pool)
                .await
                .context("Failed to update step completion")?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RoadmapStore for RoadmapRepository {
    async fn get_roadmap_with_steps(&self, roadmap_id: i64) -> Result<Option<PersistedRoadmap>> {
        let row = sqlx::query(
            "SELECT id, name, description, created_at, updated_at FROM roadmaps WHERE id = ?",
        )
        .bind(roadmap_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch roadmap")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let steps = sqlx::query(
            r#"
            SELECT id, roadmap_id, position, name, description, completed, completed_at, created_at
            FROM roadmap_steps
            WHERE roadmap_id = ?
            ORDER BY position ASC, id ASC
            "#,
        )
        .bind(roadmap_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch roadmap steps")?
        .into_iter()
        .map(|r| PersistedStep {
            id: r.get("id"),
            roadmap_id: r.get("roadmap_id"),
            position: r.get("position"),
            name: r.get("name"),
            description: r.get("description"),
            completed: r.get("completed"),
            completed_at: r.get("completed_at"),
            created_at: r.get("created_at"),
        })
        .collect();

        Ok(Some(PersistedRoadmap {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            steps,
        }))
    }

    async fn replace_contents(&self, roadmap_id: i64, roadmap: &RoadmapSnapshot) -> Result<bool> {
        let now = unix_now()?;
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin replace transaction")?;

        if !update_fields(&mut tx, roadmap_id, &roadmap.name, &roadmap.description, now).await? {
            tx.rollback()
                .await
                .context("Failed to roll back replace")?;
            return Ok(false);
        }

        delete_steps(&mut tx, roadmap_id).await?;
        insert_step_rows(&mut tx, roadmap_id, &roadmap.steps, now).await?;

        tx.commit().await.context("Failed to commit replace")?;
        Ok(true)
    }
}

async fn update_fields(
    conn: &mut SqliteConnection,
    roadmap_id: i64,
    name: &str,
    description: &str,
    now: i64,
) -> Result<bool> {
    let result =
        sqlx::query("UPDATE roadmaps SET name = ?, description = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(description)
            .bind(now)
            .bind(roadmap_id)
            .execute(&mut *conn)
            .await
            .context("Failed to update roadmap fields")?;

    Ok(result.rows_affected() > 0)
}

async fn delete_steps(conn: &mut SqliteConnection, roadmap_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM roadmap_steps WHERE roadmap_id = ?")
        .bind(roadmap_id)
        .execute(&mut *conn)
        .await
        .context("Failed to delete roadmap steps")?;

    Ok(result.rows_affected())
}

async fn insert_step_rows(
    conn: &mut SqliteConnection,
    roadmap_id: i64,
    steps: &[StepDraft],
    now: i64,
) -> Result<()> {
    let start: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM roadmap_steps WHERE roadmap_id = ?",
    )
    .bind(roadmap_id)
    .fetch_one(&mut *conn)
    .await
    .context("Failed to read step positions")?;

    for (offset, step) in steps.iter().enumerate() {
        sqlx::query(
            "INSERT INTO roadmap_steps (roadmap_id, position, name, description, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(roadmap_id)
        .bind(start + offset as i64)
        .bind(&step.name)
        .bind(&step.description)
        .bind(now)
        .execute(&mut *conn)
        .await
        .context("Failed to insert roadmap step")?;
    }

    Ok(())
}

//! Durable per-workspace key/value persistence of workflow state
//!
//! Each workspace owns one row per artifact key. A stage commit that moves
//! the workflow forward writes its artifact and `currentStage` through a
//! single `save_all` call so either both land or neither does. A re-run that
//! leaves `currentStage` alone writes its artifact with `save`.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use sqlx::{PgPool, Row};

use crate::domain::{ArtifactKey, WorkflowState};
use crate::error::{WorkflowError, WorkflowResult};

#[async_trait]
pub trait WorkflowStateStore: Send + Sync {
    /// Overwrite a single key.
    async fn save(&self, workspace_id: &str, key: ArtifactKey, value: Value) -> WorkflowResult<()>;

    /// Write several keys atomically.
    async fn save_all(
        &self,
        workspace_id: &str,
        entries: Vec<(ArtifactKey, Value)>,
    ) -> WorkflowResult<()>;

    /// `None` when the key was never written.
    async fn recall(&self, workspace_id: &str, key: ArtifactKey) -> WorkflowResult<Option<Value>>;

    async fn recall_all(&self, workspace_id: &str) -> WorkflowResult<HashMap<ArtifactKey, Value>>;

    async fn health_check(&self) -> WorkflowResult<()>;
}

/// Assemble the typed workflow state from the persisted rows.
///
/// A workspace with no rows yields a fresh `not_started` state.
pub async fn load_state(
    store: &dyn WorkflowStateStore,
    workspace_id: &str,
) -> WorkflowResult<WorkflowState> {
    let mut rows = store.recall_all(workspace_id).await?;
    let mut state = WorkflowState::new(workspace_id);

    if let Some(value) = rows.remove(&ArtifactKey::CurrentStage) {
        state.current_stage = serde_json::from_value(value).map_err(|e| {
            WorkflowError::Persistence(format!("corrupt currentStage for {}: {}", workspace_id, e))
        })?;
    }

    let artifacts: serde_json::Map<String, Value> = rows
        .into_iter()
        .map(|(key, value)| (key.as_str().to_string(), value))
        .collect();
    state.artifacts = serde_json::from_value(Value::Object(artifacts)).map_err(|e| {
        WorkflowError::Persistence(format!("corrupt artifact for {}: {}", workspace_id, e))
    })?;

    Ok(state)
}

// ============================================================================
// Postgres
// ============================================================================

/// Store backed by the `workflow_artifacts` table
#[derive(Clone)]
pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const UPSERT_ARTIFACT: &str = r#"
    INSERT INTO workflow_artifacts (workspace_id, artifact_key, value, updated_at)
    VALUES ($1, $2, $3, NOW())
    ON CONFLICT (workspace_id, artifact_key)
    DO UPDATE SET
        value = EXCLUDED.value,
        updated_at = EXCLUDED.updated_at
"#;

#[async_trait]
impl WorkflowStateStore for PgStateStore {
    async fn save(&self, workspace_id: &str, key: ArtifactKey, value: Value) -> WorkflowResult<()> {
        sqlx::query(UPSERT_ARTIFACT)
            .bind(workspace_id)
            .bind(key.as_str())
            .bind(&value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_all(
        &self,
        workspace_id: &str,
        entries: Vec<(ArtifactKey, Value)>,
    ) -> WorkflowResult<()> {
        let mut tx = self.pool.begin().await?;

        for (key, value) in &entries {
            sqlx::query(UPSERT_ARTIFACT)
                .bind(workspace_id)
                .bind(key.as_str())
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            workspace_id = workspace_id,
            keys = entries.len(),
            "Workflow artifacts committed"
        );
        Ok(())
    }

    async fn recall(&self, workspace_id: &str, key: ArtifactKey) -> WorkflowResult<Option<Value>> {
        let row = sqlx::query(
            r#"
            SELECT value FROM workflow_artifacts
            WHERE workspace_id = $1 AND artifact_key = $2
            "#,
        )
        .bind(workspace_id)
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get::<Value, _>("value")))
    }

    async fn recall_all(&self, workspace_id: &str) -> WorkflowResult<HashMap<ArtifactKey, Value>> {
        let rows = sqlx::query(
            r#"
            SELECT artifact_key, value FROM workflow_artifacts
            WHERE workspace_id = $1
            "#,
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        let mut artifacts = HashMap::with_capacity(rows.len());
        for row in rows {
            let key: String = row.get("artifact_key");
            match ArtifactKey::parse(&key) {
                Some(parsed) => {
                    artifacts.insert(parsed, row.get::<Value, _>("value"));
                }
                None => {
                    tracing::warn!(workspace_id = workspace_id, key = %key, "Ignoring unknown artifact key");
                }
            }
        }

        Ok(artifacts)
    }

    async fn health_check(&self) -> WorkflowResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Process-local store for tests and single-node runs
#[derive(Default)]
pub struct MemoryStateStore {
    workspaces: RwLock<HashMap<String, HashMap<ArtifactKey, Value>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStateStore for MemoryStateStore {
    async fn save(&self, workspace_id: &str, key: ArtifactKey, value: Value) -> WorkflowResult<()> {
        self.workspaces
            .write()
            .entry(workspace_id.to_string())
            .or_default()
            .insert(key, value);
        Ok(())
    }

    async fn save_all(
        &self,
        workspace_id: &str,
        entries: Vec<(ArtifactKey, Value)>,
    ) -> WorkflowResult<()> {
        let mut workspaces = self.workspaces.write();
        let rows = workspaces.entry(workspace_id.to_string()).or_default();
        rows.extend(entries);
        Ok(())
    }

    async fn recall(&self, workspace_id: &str, key: ArtifactKey) -> WorkflowResult<Option<Value>> {
        Ok(self
            .workspaces
            .read()
            .get(workspace_id)
            .and_then(|rows| rows.get(&key).cloned()))
    }

    async fn recall_all(&self, workspace_id: &str) -> WorkflowResult<HashMap<ArtifactKey, Value>> {
        Ok(self
            .workspaces
            .read()
            .get(workspace_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn health_check(&self) -> WorkflowResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Stage;
    use serde_json::json;

    #[tokio::test]
    async fn test_recall_absent_key() {
        let store = MemoryStateStore::new();
        assert!(store.recall("ws-1", ArtifactKey::ItemSet).await.unwrap().is_none());
        assert!(store.recall_all("ws-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_overwrites_and_isolates_workspaces() {
        let store = MemoryStateStore::new();
        store.save("ws-1", ArtifactKey::Contract, json!({"v": 1})).await.unwrap();
        store.save("ws-1", ArtifactKey::Contract, json!({"v": 2})).await.unwrap();
        store.save("ws-2", ArtifactKey::Contract, json!({"v": 3})).await.unwrap();

        assert_eq!(
            store.recall("ws-1", ArtifactKey::Contract).await.unwrap(),
            Some(json!({"v": 2}))
        );
        assert_eq!(store.recall_all("ws-2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_load_state_of_fresh_workspace() {
        let store = MemoryStateStore::new();
        let state = load_state(&store, "fresh").await.unwrap();
        assert_eq!(state.current_stage, Stage::NotStarted);
        assert!(state.completed_stages().is_empty());
    }

    #[tokio::test]
    async fn test_load_state_reads_current_stage() {
        let store = MemoryStateStore::new();
        store
            .save_all(
                "ws-1",
                vec![(ArtifactKey::CurrentStage, json!("supplier_matching"))],
            )
            .await
            .unwrap();

        let state = load_state(&store, "ws-1").await.unwrap();
        assert_eq!(state.current_stage, Stage::SupplierMatching);
    }

    #[tokio::test]
    async fn test_corrupt_artifact_is_a_persistence_error() {
        let store = MemoryStateStore::new();
        store
            .save("ws-1", ArtifactKey::ItemSet, json!({"items": "not a list"}))
            .await
            .unwrap();

        let err = load_state(&store, "ws-1").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Persistence(_)));
    }
}

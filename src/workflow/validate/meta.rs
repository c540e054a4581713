// SPDX-License-Identifier: MIT

//! Collaborators consulted by validation: global variable metadata and the
//! workflow repository

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::FlowError;
use crate::workflow::canvas::{Canvas, CanvasLoader};
use crate::workflow::types::TypeInfo;

/// Declared global variables of an app or agent, by name
pub type VariablesMeta = BTreeMap<String, TypeInfo>;

#[async_trait]
pub trait VariablesMetaGetter: Send + Sync {
    async fn get_app_variables_meta(&self, app_id: &str, version: &str) -> Result<VariablesMeta, FlowError>;

    async fn get_agent_variables_meta(&self, agent_id: &str, version: &str) -> Result<VariablesMeta, FlowError>;
}

/// A stored workflow: its ID, version and serialized canvas
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRecord {
    pub id: i64,
    pub version: String,
    pub canvas: String,
}

impl WorkflowRecord {
    pub fn parse_canvas(&self) -> Result<Canvas, FlowError> {
        CanvasLoader::parse_json(&self.canvas)
    }
}

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Draft of every known ID; unknown IDs are left out
    async fn mget_drafts(&self, ids: &[i64]) -> Result<Vec<WorkflowRecord>, FlowError>;

    async fn get_version(&self, id: i64, version: &str) -> Result<WorkflowRecord, FlowError>;
}

/// Fixed variable metadata, keyed by app or agent ID
#[derive(Debug, Clone, Default)]
pub struct StaticVariablesMeta {
    apps: HashMap<String, VariablesMeta>,
    agents: HashMap<String, VariablesMeta>,
}

impl StaticVariablesMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_app(mut self, app_id: impl Into<String>, meta: VariablesMeta) -> Self {
        self.apps.insert(app_id.into(), meta);
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>, meta: VariablesMeta) -> Self {
        self.agents.insert(agent_id.into(), meta);
        self
    }
}

#[async_trait]
impl VariablesMetaGetter for StaticVariablesMeta {
    async fn get_app_variables_meta(&self, app_id: &str, _version: &str) -> Result<VariablesMeta, FlowError> {
        Ok(self.apps.get(app_id).cloned().unwrap_or_default())
    }

    async fn get_agent_variables_meta(&self, agent_id: &str, _version: &str) -> Result<VariablesMeta, FlowError> {
        Ok(self.agents.get(agent_id).cloned().unwrap_or_default())
    }
}

/// Answers every lookup with one metadata table
#[derive(Debug, Clone, Default)]
pub struct UniformVariablesMeta(VariablesMeta);

impl UniformVariablesMeta {
    pub fn new(meta: VariablesMeta) -> Self {
        Self(meta)
    }
}

#[async_trait]
impl VariablesMetaGetter for UniformVariablesMeta {
    async fn get_app_variables_meta(&self, _app_id: &str, _version: &str) -> Result<VariablesMeta, FlowError> {
        Ok(self.0.clone())
    }

    async fn get_agent_variables_meta(&self, _agent_id: &str, _version: &str) -> Result<VariablesMeta, FlowError> {
        Ok(self.0.clone())
    }
}

/// Workflow store kept in memory; versions are keyed by `(id, version)`
#[derive(Clone, Default)]
pub struct InMemoryWorkflowRepository {
    drafts: Arc<RwLock<HashMap<i64, WorkflowRecord>>>,
    versions: Arc<RwLock<HashMap<(i64, String), WorkflowRecord>>>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn save_draft(&self, id: i64, canvas: &Canvas) -> Result<(), FlowError> {
        let record = WorkflowRecord {
            id,
            version: String::new(),
            canvas: serde_json::to_string(canvas)?,
        };
        let mut drafts = self.drafts.write().await;
        drafts.insert(id, record);
        Ok(())
    }

    pub async fn publish(&self, id: i64, version: impl Into<String>, canvas: &Canvas) -> Result<(), FlowError> {
        let version = version.into();
        let record = WorkflowRecord {
            id,
            version: version.clone(),
            canvas: serde_json::to_string(canvas)?,
        };
        let mut versions = self.versions.write().await;
        versions.insert((id, version), record);
        Ok(())
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn mget_drafts(&self, ids: &[i64]) -> Result<Vec<WorkflowRecord>, FlowError> {
        let drafts = self.drafts.read().await;
        Ok(ids.iter().filter_map(|id| drafts.get(id).cloned()).collect())
    }

    async fn get_version(&self, id: i64, version: &str) -> Result<WorkflowRecord, FlowError> {
        let versions = self.versions.read().await;
        versions
            .get(&(id, version.to_string()))
            .cloned()
            .ok_or_else(|| FlowError::repository(format!("workflow {} version {} not found", id, version)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_variables_meta() {
        let meta = StaticVariablesMeta::new()
            .with_app("7", BTreeMap::from([("name".to_string(), TypeInfo::string())]));

        let app = meta.get_app_variables_meta("7", "").await.unwrap();
        assert_eq!(app["name"], TypeInfo::string());
        assert!(meta.get_app_variables_meta("8", "").await.unwrap().is_empty());
        assert!(meta.get_agent_variables_meta("7", "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repository_drafts_and_versions() {
        let repo = InMemoryWorkflowRepository::new();
        let canvas = Canvas::default();
        repo.save_draft(1, &canvas).await.unwrap();
        repo.publish(2, "v0.0.1", &canvas).await.unwrap();

        let drafts = repo.mget_drafts(&[1, 2]).await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].parse_canvas().unwrap(), canvas);

        assert_eq!(repo.get_version(2, "v0.0.1").await.unwrap().id, 2);
        let err = repo.get_version(2, "v9").await.unwrap_err();
        assert!(matches!(err, FlowError::Repository(_)));
    }

    #[tokio::test]
    async fn test_repository_is_clone() {
        let repo = InMemoryWorkflowRepository::new();
        let cloned = repo.clone();
        cloned.save_draft(3, &Canvas::default()).await.unwrap();
        assert_eq!(repo.mget_drafts(&[3]).await.unwrap().len(), 1);
    }
}

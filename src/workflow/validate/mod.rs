// SPDX-License-Identifier: MIT

//! Canvas validation
//!
//! Findings are returned as `Issue` lists; an empty list means the canvas is
//! valid. Only structurally impossible canvases (no start or end node, edges
//! into unknown nodes, undecodable references) and collaborator failures are
//! errors.

pub mod connections;
pub mod cycles;
pub mod meta;
pub mod reachability;
pub mod references;

pub use meta::{
    InMemoryWorkflowRepository, StaticVariablesMeta, UniformVariablesMeta, VariablesMeta,
    VariablesMetaGetter, WorkflowRecord, WorkflowRepository,
};
pub use reachability::Reachability;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::FlowError;
use crate::workflow::canvas::model::TerminatePlan;
use crate::workflow::canvas::{block_input_to_type_info, prune_isolated_nodes, BlockType, Canvas, Node};
use crate::workflow::types::{DataType, TypeInfo};

const SUB_WORKFLOW_MODIFIED: &str = "sub workflow has been modified, please refresh the page";

/// A validator finding tied to a node or to an edge between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_err: Option<NodeErr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_err: Option<PathErr>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeErr {
    #[serde(rename = "nodeID")]
    pub node_id: String,
    #[serde(rename = "nodeName")]
    pub node_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathErr {
    #[serde(rename = "start")]
    pub start_node: String,
    #[serde(rename = "end")]
    pub end_node: String,
}

impl Issue {
    pub fn node(node_id: impl Into<String>, node_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            node_err: Some(NodeErr {
                node_id: node_id.into(),
                node_name: node_name.into(),
            }),
            path_err: None,
            message: message.into(),
        }
    }

    pub fn path(start: impl Into<String>, end: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            node_err: None,
            path_err: Some(PathErr {
                start_node: start.into(),
                end_node: end.into(),
            }),
            message: message.into(),
        }
    }
}

/// Validation settings, loadable from YAML or JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateConfig {
    /// App whose global variables assignments are checked against
    pub app_id: Option<i64>,
    /// Agent whose global variables are used when no app is set
    pub agent_id: Option<String>,
    /// Drop nodes nothing points at before validating
    pub prune: bool,
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            agent_id: None,
            prune: true,
        }
    }
}

impl ValidateConfig {
    /// Load from a file; `.json` is parsed as JSON, anything else as YAML
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FlowError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| FlowError::config(format!("cannot read {}: {}", path.display(), e)))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Ok(serde_yaml::from_str(&content)?),
        }
    }
}

/// External lookups the validator may need
#[derive(Clone, Default)]
pub struct Collaborators {
    pub variables: Option<Arc<dyn VariablesMetaGetter>>,
    pub repository: Option<Arc<dyn WorkflowRepository>>,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variables(mut self, variables: Arc<dyn VariablesMetaGetter>) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn with_repository(mut self, repository: Arc<dyn WorkflowRepository>) -> Self {
        self.repository = Some(repository);
        self
    }
}

/// Static analysis over one canvas
///
/// Reachability is computed once at construction; every check reads it.
pub struct CanvasValidator {
    canvas: Canvas,
    config: ValidateConfig,
    collaborators: Collaborators,
    reachability: Reachability,
}

impl CanvasValidator {
    pub fn new(canvas: Canvas, config: ValidateConfig, collaborators: Collaborators) -> Result<Self, FlowError> {
        let reachability = Reachability::analyze(&canvas)?;
        log::debug!(
            "canvas has {} reachable nodes and {} composites",
            reachability.reachable_nodes.len(),
            reachability.nested.len()
        );

        Ok(Self {
            canvas,
            config,
            collaborators,
            reachability,
        })
    }

    pub fn reachability(&self) -> &Reachability {
        &self.reachability
    }

    pub fn validate_connections(&self) -> Vec<Issue> {
        connections::validate_connections(&self.canvas)
    }

    pub fn detect_cycles(&self) -> Vec<Issue> {
        cycles::detect_cycle_issues(&self.canvas)
    }

    pub fn validate_nested_flows(&self) -> Vec<Issue> {
        references::validate_nested_flows(&self.reachability)
    }

    pub fn check_ref_variables(&self) -> Result<Vec<Issue>, FlowError> {
        Ok(references::check_ref_variables(&self.reachability)?)
    }

    /// Compare what assign-variable nodes write against the declared global
    /// variables of the configured app or agent
    ///
    /// Variables without a declaration are not checked.
    pub async fn check_global_variables(&self) -> Result<Vec<Issue>, FlowError> {
        if self.config.app_id.is_none() && self.config.agent_id.is_none() {
            return Ok(Vec::new());
        }

        let mut assignments: Vec<(&Node, BTreeMap<String, TypeInfo>)> = Vec::new();
        for node in &self.canvas.nodes {
            if node.node_type != BlockType::AssignVariable {
                continue;
            }
            let mut vars = BTreeMap::new();
            for param in node.inputs().map(|i| i.input_parameters.as_slice()).unwrap_or_default() {
                vars.insert(param.name.clone(), block_input_to_type_info(param.left.as_ref())?);
            }
            assignments.push((node, vars));
        }
        if assignments.is_empty() {
            return Ok(Vec::new());
        }

        let getter = self.collaborators.variables.as_ref().ok_or_else(|| {
            FlowError::config("a variables meta getter is required to check global variables")
        })?;
        let declared = match (&self.config.app_id, &self.config.agent_id) {
            (Some(app_id), _) => getter.get_app_variables_meta(&app_id.to_string(), "").await?,
            (None, Some(agent_id)) => getter.get_agent_variables_meta(agent_id, "").await?,
            (None, None) => VariablesMeta::new(),
        };

        let mut issues = Vec::new();
        for (node, vars) in assignments {
            let name = node.title();
            for (var, info) in &vars {
                let Some(declared) = declared.get(var) else {
                    continue;
                };
                if declared.data_type != info.data_type {
                    issues.push(Issue::node(
                        &node.id,
                        name,
                        format!("node name {},param [{}], type mismatch", name, var),
                    ));
                }
                if declared.data_type == DataType::Array && info.data_type == DataType::Array {
                    let declared_elem = declared.elem().map(|e| &e.data_type);
                    let elem = info.elem().map(|e| &e.data_type);
                    if declared_elem != elem {
                        issues.push(Issue::node(
                            &node.id,
                            name,
                            format!("node name {}, param [{}], array element type mismatch", name, var),
                        ));
                    }
                }
            }
        }
        Ok(issues)
    }

    /// Make sure every embedded sub-workflow still ends the way its calling
    /// node expects
    ///
    /// Pinned versions are fetched one by one, drafts in a single batch.
    pub async fn check_sub_workflow_terminate_plan(&self) -> Result<Vec<Issue>, FlowError> {
        let mut calls: Vec<(&Node, i64)> = Vec::new();
        collect_sub_workflow_calls(&self.canvas.nodes, &mut calls)?;
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let repository = self.collaborators.repository.as_ref().ok_or_else(|| {
            FlowError::config("a workflow repository is required to check sub workflows")
        })?;

        let mut draft_ids = Vec::new();
        let mut pinned: BTreeMap<i64, String> = BTreeMap::new();
        for (node, id) in &calls {
            match node.inputs().and_then(|i| i.workflow_version.as_deref()) {
                Some(version) if !version.is_empty() => {
                    pinned.insert(*id, version.to_string());
                }
                _ => draft_ids.push(*id),
            }
        }

        let mut canvases: HashMap<i64, Canvas> = HashMap::new();
        if !draft_ids.is_empty() {
            for record in repository.mget_drafts(&draft_ids).await? {
                canvases.insert(record.id, record.parse_canvas()?);
            }
        }
        for (id, version) in &pinned {
            let record = repository.get_version(*id, version).await?;
            canvases.insert(*id, record.parse_canvas()?);
        }

        let mut issues = Vec::new();
        for (node, id) in calls {
            let Some(sub_canvas) = canvases.get(&id) else {
                issues.push(Issue::node(&node.id, node.title(), SUB_WORKFLOW_MODIFIED));
                continue;
            };

            let (_, end) = sub_canvas.start_and_end()?;
            let plan = end
                .inputs()
                .and_then(|i| i.terminate_plan)
                .unwrap_or(TerminatePlan::ReturnVariables);
            let expected = node
                .inputs()
                .and_then(|i| TerminatePlan::from_termination_type(i.termination_type));
            if Some(plan) != expected {
                issues.push(Issue::node(&node.id, node.title(), SUB_WORKFLOW_MODIFIED));
            }
        }
        Ok(issues)
    }
}

fn collect_sub_workflow_calls<'a>(nodes: &'a [Node], out: &mut Vec<(&'a Node, i64)>) -> Result<(), FlowError> {
    for node in nodes {
        if node.node_type == BlockType::SubWorkflow {
            let raw = node.inputs().and_then(|i| i.workflow_id.as_deref()).unwrap_or_default();
            let id = raw
                .parse::<i64>()
                .map_err(|e| FlowError::config(format!("invalid sub workflow id {:?} on node {}: {}", raw, node.id, e)))?;
            out.push((node, id));
        }
        collect_sub_workflow_calls(&node.blocks, out)?;
    }
    Ok(())
}

/// Run every validation stage in order and return the first non-empty
/// issue list
///
/// Later stages assume the earlier ones found nothing.
pub async fn validate_tree(
    mut canvas: Canvas,
    config: ValidateConfig,
    collaborators: Collaborators,
) -> Result<Vec<Issue>, FlowError> {
    if config.prune {
        prune_isolated_nodes(&mut canvas)?;
    }
    let validator = CanvasValidator::new(canvas, config, collaborators)?;

    let issues = validator.validate_connections();
    if !issues.is_empty() {
        log::debug!("connection check found {} issues", issues.len());
        return Ok(issues);
    }

    let issues = validator.detect_cycles();
    if !issues.is_empty() {
        log::debug!("cycle check found {} issues", issues.len());
        return Ok(issues);
    }

    let issues = validator.validate_nested_flows();
    if !issues.is_empty() {
        log::debug!("nested flow check found {} issues", issues.len());
        return Ok(issues);
    }

    let issues = validator.check_ref_variables()?;
    if !issues.is_empty() {
        log::debug!("reference check found {} issues", issues.len());
        return Ok(issues);
    }

    let issues = validator.check_global_variables().await?;
    if !issues.is_empty() {
        log::debug!("global variable check found {} issues", issues.len());
        return Ok(issues);
    }

    let issues = validator.check_sub_workflow_terminate_plan().await?;
    log::debug!("sub workflow check found {} issues", issues.len());
    Ok(issues)
}

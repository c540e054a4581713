// SPDX-License-Identifier: MIT

//! Execution state shared by the nodes of one run
//!
//! This module provides:
//! - `ExecutionState` - the capability interface the stream resolver and
//!   loop-scoped nodes read and write
//! - `InMemoryExecutionState` - a lock-guarded implementation
//!
//! Executed flags and group choices are written once per node per run.

mod store;

pub use store::InMemoryExecutionState;

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::WorkflowError;
use crate::workflow::schema::{FieldStreamType, SourceInfo, ENTRY_NODE_KEY};

/// Group choice meaning "no source had a value"
pub const NO_CHOICE: i64 = -1;

/// Concurrent-safe view of one workflow run
pub trait ExecutionState: Send + Sync {
    /// Record that a node ran
    fn mark_executed(&self, node_key: &str);

    /// Whether a node ran on this run; the entry node always counts as run
    fn node_executed(&self, node_key: &str) -> bool;

    /// Record which source each group of a merge node picked
    fn save_dynamic_choice(&self, node_key: &str, group_to_choice: BTreeMap<String, i64>);

    fn get_dynamic_choice(&self, node_key: &str) -> Option<BTreeMap<String, i64>>;

    /// Record the resolved input sources of a node
    fn save_source_infos(&self, node_key: &str, infos: BTreeMap<String, SourceInfo>);

    fn get_source_infos(&self, node_key: &str) -> Option<BTreeMap<String, SourceInfo>>;

    /// Seed the intermediate variables of a loop scope
    fn init_intermediate(&self, scope: &str, vars: Map<String, Value>);

    fn get_intermediate(&self, scope: &str, path: &[String]) -> Option<Value>;

    /// Overwrite an intermediate variable, or a field inside one
    fn set_intermediate(&self, scope: &str, path: &[String], value: Value) -> Result<(), WorkflowError>;

    /// Signal that the loop `scope` should stop after this iteration
    fn set_break(&self, scope: &str);

    fn has_break(&self, scope: &str) -> bool;

    /// Stream type chosen at run time for one group of a merge node
    ///
    /// A group that picked a maybe-stream source follows that source to its
    /// own producing node.
    fn get_dynamic_stream_type(&self, node_key: &str, group: &str) -> Result<FieldStreamType, WorkflowError> {
        let choices = self.get_dynamic_choice(node_key).ok_or_else(|| {
            WorkflowError::dynamic_stream(format!("choice not found for node {}", node_key))
        })?;

        let choice = *choices.get(group).ok_or_else(|| {
            WorkflowError::dynamic_stream(format!(
                "choice not found for node {} and group {}",
                node_key, group
            ))
        })?;

        if choice == NO_CHOICE {
            return Ok(FieldStreamType::NotStream);
        }

        let infos = self.get_source_infos(node_key).ok_or_else(|| {
            WorkflowError::dynamic_stream(format!("source infos not found for node {}", node_key))
        })?;

        let group_info = infos.get(group).ok_or_else(|| {
            WorkflowError::dynamic_stream(format!(
                "source infos not found for node {} and group {}",
                node_key, group
            ))
        })?;

        if group_info.sub_sources.is_empty() {
            return Err(WorkflowError::dynamic_stream(format!(
                "dynamic group {} of node {} does not contain any sub sources",
                group, node_key
            )));
        }

        let sub = group_info.sub_sources.get(&choice.to_string()).ok_or_else(|| {
            WorkflowError::dynamic_stream(format!(
                "dynamic group {} of node {} does not contain sub source for choice {}",
                group, node_key, choice
            ))
        })?;

        if sub.field_type != FieldStreamType::MaybeStream {
            return Ok(sub.field_type);
        }

        match (sub.from_node_key.as_str(), sub.from_path.as_slice()) {
            ("", _) => Err(WorkflowError::dynamic_stream(format!(
                "maybe stream source for group {} of node {} has no producing node",
                group, node_key
            ))),
            (from_node, [from_group]) => self.get_dynamic_stream_type(from_node, from_group),
            (from_node, path) => Err(WorkflowError::dynamic_stream(format!(
                "maybe stream source {} of node {} must name exactly one group, got {:?}",
                from_node, node_key, path
            ))),
        }
    }

    /// Stream types of every group a merge node has chosen for
    fn get_all_dynamic_stream_types(&self, node_key: &str) -> Result<BTreeMap<String, FieldStreamType>, WorkflowError> {
        let Some(choices) = self.get_dynamic_choice(node_key) else {
            return Ok(BTreeMap::new());
        };

        choices
            .keys()
            .map(|group| Ok((group.clone(), self.get_dynamic_stream_type(node_key, group)?)))
            .collect()
    }
}

pub(crate) fn is_entry(node_key: &str) -> bool {
    node_key == ENTRY_NODE_KEY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merge_sources(choices: &[(&str, FieldStreamType, &str, &[&str])]) -> SourceInfo {
        SourceInfo::intermediate(choices.iter().map(|(idx, t, from, path)| {
            (
                idx.to_string(),
                SourceInfo::from_node(*from, path.iter().map(|s| s.to_string()).collect(), *t),
            )
        }))
    }

    fn state() -> InMemoryExecutionState {
        let state = InMemoryExecutionState::new();

        state.save_source_infos(
            "merge_a",
            BTreeMap::from([(
                "g".to_string(),
                merge_sources(&[
                    ("0", FieldStreamType::IsStream, "llm", &["output"][..]),
                    ("1", FieldStreamType::NotStream, "code", &["output"][..]),
                ]),
            )]),
        );
        state.save_source_infos(
            "merge_b",
            BTreeMap::from([(
                "h".to_string(),
                merge_sources(&[("0", FieldStreamType::MaybeStream, "merge_a", &["g"][..])]),
            )]),
        );
        state
    }

    #[test]
    fn test_dynamic_stream_type() {
        let state = state();
        state.save_dynamic_choice("merge_a", BTreeMap::from([("g".to_string(), 0)]));
        state.save_dynamic_choice("merge_b", BTreeMap::from([("h".to_string(), 0)]));

        assert_eq!(state.get_dynamic_stream_type("merge_a", "g").unwrap(), FieldStreamType::IsStream);
        // follows the maybe-stream source into merge_a
        assert_eq!(state.get_dynamic_stream_type("merge_b", "h").unwrap(), FieldStreamType::IsStream);
    }

    #[test]
    fn test_no_choice_is_not_stream() {
        let state = state();
        state.save_dynamic_choice("merge_a", BTreeMap::from([("g".to_string(), NO_CHOICE)]));
        assert_eq!(state.get_dynamic_stream_type("merge_a", "g").unwrap(), FieldStreamType::NotStream);
    }

    #[test]
    fn test_dynamic_stream_errors() {
        let state = state();
        let err = state.get_dynamic_stream_type("merge_a", "g").unwrap_err();
        assert_eq!(err.to_string(), "dynamic stream resolution failed: choice not found for node merge_a");

        state.save_dynamic_choice("merge_a", BTreeMap::from([("g".to_string(), 5)]));
        let err = state.get_dynamic_stream_type("merge_a", "x").unwrap_err();
        assert!(err.to_string().contains("choice not found for node merge_a and group x"));
        let err = state.get_dynamic_stream_type("merge_a", "g").unwrap_err();
        assert!(err.to_string().contains("does not contain sub source for choice 5"));

        state.save_dynamic_choice("other", BTreeMap::from([("g".to_string(), 0)]));
        let err = state.get_dynamic_stream_type("other", "g").unwrap_err();
        assert!(err.to_string().contains("source infos not found for node other"));
    }

    #[test]
    fn test_all_dynamic_stream_types() {
        let state = state();
        assert!(state.get_all_dynamic_stream_types("merge_a").unwrap().is_empty());

        state.save_dynamic_choice("merge_a", BTreeMap::from([("g".to_string(), 1)]));
        let all = state.get_all_dynamic_stream_types("merge_a").unwrap();
        assert_eq!(all.get("g"), Some(&FieldStreamType::NotStream));
    }
}

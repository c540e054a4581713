// SPDX-License-Identifier: MIT

//! Set-variable node inside a loop body

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::take_map_value;
use crate::error::{CanvasError, WorkflowError};
use crate::workflow::canvas::{block_input_to_field_info, Node};
use crate::workflow::schema::{FieldPath, GlobalVarType, NodeKey, NodeSchema, Reference};
use crate::workflow::state::ExecutionState;

/// Assignment of one input field to a loop intermediate variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    pub left: Reference,
    pub right: FieldPath,
}

/// Compiled set-variable node; writes into the state scope of its parent loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopAssigner {
    pub parent_key: NodeKey,
    pub pairs: Vec<Pair>,
}

impl LoopAssigner {
    /// Bind each `left = right` parameter of a canvas node
    ///
    /// The left side must name one of the parent loop's variables. The right
    /// side is bound as an input at the variable's own path.
    pub fn adapt(node: &Node, parent: Option<&Node>, ns: &mut NodeSchema) -> Result<Self, CanvasError> {
        let parent = parent.ok_or_else(|| {
            CanvasError::schema(format!("loop set variable node must have parent: {}", node.id))
        })?;

        let params = node.inputs().map(|i| i.input_parameters.as_slice()).unwrap_or_default();
        let mut pairs = Vec::with_capacity(params.len());

        for (i, param) in params.iter().enumerate() {
            let (Some(left), Some(right)) = (param.left.as_ref(), param.right.as_ref()) else {
                return Err(CanvasError::schema(
                    "loop set variable node's param left or right is nil",
                ));
            };

            let left_sources = block_input_to_field_info(left, vec![format!("left_{}", i)], Some(parent))?;
            let [left_source] = left_sources.as_slice() else {
                return Err(CanvasError::schema(
                    "loop set variable node's param left is not a single source",
                ));
            };
            let reference = left_source.source.reference.as_ref().ok_or_else(|| {
                CanvasError::schema("loop set variable node's param left's ref is nil")
            })?;
            if reference.variable_type != Some(GlobalVarType::ParentIntermediate) {
                return Err(CanvasError::schema(
                    "loop set variable node's param left's ref's variable type is not parent intermediate",
                ));
            }

            let right_sources = block_input_to_field_info(right, reference.from_path.clone(), Some(parent))?;
            let [right_source] = right_sources.as_slice() else {
                return Err(CanvasError::schema(
                    "loop set variable node's param right is not a single source",
                ));
            };

            pairs.push(Pair {
                left: reference.clone(),
                right: right_source.path.clone(),
            });
            ns.add_input_source(right_sources);
        }

        let assigner = Self {
            parent_key: parent.id.clone(),
            pairs,
        };
        ns.configs = serde_json::to_value(&assigner).ok();
        Ok(assigner)
    }

    pub fn from_schema(ns: &NodeSchema) -> Result<Self, WorkflowError> {
        let configs = ns
            .configs
            .as_ref()
            .ok_or_else(|| WorkflowError::invalid_config("config required"))?;
        serde_json::from_value(configs.clone())
            .map_err(|e| WorkflowError::invalid_config(format!("loop set variable config: {}", e)))
    }

    /// Write every right value into its intermediate variable
    pub fn invoke(&self, input: &Map<String, Value>, state: &dyn ExecutionState) -> Result<Map<String, Value>, WorkflowError> {
        for pair in &self.pairs {
            let path: Vec<&str> = pair.right.iter().map(String::as_str).collect();
            let value = take_map_value(input, &path).ok_or_else(|| {
                WorkflowError::invalid_parameter(format!(
                    "cannot take right value {} from input",
                    pair.right.join(".")
                ))
            })?;
            state.set_intermediate(&self.parent_key, &pair.left.from_path, value.clone())?;
        }
        Ok(Map::new())
    }
}

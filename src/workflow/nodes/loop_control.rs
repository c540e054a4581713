// SPDX-License-Identifier: MIT

//! Loop node and its break/continue controls
//!
//! A loop runs its inner body once per iteration. Array loops stop at the
//! shortest input array, count loops at `loopCount`, infinite loops only on
//! break. Intermediate variables live in the execution state under the loop's
//! node key so that set-variable and break nodes inside the body can reach
//! them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::take_map_value;
use crate::error::WorkflowError;
use crate::workflow::canvas::model::LoopType;
use crate::workflow::schema::{GlobalVarType, NodeKey, NodeSchema, Reference};
use crate::workflow::state::ExecutionState;
use crate::workflow::types::DataType;

/// Input key carrying the iteration count of a count loop
pub const LOOP_COUNT_KEY: &str = "loopCount";

/// Inner workflow of a loop, invoked once per iteration
#[async_trait]
pub trait LoopBody: Send + Sync {
    async fn invoke(&self, input: Map<String, Value>) -> Result<Map<String, Value>, WorkflowError>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoopConfig {
    #[serde(default)]
    loop_type: Option<LoopType>,
    #[serde(default)]
    intermediate_vars: Vec<String>,
}

/// Compiled loop node
#[derive(Debug, Clone, PartialEq)]
pub struct LoopNode {
    pub node_key: NodeKey,
    pub loop_type: LoopType,
    pub input_arrays: Vec<String>,
    pub intermediate_vars: Vec<String>,
    /// Output key to the inner node output collected each iteration
    pub outputs: BTreeMap<String, Reference>,
    /// Output key to the intermediate variable reported after the last iteration
    pub output_vars: BTreeMap<String, String>,
}

impl LoopNode {
    pub fn from_schema(ns: &NodeSchema) -> Result<Self, WorkflowError> {
        let configs = ns
            .configs
            .as_ref()
            .ok_or_else(|| WorkflowError::invalid_config("config required"))?;
        let config: LoopConfig = serde_json::from_value(configs.clone())
            .map_err(|e| WorkflowError::invalid_config(format!("loop config: {}", e)))?;
        let loop_type = config
            .loop_type
            .ok_or_else(|| WorkflowError::invalid_config("unsupported loop type: none"))?;

        let input_arrays: Vec<String> = ns
            .input_types
            .iter()
            .filter(|(key, info)| {
                info.data_type == DataType::Array && !config.intermediate_vars.contains(key)
            })
            .map(|(key, _)| key.clone())
            .collect();

        if loop_type == LoopType::Array && input_arrays.is_empty() {
            return Err(WorkflowError::invalid_config(
                "input arrays is empty when loop type is ByArray",
            ));
        }

        let mut outputs = BTreeMap::new();
        let mut output_vars = BTreeMap::new();
        for info in &ns.output_sources {
            let [key] = info.path.as_slice() else {
                return Err(WorkflowError::invalid_config(format!(
                    "invalid output path: {:?}",
                    info.path
                )));
            };
            let reference = info.source.reference.as_ref().ok_or_else(|| {
                WorkflowError::invalid_config(format!("loop output {} is not a reference", key))
            })?;

            if reference.variable_type == Some(GlobalVarType::ParentIntermediate) {
                let [var] = reference.from_path.as_slice() else {
                    return Err(WorkflowError::invalid_config(format!(
                        "loop output refers to intermediate variable, but path length > 1: {:?}",
                        reference.from_path
                    )));
                };
                if !config.intermediate_vars.contains(var) {
                    return Err(WorkflowError::invalid_config(format!(
                        "loop output refers to intermediate variable, but not found in intermediate vars: {}",
                        var
                    )));
                }
                output_vars.insert(key.clone(), var.clone());
                continue;
            }

            outputs.insert(key.clone(), reference.clone());
        }

        Ok(Self {
            node_key: ns.key.clone(),
            loop_type,
            input_arrays,
            intermediate_vars: config.intermediate_vars,
            outputs,
            output_vars,
        })
    }

    /// Number of iterations the input allows
    pub fn max_iterations(&self, input: &Map<String, Value>) -> Result<usize, WorkflowError> {
        match self.loop_type {
            LoopType::Array => {
                let mut max_iter = usize::MAX;
                for key in &self.input_arrays {
                    let value = input.get(key).ok_or_else(|| {
                        WorkflowError::invalid_parameter(format!(
                            "incoming array not present in input: {}",
                            key
                        ))
                    })?;
                    let arr = value.as_array().ok_or_else(|| {
                        WorkflowError::invalid_parameter(format!(
                            "incoming array not a slice: {}. Actual type: {}",
                            key,
                            crate::workflow::convert::value_kind(value)
                        ))
                    })?;
                    max_iter = max_iter.min(arr.len());
                }
                Ok(max_iter)
            }
            LoopType::Count => {
                let count = input.get(LOOP_COUNT_KEY).ok_or_else(|| {
                    WorkflowError::invalid_parameter(
                        "incoming LoopCount not present in input when loop type is ByIteration",
                    )
                })?;
                let count = count.as_i64().ok_or_else(|| {
                    WorkflowError::invalid_parameter(format!("loopCount is not an integer: {}", count))
                })?;
                Ok(usize::try_from(count).unwrap_or(0))
            }
            LoopType::Infinite => Ok(usize::MAX),
        }
    }

    /// Input of iteration `i`
    ///
    /// Scalar inputs carry over. The index is exposed as `{node}#index` and the
    /// current element of each array as `{node}#{array}`, with object elements
    /// also flattened into `{node}#{array}#{field}`.
    pub fn iteration_input(&self, input: &Map<String, Value>, i: usize) -> Map<String, Value> {
        let mut out = Map::new();

        for (k, v) in input {
            if k == LOOP_COUNT_KEY || self.input_arrays.contains(k) || self.intermediate_vars.contains(k) {
                continue;
            }
            out.insert(k.clone(), v.clone());
        }

        out.insert(format!("{}#index", self.node_key), Value::from(i as i64));

        for key in &self.input_arrays {
            let Some(elem) = input.get(key).and_then(Value::as_array).and_then(|a| a.get(i)) else {
                continue;
            };
            expand(&mut out, format!("{}#{}", self.node_key, key), elem);
        }
        out
    }

    /// Run every iteration through `body`
    pub async fn run(
        &self,
        input: &Map<String, Value>,
        body: &dyn LoopBody,
        state: &dyn ExecutionState,
    ) -> Result<Map<String, Value>, WorkflowError> {
        let max_iter = self.max_iterations(input)?;

        let mut vars = Map::new();
        for key in &self.intermediate_vars {
            let value = input.get(key).ok_or_else(|| {
                WorkflowError::invalid_parameter(format!(
                    "incoming intermediate variable not present in input: {}",
                    key
                ))
            })?;
            vars.insert(key.clone(), value.clone());
        }
        state.init_intermediate(&self.node_key, vars);

        let mut collected: BTreeMap<&str, Vec<Value>> =
            self.outputs.keys().map(|k| (k.as_str(), Vec::new())).collect();

        let mut iterations = 0;
        for i in 0..max_iter {
            let task_output = body.invoke(self.iteration_input(input, i)).await?;
            iterations += 1;

            for (key, source) in &self.outputs {
                let mut path: Vec<&str> = vec![source.from_node_key.as_str()];
                path.extend(source.from_path.iter().map(String::as_str));
                if let (Some(value), Some(list)) = (take_map_value(&task_output, &path), collected.get_mut(key.as_str())) {
                    list.push(value.clone());
                }
            }

            if state.has_break(&self.node_key) {
                break;
            }
        }
        log::debug!("loop {} finished after {} iterations", self.node_key, iterations);

        let mut output: Map<String, Value> = collected
            .into_iter()
            .map(|(k, list)| (k.to_string(), Value::Array(list)))
            .collect();
        for (key, var) in &self.output_vars {
            let value = state
                .get_intermediate(&self.node_key, std::slice::from_ref(var))
                .unwrap_or(Value::Null);
            output.insert(key.clone(), value);
        }
        Ok(output)
    }
}

fn expand(out: &mut Map<String, Value>, prefix: String, value: &Value) {
    if let Value::Object(nested) = value {
        for (k, v) in nested {
            expand(out, format!("{}#{}", prefix, k), v);
        }
    }
    out.insert(prefix, value.clone());
}

/// Break node inside a loop body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakNode {
    pub parent_key: NodeKey,
}

impl BreakNode {
    pub fn new(parent_key: impl Into<NodeKey>) -> Self {
        Self {
            parent_key: parent_key.into(),
        }
    }

    /// Ask the enclosing loop to stop after the current iteration
    pub fn invoke(&self, state: &dyn ExecutionState) -> Map<String, Value> {
        state.set_break(&self.parent_key);
        Map::new()
    }
}

/// Continue node; the rest of the iteration is simply not wired
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContinueNode;

impl ContinueNode {
    pub fn invoke(&self) -> Map<String, Value> {
        Map::new()
    }
}

// SPDX-License-Identifier: MIT

//! Variable merge node: each group yields its first non-null candidate
//!
//! The index a group picked is recorded in the execution state so that
//! downstream maybe-stream fields can learn whether the chosen candidate
//! streams.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{CanvasError, WorkflowError};
use crate::workflow::canvas::{block_input_to_field_info, block_input_to_type_info, Node};
use crate::workflow::schema::{group_stream_type, FieldStreamType, NodeKey, NodeSchema, SourceInfo};
use crate::workflow::state::{ExecutionState, NO_CHOICE};
use crate::workflow::types::TypeInfo;

/// Groups in canvas order with their candidate counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeConfig {
    pub groups: Vec<MergeGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeGroup {
    pub name: String,
    pub len: usize,
}

impl MergeConfig {
    /// Declare group `g` as an object whose properties `"0"`, `"1"`, ... are
    /// the candidates in order
    pub fn adapt(node: &Node, parent: Option<&Node>, ns: &mut NodeSchema) -> Result<Self, CanvasError> {
        let groups = node.inputs().map(|i| i.merge_groups.as_slice()).unwrap_or_default();
        let mut config = MergeConfig::default();

        for group in groups {
            let mut properties = BTreeMap::new();
            for (i, variable) in group.variables.iter().enumerate() {
                let index = i.to_string();
                properties.insert(index.clone(), block_input_to_type_info(Some(variable))?);
                let path = vec![group.name.clone(), index];
                ns.add_input_source(block_input_to_field_info(variable, path, parent)?);
            }
            ns.set_input_type(group.name.clone(), TypeInfo::object(properties));
            config.groups.push(MergeGroup {
                name: group.name.clone(),
                len: group.variables.len(),
            });
        }

        ns.configs = serde_json::to_value(&config).ok();
        Ok(config)
    }
}

/// Result of one merge: the chosen values and, per group in canvas order,
/// the chosen candidate index
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutput {
    pub output: Map<String, Value>,
    pub choices: Vec<Option<usize>>,
}

/// Compiled variable merge node
#[derive(Debug, Clone, PartialEq)]
pub struct VariableMerge {
    node_key: NodeKey,
    groups: Vec<MergeGroup>,
    full_sources: BTreeMap<String, SourceInfo>,
}

impl VariableMerge {
    pub fn from_schema(ns: &NodeSchema) -> Result<Self, WorkflowError> {
        let configs = ns
            .configs
            .as_ref()
            .ok_or_else(|| WorkflowError::invalid_config("config required"))?;
        let config: MergeConfig = serde_json::from_value(configs.clone())
            .map_err(|e| WorkflowError::invalid_config(format!("variable merge config: {}", e)))?;

        Ok(Self {
            node_key: ns.key.clone(),
            groups: config.groups,
            full_sources: ns.full_sources.clone(),
        })
    }

    /// Stream type of a group as far as it is known before the run
    pub fn static_stream_type(&self, group: &str) -> FieldStreamType {
        self.full_sources
            .get(group)
            .map(|g| group_stream_type(g.sub_sources.values()))
            .unwrap_or_default()
    }

    /// Pick the first non-null candidate of every group
    ///
    /// Groups with no value are left out of the output and record `-1`.
    pub fn invoke(&self, input: &Map<String, Value>, state: &dyn ExecutionState) -> MergeOutput {
        let mut output = Map::new();
        let mut group_to_choice = BTreeMap::new();
        let mut choices = Vec::with_capacity(self.groups.len());

        for group in &self.groups {
            let candidates = input.get(&group.name).and_then(Value::as_object);
            let chosen = (0..group.len).find_map(|i| {
                candidates
                    .and_then(|c| c.get(&i.to_string()))
                    .filter(|v| !v.is_null())
                    .map(|v| (i, v))
            });

            match chosen {
                Some((i, value)) => {
                    output.insert(group.name.clone(), value.clone());
                    group_to_choice.insert(group.name.clone(), i as i64);
                    choices.push(Some(i));
                }
                None => {
                    group_to_choice.insert(group.name.clone(), NO_CHOICE);
                    choices.push(None);
                }
            }
        }

        state.save_source_infos(&self.node_key, self.full_sources.clone());
        state.save_dynamic_choice(&self.node_key, group_to_choice);
        log::debug!("variable merge {} chose {:?}", self.node_key, choices);

        MergeOutput { output, choices }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::canvas::{canvas_to_schemas, Canvas};
    use crate::workflow::state::InMemoryExecutionState;
    use crate::workflow::stream::resolve_stream_sources;
    use serde_json::json;

    fn ref_var(block: &str, name: &str) -> Value {
        json!({"type": "string", "value": {"type": "ref", "content": {"blockID": block, "name": name, "source": "block-output"}}})
    }

    fn canvas() -> Canvas {
        serde_json::from_value(json!({
            "nodes": [
                {"id": "100001", "type": "1", "data": {"outputs": [{"name": "q", "type": "string"}]}},
                {"id": "llm", "type": "3", "data": {"outputs": [{"name": "output", "type": "string"}]}},
                {"id": "code", "type": "5", "data": {"outputs": [{"name": "output", "type": "string"}]}},
                {"id": "merge", "type": "32", "data": {
                    "inputs": {"mergeGroups": [
                        {"name": "Group1", "variables": [ref_var("llm", "output"), ref_var("code", "output")]},
                        {"name": "Group2", "variables": [ref_var("code", "output")]}
                    ]},
                    "outputs": [{"name": "Group1", "type": "string"}, {"name": "Group2", "type": "string"}]
                }},
                {"id": "900001", "type": "2", "data": {"inputs": {"inputParameters": [
                    {"name": "answer", "input": ref_var("merge", "Group1")}
                ]}}}
            ],
            "edges": []
        }))
        .unwrap()
    }

    #[test]
    fn test_adapt_groups() {
        let schemas = canvas_to_schemas(&canvas()).unwrap();
        let merge = &schemas["merge"];
        assert_eq!(merge.input_types["Group1"].properties.len(), 2);
        assert_eq!(merge.full_sources["Group1"].sub_sources.len(), 2);

        let node = VariableMerge::from_schema(merge).unwrap();
        assert_eq!(node.groups[0], MergeGroup { name: "Group1".to_string(), len: 2 });
        assert_eq!(node.static_stream_type("Group1"), FieldStreamType::MaybeStream);
        assert_eq!(node.static_stream_type("Group2"), FieldStreamType::NotStream);
    }

    #[test]
    fn test_first_non_null_wins() {
        let schemas = canvas_to_schemas(&canvas()).unwrap();
        let node = VariableMerge::from_schema(&schemas["merge"]).unwrap();
        let state = InMemoryExecutionState::new();

        let input = json!({"Group1": {"0": null, "1": "from code"}, "Group2": {"0": null}});
        let out = node.invoke(input.as_object().unwrap(), &state);
        assert_eq!(Value::Object(out.output), json!({"Group1": "from code"}));
        assert_eq!(out.choices, vec![Some(1), None]);

        let choice = state.get_dynamic_choice("merge").unwrap();
        assert_eq!(choice["Group1"], 1);
        assert_eq!(choice["Group2"], NO_CHOICE);
    }

    #[test]
    fn test_downstream_stream_type_follows_choice() {
        let schemas = canvas_to_schemas(&canvas()).unwrap();
        let end = &schemas["900001"];
        assert_eq!(end.full_sources["answer"].field_type, FieldStreamType::MaybeStream);

        let node = VariableMerge::from_schema(&schemas["merge"]).unwrap();
        let state = InMemoryExecutionState::new();
        state.mark_executed("llm");
        state.mark_executed("merge");

        let input = json!({"Group1": {"0": "streamed", "1": null}});
        node.invoke(input.as_object().unwrap(), &state);

        let resolved = resolve_stream_sources(&end.full_sources, &state).unwrap();
        assert_eq!(resolved["answer"].field_type, FieldStreamType::IsStream);
    }
}

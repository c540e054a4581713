// SPDX-License-Identifier: MIT

//! Condition node: builds clauses from branch inputs and picks an outgoing port

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::take_map_value;
use crate::error::{CanvasError, WorkflowError};
use crate::workflow::canvas::model::{Condition, LogicType};
use crate::workflow::canvas::{block_input_to_field_info, block_input_to_type_info, Node};
use crate::workflow::schema::NodeSchema;
use crate::workflow::selector::{Clause, ClauseGroup, ClauseRelation, MultiClause, Operator, Selector};
use crate::workflow::types::TypeInfo;

pub const LEFT_KEY: &str = "Left";
pub const RIGHT_KEY: &str = "Right";

/// Operators of one branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseSchema {
    Single(Operator),
    Multi {
        clauses: Vec<Operator>,
        relation: ClauseRelation,
    },
}

/// Compiled configuration of a condition node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorConfig {
    pub clauses: Vec<ClauseSchema>,
}

/// Result of running a condition node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorOutput {
    pub index: usize,
    pub port: String,
}

impl SelectorConfig {
    /// Read branch operators from a canvas condition node
    pub fn from_node(node: &Node) -> Result<Self, CanvasError> {
        let branches = node.inputs().map(|i| i.branches.as_slice()).unwrap_or_default();
        let mut clauses = Vec::with_capacity(branches.len());

        for branch in branches {
            let conditions = &branch.condition.conditions;
            if let [single] = conditions.as_slice() {
                clauses.push(ClauseSchema::Single(condition_operator(single)?));
                continue;
            }

            let relation = match branch.condition.logic {
                LogicType::Or => ClauseRelation::Or,
                LogicType::And => ClauseRelation::And,
            };
            let ops = conditions
                .iter()
                .map(condition_operator)
                .collect::<Result<Vec<_>, _>>()?;
            clauses.push(ClauseSchema::Multi {
                clauses: ops,
                relation,
            });
        }

        Ok(Self { clauses })
    }

    /// Declare the branch operands as inputs of `ns`
    ///
    /// Branch `i` becomes input `"i"`; a single condition binds `i.Left` and
    /// `i.Right`, multiple conditions bind `i.j.Left` and `i.j.Right`.
    pub fn adapt_inputs(
        &self,
        node: &Node,
        parent: Option<&Node>,
        ns: &mut NodeSchema,
    ) -> Result<(), CanvasError> {
        let branches = node.inputs().map(|i| i.branches.as_slice()).unwrap_or_default();

        for (i, branch) in branches.iter().enumerate() {
            let branch_key = i.to_string();
            let conditions = &branch.condition.conditions;

            let properties = if let [single] = conditions.as_slice() {
                adapt_condition(single, vec![branch_key.clone()], parent, ns)?
            } else {
                let mut properties = BTreeMap::new();
                for (j, cond) in conditions.iter().enumerate() {
                    let operands =
                        adapt_condition(cond, vec![branch_key.clone(), j.to_string()], parent, ns)?;
                    properties.insert(j.to_string(), TypeInfo::object(operands));
                }
                properties
            };

            ns.set_input_type(branch_key, TypeInfo::object(properties));
        }
        Ok(())
    }

    /// Decode the configuration stored on a compiled schema
    pub fn from_schema(ns: &NodeSchema) -> Result<Self, WorkflowError> {
        let configs = ns
            .configs
            .as_ref()
            .ok_or_else(|| WorkflowError::invalid_config("config required"))?;
        serde_json::from_value(configs.clone())
            .map_err(|e| WorkflowError::invalid_config(format!("selector config: {}", e)))
    }

    /// Pair the configured operators with operands taken from `input`
    pub fn build_selector(&self, input: &Map<String, Value>) -> Result<Selector, WorkflowError> {
        let mut groups = Vec::with_capacity(self.clauses.len());

        for (i, schema) in self.clauses.iter().enumerate() {
            let branch_key = i.to_string();
            let group = match schema {
                ClauseSchema::Single(op) => ClauseGroup::Single(take_clause(input, &[&branch_key], *op)?),
                ClauseSchema::Multi { clauses, relation } => {
                    let mut built = Vec::with_capacity(clauses.len());
                    for (j, op) in clauses.iter().enumerate() {
                        let clause_key = j.to_string();
                        built.push(take_clause(input, &[&branch_key, &clause_key], *op)?);
                    }
                    ClauseGroup::Multi(MultiClause::new(built, *relation))
                }
            };
            groups.push(group);
        }

        Ok(Selector::new(groups))
    }

    /// Evaluate the branches and report the chosen index and port
    pub fn run(&self, input: &Map<String, Value>) -> Result<SelectorOutput, WorkflowError> {
        let index = self.build_selector(input)?.select()?;
        Ok(SelectorOutput {
            index,
            port: port_for(index, self.clauses.len()),
        })
    }
}

/// Outgoing port for a chosen branch; the else index maps to `false`
pub fn port_for(index: usize, clause_count: usize) -> String {
    if index >= clause_count {
        "false".to_string()
    } else if index == 0 {
        "true".to_string()
    } else {
        format!("true_{}", index)
    }
}

fn condition_operator(cond: &Condition) -> Result<Operator, CanvasError> {
    let left = cond
        .left
        .as_ref()
        .ok_or_else(|| CanvasError::schema("operator left is nil"))?;
    let left_type = left.input.as_ref().and_then(|i| i.var_type);
    Operator::from_canvas(cond.operator, left_type)
}

fn adapt_condition(
    cond: &Condition,
    path: Vec<String>,
    parent: Option<&Node>,
    ns: &mut NodeSchema,
) -> Result<BTreeMap<String, TypeInfo>, CanvasError> {
    let mut operands = BTreeMap::new();

    let left = cond
        .left
        .as_ref()
        .and_then(|p| p.input.as_ref())
        .ok_or_else(|| CanvasError::schema("operator left is nil"))?;
    operands.insert(LEFT_KEY.to_string(), block_input_to_type_info(Some(left))?);
    let mut left_path = path.clone();
    left_path.push(LEFT_KEY.to_string());
    ns.add_input_source(block_input_to_field_info(left, left_path, parent)?);

    if let Some(right) = cond.right.as_ref().and_then(|p| p.input.as_ref()) {
        operands.insert(RIGHT_KEY.to_string(), block_input_to_type_info(Some(right))?);
        let mut right_path = path;
        right_path.push(RIGHT_KEY.to_string());
        ns.add_input_source(block_input_to_field_info(right, right_path, parent)?);
    }

    Ok(operands)
}

fn take_clause(input: &Map<String, Value>, prefix: &[&str], op: Operator) -> Result<Clause, WorkflowError> {
    let mut left_path = prefix.to_vec();
    left_path.push(LEFT_KEY);
    let left = take_map_value(input, &left_path).ok_or_else(|| {
        WorkflowError::invalid_parameter(format!(
            "failed to take left operand from input map, clause path {}",
            prefix.join(".")
        ))
    })?;

    let mut right_path = prefix.to_vec();
    right_path.push(RIGHT_KEY);
    let right = take_map_value(input, &right_path).cloned().unwrap_or(Value::Null);

    Ok(Clause::new(left.clone(), op, right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::canvas::model::{BlockInput, BlockInputReference, VariableType};
    use crate::workflow::schema::FieldInfo;
    use serde_json::json;

    fn condition_node() -> Node {
        serde_json::from_value(json!({
            "id": "cond",
            "type": "8",
            "data": {
                "nodeMeta": {"title": "Condition"},
                "inputs": {
                    "branches": [
                        {"condition": {"logic": 2, "conditions": [{
                            "operator": 13,
                            "left": {"input": BlockInput::reference(
                                VariableType::Integer,
                                BlockInputReference::block_output("100001", "score"))},
                            "right": {"input": BlockInput::literal(VariableType::Integer, json!(5))}
                        }]}},
                        {"condition": {"logic": 1, "conditions": [
                            {
                                "operator": 7,
                                "left": {"input": BlockInput::reference(
                                    VariableType::Object,
                                    BlockInputReference::block_output("100001", "meta"))},
                                "right": {"input": BlockInput::literal(VariableType::String, json!("vip"))}
                            },
                            {
                                "operator": 9,
                                "left": {"input": BlockInput::reference(
                                    VariableType::String,
                                    BlockInputReference::block_output("100001", "name"))}
                            }
                        ]}}
                    ]
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_from_node() {
        let config = SelectorConfig::from_node(&condition_node()).unwrap();
        assert_eq!(config.clauses[0], ClauseSchema::Single(Operator::GreaterThan));
        assert_eq!(
            config.clauses[1],
            ClauseSchema::Multi {
                clauses: vec![Operator::ContainKey, Operator::Empty],
                relation: ClauseRelation::Or,
            }
        );
    }

    #[test]
    fn test_adapt_inputs() {
        let node = condition_node();
        let config = SelectorConfig::from_node(&node).unwrap();
        let mut ns = NodeSchema::new("cond", "Condition", node.node_type.clone());
        config.adapt_inputs(&node, None, &mut ns).unwrap();

        let paths: Vec<String> = ns.input_sources.iter().map(|f: &FieldInfo| f.path.join(".")).collect();
        assert_eq!(paths, vec!["0.Left", "0.Right", "1.0.Left", "1.0.Right", "1.1.Left"]);
        let path = |p: &[&str]| p.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(ns.input_type_at(&path(&["1", "0", "Right"])).is_some());
        assert!(ns.input_type_at(&path(&["1", "1", "Right"])).is_none());
    }

    #[test]
    fn test_run_selects_port() {
        let config = SelectorConfig::from_node(&condition_node()).unwrap();

        let input = json!({"0": {"Left": 7, "Right": 5}, "1": {"0": {"Left": {}, "Right": "vip"}, "1": {"Left": "x"}}});
        let out = config.run(input.as_object().unwrap()).unwrap();
        assert_eq!(out, SelectorOutput { index: 0, port: "true".to_string() });

        let input = json!({"0": {"Left": 1, "Right": 5}, "1": {"0": {"Left": {"vip": 1}, "Right": "vip"}, "1": {"Left": "x"}}});
        assert_eq!(config.run(input.as_object().unwrap()).unwrap().port, "true_1");

        let input = json!({"0": {"Left": 1, "Right": 5}, "1": {"0": {"Left": {}, "Right": "vip"}, "1": {"Left": "x"}}});
        let out = config.run(input.as_object().unwrap()).unwrap();
        assert_eq!(out.index, 2);
        assert_eq!(out.port, "false");
    }

    #[test]
    fn test_missing_left_operand() {
        let config = SelectorConfig {
            clauses: vec![ClauseSchema::Single(Operator::IsTrue)],
        };
        let err = config.build_selector(&Map::new()).unwrap_err();
        assert!(err.to_string().contains("left operand"));
    }

    #[test]
    fn test_config_round_trip_through_schema() {
        let config = SelectorConfig::from_node(&condition_node()).unwrap();
        let mut ns = NodeSchema::new("cond", "Condition", condition_node().node_type);
        ns.configs = serde_json::to_value(&config).ok();
        assert_eq!(SelectorConfig::from_schema(&ns).unwrap(), config);
    }
}

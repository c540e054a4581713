// SPDX-License-Identifier: MIT

//! Cross-node reference checks and the composite nesting rule

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::reachability::Reachability;
use super::Issue;
use crate::error::CanvasError;
use crate::workflow::canvas::{BlockInput, Node, RefSourceType};

static PARAMETER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid parameter name pattern"));

pub fn is_valid_parameter_name(name: &str) -> bool {
    PARAMETER_NAME.is_match(name)
}

/// Check every input parameter of every reachable node
///
/// A reference must point at a node reachable at its own level or at any
/// enclosing level, or at a global variable scope. Only a reference whose
/// content cannot be decoded is a hard error.
pub fn check_ref_variables(reachability: &Reachability) -> Result<Vec<Issue>, CanvasError> {
    let mut issues = Vec::new();
    check_level(reachability, &HashSet::new(), &mut issues)?;
    Ok(issues)
}

fn check_level(
    reachability: &Reachability,
    ancestors: &HashSet<String>,
    issues: &mut Vec<Issue>,
) -> Result<(), CanvasError> {
    let mut visible = ancestors.clone();
    visible.extend(reachability.reachable_nodes.keys().cloned());

    for (node_id, node) in &reachability.reachable_nodes {
        let params = node.inputs().map(|i| i.input_parameters.as_slice()).unwrap_or_default();
        for param in params {
            if let Some(input) = &param.input {
                if !is_valid_parameter_name(&param.name) {
                    issues.push(Issue::node(
                        node_id,
                        node.title(),
                        format!(
                            r#"parameter name only allows number or alphabet, and must begin with alphabet, but it's "{}""#,
                            param.name
                        ),
                    ));
                }
                verify_input(node, input, &visible, issues)?;
            }
            if let Some(left) = &param.left {
                verify_input(node, left, &visible, issues)?;
            }
            if let Some(right) = &param.right {
                verify_input(node, right, &visible, issues)?;
            }
        }
    }

    for nested in reachability.nested.values() {
        check_level(nested, &visible, issues)?;
    }
    Ok(())
}

fn verify_input(
    node: &Node,
    input: &BlockInput,
    visible: &HashSet<String>,
    issues: &mut Vec<Issue>,
) -> Result<(), CanvasError> {
    let Some(reference) = input.parse_reference()? else {
        return Ok(());
    };
    if reference.source.is_global() {
        return Ok(());
    }

    if reference.source == RefSourceType::BlockOutput && reference.block_id.is_empty() {
        issues.push(Issue::node(&node.id, node.title(), "ref block error,[blockID] is empty"));
        return Ok(());
    }

    if !visible.contains(&reference.block_id) {
        issues.push(Issue::node(
            &node.id,
            node.title(),
            format!(
                r#"the node id "{}" on which node id "{}" depends does not exist"#,
                reference.block_id, node.id
            ),
        ));
    }
    Ok(())
}

/// Composites (loop, batch) whose body contains another composite
pub fn validate_nested_flows(reachability: &Reachability) -> Vec<Issue> {
    reachability
        .nested_composites()
        .filter_map(|id| reachability.reachable_nodes.get(id))
        .map(|node| {
            Issue::node(
                &node.id,
                node.title(),
                "composite nodes such as batch/loop cannot be nested",
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::canvas::Canvas;
    use serde_json::{json, Value};

    fn ref_param(name: &str, block: &str) -> Value {
        json!({"name": name, "input": {"type": "string", "value": {"type": "ref", "content": {"blockID": block, "name": "output", "source": "block-output"}}}})
    }

    fn node(id: &str, node_type: &str, params: Vec<Value>) -> Value {
        json!({"id": id, "type": node_type, "data": {"nodeMeta": {"title": id}, "inputs": {"inputParameters": params}}})
    }

    fn analyze(value: Value) -> Reachability {
        let canvas: Canvas = serde_json::from_value(value).unwrap();
        Reachability::analyze(&canvas).unwrap()
    }

    #[test]
    fn test_parameter_names() {
        assert!(is_valid_parameter_name("input"));
        assert!(is_valid_parameter_name("_private1"));
        assert!(!is_valid_parameter_name("1st"));
        assert!(!is_valid_parameter_name("has space"));
        assert!(!is_valid_parameter_name(""));
    }

    #[test]
    fn test_references_to_reachable_nodes() {
        let r = analyze(json!({
            "nodes": [
                node("100001", "1", vec![]),
                node("a", "3", vec![ref_param("q", "100001")]),
                node("900001", "2", vec![ref_param("out", "a"), ref_param("bad name", "a")])
            ],
            "edges": [
                {"sourceNodeID": "100001", "targetNodeID": "a"},
                {"sourceNodeID": "a", "targetNodeID": "900001"}
            ]
        }));

        let issues = check_ref_variables(&r).unwrap();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains(r#"but it's "bad name""#));
    }

    #[test]
    fn test_reference_to_unreachable_node() {
        let r = analyze(json!({
            "nodes": [
                node("100001", "1", vec![]),
                node("orphan", "3", vec![]),
                node("900001", "2", vec![ref_param("out", "orphan")])
            ],
            "edges": [{"sourceNodeID": "100001", "targetNodeID": "900001"}]
        }));

        let issues = check_ref_variables(&r).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(
            issues[0].message,
            r#"the node id "orphan" on which node id "900001" depends does not exist"#
        );
    }

    #[test]
    fn test_nested_node_sees_ancestors() {
        let r = analyze(json!({
            "nodes": [
                node("100001", "1", vec![]),
                {"id": "loop", "type": "21",
                 "blocks": [node("inner", "3", vec![ref_param("q", "100001"), ref_param("p", "missing")])],
                 "edges": [
                    {"sourceNodeID": "loop", "targetNodeID": "inner"},
                    {"sourceNodeID": "inner", "targetNodeID": "loop"}
                 ]},
                node("900001", "2", vec![])
            ],
            "edges": [
                {"sourceNodeID": "100001", "targetNodeID": "loop"},
                {"sourceNodeID": "loop", "targetNodeID": "900001"}
            ]
        }));

        let issues = check_ref_variables(&r).unwrap();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains(r#""missing""#));
        assert_eq!(issues[0].node_err.as_ref().unwrap().node_id, "inner");
    }

    #[test]
    fn test_global_and_literal_inputs_are_skipped() {
        let global = json!({"name": "g", "input": {"type": "string", "value": {"type": "ref", "content": {"path": ["x"], "source": "global_variable_app"}}}});
        let literal = json!({"name": "l", "input": {"type": "string", "value": {"type": "literal", "content": "hi"}}});
        let empty = json!({"name": "e", "input": {"type": "string", "value": {"type": "ref", "content": {"blockID": "", "source": "block-output"}}}});
        let r = analyze(json!({
            "nodes": [node("100001", "1", vec![]), node("900001", "2", vec![global, literal, empty])],
            "edges": [{"sourceNodeID": "100001", "targetNodeID": "900001"}]
        }));

        let issues = check_ref_variables(&r).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message, "ref block error,[blockID] is empty");
    }

    #[test]
    fn test_undecodable_reference_is_hard_error() {
        let broken = json!({"name": "b", "input": {"type": "string", "value": {"type": "ref", "content": "oops"}}});
        let r = analyze(json!({
            "nodes": [node("100001", "1", vec![]), node("900001", "2", vec![broken])],
            "edges": [{"sourceNodeID": "100001", "targetNodeID": "900001"}]
        }));
        assert!(matches!(check_ref_variables(&r), Err(CanvasError::InvalidReference(_))));
    }

    #[test]
    fn test_nested_composites_rejected() {
        let r = analyze(json!({
            "nodes": [
                node("100001", "1", vec![]),
                {"id": "outer", "type": "28", "data": {"nodeMeta": {"title": "Batch"}},
                 "blocks": [
                    {"id": "inner", "type": "21",
                     "blocks": [node("x", "3", vec![])],
                     "edges": [{"sourceNodeID": "inner", "targetNodeID": "x"}]}
                 ],
                 "edges": [{"sourceNodeID": "outer", "targetNodeID": "inner"}]},
                node("900001", "2", vec![])
            ],
            "edges": [
                {"sourceNodeID": "100001", "targetNodeID": "outer"},
                {"sourceNodeID": "outer", "targetNodeID": "900001"}
            ]
        }));

        let issues = validate_nested_flows(&r);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].node_err.as_ref().unwrap().node_name, "Batch");
    }
}

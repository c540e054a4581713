// SPDX-License-Identifier: MIT

//! Out-degree and per-port connectivity

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::Issue;
use crate::workflow::canvas::model::{ErrorProcessType, QaAnswerType, QaOptionType};
use crate::workflow::canvas::{BlockType, Canvas, Node};

pub const PORT_FALSE: &str = "false";
pub const PORT_TRUE: &str = "true";
pub const PORT_DEFAULT: &str = "default";
pub const PORT_ERROR: &str = "branch_error";

/// Named output ports a branching node must connect, or `None` for nodes
/// with a single unnamed outlet
pub fn declared_ports(node: &Node) -> Option<BTreeSet<String>> {
    let inputs = node.inputs();
    let exception_branch = node.error_process_type() == Some(ErrorProcessType::ExceptionBranch);

    match node.node_type {
        BlockType::Condition => {
            let mut ports = BTreeSet::from([PORT_FALSE.to_string()]);
            let branches = inputs.map(|i| i.branches.len()).unwrap_or_default();
            for index in 0..branches {
                if index == 0 {
                    ports.insert(PORT_TRUE.to_string());
                } else {
                    ports.insert(format!("true_{}", index));
                }
            }
            Some(ports)
        }
        BlockType::Intent => {
            let intents = inputs.map(|i| i.intents.len()).unwrap_or_default();
            let mut ports: BTreeSet<String> = (0..intents).map(|i| format!("branch_{}", i)).collect();
            ports.insert(PORT_DEFAULT.to_string());
            if exception_branch {
                ports.insert(PORT_ERROR.to_string());
            }
            Some(ports)
        }
        BlockType::Question => {
            let inputs = inputs?;
            if inputs.answer_type != Some(QaAnswerType::Option) {
                return None;
            }
            let ports = match inputs.option_type {
                Some(QaOptionType::Static) => (0..inputs.options.len()).map(|i| format!("branch_{}", i)).collect(),
                Some(QaOptionType::Dynamic) => BTreeSet::from(["branch_0".to_string()]),
                None => BTreeSet::new(),
            };
            Some(ports)
        }
        _ if exception_branch => Some(BTreeSet::from([PORT_ERROR.to_string(), PORT_DEFAULT.to_string()])),
        _ => None,
    }
}

/// Connectivity issues of one canvas level and, recursively, of every
/// composite's sub-canvas
pub fn validate_connections(canvas: &Canvas) -> Vec<Issue> {
    let mut issues = Vec::new();

    for node in canvas.nodes.iter().filter(|n| n.is_composite()) {
        let mut nodes = node.blocks.clone();
        nodes.push(Node {
            id: node.id.clone(),
            node_type: node.node_type.clone(),
            data: node.data.clone(),
            ..Default::default()
        });
        let nested = Canvas {
            nodes,
            edges: node.edges.clone(),
            versions: None,
        };
        issues.extend(validate_connections(&nested));
    }

    let mut out_degree: HashMap<&str, usize> = HashMap::new();
    let mut port_out_degree: HashMap<(&str, &str), usize> = HashMap::new();
    for edge in &canvas.edges {
        *out_degree.entry(edge.source_node_id.as_str()).or_default() += 1;
        *port_out_degree
            .entry((edge.source_node_id.as_str(), edge.source_port_id.as_str()))
            .or_default() += 1;
    }

    // Later nodes win on duplicate IDs
    let node_map: BTreeMap<&str, &Node> = canvas.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    for (node_id, node) in node_map {
        let name = node.title();
        match node.node_type {
            BlockType::Start => {
                if out_degree.get(node_id).copied().unwrap_or_default() == 0 {
                    issues.push(Issue::node(node_id, name, r#"node "start" not connected"#));
                }
            }
            BlockType::End => {}
            _ => match declared_ports(node) {
                Some(ports) => {
                    let message: String = ports
                        .iter()
                        .filter(|port| {
                            port_out_degree
                                .get(&(node_id, port.as_str()))
                                .copied()
                                .unwrap_or_default()
                                == 0
                        })
                        .map(|port| format!(r#"node "{}"'s port "{}" not connected;"#, name, port))
                        .collect();
                    if !message.is_empty() {
                        issues.push(Issue::node(node_id, name, message));
                    }
                }
                None => {
                    if node.node_type.is_loop_control() {
                        continue;
                    }
                    if out_degree.get(node_id).copied().unwrap_or_default() == 0 {
                        issues.push(Issue::node(node_id, name, format!(r#"node "{}" not connected"#, name)));
                    }
                }
            },
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn canvas(value: serde_json::Value) -> Canvas {
        serde_json::from_value(value).unwrap()
    }

    fn node(id: &str, node_type: &str, title: &str) -> serde_json::Value {
        json!({"id": id, "type": node_type, "data": {"nodeMeta": {"title": title}}})
    }

    #[test]
    fn test_connected_canvas() {
        let c = canvas(json!({
            "nodes": [node("100001", "1", "Start"), node("a", "3", "LLM"), node("900001", "2", "End")],
            "edges": [
                {"sourceNodeID": "100001", "targetNodeID": "a"},
                {"sourceNodeID": "a", "targetNodeID": "900001"}
            ]
        }));
        assert!(validate_connections(&c).is_empty());
    }

    #[test]
    fn test_unconnected_nodes() {
        let c = canvas(json!({
            "nodes": [node("100001", "1", "Start"), node("a", "3", "LLM"), node("900001", "2", "End")],
            "edges": [{"sourceNodeID": "a", "targetNodeID": "900001"}]
        }));
        let issues = validate_connections(&c);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message, r#"node "start" not connected"#);
        assert_eq!(issues[0].node_err.as_ref().unwrap().node_id, "100001");
    }

    #[test]
    fn test_condition_ports() {
        let mut cond = node("cond", "8", "If");
        cond["data"]["inputs"] = json!({"branches": [
            {"condition": {"logic": 2, "conditions": []}},
            {"condition": {"logic": 2, "conditions": []}}
        ]});
        let c = canvas(json!({
            "nodes": [node("100001", "1", "Start"), cond, node("900001", "2", "End")],
            "edges": [
                {"sourceNodeID": "100001", "targetNodeID": "cond"},
                {"sourceNodeID": "cond", "targetNodeID": "900001", "sourcePortID": "true"},
                {"sourceNodeID": "cond", "targetNodeID": "900001", "sourcePortID": "false"}
            ]
        }));

        let issues = validate_connections(&c);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message, r#"node "If"'s port "true_1" not connected;"#);
    }

    #[test]
    fn test_exception_branch_ports() {
        let mut llm = node("llm", "3", "LLM");
        llm["data"]["inputs"] = json!({"settingOnError": {"processType": 3}});
        let c = canvas(json!({
            "nodes": [node("100001", "1", "Start"), llm, node("900001", "2", "End")],
            "edges": [
                {"sourceNodeID": "100001", "targetNodeID": "llm"},
                {"sourceNodeID": "llm", "targetNodeID": "900001", "sourcePortID": "default"}
            ]
        }));

        let issues = validate_connections(&c);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains(r#"port "branch_error" not connected"#));
    }

    #[test]
    fn test_question_and_intent_ports() {
        let mut question = node("q", "18", "Ask");
        question["data"]["inputs"] = json!({"answer_type": "option", "option_type": "static", "options": [{"name": "a"}, {"name": "b"}]});
        let ports = declared_ports(&serde_json::from_value(question).unwrap()).unwrap();
        assert_eq!(ports, BTreeSet::from(["branch_0".to_string(), "branch_1".to_string()]));

        let mut text_question = node("q", "18", "Ask");
        text_question["data"]["inputs"] = json!({"answer_type": "text"});
        assert!(declared_ports(&serde_json::from_value(text_question).unwrap()).is_none());

        let mut intent = node("i", "22", "Intent");
        intent["data"]["inputs"] = json!({"intents": [{"name": "x"}]});
        let ports = declared_ports(&serde_json::from_value(intent).unwrap()).unwrap();
        assert_eq!(ports, BTreeSet::from(["branch_0".to_string(), "default".to_string()]));
    }

    #[test]
    fn test_loop_body_connectivity() {
        let c = canvas(json!({
            "nodes": [
                node("100001", "1", "Start"),
                {"id": "loop", "type": "21", "data": {"nodeMeta": {"title": "Loop"}},
                 "blocks": [node("inner", "3", "Inner"), node("brk", "19", "Break")],
                 "edges": [
                    {"sourceNodeID": "loop", "targetNodeID": "inner", "sourcePortID": "loop-function-inline-output"},
                    {"sourceNodeID": "inner", "targetNodeID": "brk"}
                 ]},
                node("900001", "2", "End")
            ],
            "edges": [
                {"sourceNodeID": "100001", "targetNodeID": "loop"},
                {"sourceNodeID": "loop", "targetNodeID": "900001"}
            ]
        }));
        assert!(validate_connections(&c).is_empty());

        let mut broken = c.clone();
        broken.nodes[1].edges.pop();
        let issues = validate_connections(&broken);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].message, r#"node "Inner" not connected"#);
    }
}

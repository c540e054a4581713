// SPDX-License-Identifier: MIT

//! Breadth-first reachability from the start node, per canvas level

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::error::CanvasError;
use crate::workflow::canvas::{BlockType, Canvas, Node};

/// Nodes reachable from the start of one canvas level, plus the analysis of
/// every composite node's sub-canvas keyed by the composite's ID
#[derive(Debug, Clone, Default)]
pub struct Reachability {
    pub reachable_nodes: BTreeMap<String, Node>,
    pub nested: BTreeMap<String, Reachability>,
}

impl Reachability {
    /// Analyze a canvas; a level without start or end node is a hard error
    pub fn analyze(canvas: &Canvas) -> Result<Self, CanvasError> {
        let mut nested = BTreeMap::new();
        for node in canvas.nodes.iter().filter(|n| n.is_composite()) {
            let sub_canvas = composite_canvas(node);
            let analysis = Self::analyze(&sub_canvas).map_err(|e| CanvasError::nested(&node.id, e))?;
            nested.insert(node.id.clone(), analysis);
        }

        let (start, _end) = canvas.start_and_end()?;

        // Later nodes win on duplicate IDs
        let node_map: HashMap<&str, &Node> = canvas.nodes.iter().map(|n| (n.id.as_str(), n)).collect();
        let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &canvas.edges {
            successors
                .entry(edge.source_node_id.as_str())
                .or_default()
                .push(edge.target_node_id.as_str());
        }

        let mut reachable_nodes = BTreeMap::new();
        reachable_nodes.insert(start.id.clone(), start.clone());

        let mut visited = HashSet::from([start.id.as_str()]);
        let mut queue = VecDeque::from([start.id.as_str()]);
        while let Some(current) = queue.pop_front() {
            for target in successors.get(current).into_iter().flatten() {
                if !visited.insert(*target) {
                    continue;
                }
                let node = node_map
                    .get(target)
                    .ok_or_else(|| CanvasError::NodeNotFound(target.to_string()))?;
                reachable_nodes.insert(target.to_string(), (*node).clone());
                queue.push_back(*target);
            }
        }

        Ok(Self {
            reachable_nodes,
            nested,
        })
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.reachable_nodes.contains_key(node_id)
    }

    /// Composites at this level that themselves contain a composite
    pub fn nested_composites(&self) -> impl Iterator<Item = &str> {
        self.nested
            .iter()
            .filter(|(_, r)| !r.nested.is_empty())
            .map(|(id, _)| id.as_str())
    }
}

/// Private sub-canvas of a composite: the composite acts as both its start
/// and its end, followed by its blocks
pub(crate) fn composite_canvas(node: &Node) -> Canvas {
    let start = Node {
        id: node.id.clone(),
        node_type: BlockType::Start,
        data: node.data.clone(),
        ..Default::default()
    };
    let end = Node {
        id: node.id.clone(),
        node_type: BlockType::End,
        ..Default::default()
    };

    let mut nodes = Vec::with_capacity(node.blocks.len() + 2);
    nodes.push(start);
    nodes.push(end);
    nodes.extend(node.blocks.iter().cloned());

    Canvas {
        nodes,
        edges: node.edges.clone(),
        versions: None,
    }
}

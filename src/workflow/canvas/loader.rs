// SPDX-License-Identifier: MIT

//! Canvas loading, parent lookup and isolated-node pruning

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use super::model::{BlockType, Canvas, Edge, Node};
use crate::error::{CanvasError, FlowError};
use crate::workflow::schema::{ENTRY_NODE_KEY, EXIT_NODE_KEY};

/// Loads canvases from JSON or YAML documents
pub struct CanvasLoader;

impl CanvasLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a canvas from a file; `.yaml`/`.yml` are parsed as YAML, anything else as JSON
    pub fn load_canvas<P: AsRef<Path>>(&self, path: P) -> Result<Canvas, FlowError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::parse_yaml(&content),
            _ => Self::parse_json(&content),
        }
    }

    pub fn parse_json(content: &str) -> Result<Canvas, FlowError> {
        let canvas: Canvas = serde_json::from_str(content)?;
        log::debug!(
            "parsed canvas with {} nodes and {} edges",
            canvas.nodes.len(),
            canvas.edges.len()
        );
        Ok(canvas)
    }

    pub fn parse_yaml(content: &str) -> Result<Canvas, FlowError> {
        let canvas: Canvas = serde_yaml::from_str(content)?;
        Ok(canvas)
    }
}

impl Default for CanvasLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Node-ID to parent-ID table for nodes nested inside composites
#[derive(Debug, Clone, Default)]
pub struct ParentTable {
    parents: HashMap<String, String>,
}

impl ParentTable {
    /// Build the table once from a loaded canvas
    pub fn build(canvas: &Canvas) -> Self {
        fn walk(parent: &Node, parents: &mut HashMap<String, String>) {
            for block in &parent.blocks {
                parents.insert(block.id.clone(), parent.id.clone());
                walk(block, parents);
            }
        }

        let mut parents = HashMap::new();
        for node in &canvas.nodes {
            walk(node, &mut parents);
        }
        Self { parents }
    }

    pub fn parent_of(&self, node_id: &str) -> Option<&str> {
        self.parents.get(node_id).map(String::as_str)
    }

    /// Resolve the parent node itself from the canvas
    pub fn parent_node<'a>(&self, canvas: &'a Canvas, node_id: &str) -> Option<&'a Node> {
        let parent_id = self.parent_of(node_id)?;
        find_node(&canvas.nodes, parent_id)
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

/// Depth-first search for a node by ID at any nesting level
pub fn find_node<'a>(nodes: &'a [Node], node_id: &str) -> Option<&'a Node> {
    for node in nodes {
        if node.id == node_id {
            return Some(node);
        }
        if let Some(found) = find_node(&node.blocks, node_id) {
            return Some(found);
        }
    }
    None
}

/// Remove nodes nothing points at, recursing into composites
///
/// The entry and exit nodes always survive. Break and continue blocks count
/// as an incoming dependency of their enclosing composite.
pub fn prune_isolated_nodes(canvas: &mut Canvas) -> Result<(), CanvasError> {
    let (nodes, edges) = prune_level(
        std::mem::take(&mut canvas.nodes),
        std::mem::take(&mut canvas.edges),
        None,
    )?;
    canvas.nodes = nodes;
    canvas.edges = edges;
    Ok(())
}

fn prune_level(
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    parent_id: Option<&str>,
) -> Result<(Vec<Node>, Vec<Edge>), CanvasError> {
    let mut dependency_count: BTreeMap<String, usize> = BTreeMap::new();
    if let Some(parent) = parent_id {
        dependency_count.insert(parent.to_string(), 0);
    }

    let mut pruned_nodes = Vec::with_capacity(nodes.len());
    for mut node in nodes {
        if node.is_composite() {
            let (blocks, inner_edges) = prune_level(
                std::mem::take(&mut node.blocks),
                std::mem::take(&mut node.edges),
                Some(&node.id),
            )?;
            node.blocks = blocks;
            node.edges = inner_edges;
        }

        dependency_count.insert(node.id.clone(), 0);
        if matches!(node.node_type, BlockType::Break | BlockType::Continue) {
            if let Some(parent) = parent_id {
                *dependency_count.entry(parent.to_string()).or_default() += 1;
            }
        }
        pruned_nodes.push(node);
    }

    dependency_count.insert(ENTRY_NODE_KEY.to_string(), 1);
    dependency_count.insert(EXIT_NODE_KEY.to_string(), 1);

    for edge in &edges {
        match dependency_count.get_mut(&edge.target_node_id) {
            Some(count) => *count += 1,
            None => return Err(CanvasError::DanglingEdge(edge.target_node_id.clone())),
        }
    }

    let isolated: HashSet<&String> = dependency_count
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| id)
        .collect();

    if !isolated.is_empty() {
        log::debug!("pruning {} isolated nodes", isolated.len());
    }

    let kept_edges: Vec<Edge> = edges
        .iter()
        .filter(|e| !isolated.contains(&e.source_node_id))
        .cloned()
        .collect();
    let kept_nodes: Vec<Node> = pruned_nodes
        .into_iter()
        .filter(|n| !isolated.contains(&n.id))
        .collect();

    Ok((kept_nodes, kept_edges))
}

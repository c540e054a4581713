// SPDX-License-Identifier: MIT

//! Control-flow cycle detection

use std::collections::{HashMap, HashSet};

use super::Issue;
use crate::workflow::canvas::Canvas;

const CYCLE_MESSAGE: &str =
    "line connections do not allow parallel lines to intersect and form loops with each other";

/// One path-level issue per pair of adjacent nodes on every detected cycle
pub fn detect_cycle_issues(canvas: &Canvas) -> Vec<Issue> {
    // Walk edges backwards: target -> sources
    let mut predecessors: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &canvas.edges {
        predecessors
            .entry(edge.target_node_id.as_str())
            .or_default()
            .push(edge.source_node_id.as_str());
    }

    let node_ids: Vec<&str> = canvas.nodes.iter().map(|n| n.id.as_str()).collect();
    let mut issues = Vec::new();
    for cycle in detect_cycles(&node_ids, &predecessors) {
        let n = cycle.len();
        for i in 0..n {
            let (start, end) = (cycle[i], cycle[(i + 1) % n]);
            if start == end {
                continue;
            }
            issues.push(Issue::path(start, end, CYCLE_MESSAGE));
        }
    }
    issues
}

/// Cycles as node paths whose last element repeats an earlier one
///
/// Each back edge reached by the depth-first walk yields exactly one cycle.
pub fn detect_cycles<'a>(nodes: &[&'a str], successors: &HashMap<&'a str, Vec<&'a str>>) -> Vec<Vec<&'a str>> {
    fn visit<'a>(
        path: &mut Vec<&'a str>,
        on_path: &mut HashSet<&'a str>,
        finished: &mut HashSet<&'a str>,
        successors: &HashMap<&'a str, Vec<&'a str>>,
        cycles: &mut Vec<Vec<&'a str>>,
    ) {
        let Some(&current) = path.last() else {
            return;
        };
        for &next in successors.get(current).into_iter().flatten() {
            if on_path.contains(next) {
                if let Some(pos) = path.iter().position(|n| *n == next) {
                    let mut cycle = path[pos..].to_vec();
                    cycle.push(next);
                    cycles.push(cycle);
                }
                continue;
            }
            if finished.contains(next) {
                continue;
            }
            path.push(next);
            on_path.insert(next);
            visit(path, on_path, finished, successors, cycles);
            on_path.remove(next);
            path.pop();
        }
        finished.insert(current);
    }

    let mut finished = HashSet::new();
    let mut cycles = Vec::new();
    for &node in nodes {
        if finished.contains(node) {
            continue;
        }
        let mut path = vec![node];
        let mut on_path = HashSet::from([node]);
        visit(&mut path, &mut on_path, &mut finished, successors, &mut cycles);
    }
    cycles
}

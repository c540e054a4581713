// SPDX-License-Identifier: MIT

//! Per-run resolution of field stream types
//!
//! Compile-time provenance says where each input field comes from. At run
//! time a producer may have been skipped by a branch, and a merge group only
//! knows whether it streams once it picked a source.

use std::collections::{BTreeMap, HashMap};

use crate::error::WorkflowError;
use crate::workflow::schema::{FieldStreamType, SourceInfo};
use crate::workflow::state::ExecutionState;

/// Resolve every source against the live execution state
///
/// Sources without a producing node are finite values. Sources whose producer
/// did not run are `Skipped`. Maybe-stream sources ask the state for the
/// stream type their merge group picked.
pub fn resolve_stream_sources(
    sources: &BTreeMap<String, SourceInfo>,
    state: &dyn ExecutionState,
) -> Result<BTreeMap<String, SourceInfo>, WorkflowError> {
    let mut skipped_nodes = HashMap::new();
    resolve_level(sources, state, &mut skipped_nodes)
}

fn resolve_level(
    sources: &BTreeMap<String, SourceInfo>,
    state: &dyn ExecutionState,
    skipped_nodes: &mut HashMap<String, bool>,
) -> Result<BTreeMap<String, SourceInfo>, WorkflowError> {
    let mut resolved = BTreeMap::new();

    for (key, source) in sources {
        let mut out = source.clone();

        if source.is_intermediate {
            out.sub_sources = resolve_level(&source.sub_sources, state, skipped_nodes)?;
            resolved.insert(key.clone(), out);
            continue;
        }

        if source.from_node_key.is_empty() {
            out.field_type = FieldStreamType::NotStream;
            resolved.insert(key.clone(), out);
            continue;
        }

        let skipped = *skipped_nodes
            .entry(source.from_node_key.clone())
            .or_insert_with(|| !state.node_executed(&source.from_node_key));

        if skipped {
            out.field_type = FieldStreamType::Skipped;
        } else if source.field_type == FieldStreamType::MaybeStream {
            let group = source.from_path.first().ok_or_else(|| {
                WorkflowError::dynamic_stream(format!(
                    "field {} is maybe stream but names no group of node {}",
                    key, source.from_node_key
                ))
            })?;
            out.field_type = state.get_dynamic_stream_type(&source.from_node_key, group)?;
        }

        resolved.insert(key.clone(), out);
    }

    Ok(resolved)
}

// SPDX-License-Identifier: MIT

//! Node evaluators whose logic goes beyond moving values around
//!
//! Each evaluator is compiled from a `NodeSchema` (`from_schema`) and invoked
//! with the node's converted input map.

pub mod assigner;
pub mod database;
pub mod json;
pub mod loop_control;
pub mod merge;
pub mod selector;

pub use assigner::LoopAssigner;
pub use database::{DatabaseConfig, DbClauseGroup, DbOperator};
pub use json::{JsonDeserializer, JsonSerializer};
pub use loop_control::{BreakNode, ContinueNode, LoopBody, LoopNode};
pub use merge::VariableMerge;
pub use selector::{SelectorConfig, SelectorOutput};

use serde_json::{Map, Value};

/// Value at `path` inside a nested input map
pub fn take_map_value<'a>(map: &'a Map<String, Value>, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = map.get(*first)?;
    for key in rest {
        current = current.as_object()?.get(*key)?;
    }
    Some(current)
}

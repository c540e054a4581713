// SPDX-License-Identifier: MIT

//! In-memory execution state guarded by read/write locks

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{is_entry, ExecutionState};
use crate::error::WorkflowError;
use crate::workflow::schema::SourceInfo;

/// Execution state of one run, shareable across tasks behind an `Arc`
#[derive(Debug, Default)]
pub struct InMemoryExecutionState {
    executed: RwLock<HashSet<String>>,
    group_choices: RwLock<HashMap<String, BTreeMap<String, i64>>>,
    source_infos: RwLock<HashMap<String, BTreeMap<String, SourceInfo>>>,
    intermediate: RwLock<HashMap<String, Map<String, Value>>>,
    breaks: RwLock<HashSet<String>>,
}

// A panic while holding a guard leaves the maps consistent, so poisoning is ignored
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl InMemoryExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes recorded as executed
    pub fn executed_count(&self) -> usize {
        read(&self.executed).len()
    }
}

impl ExecutionState for InMemoryExecutionState {
    fn mark_executed(&self, node_key: &str) {
        write(&self.executed).insert(node_key.to_string());
    }

    fn node_executed(&self, node_key: &str) -> bool {
        is_entry(node_key) || read(&self.executed).contains(node_key)
    }

    fn save_dynamic_choice(&self, node_key: &str, group_to_choice: BTreeMap<String, i64>) {
        let mut choices = write(&self.group_choices);
        if choices.contains_key(node_key) {
            log::warn!("dynamic choice of node {} already recorded, keeping the first", node_key);
            return;
        }
        choices.insert(node_key.to_string(), group_to_choice);
    }

    fn get_dynamic_choice(&self, node_key: &str) -> Option<BTreeMap<String, i64>> {
        read(&self.group_choices).get(node_key).cloned()
    }

    fn save_source_infos(&self, node_key: &str, infos: BTreeMap<String, SourceInfo>) {
        write(&self.source_infos).insert(node_key.to_string(), infos);
    }

    fn get_source_infos(&self, node_key: &str) -> Option<BTreeMap<String, SourceInfo>> {
        read(&self.source_infos).get(node_key).cloned()
    }

    fn init_intermediate(&self, scope: &str, vars: Map<String, Value>) {
        write(&self.intermediate).insert(scope.to_string(), vars);
        write(&self.breaks).remove(scope);
    }

    fn get_intermediate(&self, scope: &str, path: &[String]) -> Option<Value> {
        let scopes = read(&self.intermediate);
        let (root, rest) = path.split_first()?;
        let mut current = scopes.get(scope)?.get(root)?;
        for segment in rest {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    fn set_intermediate(&self, scope: &str, path: &[String], value: Value) -> Result<(), WorkflowError> {
        let mut scopes = write(&self.intermediate);
        let vars = scopes.get_mut(scope).ok_or_else(|| {
            WorkflowError::invalid_parameter(format!("loop {} has no intermediate variables", scope))
        })?;

        let (root, rest) = path
            .split_first()
            .ok_or_else(|| WorkflowError::invalid_parameter("empty intermediate variable path"))?;
        let mut current = vars.get_mut(root).ok_or_else(|| {
            WorkflowError::invalid_parameter(format!(
                "intermediate variable {} not found in loop {}",
                root, scope
            ))
        })?;

        for segment in rest {
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
            current = match current {
                Value::Object(obj) => obj.entry(segment.clone()).or_insert(Value::Null),
                _ => {
                    return Err(WorkflowError::invalid_parameter(format!(
                        "intermediate variable {} is not an object at {}",
                        path.join("."),
                        segment
                    )))
                }
            };
        }

        *current = value;
        Ok(())
    }

    fn set_break(&self, scope: &str) {
        write(&self.breaks).insert(scope.to_string());
    }

    fn has_break(&self, scope: &str) -> bool {
        read(&self.breaks).contains(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn path(p: &[&str]) -> Vec<String> {
        p.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_entry_always_executed() {
        let state = InMemoryExecutionState::new();
        assert!(state.node_executed("100001"));
        assert!(!state.node_executed("llm"));
        state.mark_executed("llm");
        assert!(state.node_executed("llm"));
    }

    #[test]
    fn test_dynamic_choice_write_once() {
        let state = InMemoryExecutionState::new();
        state.save_dynamic_choice("merge", BTreeMap::from([("g".to_string(), 1)]));
        state.save_dynamic_choice("merge", BTreeMap::from([("g".to_string(), 0)]));
        assert_eq!(state.get_dynamic_choice("merge").unwrap()["g"], 1);
    }

    #[test]
    fn test_intermediate_variables() {
        let state = InMemoryExecutionState::new();
        let vars = json!({"total": 0, "profile": null});
        state.init_intermediate("loop", vars.as_object().unwrap().clone());

        state.set_intermediate("loop", &path(&["total"]), json!(3)).unwrap();
        state
            .set_intermediate("loop", &path(&["profile", "name"]), json!("ada"))
            .unwrap();

        assert_eq!(state.get_intermediate("loop", &path(&["total"])), Some(json!(3)));
        assert_eq!(
            state.get_intermediate("loop", &path(&["profile", "name"])),
            Some(json!("ada"))
        );

        assert!(state.set_intermediate("loop", &path(&["missing"]), json!(1)).is_err());
        assert!(state.set_intermediate("other", &path(&["total"]), json!(1)).is_err());
        assert!(state
            .set_intermediate("loop", &path(&["total", "x"]), json!(1))
            .is_err());
    }

    #[test]
    fn test_break_flag_reset_on_init() {
        let state = InMemoryExecutionState::new();
        state.set_break("loop");
        assert!(state.has_break("loop"));
        state.init_intermediate("loop", Map::new());
        assert!(!state.has_break("loop"));
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let state = Arc::new(InMemoryExecutionState::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let state = Arc::clone(&state);
                tokio::spawn(async move { state.mark_executed(&format!("node_{}", i)) })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            result.unwrap();
        }
        assert_eq!(state.executed_count(), 8);
        assert!(state.node_executed("node_7"));
    }
}

// SPDX-License-Identifier: MIT

//! Clause algebra for branching nodes
//!
//! A `Selector` holds an ordered list of clause groups and picks the first
//! one that resolves true. When none match it returns the clause count,
//! which callers treat as the "else" branch.

mod clause;
mod operator;

pub use clause::{Clause, ClauseGroup, ClauseRelation, MultiClause};
pub use operator::{Operator, RuntimeType};

use crate::error::WorkflowError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    pub clauses: Vec<ClauseGroup>,
}

impl Selector {
    pub fn new(clauses: Vec<ClauseGroup>) -> Self {
        Self { clauses }
    }

    /// Index of the first group resolving true, or `len()` for else
    pub fn select(&self) -> Result<usize, WorkflowError> {
        for (i, group) in self.clauses.iter().enumerate() {
            if group.resolve()? {
                log::debug!("selector matched clause group {}", i);
                return Ok(i);
            }
        }
        Ok(self.clauses.len())
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn constant(result: bool) -> ClauseGroup {
        ClauseGroup::Single(Clause::unary(json!(result), Operator::IsTrue))
    }

    #[test]
    fn test_first_match_wins() {
        let selector = Selector::new(vec![constant(false), constant(true), constant(true)]);
        assert_eq!(selector.select().unwrap(), 1);
    }

    #[test]
    fn test_else_index() {
        let selector = Selector::new(vec![constant(false), constant(false)]);
        assert_eq!(selector.select().unwrap(), 2);
        assert_eq!(Selector::default().select().unwrap(), 0);
    }

    #[test]
    fn test_error_propagates() {
        let selector = Selector::new(vec![ClauseGroup::Single(Clause::new(
            json!({"a": 1}),
            Operator::Equal,
            json!({"a": 1}),
        ))]);
        assert!(selector.select().is_err());
    }
}

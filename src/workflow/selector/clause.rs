// SPDX-License-Identifier: MIT

//! Clause evaluation

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::operator::{Operator, RuntimeType};
use crate::error::WorkflowError;

/// A single typed predicate; a null right operand means "absent"
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub left: Value,
    pub op: Operator,
    pub right: Value,
}

/// How the children of a multi-clause combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClauseRelation {
    #[default]
    And,
    Or,
}

/// Several clauses joined by one relation
#[derive(Debug, Clone, PartialEq)]
pub struct MultiClause {
    pub clauses: Vec<Clause>,
    pub relation: ClauseRelation,
}

/// One selectable branch
#[derive(Debug, Clone, PartialEq)]
pub enum ClauseGroup {
    Single(Clause),
    Multi(MultiClause),
}

impl Clause {
    pub fn new(left: Value, op: Operator, right: Value) -> Self {
        Self { left, op, right }
    }

    /// Unary clause such as `empty` or `is_true`
    pub fn unary(left: Value, op: Operator) -> Self {
        Self::new(left, op, Value::Null)
    }

    pub fn resolve(&self) -> Result<bool, WorkflowError> {
        let left_type = RuntimeType::of(&self.left);
        let right_type = RuntimeType::of(&self.right);
        self.op.will_accept(left_type, right_type)?;

        let left = &self.left;
        let right = &self.right;

        let result = match self.op {
            Operator::Equal => loose_equal(left, right),
            Operator::NotEqual => !loose_equal(left, right),
            Operator::Empty => is_empty(left),
            Operator::NotEmpty => !is_empty(left),
            Operator::IsTrue => left.as_bool() == Some(true),
            Operator::IsFalse => left.as_bool() == Some(false),
            Operator::GreaterThan => compare(left, right).is_some_and(|o| o.is_gt()),
            Operator::GreaterThanOrEqual => compare(left, right).is_some_and(|o| o.is_ge()),
            Operator::LesserThan => compare(left, right).is_some_and(|o| o.is_lt()),
            Operator::LesserThanOrEqual => compare(left, right).is_some_and(|o| o.is_le()),
            Operator::LengthGreaterThan => length_of(left) > int_of(right),
            Operator::LengthGreaterThanOrEqual => length_of(left) >= int_of(right),
            Operator::LengthLesserThan => length_of(left) < int_of(right),
            Operator::LengthLesserThanOrEqual => length_of(left) <= int_of(right),
            Operator::Contain => contains(left, right),
            Operator::NotContain => left.is_null() || !contains(left, right),
            Operator::ContainKey => contains_key(left, right),
            Operator::NotContainKey => left.is_null() || !contains_key(left, right),
        };

        Ok(result)
    }
}

impl MultiClause {
    pub fn new(clauses: Vec<Clause>, relation: ClauseRelation) -> Self {
        Self { clauses, relation }
    }

    /// Short-circuits on the first false (AND) or first true (OR)
    pub fn resolve(&self) -> Result<bool, WorkflowError> {
        match self.relation {
            ClauseRelation::And => {
                for clause in &self.clauses {
                    if !clause.resolve()? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            ClauseRelation::Or => {
                for clause in &self.clauses {
                    if clause.resolve()? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

impl ClauseGroup {
    pub fn resolve(&self) -> Result<bool, WorkflowError> {
        match self {
            ClauseGroup::Single(c) => c.resolve(),
            ClauseGroup::Multi(m) => m.resolve(),
        }
    }
}

fn loose_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(_), Value::Number(_)) => compare(left, right).is_some_and(|o| o.is_eq()),
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_i64(), r.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => l.as_f64()?.partial_cmp(&r.as_f64()?),
        },
        _ => None,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty() || s == "None",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Bool(b) => !b,
    }
}

/// Length in characters for strings, elements for arrays; nil counts as zero
fn length_of(value: &Value) -> i64 {
    let len = match value {
        Value::String(s) => s.chars().count(),
        Value::Array(a) => a.len(),
        _ => 0,
    };
    i64::try_from(len).unwrap_or(i64::MAX)
}

fn int_of(value: &Value) -> i64 {
    value.as_i64().unwrap_or_default()
}

fn contains(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
        (Value::Array(items), _) => items.iter().any(|item| loose_equal(item, right)),
        _ => false,
    }
}

fn contains_key(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Object(map), Value::String(key)) => map.contains_key(key),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolve(left: Value, op: Operator, right: Value) -> bool {
        Clause::new(left, op, right).resolve().unwrap()
    }

    #[test]
    fn test_nil_equality() {
        assert!(resolve(json!(null), Operator::Equal, json!(null)));
        assert!(!resolve(json!(null), Operator::Equal, json!("x")));
        assert!(resolve(json!(null), Operator::NotEqual, json!("x")));
    }

    #[test]
    fn test_numeric_equality_crosses_int_and_float() {
        assert!(resolve(json!(1), Operator::Equal, json!(1.0)));
        assert!(!resolve(json!(1), Operator::Equal, json!(1.5)));
        assert!(resolve(json!("a"), Operator::NotEqual, json!("b")));
    }

    #[test]
    fn test_length_with_nil_left() {
        assert!(resolve(json!([]), Operator::LengthGreaterThanOrEqual, json!(0)));
        assert!(resolve(json!(null), Operator::LengthGreaterThanOrEqual, json!(0)));
        assert!(!resolve(json!(null), Operator::LengthGreaterThan, json!(0)));
        assert!(resolve(json!("héllo"), Operator::LengthLesserThanOrEqual, json!(5)));
        assert!(resolve(json!([1, 2, 3]), Operator::LengthGreaterThan, json!(2)));
    }

    #[test]
    fn test_ordering() {
        assert!(resolve(json!(7.5), Operator::GreaterThan, json!(5)));
        assert!(resolve(json!(5), Operator::GreaterThanOrEqual, json!(5)));
        assert!(resolve(json!(2), Operator::LesserThan, json!(2.5)));
        assert!(!resolve(json!(null), Operator::LesserThan, json!(2)));
        assert!(!resolve(json!(null), Operator::GreaterThan, json!(2)));
    }

    #[test]
    fn test_empty() {
        for v in [json!(null), json!(""), json!("None"), json!([]), json!({}), json!(0), json!(0.0), json!(false)] {
            assert!(Clause::unary(v.clone(), Operator::Empty).resolve().unwrap(), "{v}");
        }
        assert!(Clause::unary(json!("x"), Operator::NotEmpty).resolve().unwrap());
        assert!(Clause::unary(json!([0]), Operator::NotEmpty).resolve().unwrap());
    }

    #[test]
    fn test_bool_operators() {
        assert!(Clause::unary(json!(true), Operator::IsTrue).resolve().unwrap());
        assert!(Clause::unary(json!(false), Operator::IsFalse).resolve().unwrap());
        assert!(!Clause::unary(json!(null), Operator::IsTrue).resolve().unwrap());
        assert!(!Clause::unary(json!(null), Operator::IsFalse).resolve().unwrap());
    }

    #[test]
    fn test_contain() {
        assert!(resolve(json!("hello world"), Operator::Contain, json!("world")));
        assert!(resolve(json!(["bug", "urgent"]), Operator::Contain, json!("bug")));
        assert!(resolve(json!([1, 2.0]), Operator::Contain, json!(2)));
        assert!(!resolve(json!(null), Operator::Contain, json!("x")));
        assert!(resolve(json!(null), Operator::NotContain, json!("x")));
        assert!(resolve(json!(["a"]), Operator::NotContain, json!("b")));
    }

    #[test]
    fn test_contain_key() {
        assert!(resolve(json!({"a": 1}), Operator::ContainKey, json!("a")));
        assert!(!resolve(json!({"a": 1}), Operator::ContainKey, json!("b")));
        assert!(!resolve(json!(null), Operator::ContainKey, json!("a")));
        assert!(resolve(json!(null), Operator::NotContainKey, json!("a")));
    }

    #[test]
    fn test_type_mismatch_is_error() {
        let err = Clause::new(json!("a"), Operator::GreaterThan, json!(1))
            .resolve()
            .unwrap_err();
        assert!(matches!(err, WorkflowError::OperatorMismatch { .. }));
    }

    #[test]
    fn test_multi_clause_short_circuit() {
        // the second clause would fail the type check if evaluated
        let bad = Clause::new(json!("a"), Operator::GreaterThan, json!(1));

        let and = MultiClause::new(
            vec![Clause::new(json!(1), Operator::Equal, json!(2)), bad.clone()],
            ClauseRelation::And,
        );
        assert!(!and.resolve().unwrap());

        let or = MultiClause::new(
            vec![Clause::new(json!(1), Operator::Equal, json!(1)), bad],
            ClauseRelation::Or,
        );
        assert!(or.resolve().unwrap());
    }
}

// SPDX-License-Identifier: MIT

//! Selector operators and their operand type rules

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{CanvasError, WorkflowError};
use crate::workflow::canvas::VariableType;

/// Comparison applied by a single clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equal,
    NotEqual,
    LengthGreaterThan,
    LengthGreaterThanOrEqual,
    LengthLesserThan,
    LengthLesserThanOrEqual,
    Contain,
    NotContain,
    Empty,
    NotEmpty,
    IsTrue,
    IsFalse,
    GreaterThan,
    GreaterThanOrEqual,
    LesserThan,
    LesserThanOrEqual,
    ContainKey,
    NotContainKey,
}

/// Broad runtime category of an operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeType {
    Nil,
    Bool,
    Integer,
    Float,
    String,
    Array,
    Object,
}

impl RuntimeType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => RuntimeType::Nil,
            Value::Bool(_) => RuntimeType::Bool,
            Value::Number(n) if n.is_i64() || n.is_u64() => RuntimeType::Integer,
            Value::Number(_) => RuntimeType::Float,
            Value::String(_) => RuntimeType::String,
            Value::Array(_) => RuntimeType::Array,
            Value::Object(_) => RuntimeType::Object,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, RuntimeType::Integer | RuntimeType::Float)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeType::Nil => "nil",
            RuntimeType::Bool => "bool",
            RuntimeType::Integer => "integer",
            RuntimeType::Float => "float",
            RuntimeType::String => "string",
            RuntimeType::Array => "array",
            RuntimeType::Object => "object",
        }
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Operator {
    /// Map a canvas operator code onto an operator
    ///
    /// Contain and not-contain against an object operand test for keys.
    pub fn from_canvas(code: i64, left_type: Option<VariableType>) -> Result<Self, CanvasError> {
        let is_object = left_type == Some(VariableType::Object);
        let op = match code {
            1 => Operator::Equal,
            2 => Operator::NotEqual,
            3 => Operator::LengthGreaterThan,
            4 => Operator::LengthGreaterThanOrEqual,
            5 => Operator::LengthLesserThan,
            6 => Operator::LengthLesserThanOrEqual,
            7 if is_object => Operator::ContainKey,
            7 => Operator::Contain,
            8 if is_object => Operator::NotContainKey,
            8 => Operator::NotContain,
            9 => Operator::Empty,
            10 => Operator::NotEmpty,
            11 => Operator::IsTrue,
            12 => Operator::IsFalse,
            13 => Operator::GreaterThan,
            14 => Operator::GreaterThanOrEqual,
            15 => Operator::LesserThan,
            16 => Operator::LesserThanOrEqual,
            other => {
                return Err(CanvasError::schema(format!(
                    "unsupported condition operator: {}",
                    other
                )))
            }
        };
        Ok(op)
    }

    /// Whether the operator takes no right operand
    pub fn is_unary(&self) -> bool {
        matches!(
            self,
            Operator::Empty | Operator::NotEmpty | Operator::IsTrue | Operator::IsFalse
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equal => "equal",
            Operator::NotEqual => "not_equal",
            Operator::LengthGreaterThan => "length_greater_than",
            Operator::LengthGreaterThanOrEqual => "length_greater_than_or_equal",
            Operator::LengthLesserThan => "length_lesser_than",
            Operator::LengthLesserThanOrEqual => "length_lesser_than_or_equal",
            Operator::Contain => "contain",
            Operator::NotContain => "not_contain",
            Operator::Empty => "empty",
            Operator::NotEmpty => "not_empty",
            Operator::IsTrue => "is_true",
            Operator::IsFalse => "is_false",
            Operator::GreaterThan => "greater_than",
            Operator::GreaterThanOrEqual => "greater_than_or_equal",
            Operator::LesserThan => "lesser_than",
            Operator::LesserThanOrEqual => "lesser_than_or_equal",
            Operator::ContainKey => "contain_key",
            Operator::NotContainKey => "not_contain_key",
        }
    }

    /// Check the runtime operand types before evaluation
    ///
    /// A nil operand is accepted wherever the operator gives it a defined
    /// truth value.
    pub fn will_accept(&self, left: RuntimeType, right: RuntimeType) -> Result<(), WorkflowError> {
        use RuntimeType::*;

        let accepted = match self {
            Operator::Equal | Operator::NotEqual => {
                left == Nil
                    || right == Nil
                    || (left.is_numeric() && right.is_numeric())
                    || (left == right && matches!(left, Bool | String))
            }
            Operator::GreaterThan
            | Operator::GreaterThanOrEqual
            | Operator::LesserThan
            | Operator::LesserThanOrEqual => {
                (left == Nil || left.is_numeric()) && right.is_numeric()
            }
            Operator::Empty | Operator::NotEmpty => right == Nil,
            Operator::IsTrue | Operator::IsFalse => matches!(left, Bool | Nil) && right == Nil,
            Operator::LengthGreaterThan
            | Operator::LengthGreaterThanOrEqual
            | Operator::LengthLesserThan
            | Operator::LengthLesserThanOrEqual => {
                matches!(left, String | Array | Nil) && right == Integer
            }
            Operator::Contain | Operator::NotContain => match left {
                Nil | Array => true,
                String => right == String,
                _ => false,
            },
            Operator::ContainKey | Operator::NotContainKey => {
                matches!(left, Object | Nil) && right == String
            }
        };

        if accepted {
            Ok(())
        } else {
            Err(WorkflowError::OperatorMismatch {
                operator: self.as_str().to_string(),
                detail: format!("left operand {} with right operand {}", left, right),
            })
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use RuntimeType::*;

    #[test]
    fn test_runtime_type_of() {
        assert_eq!(RuntimeType::of(&json!(null)), Nil);
        assert_eq!(RuntimeType::of(&json!(3)), Integer);
        assert_eq!(RuntimeType::of(&json!(3.5)), Float);
        assert_eq!(RuntimeType::of(&json!({"a": 1})), Object);
        assert_eq!(RuntimeType::of(&json!([1])), Array);
    }

    #[test]
    fn test_from_canvas() {
        assert_eq!(Operator::from_canvas(1, None).unwrap(), Operator::Equal);
        assert_eq!(
            Operator::from_canvas(7, Some(VariableType::Object)).unwrap(),
            Operator::ContainKey
        );
        assert_eq!(
            Operator::from_canvas(8, Some(VariableType::List)).unwrap(),
            Operator::NotContain
        );
        assert_eq!(Operator::from_canvas(16, None).unwrap(), Operator::LesserThanOrEqual);
        assert!(Operator::from_canvas(17, None).is_err());
    }

    #[test]
    fn test_will_accept_equality() {
        assert!(Operator::Equal.will_accept(Integer, Integer).is_ok());
        assert!(Operator::Equal.will_accept(Integer, Float).is_ok());
        assert!(Operator::NotEqual.will_accept(Float, Float).is_ok());
        assert!(Operator::Equal.will_accept(Nil, String).is_ok());
        assert!(Operator::Equal.will_accept(Object, Object).is_err());
        assert!(Operator::Equal.will_accept(String, Integer).is_err());
    }

    #[test]
    fn test_will_accept_unary() {
        assert!(Operator::Empty.will_accept(Object, Nil).is_ok());
        assert!(Operator::Empty.will_accept(Object, Integer).is_err());
        assert!(Operator::NotEmpty.will_accept(Array, Nil).is_ok());
        assert!(Operator::IsTrue.will_accept(Bool, Nil).is_ok());
        assert!(Operator::IsTrue.will_accept(Bool, Integer).is_err());
        assert!(Operator::IsFalse.will_accept(Integer, Nil).is_err());
    }

    #[test]
    fn test_will_accept_ordering_and_length() {
        assert!(Operator::GreaterThan.will_accept(Integer, Integer).is_ok());
        assert!(Operator::LesserThanOrEqual.will_accept(Float, Float).is_ok());
        assert!(Operator::GreaterThan.will_accept(Object, Object).is_err());

        assert!(Operator::LengthGreaterThan.will_accept(String, Integer).is_ok());
        assert!(Operator::LengthGreaterThanOrEqual.will_accept(Array, Integer).is_ok());
        assert!(Operator::LengthLesserThan.will_accept(Integer, Integer).is_err());
        assert!(Operator::LengthLesserThanOrEqual.will_accept(Array, Float).is_err());
    }

    #[test]
    fn test_will_accept_contain() {
        assert!(Operator::Contain.will_accept(String, String).is_ok());
        assert!(Operator::Contain.will_accept(Array, Integer).is_ok());
        assert!(Operator::Contain.will_accept(Integer, Integer).is_err());
        assert!(Operator::NotContain.will_accept(String, Integer).is_err());
        assert!(Operator::ContainKey.will_accept(Object, String).is_ok());
        assert!(Operator::NotContainKey.will_accept(Object, Integer).is_err());
        assert!(Operator::ContainKey.will_accept(Array, String).is_err());
    }

    #[test]
    fn test_mismatch_message() {
        let err = Operator::GreaterThan.will_accept(String, Integer).unwrap_err();
        assert_eq!(
            err.to_string(),
            "operator greater_than does not accept left operand string with right operand integer"
        );
    }
}

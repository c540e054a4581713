// SPDX-License-Identifier: MIT

//! Database nodes: clause building and response formatting
//!
//! Query, update and delete nodes compile their condition list into a
//! `DbClauseGroup` stored on the node schema. At run time the right-hand
//! values are taken from the node input under `__condition_right_{i}` and the
//! fields to write under `__setting_field_{name}`. Rows coming back from the
//! store are reshaped against the declared `outputList` element type.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::take_map_value;
use crate::error::{CanvasError, WorkflowError};
use crate::workflow::canvas::model::{BlockInputValueType, DbCondition};
use crate::workflow::canvas::{block_input_to_field_info, block_input_to_type_info, Node, Param};
use crate::workflow::convert::{format_float, parse_bool, stringify};
use crate::workflow::schema::NodeSchema;
use crate::workflow::selector::ClauseRelation;
use crate::workflow::types::{DataType, TypeInfo};

pub const ROW_NUM_KEY: &str = "rowNum";
pub const OUTPUT_LIST_KEY: &str = "outputList";

const CONDITION_RIGHT_PREFIX: &str = "__condition_right_";
const SETTING_FIELD_PREFIX: &str = "__setting_field_";

/// Rendering of time cells
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Comparison applied by the store to one column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DbOperator {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    Like,
    NotLike,
}

impl DbOperator {
    /// Null checks compare against nothing
    pub fn takes_right(&self) -> bool {
        !matches!(self, DbOperator::IsNull | DbOperator::IsNotNull)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DbOperator::Equal => "EQUAL",
            DbOperator::NotEqual => "NOT_EQUAL",
            DbOperator::GreaterThan => "GREATER_THAN",
            DbOperator::LessThan => "LESS_THAN",
            DbOperator::GreaterEqual => "GREATER_EQUAL",
            DbOperator::LessEqual => "LESS_EQUAL",
            DbOperator::In => "IN",
            DbOperator::NotIn => "NOT_IN",
            DbOperator::IsNull => "IS_NULL",
            DbOperator::IsNotNull => "IS_NOT_NULL",
            DbOperator::Like => "LIKE",
            DbOperator::NotLike => "NOT_LIKE",
        }
    }
}

impl FromStr for DbOperator {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s {
            "EQUAL" => DbOperator::Equal,
            "NOT_EQUAL" => DbOperator::NotEqual,
            "GREATER_THAN" => DbOperator::GreaterThan,
            "LESS_THAN" => DbOperator::LessThan,
            "GREATER_EQUAL" => DbOperator::GreaterEqual,
            "LESS_EQUAL" => DbOperator::LessEqual,
            "IN" => DbOperator::In,
            "NOT_IN" => DbOperator::NotIn,
            "IS_NULL" => DbOperator::IsNull,
            "IS_NOT_NULL" => DbOperator::IsNotNull,
            "LIKE" => DbOperator::Like,
            "NOT_LIKE" => DbOperator::NotLike,
            other => {
                return Err(CanvasError::schema(format!(
                    "not a valid Operation string: {}",
                    other
                )))
            }
        };
        Ok(op)
    }
}

impl fmt::Display for DbOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relation of a multi-clause condition list; `AND` or `OR` on the canvas
pub fn relation_from_logic(logic: &str) -> Result<ClauseRelation, CanvasError> {
    match logic {
        "AND" => Ok(ClauseRelation::And),
        "OR" => Ok(ClauseRelation::Or),
        other => Err(CanvasError::schema(format!("logic type {} is invalid", other))),
    }
}

/// Compiled clause: a column compared by an operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbClause {
    pub left: String,
    pub operator: DbOperator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbClauseGroup {
    Single(DbClause),
    Multi {
        clauses: Vec<DbClause>,
        relation: ClauseRelation,
    },
}

/// Clause with its right-hand value bound, as handed to the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbConditionEntry {
    pub left: String,
    pub operator: DbOperator,
    pub right: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionGroup {
    pub conditions: Vec<DbConditionEntry>,
    pub relation: ClauseRelation,
}

/// What an update node writes and where
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateInventory {
    pub condition_group: ConditionGroup,
    pub fields: Map<String, Value>,
}

/// Compiled configuration of a database node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clause_group: Option<DbClauseGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

impl DatabaseConfig {
    pub fn from_schema(ns: &NodeSchema) -> Result<Self, WorkflowError> {
        let configs = ns
            .configs
            .as_ref()
            .ok_or_else(|| WorkflowError::invalid_config("config required"))?;
        serde_json::from_value(configs.clone())
            .map_err(|e| WorkflowError::invalid_config(format!("database config: {}", e)))
    }
}

fn literal_str<'a>(param: &'a Param, what: &str) -> Result<&'a str, CanvasError> {
    param
        .input
        .as_ref()
        .and_then(|i| i.value.as_ref())
        .filter(|v| v.value_type == BlockInputValueType::Literal)
        .and_then(|v| v.content.as_ref())
        .and_then(Value::as_str)
        .ok_or_else(|| CanvasError::schema(format!("{} clause must be a literal string", what)))
}

fn build_clause_from_params(params: &[Param]) -> Result<DbClause, CanvasError> {
    let left = params
        .iter()
        .find(|p| p.name == "left")
        .ok_or_else(|| CanvasError::schema("left clause is required"))?;
    let operation = params
        .iter()
        .find(|p| p.name == "operation")
        .ok_or_else(|| CanvasError::schema("operation clause is required"))?;

    Ok(DbClause {
        left: literal_str(left, "left")?.to_string(),
        operator: literal_str(operation, "operation")?.parse()?,
    })
}

/// Compile a canvas condition list
///
/// One entry becomes a single clause; otherwise `logic` decides the relation.
pub fn build_clause_group_from_condition(condition: &DbCondition) -> Result<DbClauseGroup, CanvasError> {
    if let [params] = condition.condition_list.as_slice() {
        return Ok(DbClauseGroup::Single(build_clause_from_params(params)?));
    }

    let relation = relation_from_logic(&condition.logic)?;
    let clauses = condition
        .condition_list
        .iter()
        .map(|params| build_clause_from_params(params))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DbClauseGroup::Multi { clauses, relation })
}

fn apply_condition_inputs(
    condition: &DbCondition,
    parent: Option<&Node>,
    ns: &mut NodeSchema,
) -> Result<(), CanvasError> {
    for (idx, params) in condition.condition_list.iter().enumerate() {
        let Some(right) = params.iter().find(|p| p.name == "right") else {
            continue;
        };
        let Some(input) = right.input.as_ref() else {
            continue;
        };

        let name = format!("{}{}", CONDITION_RIGHT_PREFIX, idx);
        ns.set_input_type(name.clone(), block_input_to_type_info(Some(input))?);
        ns.add_input_source(block_input_to_field_info(input, vec![name], parent)?);
    }
    Ok(())
}

fn apply_setting_fields(
    field_info: &[Vec<Param>],
    parent: Option<&Node>,
    ns: &mut NodeSchema,
) -> Result<(), CanvasError> {
    for pair in field_info {
        let [name_param, value_param, ..] = pair.as_slice() else {
            return Err(CanvasError::schema("field info must pair a name with a value"));
        };
        let field = literal_str(name_param, "field name")?;
        let Some(input) = value_param.input.as_ref() else {
            return Err(CanvasError::schema(format!("field {} has no value", field)));
        };

        let name = format!("{}{}", SETTING_FIELD_PREFIX, field);
        ns.set_input_type(name.clone(), block_input_to_type_info(Some(input))?);
        ns.add_input_source(block_input_to_field_info(input, vec![name], parent)?);
    }
    Ok(())
}

/// Declare condition right values and written fields as inputs, and store
/// the compiled clause group as the node config
pub fn adapt_database_inputs(node: &Node, parent: Option<&Node>, ns: &mut NodeSchema) -> Result<(), CanvasError> {
    let Some(inputs) = node.inputs() else {
        return Ok(());
    };
    let mut config = DatabaseConfig::default();

    if let Some(select) = inputs.select_param.as_ref() {
        config.limit = Some(select.limit);
        if let Some(condition) = select.condition.as_ref() {
            config.clause_group = Some(build_clause_group_from_condition(condition)?);
            apply_condition_inputs(condition, parent, ns)?;
        }
    }

    if let Some(insert) = inputs.insert_param.as_ref() {
        apply_setting_fields(&insert.field_info, parent, ns)?;
    }

    for param in [inputs.delete_param.as_ref(), inputs.update_param.as_ref()]
        .into_iter()
        .flatten()
    {
        config.clause_group = Some(build_clause_group_from_condition(&param.condition)?);
        apply_condition_inputs(&param.condition, parent, ns)?;
        apply_setting_fields(&param.field_info, parent, ns)?;
    }

    ns.configs = serde_json::to_value(&config).ok();
    Ok(())
}

fn take_right(input: &Map<String, Value>, idx: usize, clause: &DbClause, what: &str) -> Result<Value, WorkflowError> {
    if !clause.operator.takes_right() {
        return Ok(Value::Null);
    }
    let key = format!("{}{}", CONDITION_RIGHT_PREFIX, idx);
    take_map_value(input, &[&key])
        .cloned()
        .ok_or_else(|| WorkflowError::invalid_parameter(format!("cannot take {} clause from input", what)))
}

/// Bind right-hand values from the node input to a compiled clause group
pub fn convert_clause_group_to_condition_group(
    group: &DbClauseGroup,
    input: &Map<String, Value>,
) -> Result<ConditionGroup, WorkflowError> {
    match group {
        DbClauseGroup::Single(clause) => Ok(ConditionGroup {
            conditions: vec![DbConditionEntry {
                left: clause.left.clone(),
                operator: clause.operator,
                right: take_right(input, 0, clause, "single")?,
            }],
            relation: ClauseRelation::And,
        }),
        DbClauseGroup::Multi { clauses, relation } => {
            let conditions = clauses
                .iter()
                .enumerate()
                .map(|(idx, clause)| {
                    Ok(DbConditionEntry {
                        left: clause.left.clone(),
                        operator: clause.operator,
                        right: take_right(input, idx, clause, "multi")?,
                    })
                })
                .collect::<Result<Vec<_>, WorkflowError>>()?;
            Ok(ConditionGroup {
                conditions,
                relation: *relation,
            })
        }
    }
}

/// Fields an insert or update writes, with the input prefix removed
pub fn parse_setting_fields(input: &Map<String, Value>) -> Map<String, Value> {
    input
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(SETTING_FIELD_PREFIX)
                .map(|field| (field.to_string(), value.clone()))
        })
        .collect()
}

pub fn convert_clause_group_to_update_inventory(
    group: &DbClauseGroup,
    input: &Map<String, Value>,
) -> Result<UpdateInventory, WorkflowError> {
    Ok(UpdateInventory {
        condition_group: convert_clause_group_to_condition_group(group, input)?,
        fields: parse_setting_fields(input),
    })
}

/// One cell of a row returned by the store
#[derive(Debug, Clone, PartialEq)]
pub enum DbCell {
    Value(Value),
    Bytes(Vec<u8>),
    Time(DateTime<FixedOffset>),
}

impl From<Value> for DbCell {
    fn from(v: Value) -> Self {
        DbCell::Value(v)
    }
}

pub type DbObject = BTreeMap<String, DbCell>;

/// Rows returned by the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DbResponse {
    pub objects: Vec<DbObject>,
    pub row_number: Option<i64>,
}

fn cell_text(cell: &DbCell) -> Result<String, String> {
    match cell {
        DbCell::Bytes(b) => Ok(String::from_utf8_lossy(b).into_owned()),
        DbCell::Time(t) => Ok(t.format(TIME_FORMAT).to_string()),
        DbCell::Value(v) => stringify(v).ok_or_else(|| format!("unknown type: {}", v)),
    }
}

fn float_value(f: f64) -> Result<Value, String> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| format!("{} is not a finite number", f))
}

fn to_string_value(cell: &DbCell) -> Result<Value, String> {
    cell_text(cell).map(Value::String)
}

fn to_integer(cell: &DbCell) -> Result<Value, String> {
    match cell {
        DbCell::Time(_) => Err("type 'time' can't convert to int64".to_string()),
        DbCell::Value(Value::Number(n)) => Ok(match n.as_i64() {
            Some(i) => Value::from(i),
            None => Value::from(n.as_f64().unwrap_or_default().trunc() as i64),
        }),
        DbCell::Value(Value::Bool(_)) => Err("type 'bool' can't convert to int64".to_string()),
        DbCell::Value(Value::String(_)) | DbCell::Bytes(_) => {
            let text = cell_text(cell)?;
            text.parse::<i64>().map(Value::from).map_err(|e| e.to_string())
        }
        DbCell::Value(other) => Err(format!("unknown type: {}", other)),
    }
}

fn to_number(cell: &DbCell) -> Result<Value, String> {
    match cell {
        DbCell::Time(_) => Err("type 'time' can't convert to float64".to_string()),
        DbCell::Value(Value::Number(n)) => float_value(n.as_f64().unwrap_or_default()),
        DbCell::Value(Value::Bool(_)) => Err("type 'bool' can't convert to float64".to_string()),
        DbCell::Value(Value::String(_)) | DbCell::Bytes(_) => {
            let text = cell_text(cell)?;
            float_value(text.parse::<f64>().map_err(|e| e.to_string())?)
        }
        DbCell::Value(other) => Err(format!("unknown type: {}", other)),
    }
}

fn to_time(cell: &DbCell) -> Result<Value, String> {
    match cell {
        DbCell::Value(Value::Bool(b)) => Ok(Value::String(if *b { "1" } else { "0" }.to_string())),
        DbCell::Value(Value::Array(_)) | DbCell::Value(Value::Object(_)) => {
            Err("unknown type: container".to_string())
        }
        other => to_string_value(other),
    }
}

fn to_bool(cell: &DbCell) -> Result<Value, String> {
    if let DbCell::Value(Value::Bool(b)) = cell {
        return Ok(Value::Bool(*b));
    }
    let text = match cell {
        DbCell::Value(Value::Number(n)) if n.is_f64() => format_float(n.as_f64().unwrap_or_default()),
        other => cell_text(other)?,
    };
    parse_bool(&text)
        .map(Value::Bool)
        .ok_or_else(|| format!("invalid syntax: {}", text))
}

fn scalar(cell: &DbCell, data_type: DataType) -> Option<Result<Value, String>> {
    let converted = match data_type {
        DataType::String => to_string_value(cell),
        DataType::Integer => to_integer(cell),
        DataType::Number => to_number(cell),
        DataType::Boolean => to_bool(cell),
        DataType::Time => to_time(cell),
        _ => return None,
    };
    Some(converted)
}

/// Reshape one cell to its declared type
///
/// Failures are logged and yield null. Arrays are decoded from their text
/// form and elements that fail to convert are dropped. Objects are not a
/// column type and always yield null.
pub fn formatted(cell: &DbCell, ty: &TypeInfo) -> Value {
    if let Some(result) = scalar(cell, ty.data_type) {
        return result.unwrap_or_else(|e| {
            log::warn!("formatted {} error: {}", ty.data_type, e);
            Value::Null
        });
    }

    if ty.data_type != DataType::Array {
        return Value::Null;
    }

    let items = match cell_text(cell).map(|text| serde_json::from_str::<Vec<Value>>(&text)) {
        Ok(Ok(items)) => items,
        Ok(Err(e)) => {
            log::warn!("formatted array unmarshal error: {}", e);
            return Value::Array(Vec::new());
        }
        Err(e) => {
            log::warn!("formatted array error: {}", e);
            return Value::Array(Vec::new());
        }
    };

    let Some(elem) = ty.elem() else {
        return Value::Null;
    };

    if elem.data_type == DataType::Object {
        let result = if elem.properties.is_empty() {
            items.into_iter().filter(Value::is_object).collect()
        } else {
            items
                .into_iter()
                .map(|item| match item {
                    Value::Object(obj) => {
                        let row: DbObject = obj.into_iter().map(|(k, v)| (k, DbCell::Value(v))).collect();
                        Value::Object(object_formatted(&elem.properties, &row))
                    }
                    _ => Value::Object(elem.properties.keys().map(|k| (k.clone(), Value::Null)).collect()),
                })
                .collect()
        };
        return Value::Array(result);
    }

    let mut result = Vec::with_capacity(items.len());
    for item in items {
        match scalar(&DbCell::Value(item), elem.data_type) {
            Some(Ok(v)) => result.push(v),
            Some(Err(e)) => log::warn!("formatted {} failed: {}", elem.data_type, e),
            None => return Value::Null,
        }
    }
    Value::Array(result)
}

/// Reshape a row against declared properties
///
/// Without declared properties every cell is rendered as text. Declared
/// properties missing from the row, or null in it, come out as null.
pub fn object_formatted(props: &BTreeMap<String, TypeInfo>, object: &DbObject) -> Map<String, Value> {
    if props.is_empty() {
        let mut ret = Map::new();
        for (k, cell) in object {
            match to_string_value(cell) {
                Ok(v) => {
                    ret.insert(k.clone(), v);
                }
                Err(e) => log::warn!("formatted string error: {}", e),
            }
        }
        return ret;
    }

    props
        .iter()
        .map(|(k, ty)| {
            let value = match object.get(k) {
                Some(DbCell::Value(Value::Null)) | None => Value::Null,
                Some(cell) => formatted(cell, ty),
            };
            (k.clone(), value)
        })
        .collect()
}

/// Build the node output from store rows and the declared output types
pub fn response_formatted(
    config_output: &BTreeMap<String, TypeInfo>,
    response: &DbResponse,
) -> Result<Map<String, Value>, WorkflowError> {
    let list_type = config_output
        .get(OUTPUT_LIST_KEY)
        .ok_or_else(|| WorkflowError::invalid_config("outputList key is required"))?;

    if list_type.data_type != DataType::Array {
        return Err(WorkflowError::invalid_config(format!(
            "output list type info must array,but got {}",
            list_type.data_type
        )));
    }
    let elem = list_type.elem().ok_or_else(|| {
        WorkflowError::invalid_config(
            "output list must be an array and the array must contain element type info",
        )
    })?;
    if elem.data_type != DataType::Object {
        return Err(WorkflowError::invalid_config(format!(
            "output list must be an array and element must object, but got {}",
            elem.data_type
        )));
    }

    let list = response
        .objects
        .iter()
        .map(|object| Value::Object(object_formatted(&elem.properties, object)))
        .collect();

    let mut ret = Map::new();
    ret.insert(OUTPUT_LIST_KEY.to_string(), Value::Array(list));
    ret.insert(
        ROW_NUM_KEY.to_string(),
        response.row_number.map(Value::from).unwrap_or(Value::Null),
    );
    Ok(ret)
}

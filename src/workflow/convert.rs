// SPDX-License-Identifier: MIT

//! Conversion engine applied at every node boundary
//!
//! Values arrive as decoded JSON and are coerced against the node's declared
//! `TypeInfo`. Mismatches on scalar kinds are collected as warnings and the
//! field degrades to null; missing required fields and fail-fast mismatches
//! are hard errors.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::WorkflowError;
use crate::workflow::types::{DataType, TypeInfo};

/// A non-fatal mismatch between a value and its declared type
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionWarning {
    pub path: String,
    pub data_type: DataType,
    pub cause: String,
}

impl fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field {} is not {}", self.path, self.data_type)
    }
}

/// Warnings accumulated across a whole conversion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionWarnings(Vec<ConversionWarning>);

impl ConversionWarnings {
    fn single(path: &str, data_type: DataType, cause: impl Into<String>) -> Self {
        Self(vec![ConversionWarning {
            path: path.to_string(),
            data_type,
            cause: cause.into(),
        }])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversionWarning> {
        self.0.iter()
    }

    pub fn merge(&mut self, other: ConversionWarnings) {
        self.0.extend(other.0);
    }

    /// Escalate non-empty warnings into a warn-level error
    pub fn into_result(self) -> Result<(), WorkflowError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::ConversionWarnings(self))
        }
    }
}

impl fmt::Display for ConversionWarnings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(|w| w.to_string()).collect();
        f.write_str(&joined.join(", "))
    }
}

impl IntoIterator for ConversionWarnings {
    type Item = ConversionWarning;
    type IntoIter = std::vec::IntoIter<ConversionWarning>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Options controlling how strictly values are converted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Drop fields that have no declared type instead of passing them through
    pub skip_unknown_fields: bool,
    /// Turn every warning into a hard error
    pub fail_fast: bool,
    /// Do not enforce required fields
    pub skip_require_check: bool,
}

impl ConvertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_unknown_fields(mut self) -> Self {
        self.skip_unknown_fields = true;
        self
    }

    pub fn fail_fast(mut self) -> Self {
        self.fail_fast = true;
        self
    }

    pub fn skip_require_check(mut self) -> Self {
        self.skip_require_check = true;
        self
    }
}

/// Converted value plus the warnings raised while producing it
pub type Converted = (Value, ConversionWarnings);

/// Convert a node's whole input map against its declared input types
pub fn convert_inputs(
    input: &Map<String, Value>,
    types: &BTreeMap<String, TypeInfo>,
    options: &ConvertOptions,
) -> Result<(Map<String, Value>, ConversionWarnings), WorkflowError> {
    if input.is_empty() {
        if !options.skip_require_check {
            if let Some((name, _)) = types.iter().find(|(_, t)| t.required) {
                return Err(WorkflowError::missing_required(name.clone()));
            }
        }
        return Ok((Map::new(), ConversionWarnings::default()));
    }

    let mut out = Map::new();
    let mut warnings = ConversionWarnings::default();

    for (key, value) in input {
        let Some(info) = types.get(key) else {
            log::warn!("input {} not found in type info", key);
            if !options.skip_unknown_fields {
                out.insert(key.clone(), value.clone());
            }
            continue;
        };

        let (converted, ws) = convert(value, key, info, options).map_err(|e| match e {
            WorkflowError::MissingRequiredParam { .. } | WorkflowError::InvalidParameter(_) => e,
            other => WorkflowError::invalid_parameter(other.to_string()),
        })?;
        warnings.merge(ws);
        out.insert(key.clone(), converted);
    }

    if !options.skip_require_check {
        for (key, info) in types {
            if info.required && !out.contains_key(key) {
                return Err(WorkflowError::missing_required(key.clone()));
            }
        }
    }

    Ok((out, warnings))
}

/// Convert a single value at `path` against `info`
///
/// Null is valid for every type and stays null.
pub fn convert(
    value: &Value,
    path: &str,
    info: &TypeInfo,
    options: &ConvertOptions,
) -> Result<Converted, WorkflowError> {
    if value.is_null() {
        return Ok((Value::Null, ConversionWarnings::default()));
    }

    match info.data_type {
        DataType::String | DataType::File | DataType::Time => convert_to_string(value, path, options),
        DataType::Integer => convert_to_integer(value, path, options),
        DataType::Number => convert_to_number(value, path, options),
        DataType::Boolean => convert_to_boolean(value, path, options),
        DataType::Object => convert_to_object(value, path, info, options),
        DataType::Array => convert_to_array(value, path, info, options),
    }
}

/// Name of a value's runtime kind, used in diagnostics
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float64",
        Value::Number(_) => "int64",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Format a float without exponent and without a trailing `.0`
pub fn format_float(f: f64) -> String {
    format!("{}", f)
}

/// Render a scalar or container as text the way string conversion does
pub fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(format_number(n)),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).ok(),
        Value::Null => None,
    }
}

fn format_number(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        i.to_string()
    } else if let Some(u) = n.as_u64() {
        u.to_string()
    } else {
        format_float(n.as_f64().unwrap_or_default())
    }
}

/// Parse a boolean the way the canvas runtime accepts it
pub fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn mismatch(
    path: &str,
    data_type: DataType,
    cause: String,
    options: &ConvertOptions,
) -> Result<Converted, WorkflowError> {
    if options.fail_fast {
        return Err(WorkflowError::invalid_parameter(format!("{}: {}", path, cause)));
    }
    Ok((Value::Null, ConversionWarnings::single(path, data_type, cause)))
}

/// Coerce any value to its string representation
///
/// Containers become their JSON encoding, floats are printed without exponent.
pub fn convert_to_string(
    value: &Value,
    path: &str,
    options: &ConvertOptions,
) -> Result<Converted, WorkflowError> {
    match value {
        Value::Array(_) | Value::Object(_) => match serde_json::to_string(value) {
            Ok(s) => Ok((Value::String(s), ConversionWarnings::default())),
            Err(e) if options.fail_fast => Err(WorkflowError::Serialization(e.to_string())),
            Err(e) => Ok((
                Value::Null,
                ConversionWarnings::single(path, DataType::String, e.to_string()),
            )),
        },
        other => match stringify(other) {
            Some(s) => Ok((Value::String(s), ConversionWarnings::default())),
            None => mismatch(
                path,
                DataType::String,
                format!("unsupported type to convert to string: {}", value_kind(other)),
                options,
            ),
        },
    }
}

fn convert_to_integer(value: &Value, path: &str, options: &ConvertOptions) -> Result<Converted, WorkflowError> {
    match value {
        Value::Number(n) => {
            let i = match n.as_i64() {
                Some(i) => i,
                None => n.as_f64().unwrap_or_default().trunc() as i64,
            };
            Ok((Value::from(i), ConversionWarnings::default()))
        }
        Value::String(s) => match s.parse::<i64>() {
            Ok(i) => Ok((Value::from(i), ConversionWarnings::default())),
            Err(e) => mismatch(
                path,
                DataType::Integer,
                format!("parsing {:?}: {}", s, e),
                options,
            ),
        },
        other => mismatch(
            path,
            DataType::Integer,
            format!("unsupported type to convert to int64: {}", value_kind(other)),
            options,
        ),
    }
}

fn convert_to_number(value: &Value, path: &str, options: &ConvertOptions) -> Result<Converted, WorkflowError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| "number out of range".to_string()),
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|e| format!("parsing {:?}: {}", s, e)),
        other => Err(format!(
            "unsupported type to convert to float64: {}",
            value_kind(other)
        )),
    };

    match parsed.and_then(|f| Number::from_f64(f).ok_or_else(|| format!("value {} out of range", f))) {
        Ok(n) => Ok((Value::Number(n), ConversionWarnings::default())),
        Err(cause) => mismatch(path, DataType::Number, cause, options),
    }
}

fn convert_to_boolean(value: &Value, path: &str, options: &ConvertOptions) -> Result<Converted, WorkflowError> {
    match value {
        Value::Bool(b) => Ok((Value::Bool(*b), ConversionWarnings::default())),
        Value::String(s) => match parse_bool(s) {
            Some(b) => Ok((Value::Bool(b), ConversionWarnings::default())),
            None => mismatch(
                path,
                DataType::Boolean,
                format!("parsing {:?}: invalid syntax", s),
                options,
            ),
        },
        other => mismatch(
            path,
            DataType::Boolean,
            format!("unsupported type to convert to bool: {}", value_kind(other)),
            options,
        ),
    }
}

fn decode_container(
    value: &Value,
    path: &str,
    data_type: DataType,
    options: &ConvertOptions,
) -> Result<Result<Value, ConversionWarnings>, WorkflowError> {
    let expected_object = data_type == DataType::Object;
    let decoded = match value {
        Value::Object(_) if expected_object => return Ok(Ok(value.clone())),
        Value::Array(_) if !expected_object => return Ok(Ok(value.clone())),
        Value::String(s) => serde_json::from_str::<Value>(s).map_err(|e| e.to_string()),
        other => {
            let cause = format!(
                "unsupported type to convert to {}: {}",
                if expected_object { "object" } else { "array" },
                value_kind(other)
            );
            if options.fail_fast {
                return Err(WorkflowError::invalid_parameter(format!("{}: {}", path, cause)));
            }
            return Ok(Err(ConversionWarnings::single(path, data_type, cause)));
        }
    };

    let decoded = decoded.and_then(|v| match (&v, expected_object) {
        (Value::Object(_), true) | (Value::Array(_), false) => Ok(v),
        _ => Err(format!("decoded {} is not {}", value_kind(&v), data_type)),
    });

    match decoded {
        Ok(v) => Ok(Ok(v)),
        Err(cause) if options.fail_fast => Err(WorkflowError::Serialization(format!("{}: {}", path, cause))),
        Err(cause) => Ok(Err(ConversionWarnings::single(path, data_type, cause))),
    }
}

fn convert_to_object(
    value: &Value,
    path: &str,
    info: &TypeInfo,
    options: &ConvertOptions,
) -> Result<Converted, WorkflowError> {
    let map = match decode_container(value, path, DataType::Object, options)? {
        Ok(Value::Object(map)) => map,
        Ok(_) => return Ok((Value::Null, ConversionWarnings::default())),
        Err(warnings) => return Ok((Value::Null, warnings)),
    };

    if map.is_empty() {
        if !options.skip_require_check {
            if let Some((name, _)) = info.properties.iter().find(|(_, p)| p.required) {
                return Err(WorkflowError::missing_required(format!("{}.{}", path, name)));
            }
        }
        return Ok((Value::Object(map), ConversionWarnings::default()));
    }

    let mut out = Map::new();
    let mut warnings = ConversionWarnings::default();

    for (key, v) in map {
        let Some(prop) = info.properties.get(&key) else {
            log::warn!("input {}.{} not found in type info", path, key);
            if !options.skip_unknown_fields {
                out.insert(key, v);
            }
            continue;
        };

        let prop_path = format!("{}.{}", path, key);
        let (converted, ws) = convert(&v, &prop_path, prop, options)?;
        warnings.merge(ws);
        out.insert(key, converted);
    }

    if !options.skip_require_check {
        for (key, prop) in &info.properties {
            if prop.required && !out.contains_key(key) {
                return Err(WorkflowError::missing_required(format!("{}.{}", path, key)));
            }
        }
    }

    Ok((Value::Object(out), warnings))
}

fn convert_to_array(
    value: &Value,
    path: &str,
    info: &TypeInfo,
    options: &ConvertOptions,
) -> Result<Converted, WorkflowError> {
    let items = match decode_container(value, path, DataType::Array, options)? {
        Ok(Value::Array(items)) => items,
        Ok(_) => Vec::new(),
        Err(warnings) => return Ok((Value::Array(Vec::new()), warnings)),
    };

    let Some(elem) = info.elem() else {
        return Ok((Value::Array(items), ConversionWarnings::default()));
    };

    let mut out = Vec::with_capacity(items.len());
    let mut warnings = ConversionWarnings::default();

    for (i, item) in items.iter().enumerate() {
        let elem_path = format!("{}.{}", path, i);
        let (converted, ws) = convert(item, &elem_path, elem, options)?;
        if ws.is_empty() {
            out.push(converted);
        } else {
            // partially converted objects are kept, other warned elements are dropped
            if elem.data_type == DataType::Object {
                out.push(converted);
            }
            warnings.merge(ws);
        }
    }

    Ok((Value::Array(out), warnings))
}

// SPDX-License-Identifier: MIT

//! JSON serialization and deserialization nodes

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::WorkflowError;
use crate::workflow::convert::{convert, ConversionWarnings, ConvertOptions};
use crate::workflow::schema::NodeSchema;
use crate::workflow::types::TypeInfo;

pub const INPUT_KEY: &str = "input";
pub const OUTPUT_KEY: &str = "output";

/// Encodes its `input` field as a JSON string
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    /// A missing input encodes as `null`
    pub fn invoke(&self, input: &Map<String, Value>) -> Result<Map<String, Value>, WorkflowError> {
        let value = input.get(INPUT_KEY).unwrap_or(&Value::Null);
        let encoded = serde_json::to_string(value)
            .map_err(|e| WorkflowError::Serialization(e.to_string()))?;

        let mut out = Map::new();
        out.insert(OUTPUT_KEY.to_string(), Value::String(encoded));
        Ok(out)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeserializationConfig {
    pub output_fields: BTreeMap<String, TypeInfo>,
}

/// Decodes the JSON string in `input` against the declared `output` type
#[derive(Debug, Clone, PartialEq)]
pub struct JsonDeserializer {
    output_type: TypeInfo,
}

impl JsonDeserializer {
    pub fn new(config: Option<&DeserializationConfig>) -> Result<Self, WorkflowError> {
        let config = config.ok_or_else(|| WorkflowError::invalid_config("config required"))?;
        if config.output_fields.is_empty() {
            return Err(WorkflowError::invalid_config("OutputFields is required"));
        }
        let output_type = config.output_fields.get(OUTPUT_KEY).ok_or_else(|| {
            WorkflowError::invalid_config("no output field specified in deserialization config")
        })?;

        Ok(Self {
            output_type: output_type.clone(),
        })
    }

    pub fn from_schema(ns: &NodeSchema) -> Result<Self, WorkflowError> {
        Self::new(Some(&DeserializationConfig {
            output_fields: ns.output_types.clone(),
        }))
    }

    /// Decode and convert; type mismatches come back as warnings next to the
    /// partial output, malformed JSON is a hard error
    pub fn invoke(&self, input: &Map<String, Value>) -> Result<(Map<String, Value>, ConversionWarnings), WorkflowError> {
        let raw = match input.get(INPUT_KEY) {
            Some(Value::String(s)) => s.as_str(),
            Some(other) => {
                return Err(WorkflowError::invalid_parameter(format!(
                    "input must be a JSON string, got {}",
                    crate::workflow::convert::value_kind(other)
                )))
            }
            None => return Err(WorkflowError::missing_required(INPUT_KEY)),
        };

        let decoded: Value = serde_json::from_str(raw)
            .map_err(|e| WorkflowError::Serialization(format!("failed to unmarshal input: {}", e)))?;

        let (converted, warnings) = convert(&decoded, OUTPUT_KEY, &self.output_type, &ConvertOptions::default())?;
        if !warnings.is_empty() {
            log::warn!("json deserialization produced {} warnings: {}", warnings.len(), warnings);
        }

        let mut out = Map::new();
        out.insert(OUTPUT_KEY.to_string(), converted);
        Ok((out, warnings))
    }

    /// Like `invoke`, but turns warnings into a warn-level error
    pub fn invoke_strict(&self, input: &Map<String, Value>) -> Result<Map<String, Value>, WorkflowError> {
        let (out, warnings) = self.invoke(input)?;
        warnings.into_result()?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deserializer(output: TypeInfo) -> JsonDeserializer {
        JsonDeserializer::new(Some(&DeserializationConfig {
            output_fields: BTreeMap::from([(OUTPUT_KEY.to_string(), output)]),
        }))
        .unwrap()
    }

    fn run(d: &JsonDeserializer, raw: &str) -> Result<(Value, usize), WorkflowError> {
        let input = json!({"input": raw});
        let (out, warnings) = d.invoke(input.as_object().unwrap())?;
        Ok((out[OUTPUT_KEY].clone(), warnings.len()))
    }

    #[test]
    fn test_config_errors() {
        let err = JsonDeserializer::new(None).unwrap_err();
        assert!(err.to_string().contains("config required"));

        let err = JsonDeserializer::new(Some(&DeserializationConfig::default())).unwrap_err();
        assert!(err.to_string().contains("OutputFields is required"));

        let config = DeserializationConfig {
            output_fields: BTreeMap::from([("testKey".to_string(), TypeInfo::string())]),
        };
        let err = JsonDeserializer::new(Some(&config)).unwrap_err();
        assert!(err.to_string().contains("no output field specified in deserialization config"));
    }

    #[test]
    fn test_serializer() {
        let input = json!({"input": {"b": [1, 2], "a": "x"}});
        let out = JsonSerializer.invoke(input.as_object().unwrap()).unwrap();
        assert_eq!(out[OUTPUT_KEY], json!(r#"{"a":"x","b":[1,2]}"#));

        let out = JsonSerializer.invoke(&Map::new()).unwrap();
        assert_eq!(out[OUTPUT_KEY], json!("null"));
    }

    #[test]
    fn test_scalars() {
        assert_eq!(run(&deserializer(TypeInfo::string()), r#""test string""#).unwrap(), (json!("test string"), 0));
        assert_eq!(run(&deserializer(TypeInfo::integer()), "123").unwrap(), (json!(123), 0));
        assert_eq!(run(&deserializer(TypeInfo::integer()), r#""123""#).unwrap(), (json!(123), 0));
        assert_eq!(run(&deserializer(TypeInfo::integer()), "123.5").unwrap(), (json!(123), 0));
        assert_eq!(run(&deserializer(TypeInfo::boolean()), r#""true""#).unwrap(), (json!(true), 0));
        assert_eq!(run(&deserializer(TypeInfo::string()), "null").unwrap(), (Value::Null, 0));
    }

    #[test]
    fn test_mismatch_warnings() {
        assert_eq!(run(&deserializer(TypeInfo::integer()), r#""not a number""#).unwrap(), (Value::Null, 1));
        assert_eq!(run(&deserializer(TypeInfo::integer()), "true").unwrap(), (Value::Null, 1));
        assert_eq!(run(&deserializer(TypeInfo::integer()), r#""123abc""#).unwrap(), (Value::Null, 1));

        let nested = deserializer(TypeInfo::object([("score", TypeInfo::integer())]));
        assert_eq!(run(&nested, r#"{"score":"invalid"}"#).unwrap(), (json!({"score": null}), 1));
    }

    #[test]
    fn test_containers() {
        let object = deserializer(TypeInfo::object([
            ("name", TypeInfo::string().required()),
            ("age", TypeInfo::integer()),
        ]));
        assert_eq!(
            run(&object, r#"{"name":"test","age":"20"}"#).unwrap(),
            (json!({"name": "test", "age": 20}), 0)
        );

        let ints = deserializer(TypeInfo::array(TypeInfo::integer()));
        assert_eq!(run(&ints, r#"["1", "2", "3"]"#).unwrap(), (json!([1, 2, 3]), 0));

        let rows = deserializer(TypeInfo::array(TypeInfo::object([
            ("id", TypeInfo::integer()),
            ("name", TypeInfo::string()),
        ])));
        assert_eq!(
            run(&rows, r#"[{"id":1,"name":"a"},{"id":2,"name":"b"}]"#).unwrap(),
            (json!([{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]), 0)
        );
    }

    #[test]
    fn test_invalid_json_is_hard_error() {
        let err = run(&deserializer(TypeInfo::string()), "{invalid json}").unwrap_err();
        assert!(matches!(err, WorkflowError::Serialization(_)));
    }

    #[test]
    fn test_strict_escalates_warnings() {
        let d = deserializer(TypeInfo::integer());
        let input = json!({"input": "\"abc\""});
        let err = d.invoke_strict(input.as_object().unwrap()).unwrap_err();
        assert!(err.is_warning());
    }
}

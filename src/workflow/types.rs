// SPDX-License-Identifier: MIT

//! Type system for node inputs and outputs
//!
//! `TypeInfo` is a recursive schema built once when a canvas node is adapted.
//! It is consumed by the conversion engine and projected to JSON Schema for
//! tooling that needs to describe a node's fields.

use schemars::schema::{
    ArrayValidation, InstanceType, Metadata, ObjectValidation, RootSchema, Schema, SchemaObject,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Broad data type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    Integer,
    Number,
    Boolean,
    Time,
    File,
    Object,
    #[serde(rename = "list", alias = "array")]
    Array,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Integer => "integer",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Time => "time",
            DataType::File => "file",
            DataType::Object => "object",
            DataType::Array => "list",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-type of a file field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSubType {
    Default,
    Image,
    Svg,
    Audio,
    Video,
    Voice,
    #[serde(rename = "doc")]
    Document,
    Ppt,
    Excel,
    Txt,
    Code,
    Zip,
}

impl FileSubType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileSubType::Default => "default",
            FileSubType::Image => "image",
            FileSubType::Svg => "svg",
            FileSubType::Audio => "audio",
            FileSubType::Video => "video",
            FileSubType::Voice => "voice",
            FileSubType::Document => "doc",
            FileSubType::Ppt => "ppt",
            FileSubType::Excel => "excel",
            FileSubType::Txt => "txt",
            FileSubType::Code => "code",
            FileSubType::Zip => "zip",
        }
    }
}

/// Recursive field schema
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TypeInfo {
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elem_type_info: Option<Box<TypeInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileSubType>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub desc: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, TypeInfo>,
}

impl TypeInfo {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            ..Default::default()
        }
    }

    pub fn string() -> Self {
        Self::new(DataType::String)
    }

    pub fn integer() -> Self {
        Self::new(DataType::Integer)
    }

    pub fn number() -> Self {
        Self::new(DataType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(DataType::Boolean)
    }

    pub fn time() -> Self {
        Self::new(DataType::Time)
    }

    pub fn file(sub_type: FileSubType) -> Self {
        Self {
            data_type: DataType::File,
            file_type: Some(sub_type),
            ..Default::default()
        }
    }

    pub fn object<I, K>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, TypeInfo)>,
        K: Into<String>,
    {
        Self {
            data_type: DataType::Object,
            properties: properties.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            ..Default::default()
        }
    }

    pub fn array(elem: TypeInfo) -> Self {
        Self {
            data_type: DataType::Array,
            elem_type_info: Some(Box::new(elem)),
            ..Default::default()
        }
    }

    /// Mark the field as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    /// Element type of an array, if declared
    pub fn elem(&self) -> Option<&TypeInfo> {
        self.elem_type_info.as_deref()
    }

    /// Default value used when a field has no value
    pub fn zero(&self) -> Value {
        match self.data_type {
            DataType::String | DataType::Time | DataType::File => json!(""),
            DataType::Integer => json!(0),
            DataType::Number => json!(0.0),
            DataType::Boolean => json!(false),
            DataType::Object | DataType::Array => Value::Null,
        }
    }

    /// Follow a property path through nested objects
    pub fn lookup<'a, S: AsRef<str>>(&'a self, path: &[S]) -> Option<&'a TypeInfo> {
        let mut current = self;
        for segment in path {
            current = current.properties.get(segment.as_ref())?;
        }
        Some(current)
    }

    /// Project this type onto a JSON Schema object
    pub fn to_json_schema(&self) -> SchemaObject {
        let mut sc = SchemaObject::default();

        let instance_type = match self.data_type {
            DataType::String | DataType::Time | DataType::File => InstanceType::String,
            DataType::Integer => InstanceType::Integer,
            DataType::Number => InstanceType::Number,
            DataType::Boolean => InstanceType::Boolean,
            DataType::Object => InstanceType::Object,
            DataType::Array => InstanceType::Array,
        };
        sc.instance_type = Some(instance_type.into());

        match self.data_type {
            DataType::Time => sc.format = Some("date-time".to_string()),
            DataType::File => {
                sc.format = Some("uri".to_string());
                if let Some(ft) = self.file_type {
                    sc.extensions
                        .insert("x-file-type".to_string(), json!(ft.as_str()));
                }
            }
            _ => {}
        }

        if !self.desc.is_empty() {
            sc.metadata = Some(Box::new(Metadata {
                description: Some(self.desc.clone()),
                ..Default::default()
            }));
        }

        if self.data_type == DataType::Array {
            if let Some(elem) = self.elem() {
                sc.array = Some(Box::new(ArrayValidation {
                    items: Some(Schema::Object(elem.to_json_schema()).into()),
                    ..Default::default()
                }));
            }
        }

        if self.data_type == DataType::Object && !self.properties.is_empty() {
            let mut object = ObjectValidation::default();
            for (name, prop) in &self.properties {
                object
                    .properties
                    .insert(name.clone(), Schema::Object(prop.to_json_schema()));
                if prop.required {
                    object.required.insert(name.clone());
                }
            }
            sc.object = Some(Box::new(object));
        }

        sc
    }
}

/// Build a root JSON Schema describing a map of named fields
pub fn fields_to_json_schema(fields: &BTreeMap<String, TypeInfo>, title: Option<&str>) -> RootSchema {
    let mut object = ObjectValidation::default();
    for (name, info) in fields {
        object
            .properties
            .insert(name.clone(), Schema::Object(info.to_json_schema()));
        if info.required {
            object.required.insert(name.clone());
        }
    }

    let metadata = title.map(|t| {
        Box::new(Metadata {
            title: Some(t.to_string()),
            ..Default::default()
        })
    });

    RootSchema {
        schema: SchemaObject {
            metadata,
            instance_type: Some(InstanceType::Object.into()),
            object: Some(Box::new(object)),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values() {
        assert_eq!(TypeInfo::string().zero(), json!(""));
        assert_eq!(TypeInfo::integer().zero(), json!(0));
        assert_eq!(TypeInfo::number().zero(), json!(0.0));
        assert_eq!(TypeInfo::boolean().zero(), json!(false));
        assert_eq!(TypeInfo::time().zero(), json!(""));
        assert_eq!(TypeInfo::file(FileSubType::Image).zero(), json!(""));
        assert_eq!(TypeInfo::object(Vec::<(String, TypeInfo)>::new()).zero(), Value::Null);
        assert_eq!(TypeInfo::array(TypeInfo::string()).zero(), Value::Null);
    }

    #[test]
    fn test_serde_shape() {
        let info = TypeInfo::array(TypeInfo::object([("name", TypeInfo::string().required())]));
        let encoded = serde_json::to_value(&info).unwrap();
        assert_eq!(
            encoded,
            json!({
                "type": "list",
                "elem_type_info": {
                    "type": "object",
                    "properties": {"name": {"type": "string", "required": true}}
                }
            })
        );

        let decoded: TypeInfo =
            serde_json::from_value(json!({"type": "file", "file_type": "doc"})).unwrap();
        assert_eq!(decoded, TypeInfo::file(FileSubType::Document));
    }

    #[test]
    fn test_lookup() {
        let info = TypeInfo::object([(
            "user",
            TypeInfo::object([("age", TypeInfo::integer())]),
        )]);
        assert_eq!(info.lookup(&["user", "age"]), Some(&TypeInfo::integer()));
        assert!(info.lookup(&["user", "name"]).is_none());
    }

    #[test]
    fn test_json_schema_projection() {
        let info = TypeInfo::object([
            ("created", TypeInfo::time()),
            ("avatar", TypeInfo::file(FileSubType::Image)),
            ("tags", TypeInfo::array(TypeInfo::string()).with_desc("labels")),
            ("name", TypeInfo::string().required()),
        ]);
        let schema = serde_json::to_value(info.to_json_schema()).unwrap();

        assert_eq!(schema["type"], json!("object"));
        assert_eq!(schema["properties"]["created"]["format"], json!("date-time"));
        assert_eq!(schema["properties"]["avatar"]["format"], json!("uri"));
        assert_eq!(schema["properties"]["avatar"]["x-file-type"], json!("image"));
        assert_eq!(schema["properties"]["tags"]["items"]["type"], json!("string"));
        assert_eq!(schema["properties"]["tags"]["description"], json!("labels"));
        assert_eq!(schema["required"], json!(["name"]));
    }

    #[test]
    fn test_fields_to_json_schema() {
        let mut fields = BTreeMap::new();
        fields.insert("count".to_string(), TypeInfo::integer().required());
        let root = fields_to_json_schema(&fields, Some("Inputs"));
        let value = serde_json::to_value(root).unwrap();
        assert_eq!(value["title"], json!("Inputs"));
        assert_eq!(value["properties"]["count"]["type"], json!("integer"));
        assert_eq!(value["required"], json!(["count"]));
    }
}

// SPDX-License-Identifier: MIT

//! Compiled per-node schema
//!
//! A `NodeSchema` is the immutable artifact produced when a canvas node is
//! adapted: declared input/output types, where each input field's value comes
//! from, and the stream provenance of those fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::workflow::canvas::BlockType;
use crate::workflow::types::{fields_to_json_schema, DataType, TypeInfo};
use schemars::schema::RootSchema;

/// Identifier of a node within a workflow
pub type NodeKey = String;

/// Field path inside a node's input or output map
pub type FieldPath = Vec<String>;

/// Key of the workflow entry node
pub const ENTRY_NODE_KEY: &str = "100001";

/// Key of the workflow exit node
pub const EXIT_NODE_KEY: &str = "900001";

/// Whether a field's value arrives as a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStreamType {
    #[default]
    NotStream,
    IsStream,
    /// Only known once the producing node has run
    MaybeStream,
    /// The producing node did not execute on this run
    Skipped,
}

/// Scope of a variable reference that does not point at a node output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlobalVarType {
    #[serde(rename = "parent_intermediate")]
    ParentIntermediate,
    #[serde(rename = "global_user")]
    GlobalUser,
    #[serde(rename = "global_system")]
    GlobalSystem,
    #[serde(rename = "global_app")]
    GlobalApp,
}

impl GlobalVarType {
    pub fn is_global(&self) -> bool {
        !matches!(self, GlobalVarType::ParentIntermediate)
    }
}

/// A pointer to another node's output, or to a variable scope
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from_node_key: NodeKey,
    pub from_path: FieldPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_type: Option<GlobalVarType>,
}

impl Reference {
    pub fn node_output(from_node_key: impl Into<NodeKey>, from_path: FieldPath) -> Self {
        Self {
            from_node_key: from_node_key.into(),
            from_path,
            variable_type: None,
        }
    }

    pub fn variable(variable_type: GlobalVarType, from_path: FieldPath) -> Self {
        Self {
            from_node_key: NodeKey::new(),
            from_path,
            variable_type: Some(variable_type),
        }
    }
}

/// Either a literal value or a reference
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldSource {
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<Value>,
}

/// Binding of one input (or composite output) path to its source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub path: FieldPath,
    pub source: FieldSource,
}

impl FieldInfo {
    pub fn literal(path: FieldPath, val: Value) -> Self {
        Self {
            path,
            source: FieldSource {
                reference: None,
                val: Some(val),
            },
        }
    }

    pub fn reference(path: FieldPath, reference: Reference) -> Self {
        Self {
            path,
            source: FieldSource {
                reference: Some(reference),
                val: None,
            },
        }
    }
}

/// Stream provenance of one input field
///
/// An intermediate source is a container whose sub-fields each carry their
/// own provenance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SourceInfo {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_intermediate: bool,
    #[serde(default)]
    pub field_type: FieldStreamType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from_node_key: NodeKey,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from_path: FieldPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_info: Option<TypeInfo>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sub_sources: BTreeMap<String, SourceInfo>,
}

impl SourceInfo {
    /// Leaf source fed by a node output
    pub fn from_node(
        from_node_key: impl Into<NodeKey>,
        from_path: FieldPath,
        field_type: FieldStreamType,
    ) -> Self {
        Self {
            field_type,
            from_node_key: from_node_key.into(),
            from_path,
            ..Default::default()
        }
    }

    /// Leaf source with no producing node
    pub fn literal() -> Self {
        Self::default()
    }

    /// Container source built from independently sourced sub-fields
    pub fn intermediate<I, K>(sub_sources: I) -> Self
    where
        I: IntoIterator<Item = (K, SourceInfo)>,
        K: Into<String>,
    {
        Self {
            is_intermediate: true,
            sub_sources: sub_sources.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            ..Default::default()
        }
    }

    pub fn with_type_info(mut self, type_info: TypeInfo) -> Self {
        self.type_info = Some(type_info);
        self
    }

    /// An intermediate is skipped only when every leaf under it is skipped
    pub fn skipped(&self) -> bool {
        if !self.is_intermediate {
            return self.field_type == FieldStreamType::Skipped;
        }

        self.sub_sources.values().all(SourceInfo::skipped)
    }

    /// Whether any leaf may carry a stream
    pub fn any_stream(&self) -> bool {
        if self.field_type != FieldStreamType::NotStream {
            return true;
        }
        self.sub_sources.values().any(SourceInfo::any_stream)
    }
}

/// Stream capabilities of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamConfig {
    /// The node produces genuine streaming output
    #[serde(default)]
    pub can_generate_stream: bool,
    /// The node prefers streaming input
    #[serde(default)]
    pub require_streaming_input: bool,
}

/// Compiled schema of a single node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSchema {
    pub key: NodeKey,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: BlockType,

    /// Node specific configuration, opaque to the workflow layer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configs: Option<Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input_types: BTreeMap<String, TypeInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_sources: Vec<FieldInfo>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub output_types: BTreeMap<String, TypeInfo>,
    /// Only used by composite nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_sources: Vec<FieldInfo>,

    #[serde(default)]
    pub stream_configs: StreamConfig,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub full_sources: BTreeMap<String, SourceInfo>,
}

impl NodeSchema {
    pub fn new(key: impl Into<NodeKey>, name: impl Into<String>, node_type: BlockType) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            node_type,
            configs: None,
            input_types: BTreeMap::new(),
            input_sources: Vec::new(),
            output_types: BTreeMap::new(),
            output_sources: Vec::new(),
            stream_configs: StreamConfig::default(),
            full_sources: BTreeMap::new(),
        }
    }

    pub fn set_input_type(&mut self, key: impl Into<String>, info: TypeInfo) {
        self.input_types.insert(key.into(), info);
    }

    pub fn add_input_source(&mut self, fields: impl IntoIterator<Item = FieldInfo>) {
        self.input_sources.extend(fields);
    }

    pub fn set_output_type(&mut self, key: impl Into<String>, info: TypeInfo) {
        self.output_types.insert(key.into(), info);
    }

    pub fn add_output_source(&mut self, fields: impl IntoIterator<Item = FieldInfo>) {
        self.output_sources.extend(fields);
    }

    pub fn input_json_schema(&self) -> RootSchema {
        fields_to_json_schema(&self.input_types, Some(&format!("{} inputs", self.name)))
    }

    pub fn output_json_schema(&self) -> RootSchema {
        fields_to_json_schema(&self.output_types, Some(&format!("{} outputs", self.name)))
    }

    /// Type of an input field, following object properties for nested paths
    pub fn input_type_at(&self, path: &[String]) -> Option<&TypeInfo> {
        let (root, rest) = path.split_first()?;
        self.input_types.get(root)?.lookup(rest)
    }

    /// Build the stream provenance of every input field
    ///
    /// `producers` holds the compiled schemas of the other nodes in the
    /// workflow. A reference to a stream-capable node's string output is a
    /// stream; a reference to a variable merge group is only known at run
    /// time; everything else is a finite value.
    pub fn set_full_sources(&mut self, producers: &BTreeMap<NodeKey, NodeSchema>) {
        let mut full = BTreeMap::new();

        for field in &self.input_sources {
            let leaf = leaf_source(field, producers, self.input_type_at(&field.path).cloned());
            insert_source(&mut full, &field.path, leaf);
        }

        self.full_sources = full;
    }
}

fn leaf_source(
    field: &FieldInfo,
    producers: &BTreeMap<NodeKey, NodeSchema>,
    type_info: Option<TypeInfo>,
) -> SourceInfo {
    let Some(reference) = field.source.reference.as_ref() else {
        return with_optional_type(SourceInfo::literal(), type_info);
    };

    if reference.from_node_key.is_empty() {
        return with_optional_type(SourceInfo::literal(), type_info);
    }

    let field_type = match producers.get(&reference.from_node_key) {
        Some(producer) if producer.node_type == BlockType::VariableMerge => {
            if reference.from_path.len() == 1 {
                FieldStreamType::MaybeStream
            } else {
                FieldStreamType::NotStream
            }
        }
        Some(producer) if producer.stream_configs.can_generate_stream => {
            let produced = reference
                .from_path
                .split_first()
                .and_then(|(root, rest)| producer.output_types.get(root)?.lookup(rest));
            match produced {
                Some(info) if info.data_type == DataType::String => FieldStreamType::IsStream,
                _ => FieldStreamType::NotStream,
            }
        }
        _ => FieldStreamType::NotStream,
    };

    with_optional_type(
        SourceInfo::from_node(reference.from_node_key.clone(), reference.from_path.clone(), field_type),
        type_info,
    )
}

fn with_optional_type(source: SourceInfo, type_info: Option<TypeInfo>) -> SourceInfo {
    match type_info {
        Some(t) => source.with_type_info(t),
        None => source,
    }
}

fn insert_source(into: &mut BTreeMap<String, SourceInfo>, path: &[String], leaf: SourceInfo) {
    match path {
        [] => {}
        [last] => {
            into.insert(last.clone(), leaf);
        }
        [head, rest @ ..] => {
            let entry = into
                .entry(head.clone())
                .or_insert_with(|| SourceInfo::intermediate(Vec::<(String, SourceInfo)>::new()));
            entry.is_intermediate = true;
            insert_source(&mut entry.sub_sources, rest, leaf);
        }
    }
}

/// Aggregate stream type of a variable merge group
///
/// All streams yields a stream, no streams yields a finite value, a mix is
/// only decided by which source the group picks at run time.
pub fn group_stream_type<'a, I>(sources: I) -> FieldStreamType
where
    I: IntoIterator<Item = &'a SourceInfo>,
{
    let mut any_stream = false;
    let mut all_stream = true;

    for source in sources {
        match source.field_type {
            FieldStreamType::IsStream => any_stream = true,
            FieldStreamType::MaybeStream => {
                any_stream = true;
                all_stream = false;
            }
            _ => all_stream = false,
        }
    }

    match (any_stream, all_stream) {
        (true, true) => FieldStreamType::IsStream,
        (false, _) => FieldStreamType::NotStream,
        _ => FieldStreamType::MaybeStream,
    }
}

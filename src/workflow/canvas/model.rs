// SPDX-License-Identifier: MIT

//! Canvas wire model
//!
//! Mirrors the JSON document written by the canvas editor. Field names follow
//! the editor's camelCase; node kinds are small-integer strings.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::CanvasError;

/// Authored node/edge graph of one workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub versions: Option<Value>,
}

impl Canvas {
    /// The node of the given kind at this canvas level
    pub fn find_node(&self, node_type: &BlockType) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.node_type == node_type)
    }

    /// Start and end node of this canvas level
    pub fn start_and_end(&self) -> Result<(&Node, &Node), CanvasError> {
        find_start_and_end(&self.nodes)
    }

    /// Every sub-workflow reference, including those inside composites
    pub fn sub_workflow_identities(&self) -> Vec<WorkflowIdentity> {
        fn collect(nodes: &[Node], out: &mut Vec<WorkflowIdentity>) {
            for n in nodes {
                if n.node_type == BlockType::SubWorkflow {
                    let inputs = n.inputs();
                    out.push(WorkflowIdentity {
                        id: inputs.and_then(|i| i.workflow_id.clone()).unwrap_or_default(),
                        version: inputs
                            .and_then(|i| i.workflow_version.clone())
                            .unwrap_or_default(),
                    });
                }
                collect(&n.blocks, out);
            }
        }

        let mut out = Vec::new();
        collect(&self.nodes, &mut out);
        out
    }
}

pub(crate) fn find_start_and_end(nodes: &[Node]) -> Result<(&Node, &Node), CanvasError> {
    let mut start = None;
    let mut end = None;
    for node in nodes {
        match node.node_type {
            BlockType::Start => start = Some(node),
            BlockType::End => end = Some(node),
            _ => {}
        }
    }

    let start = start.ok_or(CanvasError::StartNodeNotFound)?;
    let end = end.ok_or(CanvasError::EndNodeNotFound)?;
    Ok((start, end))
}

/// A sub-workflow reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowIdentity {
    pub id: String,
    pub version: String,
}

/// A canvas node; composites carry their own blocks and edges
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: BlockType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<NodeData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

impl Node {
    /// Display title of the node, empty when unset
    pub fn title(&self) -> &str {
        self.data
            .as_ref()
            .and_then(|d| d.node_meta.as_ref())
            .map(|m| m.title.as_str())
            .unwrap_or_default()
    }

    pub fn inputs(&self) -> Option<&Inputs> {
        self.data.as_ref().and_then(|d| d.inputs.as_ref())
    }

    pub fn outputs(&self) -> &[Value] {
        self.data
            .as_ref()
            .map(|d| d.outputs.as_slice())
            .unwrap_or_default()
    }

    /// Whether the node owns a nested sub-canvas
    pub fn is_composite(&self) -> bool {
        !self.blocks.is_empty() && !self.edges.is_empty()
    }

    /// Configured error handling, if any
    pub fn error_process_type(&self) -> Option<ErrorProcessType> {
        self.inputs()
            .and_then(|i| i.setting_on_error.as_ref())
            .and_then(|s| s.process_type)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_title: String,
}

/// Directed arc between two nodes, optionally between named ports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(rename = "sourceNodeID")]
    pub source_node_id: String,
    #[serde(rename = "targetNodeID")]
    pub target_node_id: String,
    #[serde(rename = "sourcePortID", default, skip_serializing_if = "String::is_empty")]
    pub source_port_id: String,
    #[serde(rename = "targetPortID", default, skip_serializing_if = "String::is_empty")]
    pub target_port_id: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_node_id: source.into(),
            target_node_id: target.into(),
            ..Default::default()
        }
    }

    pub fn from_port(mut self, port: impl Into<String>) -> Self {
        self.source_port_id = port.into();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(rename = "nodeMeta", default, skip_serializing_if = "Option::is_none")]
    pub node_meta: Option<NodeMeta>,
    /// Either variables or params, depending on node kind
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Inputs>,
}

/// Node configuration; which fields are set depends on the node kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inputs {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_parameters: Vec<Param>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<BlockInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminate_plan: Option<TerminatePlan>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub streaming_output: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting_on_error: Option<SettingOnError>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_type: Option<LoopType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_count: Option<BlockInput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variable_parameters: Vec<Param>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<Branch>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub intents: Vec<Intent>,

    #[serde(rename = "answer_type", default, skip_serializing_if = "Option::is_none")]
    pub answer_type: Option<QaAnswerType>,
    #[serde(rename = "option_type", default, skip_serializing_if = "Option::is_none")]
    pub option_type: Option<QaOptionType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<QaOption>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_version: Option<String>,
    /// Terminate plan the calling node expects from a sub-workflow
    #[serde(rename = "type", default)]
    pub termination_type: i64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merge_groups: Vec<Param>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select_param: Option<SelectParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_param: Option<ConditionParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_param: Option<ConditionParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insert_param: Option<InsertParam>,
}

/// A named binding; selectors use `left`/`right`, merge groups use `variables`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Param {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<BlockInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<BlockInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<BlockInput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<BlockInput>,
}

impl Param {
    pub fn new(name: impl Into<String>, input: BlockInput) -> Self {
        Self {
            name: name.into(),
            input: Some(input),
            ..Default::default()
        }
    }
}

/// Declared output variable of a node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: Option<VariableType>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub assist_type: i64,
    /// Property variables for objects, the element variable for lists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl Variable {
    pub fn new(name: impl Into<String>, var_type: VariableType) -> Self {
        Self {
            name: name.into(),
            var_type: Some(var_type),
            ..Default::default()
        }
    }

    /// Decode a variable from an untyped schema entry
    pub fn parse(value: &Value) -> Result<Self, CanvasError> {
        serde_json::from_value(value.clone())
            .map_err(|e| CanvasError::schema(format!("invalid variable {}: {}", value, e)))
    }
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// Typed input of a node parameter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInput {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub var_type: Option<VariableType>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub assist_type: i64,
    /// Element schema for lists, property list for objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<BlockInputValue>,
}

impl BlockInput {
    pub fn literal(var_type: VariableType, content: Value) -> Self {
        Self {
            var_type: Some(var_type),
            value: Some(BlockInputValue {
                value_type: BlockInputValueType::Literal,
                content: Some(content),
                raw_meta: None,
            }),
            ..Default::default()
        }
    }

    pub fn reference(var_type: VariableType, reference: BlockInputReference) -> Self {
        Self {
            var_type: Some(var_type),
            value: Some(BlockInputValue {
                value_type: BlockInputValueType::Ref,
                content: serde_json::to_value(reference).ok(),
                raw_meta: None,
            }),
            ..Default::default()
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn value_type(&self) -> Option<BlockInputValueType> {
        self.value.as_ref().map(|v| v.value_type)
    }

    /// Decode the reference carried by a `ref` value
    pub fn parse_reference(&self) -> Result<Option<BlockInputReference>, CanvasError> {
        let Some(value) = self.value.as_ref() else {
            return Ok(None);
        };
        if value.value_type != BlockInputValueType::Ref {
            return Ok(None);
        }

        match value.content.as_ref() {
            Some(content @ Value::Object(_)) => serde_json::from_value(content.clone())
                .map(Some)
                .map_err(|e| CanvasError::InvalidReference(e.to_string())),
            Some(other) => Err(CanvasError::InvalidReference(format!(
                "invalid content type: {} when parse BlockInputRef",
                other
            ))),
            None => Err(CanvasError::InvalidReference(
                "reference has no content".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInputValue {
    #[serde(rename = "type")]
    pub value_type: BlockInputValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_meta: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockInputValueType {
    Literal,
    Ref,
    ObjectRef,
}

/// Pointer from a block input to a node output or a variable scope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockInputReference {
    #[serde(rename = "blockID", default)]
    pub block_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
    #[serde(default)]
    pub source: RefSourceType,
}

impl BlockInputReference {
    pub fn block_output(block_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            block_id: block_id.into(),
            name: name.into(),
            path: Vec::new(),
            source: RefSourceType::BlockOutput,
        }
    }

    pub fn global(source: RefSourceType, path: Vec<String>) -> Self {
        Self {
            block_id: String::new(),
            name: String::new(),
            path,
            source,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefSourceType {
    #[default]
    #[serde(rename = "block-output")]
    BlockOutput,
    #[serde(rename = "global_variable_app")]
    GlobalApp,
    #[serde(rename = "global_variable_system")]
    GlobalSystem,
    #[serde(rename = "global_variable_user")]
    GlobalUser,
}

impl RefSourceType {
    pub fn is_global(&self) -> bool {
        !matches!(self, RefSourceType::BlockOutput)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    String,
    Integer,
    Float,
    Boolean,
    Object,
    List,
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VariableType::String => "string",
            VariableType::Integer => "integer",
            VariableType::Float => "float",
            VariableType::Boolean => "boolean",
            VariableType::Object => "object",
            VariableType::List => "list",
        };
        f.write_str(s)
    }
}

/// Assist type marking a string as a time value
pub const ASSIST_TYPE_TIME: i64 = 10000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminatePlan {
    #[serde(rename = "returnVariables")]
    ReturnVariables,
    #[serde(rename = "useAnswerContent")]
    UseAnswerContent,
}

impl TerminatePlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminatePlan::ReturnVariables => "returnVariables",
            TerminatePlan::UseAnswerContent => "useAnswerContent",
        }
    }

    /// Plan matching a sub-workflow node's termination `type`
    pub fn from_termination_type(t: i64) -> Option<Self> {
        match t {
            0 => Some(TerminatePlan::ReturnVariables),
            1 => Some(TerminatePlan::UseAnswerContent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ErrorProcessType {
    Throw,
    Default,
    ExceptionBranch,
}

impl TryFrom<i64> for ErrorProcessType {
    type Error = String;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(ErrorProcessType::Throw),
            2 => Ok(ErrorProcessType::Default),
            3 => Ok(ErrorProcessType::ExceptionBranch),
            other => Err(format!("unknown error process type {}", other)),
        }
    }
}

impl From<ErrorProcessType> for i64 {
    fn from(t: ErrorProcessType) -> Self {
        match t {
            ErrorProcessType::Throw => 1,
            ErrorProcessType::Default => 2,
            ErrorProcessType::ExceptionBranch => 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingOnError {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub data_on_err: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub switch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_type: Option<ErrorProcessType>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub retry_times: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub timeout_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopType {
    Array,
    Count,
    Infinite,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub condition: BranchCondition,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchCondition {
    pub logic: LogicType,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// How the conditions of a branch combine; 1 is OR, 2 is AND
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum LogicType {
    Or,
    #[default]
    And,
}

impl TryFrom<i64> for LogicType {
    type Error = String;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(LogicType::Or),
            2 => Ok(LogicType::And),
            other => Err(format!("unknown logic type {}", other)),
        }
    }
}

impl From<LogicType> for i64 {
    fn from(l: LogicType) -> Self {
        match l {
            LogicType::Or => 1,
            LogicType::And => 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Canvas operator code, 1 through 16
    pub operator: i64,
    #[serde(default)]
    pub left: Option<Param>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Param>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QaAnswerType {
    Option,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QaOptionType {
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QaOption {
    pub name: String,
}

/// Database condition list; each inner list holds the `left`, `operation`
/// and `right` params of one clause
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbCondition {
    #[serde(default)]
    pub condition_list: Vec<Vec<Param>>,
    #[serde(default)]
    pub logic: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectParam {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<DbCondition>,
    #[serde(default)]
    pub limit: i64,
}

/// Condition of a database update or delete; updates also carry the fields to set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionParam {
    pub condition: DbCondition,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_info: Vec<Vec<Param>>,
}

/// Each entry pairs a field-name param with a value param
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertParam {
    #[serde(default)]
    pub field_info: Vec<Vec<Param>>,
}

/// Node kind tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BlockType {
    Start,
    End,
    Llm,
    Api,
    Code,
    Dataset,
    Condition,
    SubWorkflow,
    Database,
    Message,
    Text,
    Question,
    Break,
    LoopSetVariable,
    Loop,
    Intent,
    DatasetWrite,
    Batch,
    Continue,
    Input,
    Comment,
    VariableMerge,
    AssignVariable,
    DatabaseUpdate,
    DatabaseSelect,
    DatabaseDelete,
    Http,
    DatabaseInsert,
    JsonSerialization,
    JsonDeserialization,
    Other(String),
    #[default]
    Unknown,
}

impl BlockType {
    pub fn code(&self) -> &str {
        match self {
            BlockType::Start => "1",
            BlockType::End => "2",
            BlockType::Llm => "3",
            BlockType::Api => "4",
            BlockType::Code => "5",
            BlockType::Dataset => "6",
            BlockType::Condition => "8",
            BlockType::SubWorkflow => "9",
            BlockType::Database => "12",
            BlockType::Message => "13",
            BlockType::Text => "15",
            BlockType::Question => "18",
            BlockType::Break => "19",
            BlockType::LoopSetVariable => "20",
            BlockType::Loop => "21",
            BlockType::Intent => "22",
            BlockType::DatasetWrite => "27",
            BlockType::Batch => "28",
            BlockType::Continue => "29",
            BlockType::Input => "30",
            BlockType::Comment => "31",
            BlockType::VariableMerge => "32",
            BlockType::AssignVariable => "40",
            BlockType::DatabaseUpdate => "42",
            BlockType::DatabaseSelect => "43",
            BlockType::DatabaseDelete => "44",
            BlockType::Http => "45",
            BlockType::DatabaseInsert => "46",
            BlockType::JsonSerialization => "58",
            BlockType::JsonDeserialization => "59",
            BlockType::Other(s) => s.as_str(),
            BlockType::Unknown => "",
        }
    }

    /// Composite kinds own a nested sub-canvas
    pub fn is_composite(&self) -> bool {
        matches!(self, BlockType::Loop | BlockType::Batch)
    }

    /// Break and continue only make sense inside a loop
    pub fn is_loop_control(&self) -> bool {
        matches!(self, BlockType::Break | BlockType::Continue)
    }
}

impl From<String> for BlockType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "1" => BlockType::Start,
            "2" => BlockType::End,
            "3" => BlockType::Llm,
            "4" => BlockType::Api,
            "5" => BlockType::Code,
            "6" => BlockType::Dataset,
            "8" => BlockType::Condition,
            "9" => BlockType::SubWorkflow,
            "12" => BlockType::Database,
            "13" => BlockType::Message,
            "15" => BlockType::Text,
            "18" => BlockType::Question,
            "19" => BlockType::Break,
            "20" => BlockType::LoopSetVariable,
            "21" => BlockType::Loop,
            "22" => BlockType::Intent,
            "27" => BlockType::DatasetWrite,
            "28" => BlockType::Batch,
            "29" => BlockType::Continue,
            "30" => BlockType::Input,
            "31" => BlockType::Comment,
            "32" => BlockType::VariableMerge,
            "40" => BlockType::AssignVariable,
            "42" => BlockType::DatabaseUpdate,
            "43" => BlockType::DatabaseSelect,
            "44" => BlockType::DatabaseDelete,
            "45" => BlockType::Http,
            "46" => BlockType::DatabaseInsert,
            "58" => BlockType::JsonSerialization,
            "59" => BlockType::JsonDeserialization,
            "" => BlockType::Unknown,
            _ => BlockType::Other(s),
        }
    }
}

impl From<BlockType> for String {
    fn from(b: BlockType) -> Self {
        b.code().to_string()
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_type_round_trip() {
        let b: BlockType = serde_json::from_value(json!("21")).unwrap();
        assert_eq!(b, BlockType::Loop);
        assert!(b.is_composite());

        let other: BlockType = serde_json::from_value(json!("999")).unwrap();
        assert_eq!(other, BlockType::Other("999".to_string()));
        assert_eq!(serde_json::to_value(&other).unwrap(), json!("999"));
    }

    #[test]
    fn test_parse_node() {
        let node: Node = serde_json::from_value(json!({
            "id": "133234",
            "type": "8",
            "data": {
                "nodeMeta": {"title": "Condition"},
                "inputs": {
                    "branches": [{
                        "condition": {
                            "logic": 2,
                            "conditions": [{
                                "operator": 1,
                                "left": {"input": {"type": "string", "value": {"type": "ref", "content": {"blockID": "100001", "name": "q", "source": "block-output"}}}},
                                "right": {"input": {"type": "string", "value": {"type": "literal", "content": "hi"}}}
                            }]
                        }
                    }],
                    "settingOnError": {"processType": 3}
                }
            }
        }))
        .unwrap();

        assert_eq!(node.title(), "Condition");
        assert_eq!(node.node_type, BlockType::Condition);
        assert_eq!(node.error_process_type(), Some(ErrorProcessType::ExceptionBranch));

        let inputs = node.inputs().unwrap();
        assert_eq!(inputs.branches.len(), 1);
        let cond = &inputs.branches[0].condition.conditions[0];
        let left = cond.left.as_ref().unwrap().input.as_ref().unwrap();
        let reference = left.parse_reference().unwrap().unwrap();
        assert_eq!(reference.block_id, "100001");
        assert_eq!(reference.source, RefSourceType::BlockOutput);
    }

    #[test]
    fn test_edge_ports() {
        let edge: Edge = serde_json::from_value(json!({
            "sourceNodeID": "a", "targetNodeID": "b", "sourcePortID": "true_1"
        }))
        .unwrap();
        assert_eq!(edge, Edge::new("a", "b").from_port("true_1"));
    }

    #[test]
    fn test_start_and_end() {
        let canvas = Canvas {
            nodes: vec![Node {
                id: "100001".to_string(),
                node_type: BlockType::Start,
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(matches!(canvas.start_and_end(), Err(CanvasError::EndNodeNotFound)));
    }
}

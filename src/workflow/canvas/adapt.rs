// SPDX-License-Identifier: MIT

//! Canvas to `NodeSchema` adaptation
//!
//! Turns the editor's loosely typed block inputs into `TypeInfo` trees and
//! field bindings. Every failure here is a `CanvasError::SchemaConversion`
//! or `CanvasError::InvalidReference`.

use serde_json::{json, Value};
use std::collections::BTreeMap;

use super::loader::ParentTable;
use super::model::{
    BlockInput, BlockInputReference, BlockInputValueType, BlockType, Canvas, Node, Param,
    RefSourceType, Variable, VariableType, ASSIST_TYPE_TIME,
};
use crate::error::CanvasError;
use crate::workflow::convert::parse_bool;
use crate::workflow::nodes::assigner::LoopAssigner;
use crate::workflow::nodes::database::adapt_database_inputs;
use crate::workflow::nodes::loop_control::LOOP_COUNT_KEY;
use crate::workflow::nodes::merge::MergeConfig;
use crate::workflow::nodes::selector::SelectorConfig;
use crate::workflow::schema::{
    FieldInfo, FieldPath, FieldSource, GlobalVarType, NodeKey, NodeSchema, Reference,
};
use crate::workflow::types::{DataType, FileSubType, TypeInfo};

/// Reserved output produced when a node fails with exception handling enabled
const ERROR_BODY_OUTPUT: &str = "errorBody";

fn assist_type_to_file_type(assist_type: i64) -> Option<FileSubType> {
    match assist_type {
        1 => Some(FileSubType::Default),
        2 => Some(FileSubType::Image),
        3 => Some(FileSubType::Document),
        4 => Some(FileSubType::Code),
        5 => Some(FileSubType::Ppt),
        6 => Some(FileSubType::Txt),
        7 => Some(FileSubType::Excel),
        8 => Some(FileSubType::Audio),
        9 => Some(FileSubType::Zip),
        10 => Some(FileSubType::Video),
        11 => Some(FileSubType::Svg),
        12 => Some(FileSubType::Voice),
        _ => None,
    }
}

fn string_type_info(assist_type: i64) -> Result<TypeInfo, CanvasError> {
    match assist_type {
        0 => Ok(TypeInfo::string()),
        ASSIST_TYPE_TIME => Ok(TypeInfo::time()),
        other => assist_type_to_file_type(other)
            .map(TypeInfo::file)
            .ok_or_else(|| CanvasError::schema(format!("unsupported assist type: {}", other))),
    }
}

fn element_type_info(schema: Option<&Value>) -> Result<TypeInfo, CanvasError> {
    let schema =
        schema.ok_or_else(|| CanvasError::schema("list variable has no element schema"))?;
    variable_to_type_info(&Variable::parse(schema)?)
}

fn schema_entries(schema: Option<&Value>) -> Result<&[Value], CanvasError> {
    match schema {
        None => Ok(&[]),
        Some(Value::Array(entries)) => Ok(entries.as_slice()),
        Some(other) => Err(CanvasError::schema(format!(
            "object schema is not a list: {}",
            other
        ))),
    }
}

fn parse_param(value: &Value) -> Result<Param, CanvasError> {
    serde_json::from_value(value.clone())
        .map_err(|e| CanvasError::schema(format!("invalid param {}: {}", value, e)))
}

/// Map a declared output variable onto `TypeInfo`
pub fn variable_to_type_info(v: &Variable) -> Result<TypeInfo, CanvasError> {
    let mut info = match v.var_type {
        Some(VariableType::String) => string_type_info(v.assist_type)?,
        Some(VariableType::Integer) => TypeInfo::integer(),
        Some(VariableType::Float) => TypeInfo::number(),
        Some(VariableType::Boolean) => TypeInfo::boolean(),
        Some(VariableType::Object) => {
            let mut properties = BTreeMap::new();
            for entry in schema_entries(v.schema.as_ref())? {
                let sub = Variable::parse(entry)?;
                properties.insert(sub.name.clone(), variable_to_type_info(&sub)?);
            }
            TypeInfo {
                properties,
                ..TypeInfo::new(DataType::Object)
            }
        }
        Some(VariableType::List) => TypeInfo::array(element_type_info(v.schema.as_ref())?),
        None => {
            return Err(CanvasError::schema(format!(
                "unsupported variable type for {}",
                v.name
            )))
        }
    };

    info.required = v.required;
    info.desc = v.description.clone();
    Ok(info)
}

/// Map a block input onto `TypeInfo`; a missing input yields the default type
pub fn block_input_to_type_info(b: Option<&BlockInput>) -> Result<TypeInfo, CanvasError> {
    let Some(b) = b else {
        return Ok(TypeInfo::default());
    };

    match b.var_type {
        Some(VariableType::String) => string_type_info(b.assist_type),
        Some(VariableType::Integer) => Ok(TypeInfo::integer()),
        Some(VariableType::Float) => Ok(TypeInfo::number()),
        Some(VariableType::Boolean) => Ok(TypeInfo::boolean()),
        Some(VariableType::Object) => {
            let mut properties = BTreeMap::new();
            for entry in schema_entries(b.schema.as_ref())? {
                match b.value_type() {
                    Some(BlockInputValueType::Ref) => {
                        let sub = Variable::parse(entry)?;
                        properties.insert(sub.name.clone(), variable_to_type_info(&sub)?);
                    }
                    Some(BlockInputValueType::ObjectRef) => {
                        let sub = parse_param(entry)?;
                        properties.insert(
                            sub.name.clone(),
                            block_input_to_type_info(sub.input.as_ref())?,
                        );
                    }
                    _ => {}
                }
            }
            Ok(TypeInfo {
                properties,
                ..TypeInfo::new(DataType::Object)
            })
        }
        Some(VariableType::List) => Ok(TypeInfo::array(element_type_info(b.schema.as_ref())?)),
        None => Err(CanvasError::schema("unsupported variable type")),
    }
}

/// Translate a reference into a field source
pub fn block_input_ref_to_field_source(r: &BlockInputReference) -> Result<FieldSource, CanvasError> {
    let reference = match r.source {
        RefSourceType::BlockOutput => {
            if r.block_id.is_empty() {
                return Err(CanvasError::InvalidReference(format!(
                    "BlockID is empty when source is block output: {:?}",
                    r
                )));
            }
            // an empty name maps the whole output
            let parts = r.name.split('.').map(str::to_string).collect();
            Reference::node_output(r.block_id.clone(), parts)
        }
        source => {
            if r.path.is_empty() {
                return Err(CanvasError::InvalidReference(format!(
                    "Path is empty when source is variables: {:?}",
                    r
                )));
            }
            let var_type = match source {
                RefSourceType::GlobalApp => GlobalVarType::GlobalApp,
                RefSourceType::GlobalSystem => GlobalVarType::GlobalSystem,
                _ => GlobalVarType::GlobalUser,
            };
            Reference::variable(var_type, r.path.clone())
        }
    };

    Ok(FieldSource {
        reference: Some(reference),
        val: None,
    })
}

fn coerce_literal(
    var_type: Option<VariableType>,
    content: &Value,
    path: &FieldPath,
) -> Result<Value, CanvasError> {
    let bad = |what: &str| {
        CanvasError::schema(format!(
            "literal {:?} at {} is not a valid {}",
            content,
            path.join("."),
            what
        ))
    };

    match var_type {
        Some(VariableType::Object) => match content {
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(v @ Value::Object(_)) => Ok(v),
                _ => Err(bad("object")),
            },
            Value::Object(_) => Ok(content.clone()),
            _ => Err(bad("object")),
        },
        Some(VariableType::List) => match content {
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(v @ Value::Array(_)) => Ok(v),
                _ => Err(bad("list")),
            },
            Value::Array(_) => Ok(content.clone()),
            _ => Err(bad("list")),
        },
        Some(VariableType::Integer) => match content {
            Value::String(s) => s.parse::<i64>().map(Value::from).map_err(|_| bad("integer")),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::from(i)),
                None => Ok(Value::from(n.as_f64().unwrap_or_default().trunc() as i64)),
            },
            _ => Err(bad("integer")),
        },
        Some(VariableType::Float) => match content {
            Value::String(s) => s
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| bad("float")),
            Value::Number(n) => n
                .as_f64()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| bad("float")),
            _ => Err(bad("float")),
        },
        Some(VariableType::Boolean) => match content {
            Value::String(s) => parse_bool(s).map(Value::Bool).ok_or_else(|| bad("boolean")),
            Value::Bool(b) => Ok(Value::Bool(*b)),
            _ => Err(bad("boolean")),
        },
        _ => Ok(content.clone()),
    }
}

/// Translate a block input into field bindings rooted at `path`
///
/// `parent` is the enclosing composite, used to recognise references to the
/// loop's own variable parameters.
pub fn block_input_to_field_info(
    b: &BlockInput,
    path: FieldPath,
    parent: Option<&Node>,
) -> Result<Vec<FieldInfo>, CanvasError> {
    let value = b.value.as_ref().ok_or_else(|| {
        CanvasError::schema(format!("input {} has no value", path.join(".")))
    })?;

    match value.value_type {
        BlockInputValueType::ObjectRef => {
            let mut sources = Vec::new();
            for entry in schema_entries(b.schema.as_ref())? {
                let param = parse_param(entry)?;
                let Some(input) = param.input.as_ref() else {
                    return Err(CanvasError::schema(format!(
                        "object_ref param {} has no input",
                        param.name
                    )));
                };
                let mut sub_path = path.clone();
                sub_path.push(param.name.clone());
                sources.extend(block_input_to_field_info(input, sub_path, parent)?);
            }
            Ok(sources)
        }
        BlockInputValueType::Literal => {
            let content = value.content.as_ref().ok_or_else(|| {
                CanvasError::schema(format!(
                    "input {} is literal but has no value",
                    path.join(".")
                ))
            })?;
            let coerced = coerce_literal(b.var_type, content, &path)?;
            Ok(vec![FieldInfo::literal(path, coerced)])
        }
        BlockInputValueType::Ref => {
            let reference = b.parse_reference()?.ok_or_else(|| {
                CanvasError::InvalidReference(format!("input {} has no reference", path.join(".")))
            })?;
            let mut source = block_input_ref_to_field_source(&reference)?;

            if let (Some(parent), Some(r)) = (parent, source.reference.as_mut()) {
                let is_loop_variable = parent.node_type == BlockType::Loop
                    && r.from_node_key == parent.id
                    && r.from_path.first().is_some_and(|root| {
                        parent
                            .inputs()
                            .is_some_and(|i| i.variable_parameters.iter().any(|p| &p.name == root))
                    });
                if is_loop_variable {
                    r.from_node_key = NodeKey::new();
                    r.variable_type = Some(GlobalVarType::ParentIntermediate);
                }
            }

            Ok(vec![FieldInfo {
                path,
                source,
            }])
        }
    }
}

/// Input types and bindings from `inputParameters`
pub fn set_inputs_for_node_schema(
    node: &Node,
    parent: Option<&Node>,
    ns: &mut NodeSchema,
) -> Result<(), CanvasError> {
    let Some(inputs) = node.inputs() else {
        return Ok(());
    };

    for param in &inputs.input_parameters {
        set_param_input(param, parent, ns)?;
    }
    Ok(())
}

fn set_param_input(param: &Param, parent: Option<&Node>, ns: &mut NodeSchema) -> Result<(), CanvasError> {
    let info = block_input_to_type_info(param.input.as_ref())?;
    ns.set_input_type(param.name.clone(), info);

    if let Some(input) = param.input.as_ref() {
        let sources = block_input_to_field_info(input, vec![param.name.clone()], parent)?;
        ns.add_input_source(sources);
    }
    Ok(())
}

/// Output types from declared output variables
pub fn set_output_types_for_node_schema(node: &Node, ns: &mut NodeSchema) -> Result<(), CanvasError> {
    for raw in node.outputs() {
        let v = Variable::parse(raw)?;
        if v.read_only && v.name == ERROR_BODY_OUTPUT {
            continue;
        }
        let info = variable_to_type_info(&v)?;
        ns.set_output_type(v.name.clone(), info);
    }
    Ok(())
}

/// Output types and bindings of a composite node, whose outputs are params
pub fn set_outputs_for_node_schema(
    node: &Node,
    parent: Option<&Node>,
    ns: &mut NodeSchema,
) -> Result<(), CanvasError> {
    for raw in node.outputs() {
        let param = parse_param(raw)?;
        let info = block_input_to_type_info(param.input.as_ref())?;
        ns.set_output_type(param.name.clone(), info);

        if let Some(input) = param.input.as_ref() {
            let sources = block_input_to_field_info(input, vec![param.name.clone()], parent)?;
            ns.add_output_source(sources);
        }
    }
    Ok(())
}

fn set_loop_inputs(node: &Node, parent: Option<&Node>, ns: &mut NodeSchema) -> Result<(), CanvasError> {
    let Some(inputs) = node.inputs() else {
        return Ok(());
    };

    for param in &inputs.variable_parameters {
        set_param_input(param, parent, ns)?;
    }

    if let Some(count) = inputs.loop_count.as_ref() {
        let loop_count = Param::new(LOOP_COUNT_KEY, count.clone());
        set_param_input(&loop_count, parent, ns)?;
    }

    ns.configs = Some(json!({
        "loopType": inputs.loop_type,
        "intermediateVars": inputs
            .variable_parameters
            .iter()
            .map(|p| p.name.clone())
            .collect::<Vec<_>>(),
    }));
    Ok(())
}

/// Compile one canvas node into its `NodeSchema`
pub fn node_to_schema(node: &Node, parent: Option<&Node>) -> Result<NodeSchema, CanvasError> {
    let mut ns = NodeSchema::new(node.id.clone(), node.title(), node.node_type.clone());

    match node.node_type {
        BlockType::Condition => {
            let config = SelectorConfig::from_node(node)?;
            config.adapt_inputs(node, parent, &mut ns)?;
            ns.configs = serde_json::to_value(&config).ok();
        }
        BlockType::VariableMerge => {
            MergeConfig::adapt(node, parent, &mut ns)?;
            set_output_types_for_node_schema(node, &mut ns)?;
        }
        BlockType::LoopSetVariable => {
            LoopAssigner::adapt(node, parent, &mut ns)?;
        }
        BlockType::Database
        | BlockType::DatabaseSelect
        | BlockType::DatabaseUpdate
        | BlockType::DatabaseDelete
        | BlockType::DatabaseInsert => {
            set_inputs_for_node_schema(node, parent, &mut ns)?;
            adapt_database_inputs(node, parent, &mut ns)?;
            set_output_types_for_node_schema(node, &mut ns)?;
        }
        BlockType::Loop | BlockType::Batch => {
            set_inputs_for_node_schema(node, parent, &mut ns)?;
            if node.node_type == BlockType::Loop {
                set_loop_inputs(node, parent, &mut ns)?;
            }
            // inner references resolve against this node as their parent
            set_outputs_for_node_schema(node, Some(node), &mut ns)?;
        }
        _ => {
            set_inputs_for_node_schema(node, parent, &mut ns)?;
            set_output_types_for_node_schema(node, &mut ns)?;
        }
    }

    if node.node_type == BlockType::Llm {
        ns.stream_configs.can_generate_stream = true;
    }

    Ok(ns)
}

/// Compile every node of a canvas, nested blocks included
///
/// Comment nodes carry no behaviour and are skipped. Stream provenance is
/// computed once all schemas exist.
pub fn canvas_to_schemas(canvas: &Canvas) -> Result<BTreeMap<NodeKey, NodeSchema>, CanvasError> {
    let parents = ParentTable::build(canvas);
    let mut schemas = BTreeMap::new();

    fn walk(
        nodes: &[Node],
        canvas: &Canvas,
        parents: &ParentTable,
        schemas: &mut BTreeMap<NodeKey, NodeSchema>,
    ) -> Result<(), CanvasError> {
        for node in nodes {
            if node.node_type == BlockType::Comment {
                continue;
            }
            let parent = parents.parent_node(canvas, &node.id);
            let ns = node_to_schema(node, parent)
                .map_err(|e| CanvasError::schema(format!("node {}: {}", node.id, e)))?;
            schemas.insert(node.id.clone(), ns);
            walk(&node.blocks, canvas, parents, schemas)?;
        }
        Ok(())
    }

    walk(&canvas.nodes, canvas, &parents, &mut schemas)?;

    let producers = schemas.clone();
    for ns in schemas.values_mut() {
        ns.set_full_sources(&producers);
    }

    log::debug!("adapted {} node schemas", schemas.len());
    Ok(schemas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::schema::FieldStreamType;
    use serde_json::json;

    fn ref_input(var_type: &str, block: &str, name: &str) -> Value {
        json!({
            "type": var_type,
            "value": {"type": "ref", "content": {"blockID": block, "name": name, "source": "block-output"}}
        })
    }

    #[test]
    fn test_variable_to_type_info() {
        let v: Variable = serde_json::from_value(json!({
            "name": "user",
            "type": "object",
            "required": true,
            "schema": [
                {"name": "avatar", "type": "string", "assistType": 2},
                {"name": "born", "type": "string", "assistType": 10000},
                {"name": "tags", "type": "list", "schema": {"type": "string"}},
                {"name": "score", "type": "float"}
            ]
        }))
        .unwrap();

        let info = variable_to_type_info(&v).unwrap();
        assert!(info.required);
        assert_eq!(info.properties["avatar"], TypeInfo::file(FileSubType::Image));
        assert_eq!(info.properties["born"], TypeInfo::time());
        assert_eq!(info.properties["tags"], TypeInfo::array(TypeInfo::string()));
        assert_eq!(info.properties["score"], TypeInfo::number());
    }

    #[test]
    fn test_unsupported_assist_type() {
        let v: Variable =
            serde_json::from_value(json!({"name": "x", "type": "string", "assistType": 77})).unwrap();
        let err = variable_to_type_info(&v).unwrap_err();
        assert!(matches!(err, CanvasError::SchemaConversion(_)));
    }

    #[test]
    fn test_literal_coercion() {
        let b = BlockInput::literal(VariableType::Integer, json!("42"));
        let fields = block_input_to_field_info(&b, vec!["n".to_string()], None).unwrap();
        assert_eq!(fields[0].source.val, Some(json!(42)));

        let b = BlockInput::literal(VariableType::Object, json!(r#"{"a":1}"#));
        let fields = block_input_to_field_info(&b, vec!["o".to_string()], None).unwrap();
        assert_eq!(fields[0].source.val, Some(json!({"a": 1})));

        let b = BlockInput::literal(VariableType::Boolean, json!("maybe"));
        assert!(block_input_to_field_info(&b, vec!["b".to_string()], None).is_err());
    }

    #[test]
    fn test_reference_sources() {
        let b: BlockInput = serde_json::from_value(ref_input("string", "123", "output.text")).unwrap();
        let fields = block_input_to_field_info(&b, vec!["q".to_string()], None).unwrap();
        let r = fields[0].source.reference.as_ref().unwrap();
        assert_eq!(r.from_node_key, "123");
        assert_eq!(r.from_path, vec!["output", "text"]);

        let global = BlockInput::reference(
            VariableType::String,
            BlockInputReference::global(RefSourceType::GlobalUser, vec!["name".to_string()]),
        );
        let fields = block_input_to_field_info(&global, vec!["u".to_string()], None).unwrap();
        let r = fields[0].source.reference.as_ref().unwrap();
        assert_eq!(r.variable_type, Some(GlobalVarType::GlobalUser));
        assert!(r.from_node_key.is_empty());

        let empty = BlockInput::reference(
            VariableType::String,
            BlockInputReference::global(RefSourceType::GlobalApp, vec![]),
        );
        assert!(block_input_to_field_info(&empty, vec!["u".to_string()], None).is_err());
    }

    #[test]
    fn test_object_ref_fields() {
        let b: BlockInput = serde_json::from_value(json!({
            "type": "object",
            "value": {"type": "object_ref"},
            "schema": [
                {"name": "a", "input": ref_input("string", "n1", "x")},
                {"name": "b", "input": {"type": "integer", "value": {"type": "literal", "content": 3}}}
            ]
        }))
        .unwrap();

        let info = block_input_to_type_info(Some(&b)).unwrap();
        assert_eq!(info.properties["a"], TypeInfo::string());
        assert_eq!(info.properties["b"], TypeInfo::integer());

        let fields = block_input_to_field_info(&b, vec!["obj".to_string()], None).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].path, vec!["obj", "a"]);
        assert_eq!(fields[1].source.val, Some(json!(3)));
    }

    #[test]
    fn test_parent_intermediate_reference() {
        let parent: Node = serde_json::from_value(json!({
            "id": "loop1",
            "type": "21",
            "data": {"inputs": {
                "variableParameters": [{"name": "acc", "input": {"type": "integer", "value": {"type": "literal", "content": 0}}}]
            }}
        }))
        .unwrap();

        let b: BlockInput = serde_json::from_value(ref_input("integer", "loop1", "acc")).unwrap();
        let fields = block_input_to_field_info(&b, vec!["v".to_string()], Some(&parent)).unwrap();
        let r = fields[0].source.reference.as_ref().unwrap();
        assert!(r.from_node_key.is_empty());
        assert_eq!(r.variable_type, Some(GlobalVarType::ParentIntermediate));

        let b: BlockInput = serde_json::from_value(ref_input("integer", "loop1", "index")).unwrap();
        let fields = block_input_to_field_info(&b, vec!["v".to_string()], Some(&parent)).unwrap();
        assert_eq!(fields[0].source.reference.as_ref().unwrap().from_node_key, "loop1");
    }

    #[test]
    fn test_canvas_to_schemas() {
        let canvas: Canvas = serde_json::from_value(json!({
            "nodes": [
                {"id": "100001", "type": "1", "data": {"nodeMeta": {"title": "Start"},
                    "outputs": [{"name": "q", "type": "string", "required": true}]}},
                {"id": "llm", "type": "3", "data": {"nodeMeta": {"title": "LLM"},
                    "inputs": {"inputParameters": [{"name": "prompt", "input": ref_input("string", "100001", "q")}]},
                    "outputs": [{"name": "output", "type": "string"},
                                {"name": "errorBody", "type": "object", "readOnly": true}]}},
                {"id": "900001", "type": "2", "data": {"nodeMeta": {"title": "End"},
                    "inputs": {"inputParameters": [{"name": "answer", "input": ref_input("string", "llm", "output")}]}}},
                {"id": "note", "type": "31"}
            ],
            "edges": []
        }))
        .unwrap();

        let schemas = canvas_to_schemas(&canvas).unwrap();
        assert_eq!(schemas.len(), 3);
        assert!(!schemas.contains_key("note"));

        let llm = &schemas["llm"];
        assert!(llm.stream_configs.can_generate_stream);
        assert!(llm.output_types.contains_key("output"));
        assert!(!llm.output_types.contains_key("errorBody"));

        let end = &schemas["900001"];
        assert_eq!(end.full_sources["answer"].field_type, FieldStreamType::IsStream);
        assert_eq!(schemas["llm"].full_sources["prompt"].field_type, FieldStreamType::NotStream);
    }
}

// SPDX-License-Identifier: MIT

//! `{{path.to.field}}` template rendering
//!
//! Templates are split into literal text and variable parts. A variable part
//! is a dotted path with optional `[index]` accessors, e.g. `{{items[0].name}}`.
//! Rendering consults the resolved input sources first: parts whose producer
//! was skipped render empty, parts whose root is unknown render verbatim.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::error::WorkflowError;
use crate::workflow::convert::stringify;
use crate::workflow::schema::{FieldStreamType, SourceInfo};
use crate::workflow::state::ExecutionState;
use crate::workflow::stream::resolve_stream_sources;
use crate::workflow::types::TypeInfo;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([^}]+)\s*\}\}").expect("placeholder pattern is valid")
});

/// One step of a variable path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A parsed piece of a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(String),
    Variable(VariablePart),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariablePart {
    /// Text between the braces
    pub value: String,
    /// First key, without array accessors
    pub root: String,
    /// Keys after the root up to the first array accessor
    pub sub_paths_before_slice: Vec<String>,
    pub json_path: Vec<PathSegment>,
}

type NilRenderer = Arc<dyn Fn() -> String + Send + Sync>;

/// Rendering switches
#[derive(Clone, Default)]
pub struct RenderOptions {
    /// Roots rendered straight from the input, without the skip check
    pub reserved_keys: HashSet<String>,
    /// Text for null values; empty when unset
    pub nil_renderer: Option<NilRenderer>,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reserved_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn with_nil_renderer<F>(mut self, renderer: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.nil_renderer = Some(Arc::new(renderer));
        self
    }
}

/// Split a template into literal and variable parts
///
/// Malformed accessors such as `{{a[x]}}` are kept as literal text.
pub fn parse_template(template: &str) -> Vec<TemplatePart> {
    let mut parts = Vec::new();
    let mut last_end = 0;

    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };

        if whole.start() > last_end {
            parts.push(TemplatePart::Literal(template[last_end..whole.start()].to_string()));
        }
        last_end = whole.end();

        let value = inner.as_str().trim_end();
        match parse_variable(value) {
            Some(var) => parts.push(TemplatePart::Variable(var)),
            None => parts.push(TemplatePart::Literal(whole.as_str().to_string())),
        }
    }

    if last_end < template.len() {
        parts.push(TemplatePart::Literal(template[last_end..].to_string()));
    }

    parts
}

fn parse_variable(value: &str) -> Option<VariablePart> {
    let segments: Vec<&str> = value.split('.').collect();
    let first = segments.first()?;

    let mut sub_paths = Vec::new();
    if !first.contains('[') {
        for segment in &segments[1..] {
            if segment.contains('[') {
                break;
            }
            sub_paths.push(segment.to_string());
        }
    }

    let mut json_path = Vec::new();
    for segment in &segments {
        let Some(bracket) = segment.find('[') else {
            json_path.push(PathSegment::Key(segment.to_string()));
            continue;
        };

        let key = &segment[..bracket];
        if !key.is_empty() {
            json_path.push(PathSegment::Key(key.to_string()));
        }

        let mut rest = &segment[bracket..];
        while let Some(stripped) = rest.strip_prefix('[') {
            let close = stripped.find(']')?;
            let index = stripped[..close].parse::<usize>().ok()?;
            json_path.push(PathSegment::Index(index));
            rest = &stripped[close + 1..];
        }
        if !rest.is_empty() {
            return None;
        }
    }

    let root = match first.find('[') {
        Some(i) => first[..i].to_string(),
        None => first.to_string(),
    };

    Some(VariablePart {
        value: value.to_string(),
        root,
        sub_paths_before_slice: sub_paths,
        json_path,
    })
}

/// Dotted rendering of a path, e.g. `a.b[1][2].c`
pub fn join_json_path(path: &[PathSegment]) -> String {
    let mut out = String::new();
    for (i, segment) in path.iter().enumerate() {
        match segment {
            PathSegment::Key(key) => {
                if i > 0 && matches!(path[i - 1], PathSegment::Key(_)) {
                    out.push('.');
                }
                out.push_str(key);
            }
            PathSegment::Index(idx) => out.push_str(&format!("[{}]", idx)),
        }
    }
    out
}

impl VariablePart {
    /// Original placeholder text
    pub fn literal(&self) -> String {
        format!("{{{{{}}}}}", self.value)
    }

    /// Whether the part's producer was skipped, and whether its root is unknown
    ///
    /// With no source information at all, nothing is skipped or invalid.
    pub fn skipped(&self, resolved: &BTreeMap<String, SourceInfo>) -> (bool, bool) {
        if resolved.is_empty() {
            return (false, false);
        }

        let Some(mut matching) = resolved.get(&self.root) else {
            return (false, true);
        };

        if !matching.is_intermediate {
            return (matching.field_type == FieldStreamType::Skipped, false);
        }

        for sub_path in &self.sub_paths_before_slice {
            match matching.sub_sources.get(sub_path) {
                Some(sub) => matching = sub,
                None if matching.is_intermediate => return (false, true),
                None => return (matching.field_type == FieldStreamType::Skipped, false),
            }
        }

        (matching.skipped(), false)
    }

    /// Declared type of the part, following object properties
    pub fn type_info<'a>(&self, types: &'a BTreeMap<String, TypeInfo>) -> Option<&'a TypeInfo> {
        let root = types.get(&self.root)?;
        if self.sub_paths_before_slice.is_empty() {
            return Some(root);
        }

        let mut current = root;
        for sub_path in &self.sub_paths_before_slice {
            current = current.properties.get(sub_path)?;
        }
        Some(current)
    }

    /// Render the part against the node input
    ///
    /// A missing object field re-emits the placeholder. A missing array
    /// element, or indexing into a value that is not an array, is an error.
    pub fn render(&self, input: &Value, options: &RenderOptions) -> Result<String, WorkflowError> {
        let mut current = input;

        for (i, segment) in self.json_path.iter().enumerate() {
            match segment {
                PathSegment::Key(key) => match current.get(key.as_str()) {
                    Some(next) => current = next,
                    None => return Ok(self.literal()),
                },
                PathSegment::Index(idx) => match current {
                    Value::Array(items) => match items.get(*idx) {
                        Some(next) => current = next,
                        None => {
                            return Err(WorkflowError::ArrIndexOutOfRange {
                                arr_name: join_json_path(&self.json_path[..i]),
                                req_index: *idx,
                                arr_len: items.len(),
                            })
                        }
                    },
                    _ => {
                        return Err(WorkflowError::IndexingNilArray {
                            arr_name: join_json_path(&self.json_path[..i]),
                            req_index: *idx,
                        })
                    }
                },
            }
        }

        Ok(render_value(current, options))
    }
}

fn render_value(value: &Value, options: &RenderOptions) -> String {
    match value {
        Value::Null => options.nil_renderer.as_ref().map(|f| f()).unwrap_or_default(),
        // serde_json maps keep keys sorted, so containers render stably
        other => stringify(other).unwrap_or_default(),
    }
}

/// Render a template against already resolved sources
pub fn render(
    template: &str,
    input: &Map<String, Value>,
    resolved: &BTreeMap<String, SourceInfo>,
    options: &RenderOptions,
) -> Result<String, WorkflowError> {
    let input = Value::Object(input.clone());
    let mut out = String::new();

    for part in parse_template(template) {
        let var = match part {
            TemplatePart::Literal(text) => {
                out.push_str(&text);
                continue;
            }
            TemplatePart::Variable(var) => var,
        };

        if options.reserved_keys.contains(&var.root) {
            out.push_str(&var.render(&input, options)?);
            continue;
        }

        let (skipped, invalid) = var.skipped(resolved);
        if skipped {
            continue;
        }
        if invalid {
            out.push_str(&var.literal());
            continue;
        }

        out.push_str(&var.render(&input, options)?);
    }

    Ok(out)
}

/// Resolve `sources` against the run state, then render
pub fn render_with_state(
    template: &str,
    input: &Map<String, Value>,
    sources: &BTreeMap<String, SourceInfo>,
    state: &dyn ExecutionState,
    options: &RenderOptions,
) -> Result<String, WorkflowError> {
    let resolved = resolve_stream_sources(sources, state)?;
    render(template, input, &resolved, options)
}

// SPDX-License-Identifier: MIT

//! Typed error handling for flowcanvas-rs
//!
//! Three layers, matching how failures surface:
//! - `FlowError` - top-level error returned by loaders, the validator and the CLI
//! - `WorkflowError` - hard errors raised while invoking a node (conversion, rendering, selection)
//! - `CanvasError` - structurally impossible canvases and schema adaptation failures
//!
//! Validation findings are not errors; they are returned as `Issue` lists.

use thiserror::Error;

use crate::workflow::convert::ConversionWarnings;

/// Top-level error type for flowcanvas-rs
#[derive(Debug, Error)]
pub enum FlowError {
    /// Node invocation errors
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Canvas structure errors
    #[error("Canvas error: {0}")]
    Canvas(#[from] CanvasError),

    /// Configuration errors (missing config file, invalid flags)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failures reported by an external collaborator (variables meta, workflow repository)
    #[error("Repository error: {0}")]
    Repository(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper for compatibility
    #[error("{0}")]
    Other(String),
}

/// Hard errors raised while a node converts, renders or selects
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A declared required field has no value
    #[error("missing required parameter: {param}")]
    MissingRequiredParam { param: String },

    /// A value could not be coerced into its declared type
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Malformed JSON in a value that had to be decoded
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Array index past the end of an existing array
    #[error("array {arr_name} index out of range: requested index {req_index}, array length {arr_len}")]
    ArrIndexOutOfRange {
        arr_name: String,
        req_index: usize,
        arr_len: usize,
    },

    /// Array index applied to a null or missing value
    #[error("indexing nil array {arr_name} with index {req_index}")]
    IndexingNilArray { arr_name: String, req_index: usize },

    /// Operand types rejected by an operator before evaluation
    #[error("operator {operator} does not accept {detail}")]
    OperatorMismatch { operator: String, detail: String },

    /// Conversion warnings escalated to a node failure
    #[error("conversion warnings: {0}")]
    ConversionWarnings(ConversionWarnings),

    /// Dynamic stream type could not be resolved from execution state
    #[error("dynamic stream resolution failed: {0}")]
    DynamicStream(String),

    /// Node configuration is unusable
    #[error("invalid node config: {0}")]
    InvalidConfig(String),
}

/// Canvas structure and adaptation errors
#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("start node not found")]
    StartNodeNotFound,

    #[error("end node not found")]
    EndNodeNotFound,

    /// An edge points at a node missing from the node map
    #[error("node not found for {0} in nodeMap")]
    NodeNotFound(String),

    /// Isolated-node pruning found an edge to an unknown node
    #[error("node id {0} not existed, but appears in the edge")]
    DanglingEdge(String),

    /// Failure inside a composite node's sub-canvas
    #[error("processing nested canvas for node {node_id}: {source}")]
    Nested {
        node_id: String,
        #[source]
        source: Box<CanvasError>,
    },

    /// Canvas types that cannot be mapped onto `TypeInfo`
    #[error("schema conversion failed: {0}")]
    SchemaConversion(String),

    /// A block input reference that cannot be interpreted
    #[error("invalid reference: {0}")]
    InvalidReference(String),
}

impl FlowError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a repository error
    pub fn repository(message: impl Into<String>) -> Self {
        Self::Repository(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl WorkflowError {
    pub fn missing_required(param: impl Into<String>) -> Self {
        Self::MissingRequiredParam {
            param: param.into(),
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub fn dynamic_stream(message: impl Into<String>) -> Self {
        Self::DynamicStream(message.into())
    }

    /// Warn-level errors carry partial results and should not abort a run
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::ConversionWarnings(_))
    }
}

impl CanvasError {
    pub fn schema(message: impl Into<String>) -> Self {
        Self::SchemaConversion(message.into())
    }

    pub fn nested(node_id: impl Into<String>, source: CanvasError) -> Self {
        Self::Nested {
            node_id: node_id.into(),
            source: Box::new(source),
        }
    }
}

impl From<&str> for FlowError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for FlowError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

// Convert from Box<dyn Error> for collaborators that still return boxed errors
impl From<Box<dyn std::error::Error + Send + Sync>> for FlowError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = WorkflowError::ArrIndexOutOfRange {
            arr_name: "arr".to_string(),
            req_index: 5,
            arr_len: 2,
        };
        assert_eq!(
            err.to_string(),
            "array arr index out of range: requested index 5, array length 2"
        );

        let err = CanvasError::nested("loop_1", CanvasError::EndNodeNotFound);
        assert_eq!(
            err.to_string(),
            "processing nested canvas for node loop_1: end node not found"
        );
    }

    #[test]
    fn test_flow_error_from_workflow() {
        let err: FlowError = WorkflowError::missing_required("input.name").into();
        assert!(matches!(
            err,
            FlowError::Workflow(WorkflowError::MissingRequiredParam { .. })
        ));
        assert!(err.to_string().contains("input.name"));
    }

    #[test]
    fn test_is_warning() {
        assert!(WorkflowError::ConversionWarnings(ConversionWarnings::default()).is_warning());
        assert!(!WorkflowError::invalid_parameter("x").is_warning());
    }
}

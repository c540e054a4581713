// SPDX-License-Identifier: MIT

//! Workflow graph compiler and execution runtime core
//!
//! - `canvas` loads authored canvases and adapts nodes into `NodeSchema`s
//! - `validate` reports structural issues before a canvas is published
//! - `convert`, `selector`, `stream` and `template` are used at every node
//!   boundary while a workflow runs
//! - `nodes` holds the evaluators of node kinds with real logic

pub mod canvas;
pub mod convert;
pub mod nodes;
pub mod schema;
pub mod selector;
pub mod state;
pub mod stream;
pub mod template;
pub mod types;
pub mod validate;

pub use canvas::{Canvas, CanvasLoader};
pub use convert::{convert, convert_inputs, ConversionWarnings, ConvertOptions};
pub use schema::{FieldStreamType, NodeSchema, SourceInfo};
pub use selector::{Clause, MultiClause, Operator, Selector};
pub use state::{ExecutionState, InMemoryExecutionState};
pub use template::{render, RenderOptions};
pub use types::{DataType, TypeInfo};
pub use validate::{validate_tree, CanvasValidator, Issue, ValidateConfig};

// SPDX-License-Identifier: MIT

//! Canvas documents: wire model, loading and adaptation to node schemas

pub mod adapt;
pub mod loader;
pub mod model;

pub use adapt::{
    block_input_to_field_info, block_input_to_type_info, canvas_to_schemas, node_to_schema,
    variable_to_type_info,
};
pub use loader::{find_node, prune_isolated_nodes, CanvasLoader, ParentTable};
pub use model::{
    BlockInput, BlockInputReference, BlockInputValueType, BlockType, Canvas, Edge, Inputs, Node,
    NodeData, NodeMeta, Param, RefSourceType, Variable, VariableType,
};

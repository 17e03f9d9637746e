//! # torch2lite
//!
//! Operator conversion engine lowering traced TorchScript graphs into a
//! flat inference IR.
//!
//! The pass walks the source graph's dependency-ordered node sequence once,
//! dispatches every `prim::*` / `aten::*` / `quantized::*` operator through
//! a name-keyed registry, and accumulates the lowered target graph together
//! with the bindings and quantization parameters each node leaves behind.
//!
//! ## Features
//!
//! - **Total dispatch**: one registry entry per qualified operator name,
//!   with in-place variants aliased to their out-of-place form
//! - **Trace-time evaluation**: constants, aggregates, and module attributes
//!   are resolved during conversion and inlined at their use sites
//! - **Quantization tracking**: scale/zero-point parameters flow through a
//!   side table from quantize to dequantize
//! - **Control flow**: `prim::If` lowers to a conditional node with nested
//!   branch bodies, or inlines when the condition is constant
//!
//! ## Example
//!
//! ```
//! use torch2lite::prelude::*;
//!
//! let mut graph = SourceGraph::new();
//! let x = graph.add_input(ValueKind::Tensor);
//! let y = graph.add_node("aten::relu", &[x.id], &[ValueKind::Tensor]);
//! graph.set_outputs(&[y[0].id]);
//!
//! let target = convert_graph(&graph)?;
//! assert_eq!(target.node_count(), 1);
//! # Ok::<(), torch2lite::ConvertError>(())
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// ============================================================================
// Module declarations
// ============================================================================

pub mod context;
pub mod convert;
pub mod error;
pub mod registry;
pub mod source;
pub mod target;
pub mod value;

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Prelude module - import commonly used types with `use torch2lite::prelude::*`
pub mod prelude {
    pub use crate::context::{Binding, ConversionContext, ConversionStats, QuantParams};
    pub use crate::convert::{convert_graph, convert_graph_with, NodeConverter, Outcome};
    pub use crate::error::{ConvertError, ConvertResult};
    pub use crate::registry::Registry;
    pub use crate::source::{OpName, SourceGraph, SourceNode, ValueId, ValueKind, ValueRef};
    pub use crate::target::{TargetGraph, TargetInput, TargetNode, TargetOp, TensorHandle};
    pub use crate::value::Constant;
}

// ============================================================================
// Crate-level re-exports
// ============================================================================

pub use convert::{convert_graph, convert_graph_with};
pub use error::{ConvertError, ConvertResult};
pub use registry::Registry;
pub use source::SourceGraph;
pub use target::TargetGraph;

// ============================================================================
// Version information
// ============================================================================

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

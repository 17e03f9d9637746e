//! Source IR: the traced computation graph being converted
//!
//! The source graph is single-assignment: every value is produced by exactly
//! one node (or is a graph input) and consumed by zero or more downstream
//! nodes. Nodes arrive already dependency-ordered from the tracer, so the
//! engine never topologically sorts.
//!
//! The builder-style constructors on [`SourceGraph`] form the input boundary:
//! an external tracing component populates the graph through them.

use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::value::Constant;

mod attrs;

pub use attrs::Attribute;

/// A qualified operator name of the form `namespace::op`
///
/// Identity key for registry lookup. Case- and form-sensitive; there is no
/// overload resolution by argument type, dispatch is purely by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OpName(String);

impl OpName {
    /// Create an operator name from its qualified string form
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The full qualified name
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The namespace part (`aten` in `aten::relu`)
    pub fn namespace(&self) -> &str {
        self.0.split("::").next().unwrap_or("")
    }

    /// The unqualified operator part (`relu` in `aten::relu`)
    pub fn op(&self) -> &str {
        self.0.split("::").nth(1).unwrap_or(&self.0)
    }

    /// Whether this is a mutating ("in-place") variant, by naming convention
    pub fn is_inplace(&self) -> bool {
        self.0.ends_with('_')
    }
}

impl fmt::Display for OpName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OpName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Stable identifier of one produced value in the source graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Kind tag carried by every value reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Runtime tensor
    Tensor,
    /// Compile-time constant scalar or sequence
    Constant,
    /// Ordered collection of values
    List,
    /// Fixed-arity collection of values
    Tuple,
    /// Keyed collection of values
    Dict,
    /// Handle into the module attribute hierarchy
    AttributeHandle,
}

/// Reference to one output slot of one source node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueRef {
    /// The value's stable identifier
    pub id: ValueId,
    /// The value's kind tag
    pub kind: ValueKind,
}

/// A nested block of nodes (a conditional branch)
#[derive(Debug, Clone, Default)]
pub struct Block {
    /// Nodes of the block, dependency-ordered like the outer graph
    pub nodes: Vec<SourceNode>,
    /// Values the block yields to its parent node's outputs
    pub outputs: SmallVec<[ValueId; 2]>,
}

/// One node of the source graph
#[derive(Debug, Clone)]
pub struct SourceNode {
    /// Qualified operator name
    pub op: OpName,
    /// Ordered input value ids
    pub inputs: SmallVec<[ValueId; 4]>,
    /// Declared outputs (id plus kind tag)
    pub outputs: SmallVec<[ValueRef; 2]>,
    /// Embedded literal attributes
    pub attrs: Vec<Attribute>,
    /// Nested blocks (`prim::If` carries then/else)
    pub blocks: Vec<Block>,
}

impl SourceNode {
    /// Create a node with no attributes or blocks
    pub fn new(op: impl Into<OpName>, inputs: &[ValueId], outputs: &[ValueRef]) -> Self {
        Self {
            op: op.into(),
            inputs: inputs.iter().copied().collect(),
            outputs: outputs.iter().copied().collect(),
            attrs: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Input id at position, or an invalid-node error
    pub fn input(&self, index: usize) -> crate::error::ConvertResult<ValueId> {
        self.inputs
            .get(index)
            .copied()
            .ok_or_else(|| crate::error::ConvertError::InvalidNode {
                op: self.op.as_str().to_string(),
                reason: format!("expected input at position {index}, node has {}", self.inputs.len()),
            })
    }

    /// Single declared output, or an invalid-node error
    pub fn single_output(&self) -> crate::error::ConvertResult<ValueRef> {
        if self.outputs.len() != 1 {
            return Err(crate::error::ConvertError::InvalidNode {
                op: self.op.as_str().to_string(),
                reason: format!("expected exactly one output, node declares {}", self.outputs.len()),
            });
        }
        Ok(self.outputs[0])
    }
}

/// The traced source graph
#[derive(Debug, Clone, Default)]
pub struct SourceGraph {
    /// External inputs (activations plus the module `self` handle)
    pub inputs: Vec<ValueRef>,
    /// Dependency-ordered node list
    pub nodes: Vec<SourceNode>,
    /// Declared external outputs
    pub outputs: Vec<ValueId>,
    /// Module attribute store, keyed by dotted path (`conv1.weight`)
    pub attributes: FxHashMap<String, Constant>,
    next_id: u32,
}

impl SourceGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh value of the given kind
    pub fn fresh_value(&mut self, kind: ValueKind) -> ValueRef {
        let id = ValueId(self.next_id);
        self.next_id += 1;
        ValueRef { id, kind }
    }

    /// Declare an external graph input
    pub fn add_input(&mut self, kind: ValueKind) -> ValueRef {
        let vref = self.fresh_value(kind);
        self.inputs.push(vref);
        vref
    }

    /// Append a node, allocating one output per kind in `output_kinds`
    pub fn add_node(
        &mut self,
        op: impl Into<OpName>,
        inputs: &[ValueId],
        output_kinds: &[ValueKind],
    ) -> SmallVec<[ValueRef; 2]> {
        let outputs: SmallVec<[ValueRef; 2]> = output_kinds
            .iter()
            .map(|&kind| self.fresh_value(kind))
            .collect();
        self.nodes.push(SourceNode::new(op, inputs, &outputs));
        outputs
    }

    /// Append a fully-formed node (attributes, blocks)
    pub fn push(&mut self, node: SourceNode) {
        self.nodes.push(node);
    }

    /// Append a `prim::Constant` node embedding `value`
    pub fn add_constant(&mut self, value: Constant) -> ValueRef {
        let out = self.fresh_value(ValueKind::Constant);
        let mut node = SourceNode::new("prim::Constant", &[], &[out]);
        node.attrs.push(Attribute::new("value", value));
        self.nodes.push(node);
        out
    }

    /// Declare the graph's external outputs
    pub fn set_outputs(&mut self, outputs: &[ValueId]) {
        self.outputs = outputs.to_vec();
    }

    /// Store a module attribute under a dotted path
    pub fn set_attribute(&mut self, path: impl Into<String>, value: Constant) {
        self.attributes.insert(path.into(), value);
    }

    /// Number of nodes in the top-level block
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_name_parts() {
        let op = OpName::new("aten::relu");
        assert_eq!(op.namespace(), "aten");
        assert_eq!(op.op(), "relu");
        assert!(!op.is_inplace());
        assert!(OpName::new("aten::relu_").is_inplace());
    }

    #[test]
    fn test_op_name_display() {
        assert_eq!(OpName::new("prim::If").to_string(), "prim::If");
    }

    #[test]
    fn test_graph_builder_assigns_unique_ids() {
        let mut g = SourceGraph::new();
        let x = g.add_input(ValueKind::Tensor);
        let y = g.add_node("aten::relu", &[x.id], &[ValueKind::Tensor]);
        assert_ne!(x.id, y[0].id);
        assert_eq!(g.node_count(), 1);
        assert_eq!(g.inputs.len(), 1);
    }

    #[test]
    fn test_add_constant_embeds_literal() {
        let mut g = SourceGraph::new();
        let c = g.add_constant(Constant::Int(7));
        assert_eq!(c.kind, ValueKind::Constant);
        let node = &g.nodes[0];
        assert_eq!(node.op.as_str(), "prim::Constant");
        assert_eq!(node.attr("value").and_then(Constant::as_int), Some(7));
    }

    #[test]
    fn test_node_input_out_of_range() {
        let node = SourceNode::new("aten::relu", &[], &[]);
        assert!(node.input(0).is_err());
    }
}

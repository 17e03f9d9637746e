//! Conversion context: the only mutable state of a conversion pass
//!
//! `ConversionContext` mirrors the source graph's single-assignment value
//! space with an append-only binding arena, accumulates the ordered target
//! node sequence, and carries the quantization parameter side table. It is
//! created once per full-graph conversion, exclusively owned by the dispatch
//! loop, and discarded after the target graph is finalized.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::error::{ConvertError, ConvertResult};
use crate::source::{OpName, SourceGraph, ValueId, ValueKind};
use crate::target::{TargetGraph, TargetInput, TargetNode, TensorHandle};
use crate::value::Constant;

/// Resolved target representation of one source value
#[derive(Debug, Clone)]
pub enum Binding {
    /// A runtime tensor in the target graph
    Tensor(TensorHandle),
    /// A compile-time constant payload
    Constant(Constant),
    /// A fixed-arity grouping of already-resolved values
    Tuple(Vec<ValueId>),
    /// An ordered grouping of already-resolved values
    List(Vec<ValueId>),
    /// A keyed grouping of already-resolved values (key order is semantic)
    Dict(IndexMap<String, ValueId>),
    /// A path into the module attribute hierarchy
    Attribute(String),
}

impl Binding {
    /// Kind tag of this binding
    pub fn kind(&self) -> ValueKind {
        match self {
            Binding::Tensor(_) => ValueKind::Tensor,
            Binding::Constant(_) => ValueKind::Constant,
            Binding::Tuple(_) => ValueKind::Tuple,
            Binding::List(_) => ValueKind::List,
            Binding::Dict(_) => ValueKind::Dict,
            Binding::Attribute(_) => ValueKind::AttributeHandle,
        }
    }
}

/// Per-tensor quantization parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
    /// Scale factor
    pub scale: f64,
    /// Zero point
    pub zero_point: i64,
}

/// Counters reported after a conversion pass
#[derive(Debug, Default, Clone, Copy)]
pub struct ConversionStats {
    /// Source nodes dispatched
    pub nodes_converted: usize,
    /// Target nodes emitted
    pub nodes_emitted: usize,
    /// Compile-time constants bound without emission
    pub constants_bound: usize,
    /// Nodes consumed without binding anything
    pub nodes_skipped: usize,
}

/// Mutable per-conversion state, owned by the dispatch loop
#[derive(Debug)]
pub struct ConversionContext<'g> {
    attrs: &'g FxHashMap<String, Constant>,
    bindings: FxHashMap<u32, Binding>,
    quant: FxHashMap<u32, QuantParams>,
    nodes: Vec<TargetNode>,
    graph_inputs: Vec<TensorHandle>,
    next_handle: u32,
    /// Pass counters, updated by the dispatch loop
    pub stats: ConversionStats,
}

impl<'g> ConversionContext<'g> {
    /// Create a context for one conversion of `graph`
    pub fn new(graph: &'g SourceGraph) -> Self {
        Self {
            attrs: &graph.attributes,
            bindings: FxHashMap::default(),
            quant: FxHashMap::default(),
            nodes: Vec::with_capacity(graph.node_count()),
            graph_inputs: Vec::new(),
            next_handle: 0,
            stats: ConversionStats::default(),
        }
    }

    // ========================================================================
    // Bindings
    // ========================================================================

    /// Bind a value to its resolved representation
    ///
    /// Re-binding an already-resolved value is a programming error in the
    /// engine, not a recoverable runtime condition.
    pub fn bind(&mut self, id: ValueId, binding: Binding) {
        let prev = self.bindings.insert(id.0, binding);
        debug_assert!(prev.is_none(), "value {id} bound twice");
    }

    /// Resolve a value consumed by `op`
    pub fn resolve(&self, id: ValueId, op: &OpName) -> ConvertResult<&Binding> {
        self.bindings
            .get(&id.0)
            .ok_or_else(|| ConvertError::UnresolvedValue {
                value: id.0,
                op: op.as_str().to_string(),
            })
    }

    /// Whether a value is already resolved
    pub fn is_bound(&self, id: ValueId) -> bool {
        self.bindings.contains_key(&id.0)
    }

    /// Number of resolved values
    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    /// Resolve a value as a target-node input (tensor handle or inline
    /// constant)
    pub fn tensor_input(&self, id: ValueId, op: &OpName) -> ConvertResult<TargetInput> {
        match self.resolve(id, op)? {
            Binding::Tensor(h) => Ok(TargetInput::Handle(*h)),
            Binding::Constant(c) => Ok(TargetInput::Constant(c.clone())),
            other => Err(ConvertError::InvalidNode {
                op: op.as_str().to_string(),
                reason: format!("input {id} is a {:?}, expected tensor or constant", other.kind()),
            }),
        }
    }

    /// Resolve a value that must be a compile-time constant
    pub fn constant(&self, id: ValueId, op: &OpName) -> ConvertResult<&Constant> {
        match self.resolve(id, op)? {
            Binding::Constant(c) => Ok(c),
            _ => Err(ConvertError::ConstantKind {
                op: op.as_str().to_string(),
                value: id.0,
                expected: "constant",
            }),
        }
    }

    /// Resolve a value as a constant integer scalar
    pub fn constant_int(&self, id: ValueId, op: &OpName) -> ConvertResult<i64> {
        self.constant(id, op)?
            .as_int()
            .ok_or(ConvertError::ConstantKind {
                op: op.as_str().to_string(),
                value: id.0,
                expected: "integer",
            })
    }

    /// Resolve a value as a constant float scalar
    pub fn constant_float(&self, id: ValueId, op: &OpName) -> ConvertResult<f64> {
        self.constant(id, op)?
            .as_float()
            .ok_or(ConvertError::ConstantKind {
                op: op.as_str().to_string(),
                value: id.0,
                expected: "float",
            })
    }

    /// Resolve a value as a constant integer sequence
    pub fn constant_ints(&self, id: ValueId, op: &OpName) -> ConvertResult<Vec<i64>> {
        self.constant(id, op)?
            .as_ints()
            .ok_or(ConvertError::ConstantKind {
                op: op.as_str().to_string(),
                value: id.0,
                expected: "integer list",
            })
    }

    /// Resolve a value as a list or tuple aggregate, yielding its elements
    pub fn aggregate_elements(&self, id: ValueId, op: &OpName) -> ConvertResult<&[ValueId]> {
        match self.resolve(id, op)? {
            Binding::List(items) | Binding::Tuple(items) => Ok(items),
            other => Err(ConvertError::InvalidNode {
                op: op.as_str().to_string(),
                reason: format!("input {id} is a {:?}, expected list or tuple", other.kind()),
            }),
        }
    }

    /// Look up a module attribute by dotted path
    pub fn module_attribute(&self, path: &str) -> Option<&Constant> {
        self.attrs.get(path)
    }

    // ========================================================================
    // Target graph accretion
    // ========================================================================

    /// Allocate a fresh target tensor handle
    pub fn alloc_handle(&mut self) -> TensorHandle {
        let h = TensorHandle(self.next_handle);
        self.next_handle += 1;
        h
    }

    /// Allocate a handle registered as an external graph input
    pub fn alloc_input_handle(&mut self) -> TensorHandle {
        let h = self.alloc_handle();
        self.graph_inputs.push(h);
        h
    }

    /// Append an emitted node to the target sequence
    pub fn push_node(&mut self, node: TargetNode) {
        self.nodes.push(node);
    }

    /// Current length of the target node sequence (branch mark)
    pub fn node_mark(&self) -> usize {
        self.nodes.len()
    }

    /// Detach every node emitted after `mark`
    ///
    /// Used by the conditional converter to carve branch-local emissions out
    /// of the shared sequence.
    pub fn split_nodes_from(&mut self, mark: usize) -> Vec<TargetNode> {
        self.nodes.split_off(mark)
    }

    // ========================================================================
    // Quantization side table
    // ========================================================================

    /// Record quantization parameters for a value
    ///
    /// Append-only per value: a value is quantized or not for its whole
    /// lifetime.
    pub fn set_quant_params(&mut self, id: ValueId, params: QuantParams) {
        let prev = self.quant.insert(id.0, params);
        debug_assert!(prev.is_none(), "quantization params for {id} set twice");
    }

    /// Quantization parameters for a value, if any
    pub fn quant_params(&self, id: ValueId) -> Option<QuantParams> {
        self.quant.get(&id.0).copied()
    }

    /// Quantization parameters required by a fused kernel
    pub fn require_quant_params(&self, id: ValueId, op: &OpName) -> ConvertResult<QuantParams> {
        self.quant_params(id)
            .ok_or_else(|| ConvertError::MissingQuantizationParams {
                op: op.as_str().to_string(),
                value: id.0,
            })
    }

    /// Copy quantization parameters from one value to another, if present
    ///
    /// Used by pass-through and destructuring converters so a quantized
    /// tensor stays quantized across context-level regrouping.
    pub fn propagate_quant_params(&mut self, from: ValueId, to: ValueId) {
        if let Some(params) = self.quant_params(from) {
            self.set_quant_params(to, params);
        }
    }

    // ========================================================================
    // Finalization
    // ========================================================================

    /// Consume the context and assemble the target graph
    ///
    /// Aggregate outputs (tuples, lists, dicts) are flattened recursively,
    /// matching how a traced module's tupled return lowers to a flat output
    /// list.
    pub fn finish(mut self, outputs: &[ValueId]) -> ConvertResult<TargetGraph> {
        let op = OpName::new("<graph output>");
        let mut resolved = Vec::with_capacity(outputs.len());
        for &id in outputs {
            self.flatten_output(id, &op, &mut resolved)?;
        }

        Ok(TargetGraph {
            inputs: std::mem::take(&mut self.graph_inputs),
            nodes: std::mem::take(&mut self.nodes),
            outputs: resolved,
        })
    }

    fn flatten_output(
        &self,
        id: ValueId,
        op: &OpName,
        out: &mut Vec<TargetInput>,
    ) -> ConvertResult<()> {
        match self.resolve(id, op)? {
            Binding::Tensor(h) => out.push(TargetInput::Handle(*h)),
            Binding::Constant(c) => out.push(TargetInput::Constant(c.clone())),
            Binding::Tuple(items) | Binding::List(items) => {
                for item in items.clone() {
                    self.flatten_output(item, op, out)?;
                }
            }
            Binding::Dict(items) => {
                for (_, item) in items.clone() {
                    self.flatten_output(item, op, out)?;
                }
            }
            Binding::Attribute(path) => {
                return Err(ConvertError::InvalidNode {
                    op: op.as_str().to_string(),
                    reason: format!("attribute handle '{path}' cannot be a graph output"),
                })
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::TargetOp;

    fn empty_graph() -> SourceGraph {
        SourceGraph::new()
    }

    #[test]
    fn test_bind_and_resolve() {
        let graph = empty_graph();
        let mut ctx = ConversionContext::new(&graph);
        let id = ValueId(0);

        assert!(!ctx.is_bound(id));
        ctx.bind(id, Binding::Constant(Constant::Int(5)));
        assert!(ctx.is_bound(id));

        let op = OpName::new("aten::add");
        assert_eq!(ctx.constant_int(id, &op).unwrap(), 5);
    }

    #[test]
    fn test_unresolved_value_error() {
        let graph = empty_graph();
        let ctx = ConversionContext::new(&graph);
        let op = OpName::new("aten::relu");

        let err = ctx.resolve(ValueId(42), &op).unwrap_err();
        match err {
            ConvertError::UnresolvedValue { value, op } => {
                assert_eq!(value, 42);
                assert_eq!(op, "aten::relu");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_tensor_input_rejects_aggregates() {
        let graph = empty_graph();
        let mut ctx = ConversionContext::new(&graph);
        ctx.bind(ValueId(0), Binding::List(vec![]));

        let op = OpName::new("aten::relu");
        assert!(ctx.tensor_input(ValueId(0), &op).is_err());
    }

    #[test]
    fn test_branch_mark_split() {
        let graph = empty_graph();
        let mut ctx = ConversionContext::new(&graph);

        let h0 = ctx.alloc_handle();
        ctx.push_node(TargetNode::new(TargetOp::Relu, [], [h0]));
        let mark = ctx.node_mark();

        let h1 = ctx.alloc_handle();
        let h2 = ctx.alloc_handle();
        ctx.push_node(TargetNode::new(TargetOp::Tanh, [], [h1]));
        ctx.push_node(TargetNode::new(TargetOp::Logistic, [], [h2]));

        let branch = ctx.split_nodes_from(mark);
        assert_eq!(branch.len(), 2);
        assert_eq!(ctx.node_mark(), 1);
    }

    #[test]
    fn test_quant_params_roundtrip() {
        let graph = empty_graph();
        let mut ctx = ConversionContext::new(&graph);
        let params = QuantParams {
            scale: 0.05,
            zero_point: 128,
        };

        ctx.set_quant_params(ValueId(1), params);
        assert_eq!(ctx.quant_params(ValueId(1)), Some(params));
        assert_eq!(ctx.quant_params(ValueId(2)), None);

        let op = OpName::new("quantized::add");
        let err = ctx.require_quant_params(ValueId(2), &op).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::MissingQuantizationParams { value: 2, .. }
        ));
    }

    #[test]
    fn test_finish_flattens_tuple_outputs() {
        let graph = empty_graph();
        let mut ctx = ConversionContext::new(&graph);

        let h = ctx.alloc_handle();
        ctx.bind(ValueId(0), Binding::Tensor(h));
        ctx.bind(ValueId(1), Binding::Constant(Constant::Int(3)));
        ctx.bind(ValueId(2), Binding::Tuple(vec![ValueId(0), ValueId(1)]));

        let target = ctx.finish(&[ValueId(2)]).unwrap();
        assert_eq!(target.outputs.len(), 2);
        assert_eq!(target.outputs[0], TargetInput::Handle(h));
    }
}

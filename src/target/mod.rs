//! Target IR: the lowered graph consumed by the inference runtime
//!
//! The target graph is a flat, ordered sequence of nodes over dense tensor
//! handles. Serialization of this IR is out of scope; a downstream writer
//! consumes [`TargetGraph`] directly.

use smallvec::SmallVec;

use crate::value::Constant;

/// Handle to one tensor in the target graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorHandle(pub u32);

/// One input of a target node: a produced tensor or an inlined constant
#[derive(Debug, Clone, PartialEq)]
pub enum TargetInput {
    /// Reference to a tensor produced earlier (or a graph input)
    Handle(TensorHandle),
    /// Constant payload inlined at the use site
    Constant(Constant),
}

/// Closed set of target operator kinds
///
/// One variant per distinct lowered kernel. Several source operators share a
/// variant when they lower to the same kernel (`aten::view` and
/// `aten::reshape` both become [`TargetOp::Reshape`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum TargetOp {
    // Elementwise unary
    Abs,
    Atan2,
    Cos,
    Exp,
    Floor,
    Log,
    Logistic,
    Neg,
    Reciprocal,
    Round,
    Rsqrt,
    Sign,
    Sin,
    Sqrt,
    Tanh,

    // Activations
    Clamp,
    Elu,
    Gelu,
    Glu,
    HardSigmoid,
    HardSwish,
    LeakyRelu,
    Mish,
    Prelu,
    Relu,
    Relu6,
    Silu,
    Softplus,

    // Elementwise binary / comparison / logical
    Add,
    Div,
    Equal,
    Fill,
    FloorDiv,
    FloorMod,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    LogicalAnd,
    LogicalNot,
    LogicalOr,
    Maximum,
    Minimum,
    Mul,
    NotEqual,
    Pow,
    SelectV2,
    Sub,

    // Reductions
    ArgMax,
    ArgMin,
    Cumsum,
    Mean,
    Norm,
    Prod,
    ReduceMax,
    ReduceMin,
    Std,
    Sum,
    TopK,
    Var,

    // Shape and data movement
    BatchMatMul,
    BroadcastTo,
    Cast,
    Col2im,
    Concat,
    DepthToSpace,
    ExpandDims,
    Gather,
    GatherNd,
    Im2col,
    Meshgrid,
    MirrorPad,
    Pack,
    Pad,
    Reshape,
    ResizeBilinear,
    ResizeNearestNeighbor,
    ReverseV2,
    Roll,
    ScatterNd,
    SpaceToDepth,
    Split,
    SplitV,
    Squeeze,
    StridedSlice,
    Tile,
    Transpose,
    Unpack,

    // Neural-network kernels
    AdaptiveAvgPool2d,
    AdaptiveMaxPool2d,
    AveragePool2d,
    BatchNorm,
    Conv2d,
    FullyConnected,
    GroupNorm,
    Gru,
    InstanceNorm,
    LayerNorm,
    MaxPool2d,
    Softmax,
    LogSoftmax,
    UnidirectionalLstm,

    // Quantization
    Dequantize,
    FakeQuant,
    Quantize,
    QuantizedAdd,
    QuantizedAddRelu,
    QuantizedAddScalar,
    QuantizedBatchNorm1d,
    QuantizedBatchNorm2d,
    QuantizedBatchNorm2dRelu,
    QuantizedCat,
    QuantizedConv1d,
    QuantizedConv1dRelu,
    QuantizedConv2d,
    QuantizedConv2dRelu,
    QuantizedConvTranspose1d,
    QuantizedConvTranspose2d,
    QuantizedElu,
    QuantizedHardswish,
    QuantizedLeakyRelu,
    QuantizedLinear,
    QuantizedLinearDynamic,
    QuantizedLinearRelu,
    QuantizedLinearReluDynamic,
    QuantizedLstm,
    QuantizedMul,
    QuantizedMulScalar,
    QuantizedRelu6,

    // Control flow
    Cond,
}

/// One node of the target graph
#[derive(Debug, Clone)]
pub struct TargetNode {
    /// Lowered operator kind
    pub op: TargetOp,
    /// Ordered inputs
    pub inputs: SmallVec<[TargetInput; 4]>,
    /// Produced tensor handles
    pub outputs: SmallVec<[TensorHandle; 2]>,
    /// Lowered attributes (axis, stride, scale, ...)
    pub attrs: Vec<(&'static str, Constant)>,
    /// Nested bodies; only [`TargetOp::Cond`] carries them (then, else)
    pub blocks: Vec<TargetBlock>,
}

impl TargetNode {
    /// Create a node without attributes or blocks
    pub fn new(
        op: TargetOp,
        inputs: impl IntoIterator<Item = TargetInput>,
        outputs: impl IntoIterator<Item = TensorHandle>,
    ) -> Self {
        Self {
            op,
            inputs: inputs.into_iter().collect(),
            outputs: outputs.into_iter().collect(),
            attrs: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Attach an attribute (builder style)
    pub fn with_attr(mut self, name: &'static str, value: Constant) -> Self {
        self.attrs.push((name, value));
        self
    }

    /// Get an attribute by name
    pub fn attr(&self, name: &str) -> Option<&Constant> {
        self.attrs
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }
}

/// A nested node sequence inside a conditional construct
#[derive(Debug, Clone, Default)]
pub struct TargetBlock {
    /// Branch-local nodes, in emission order
    pub nodes: Vec<TargetNode>,
    /// Values the branch yields, one per merged output slot
    pub outputs: SmallVec<[TargetInput; 2]>,
}

/// The fully converted target graph
#[derive(Debug, Clone, Default)]
pub struct TargetGraph {
    /// Handles bound to the source graph's external tensor inputs, in order
    pub inputs: Vec<TensorHandle>,
    /// Ordered node sequence
    pub nodes: Vec<TargetNode>,
    /// Resolved representations of the source graph's external outputs
    pub outputs: Vec<TargetInput>,
}

impl TargetGraph {
    /// Number of emitted nodes (top level only)
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Iterate over top-level operator kinds in emission order
    pub fn ops(&self) -> impl Iterator<Item = TargetOp> + '_ {
        self.nodes.iter().map(|n| n.op)
    }

    /// Whether any top-level node has the given kind
    pub fn contains_op(&self, op: TargetOp) -> bool {
        self.nodes.iter().any(|n| n.op == op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_attrs() {
        let node = TargetNode::new(
            TargetOp::Concat,
            [TargetInput::Handle(TensorHandle(0))],
            [TensorHandle(1)],
        )
        .with_attr("axis", Constant::Int(1));

        assert_eq!(node.attr("axis").and_then(Constant::as_int), Some(1));
        assert!(node.attr("stride").is_none());
    }

    #[test]
    fn test_graph_ops_iteration() {
        let mut graph = TargetGraph::default();
        graph.nodes.push(TargetNode::new(TargetOp::Relu, [], [TensorHandle(0)]));
        graph.nodes.push(TargetNode::new(TargetOp::Conv2d, [], [TensorHandle(1)]));

        let ops: Vec<_> = graph.ops().collect();
        assert_eq!(ops, vec![TargetOp::Relu, TargetOp::Conv2d]);
        assert!(graph.contains_op(TargetOp::Conv2d));
        assert!(!graph.contains_op(TargetOp::Softmax));
    }
}

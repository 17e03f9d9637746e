//! Leaf numeric converters (`aten::*`)
//!
//! Most numeric operators are mechanical: resolved tensor inputs in, one
//! target node out. [`SimpleOp`] covers that whole family, parameterized by
//! the target kind; constants among the inputs are inlined at the use site.
//! The structured converters below handle the operators that need attribute
//! extraction or aggregate inputs.

use smallvec::SmallVec;

use crate::context::{Binding, ConversionContext};
use crate::error::{ConvertError, ConvertResult};
use crate::registry::Registry;
use crate::source::SourceNode;
use crate::target::{TargetInput, TargetNode, TargetOp};
use crate::value::Constant;

use super::{NodeConverter, Outcome};

fn resolve_inputs(
    node: &SourceNode,
    ctx: &ConversionContext<'_>,
) -> ConvertResult<SmallVec<[TargetInput; 4]>> {
    node.inputs
        .iter()
        .map(|&id| ctx.tensor_input(id, &node.op))
        .collect()
}

/// Generic fixed-shape converter: all inputs in, one node out
///
/// Handles any operator whose lowering is a single target node over its
/// resolved inputs, with one handle allocated per declared output.
pub struct SimpleOp {
    /// Target kind the node lowers to
    pub target: TargetOp,
}

impl NodeConverter for SimpleOp {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let inputs = resolve_inputs(node, ctx)?;
        let mut outputs = SmallVec::new();
        let mut bindings = Vec::with_capacity(node.outputs.len());
        for out in &node.outputs {
            let handle = ctx.alloc_handle();
            outputs.push(handle);
            bindings.push((out.id, Binding::Tensor(handle)));
        }

        let mut target = TargetNode::new(self.target, inputs, []);
        target.outputs = outputs;
        Ok(Outcome::Emitted {
            nodes: vec![target],
            bindings,
        })
    }
}

/// Identity at inference time (`aten::dropout`, `aten::contiguous`, ...)
///
/// Re-binds the input's resolution to the output and keeps quantization
/// parameters flowing; nothing is emitted.
pub struct Passthrough;

impl NodeConverter for Passthrough {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let input = node.input(0)?;
        let binding = ctx.resolve(input, &node.op)?.clone();
        ctx.propagate_quant_params(input, out.id);
        Ok(Outcome::bindings_only(vec![(out.id, binding)]))
    }
}

/// `aten::conv2d` / `aten::_convolution`
///
/// Stride, padding, dilation, and groups arrive as constant inputs and lower
/// to attributes; input, weight, and bias stay node inputs.
pub struct Conv2d {
    /// Whether the node carries the extended `_convolution` signature
    pub extended: bool,
}

impl NodeConverter for Conv2d {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let input = ctx.tensor_input(node.input(0)?, &node.op)?;
        let weight = ctx.tensor_input(node.input(1)?, &node.op)?;
        let bias = ctx.tensor_input(node.input(2)?, &node.op)?;

        let stride = ctx.constant_ints(node.input(3)?, &node.op)?;
        let padding = ctx.constant_ints(node.input(4)?, &node.op)?;
        let dilation = ctx.constant_ints(node.input(5)?, &node.op)?;
        let groups_pos = if self.extended { 8 } else { 6 };
        let groups = ctx.constant_int(node.input(groups_pos)?, &node.op)?;

        let handle = ctx.alloc_handle();
        let target = TargetNode::new(TargetOp::Conv2d, [input, weight, bias], [handle])
            .with_attr("stride", Constant::IntList(stride))
            .with_attr("padding", Constant::IntList(padding))
            .with_attr("dilation", Constant::IntList(dilation))
            .with_attr("groups", Constant::Int(groups));
        Ok(Outcome::single(target, out.id, Binding::Tensor(handle)))
    }
}

/// `aten::linear`: input, weight, bias -> fully connected
pub struct Linear;

impl NodeConverter for Linear {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let input = ctx.tensor_input(node.input(0)?, &node.op)?;
        let weight = ctx.tensor_input(node.input(1)?, &node.op)?;
        let bias = ctx.tensor_input(node.input(2)?, &node.op)?;

        let handle = ctx.alloc_handle();
        let target = TargetNode::new(TargetOp::FullyConnected, [input, weight, bias], [handle]);
        Ok(Outcome::single(target, out.id, Binding::Tensor(handle)))
    }
}

/// `aten::addmm`: bias, mat1, mat2 (+ beta/alpha scalars) -> fully connected
pub struct Addmm;

impl NodeConverter for Addmm {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let bias = ctx.tensor_input(node.input(0)?, &node.op)?;
        let mat1 = ctx.tensor_input(node.input(1)?, &node.op)?;
        let mat2 = ctx.tensor_input(node.input(2)?, &node.op)?;
        let beta = ctx.constant_float(node.input(3)?, &node.op)?;
        let alpha = ctx.constant_float(node.input(4)?, &node.op)?;

        let handle = ctx.alloc_handle();
        let target = TargetNode::new(TargetOp::FullyConnected, [mat1, mat2, bias], [handle])
            .with_attr("alpha", Constant::Float(alpha))
            .with_attr("beta", Constant::Float(beta));
        Ok(Outcome::single(target, out.id, Binding::Tensor(handle)))
    }
}

/// `aten::cat` / `aten::stack`: concatenate a list aggregate along an axis
pub struct CatStack {
    /// Stack introduces a new axis (`Pack`); cat joins along an existing one
    pub pack: bool,
}

impl NodeConverter for CatStack {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let elements = ctx.aggregate_elements(node.input(0)?, &node.op)?.to_vec();
        let axis = ctx.constant_int(node.input(1)?, &node.op)?;

        let inputs: SmallVec<[TargetInput; 4]> = elements
            .iter()
            .map(|&id| ctx.tensor_input(id, &node.op))
            .collect::<ConvertResult<_>>()?;

        let op = if self.pack {
            TargetOp::Pack
        } else {
            TargetOp::Concat
        };
        let handle = ctx.alloc_handle();
        let target = TargetNode::new(op, inputs, [handle]).with_attr("axis", Constant::Int(axis));
        Ok(Outcome::single(target, out.id, Binding::Tensor(handle)))
    }
}

/// `aten::chunk` / `aten::unsafe_chunk`
///
/// Chunk count and axis are constant inputs. A constant source splits at
/// conversion time; a runtime tensor lowers to one split node with one
/// output handle per piece.
pub struct Chunk;

impl NodeConverter for Chunk {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let chunks = ctx.constant_int(node.input(1)?, &node.op)? as usize;
        let axis = ctx.constant_int(node.input(2)?, &node.op)?;
        if node.outputs.len() != chunks {
            return Err(ConvertError::DestructureArity {
                op: node.op.as_str().to_string(),
                actual: chunks,
                declared: node.outputs.len(),
            });
        }

        match ctx.resolve(node.input(0)?, &node.op)?.clone() {
            Binding::Constant(value) => {
                let pieces = value.chunk(chunks, axis)?;
                Ok(Outcome::ConstantBound(
                    node.outputs
                        .iter()
                        .zip(pieces)
                        .map(|(out, piece)| (out.id, piece))
                        .collect(),
                ))
            }
            Binding::Tensor(source) => {
                let mut outputs = SmallVec::new();
                let mut bindings = Vec::with_capacity(chunks);
                for out in &node.outputs {
                    let handle = ctx.alloc_handle();
                    outputs.push(handle);
                    bindings.push((out.id, Binding::Tensor(handle)));
                }
                let mut target = TargetNode::new(
                    TargetOp::Split,
                    [TargetInput::Handle(source)],
                    [],
                )
                .with_attr("axis", Constant::Int(axis))
                .with_attr("chunks", Constant::Int(chunks as i64));
                target.outputs = outputs;
                Ok(Outcome::Emitted {
                    nodes: vec![target],
                    bindings,
                })
            }
            other => Err(ConvertError::InvalidNode {
                op: node.op.as_str().to_string(),
                reason: format!("cannot chunk a {:?}", other.kind()),
            }),
        }
    }
}

/// `aten::view` / `aten::reshape`: constant shape input becomes an attribute
pub struct Reshape;

impl NodeConverter for Reshape {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let input = ctx.tensor_input(node.input(0)?, &node.op)?;
        let shape = ctx.constant_ints(node.input(1)?, &node.op)?;

        let handle = ctx.alloc_handle();
        let target = TargetNode::new(TargetOp::Reshape, [input], [handle])
            .with_attr("shape", Constant::IntList(shape));
        Ok(Outcome::single(target, out.id, Binding::Tensor(handle)))
    }
}

/// `aten::permute`: constant axis order becomes an attribute
pub struct Permute;

impl NodeConverter for Permute {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let input = ctx.tensor_input(node.input(0)?, &node.op)?;
        let perm = ctx.constant_ints(node.input(1)?, &node.op)?;

        let handle = ctx.alloc_handle();
        let target = TargetNode::new(TargetOp::Transpose, [input], [handle])
            .with_attr("perm", Constant::IntList(perm));
        Ok(Outcome::single(target, out.id, Binding::Tensor(handle)))
    }
}

/// `aten::softmax` / `aten::log_softmax`
pub struct Softmax {
    /// Whether to emit the log-space variant
    pub log: bool,
}

impl NodeConverter for Softmax {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let input = ctx.tensor_input(node.input(0)?, &node.op)?;
        let axis = ctx.constant_int(node.input(1)?, &node.op)?;

        let op = if self.log {
            TargetOp::LogSoftmax
        } else {
            TargetOp::Softmax
        };
        let handle = ctx.alloc_handle();
        let target =
            TargetNode::new(op, [input], [handle]).with_attr("axis", Constant::Int(axis));
        Ok(Outcome::single(target, out.id, Binding::Tensor(handle)))
    }
}

/// 2-d pooling (`aten::avg_pool2d`, `aten::max_pool2d`)
pub struct Pool2d {
    /// Pool kind to emit
    pub target: TargetOp,
}

impl NodeConverter for Pool2d {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let input = ctx.tensor_input(node.input(0)?, &node.op)?;
        let kernel = ctx.constant_ints(node.input(1)?, &node.op)?;
        // an empty stride list defaults to the kernel size
        let stride = ctx.constant_ints(node.input(2)?, &node.op)?;
        let stride = if stride.is_empty() { kernel.clone() } else { stride };
        let padding = ctx.constant_ints(node.input(3)?, &node.op)?;

        let handle = ctx.alloc_handle();
        let target = TargetNode::new(self.target, [input], [handle])
            .with_attr("kernel", Constant::IntList(kernel))
            .with_attr("stride", Constant::IntList(stride))
            .with_attr("padding", Constant::IntList(padding));
        Ok(Outcome::single(target, out.id, Binding::Tensor(handle)))
    }
}

/// `aten::batch_norm`: running statistics stay inputs, epsilon lowers to an
/// attribute
pub struct BatchNorm;

impl NodeConverter for BatchNorm {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let input = ctx.tensor_input(node.input(0)?, &node.op)?;
        let weight = ctx.tensor_input(node.input(1)?, &node.op)?;
        let bias = ctx.tensor_input(node.input(2)?, &node.op)?;
        let mean = ctx.tensor_input(node.input(3)?, &node.op)?;
        let var = ctx.tensor_input(node.input(4)?, &node.op)?;
        let eps = ctx.constant_float(node.input(7)?, &node.op)?;

        let handle = ctx.alloc_handle();
        let target = TargetNode::new(
            TargetOp::BatchNorm,
            [input, weight, bias, mean, var],
            [handle],
        )
        .with_attr("eps", Constant::Float(eps));
        Ok(Outcome::single(target, out.id, Binding::Tensor(handle)))
    }
}

/// `aten::layer_norm`
pub struct LayerNorm;

impl NodeConverter for LayerNorm {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let input = ctx.tensor_input(node.input(0)?, &node.op)?;
        let shape = ctx.constant_ints(node.input(1)?, &node.op)?;
        let weight = ctx.tensor_input(node.input(2)?, &node.op)?;
        let bias = ctx.tensor_input(node.input(3)?, &node.op)?;
        let eps = ctx.constant_float(node.input(4)?, &node.op)?;

        let handle = ctx.alloc_handle();
        let target = TargetNode::new(TargetOp::LayerNorm, [input, weight, bias], [handle])
            .with_attr("normalized_shape", Constant::IntList(shape))
            .with_attr("eps", Constant::Float(eps));
        Ok(Outcome::single(target, out.id, Binding::Tensor(handle)))
    }
}

/// `aten::embedding`: a table lookup, lowered to a gather along axis 0
pub struct Embedding;

impl NodeConverter for Embedding {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let weight = ctx.tensor_input(node.input(0)?, &node.op)?;
        let indices = ctx.tensor_input(node.input(1)?, &node.op)?;

        let handle = ctx.alloc_handle();
        let target = TargetNode::new(TargetOp::Gather, [weight, indices], [handle])
            .with_attr("axis", Constant::Int(0));
        Ok(Outcome::single(target, out.id, Binding::Tensor(handle)))
    }
}

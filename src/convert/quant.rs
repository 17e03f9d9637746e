//! Quantization propagation converters
//!
//! Quantize/dequantize and the fused `quantized::*` kernels thread
//! scale/zero-point metadata through the context's side table: a quantize
//! binds parameters for its output, a dequantize ends propagation, and a
//! fused kernel requires parameters on every runtime tensor input before it
//! will convert.

use smallvec::SmallVec;

use crate::context::{Binding, ConversionContext, QuantParams};
use crate::error::{ConvertError, ConvertResult};
use crate::registry::Registry;
use crate::source::{SourceNode, ValueId};
use crate::target::{TargetInput, TargetNode, TargetOp};
use crate::value::Constant;

use super::{NodeConverter, Outcome};

/// `aten::quantize_per_tensor`: start of a quantized region
pub struct Quantize;

impl NodeConverter for Quantize {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let input = ctx.tensor_input(node.input(0)?, &node.op)?;
        let scale = ctx.constant_float(node.input(1)?, &node.op)?;
        let zero_point = ctx.constant_int(node.input(2)?, &node.op)?;

        let handle = ctx.alloc_handle();
        ctx.set_quant_params(out.id, QuantParams { scale, zero_point });

        let target = TargetNode::new(TargetOp::Quantize, [input], [handle])
            .with_attr("scale", Constant::Float(scale))
            .with_attr("zero_point", Constant::Int(zero_point));
        Ok(Outcome::single(target, out.id, Binding::Tensor(handle)))
    }
}

/// `aten::dequantize`: end of a quantized region
///
/// The input must carry tracked parameters; the output is unquantized
/// (existing side-table entries are never removed, propagation just stops).
pub struct Dequantize;

impl NodeConverter for Dequantize {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let input_id = node.input(0)?;
        let params = ctx.require_quant_params(input_id, &node.op)?;
        let input = ctx.tensor_input(input_id, &node.op)?;

        let handle = ctx.alloc_handle();
        let target = TargetNode::new(TargetOp::Dequantize, [input], [handle])
            .with_attr("scale", Constant::Float(params.scale))
            .with_attr("zero_point", Constant::Int(params.zero_point));
        Ok(Outcome::single(target, out.id, Binding::Tensor(handle)))
    }
}

/// Where a fused kernel's output parameters come from
#[derive(Debug, Clone, Copy)]
pub enum OutputParams {
    /// The node's last two inputs are output scale and zero point
    FromInputs,
    /// The output inherits the first tensor input's parameters
    Propagate,
}

/// Fused `quantized::*` kernel converter
///
/// Every runtime tensor input must already hold valid parameters in the
/// side table; constant inputs (packed weights, scalars) are exempt.
pub struct FusedQuantized {
    /// Kernel kind to emit
    pub target: TargetOp,
    /// Output parameter policy
    pub output_params: OutputParams,
}

impl FusedQuantized {
    fn runtime_tensor_inputs(&self, node: &SourceNode, end: usize) -> SmallVec<[ValueId; 4]> {
        node.inputs.iter().take(end).copied().collect()
    }
}

impl NodeConverter for FusedQuantized {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;

        let (data_end, params) = match self.output_params {
            OutputParams::FromInputs => {
                if node.inputs.len() < 3 {
                    return Err(ConvertError::InvalidNode {
                        op: node.op.as_str().to_string(),
                        reason: format!(
                            "expected data inputs plus output scale/zero-point, found {}",
                            node.inputs.len()
                        ),
                    });
                }
                let end = node.inputs.len() - 2;
                let scale = ctx.constant_float(node.inputs[end], &node.op)?;
                let zero_point = ctx.constant_int(node.inputs[end + 1], &node.op)?;
                (end, QuantParams { scale, zero_point })
            }
            OutputParams::Propagate => {
                let first = node.input(0)?;
                (node.inputs.len(), ctx.require_quant_params(first, &node.op)?)
            }
        };

        let mut inputs: SmallVec<[TargetInput; 4]> = SmallVec::new();
        for id in self.runtime_tensor_inputs(node, data_end) {
            let resolved = ctx.tensor_input(id, &node.op)?;
            if matches!(resolved, TargetInput::Handle(_)) {
                ctx.require_quant_params(id, &node.op)?;
            }
            inputs.push(resolved);
        }

        let handle = ctx.alloc_handle();
        ctx.set_quant_params(out.id, params);

        let target = TargetNode::new(self.target, inputs, [handle])
            .with_attr("scale", Constant::Float(params.scale))
            .with_attr("zero_point", Constant::Int(params.zero_point));
        Ok(Outcome::single(target, out.id, Binding::Tensor(handle)))
    }
}

/// `quantized::cat`: fused concatenation over a list aggregate
pub struct QuantizedCat;

impl NodeConverter for QuantizedCat {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let elements = ctx.aggregate_elements(node.input(0)?, &node.op)?.to_vec();
        let axis = ctx.constant_int(node.input(1)?, &node.op)?;
        let scale = ctx.constant_float(node.input(2)?, &node.op)?;
        let zero_point = ctx.constant_int(node.input(3)?, &node.op)?;

        let mut inputs: SmallVec<[TargetInput; 4]> = SmallVec::new();
        for id in elements {
            let resolved = ctx.tensor_input(id, &node.op)?;
            if matches!(resolved, TargetInput::Handle(_)) {
                ctx.require_quant_params(id, &node.op)?;
            }
            inputs.push(resolved);
        }

        let handle = ctx.alloc_handle();
        ctx.set_quant_params(out.id, QuantParams { scale, zero_point });

        let target = TargetNode::new(TargetOp::QuantizedCat, inputs, [handle])
            .with_attr("axis", Constant::Int(axis))
            .with_attr("scale", Constant::Float(scale))
            .with_attr("zero_point", Constant::Int(zero_point));
        Ok(Outcome::single(target, out.id, Binding::Tensor(handle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::convert_graph;
    use crate::source::{SourceGraph, ValueKind, ValueRef};

    fn quantize(g: &mut SourceGraph, x: ValueRef, scale: f64, zp: i64) -> ValueRef {
        let s = g.add_constant(Constant::Float(scale));
        let z = g.add_constant(Constant::Int(zp));
        let dtype = g.add_constant(Constant::None);
        g.add_node(
            "aten::quantize_per_tensor",
            &[x.id, s.id, z.id, dtype.id],
            &[ValueKind::Tensor],
        )[0]
    }

    #[test]
    fn test_quantize_add_dequantize_chain() {
        let mut g = SourceGraph::new();
        let a = g.add_input(ValueKind::Tensor);
        let b = g.add_input(ValueKind::Tensor);
        let qa = quantize(&mut g, a, 0.1, 0);
        let qb = quantize(&mut g, b, 0.1, 0);

        let out_scale = g.add_constant(Constant::Float(0.2));
        let out_zp = g.add_constant(Constant::Int(64));
        let sum = g.add_node(
            "quantized::add",
            &[qa.id, qb.id, out_scale.id, out_zp.id],
            &[ValueKind::Tensor],
        );
        let y = g.add_node("aten::dequantize", &[sum[0].id], &[ValueKind::Tensor]);
        g.set_outputs(&[y[0].id]);

        let target = convert_graph(&g).unwrap();
        let ops: Vec<_> = target.ops().collect();
        assert_eq!(
            ops,
            vec![
                TargetOp::Quantize,
                TargetOp::Quantize,
                TargetOp::QuantizedAdd,
                TargetOp::Dequantize,
            ]
        );
        let add = &target.nodes[2];
        assert_eq!(add.attr("scale").and_then(Constant::as_float), Some(0.2));
        assert_eq!(add.attr("zero_point").and_then(Constant::as_int), Some(64));
        // the dequantize reads the fused kernel's output parameters
        let deq = &target.nodes[3];
        assert_eq!(deq.attr("scale").and_then(Constant::as_float), Some(0.2));
    }

    #[test]
    fn test_fused_kernel_requires_input_params() {
        let mut g = SourceGraph::new();
        let a = g.add_input(ValueKind::Tensor);
        let b = g.add_input(ValueKind::Tensor);
        // b is never quantized
        let qa = quantize(&mut g, a, 0.1, 0);
        let out_scale = g.add_constant(Constant::Float(0.2));
        let out_zp = g.add_constant(Constant::Int(0));
        let sum = g.add_node(
            "quantized::add",
            &[qa.id, b.id, out_scale.id, out_zp.id],
            &[ValueKind::Tensor],
        );
        g.set_outputs(&[sum[0].id]);

        let err = convert_graph(&g).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::MissingQuantizationParams { .. }
        ));
    }

    #[test]
    fn test_dequantize_requires_params() {
        let mut g = SourceGraph::new();
        let x = g.add_input(ValueKind::Tensor);
        let y = g.add_node("aten::dequantize", &[x.id], &[ValueKind::Tensor]);
        g.set_outputs(&[y[0].id]);

        let err = convert_graph(&g).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::MissingQuantizationParams { value, .. } if value == x.id.0
        ));
    }

    #[test]
    fn test_quantized_conv_with_constant_weights() {
        let mut g = SourceGraph::new();
        let x = g.add_input(ValueKind::Tensor);
        let qx = quantize(&mut g, x, 0.05, 128);
        // packed weights arrive as a compile-time constant, exempt from
        // the input-parameter requirement
        let w = g.add_constant(Constant::tensor(&[4, 4], vec![0.5; 16]).unwrap());
        let out_scale = g.add_constant(Constant::Float(0.1));
        let out_zp = g.add_constant(Constant::Int(0));
        let y = g.add_node(
            "quantized::conv2d_relu",
            &[qx.id, w.id, out_scale.id, out_zp.id],
            &[ValueKind::Tensor],
        );
        g.set_outputs(&[y[0].id]);

        let target = convert_graph(&g).unwrap();
        assert!(target.contains_op(TargetOp::QuantizedConv2dRelu));
    }

    #[test]
    fn test_quantized_relu6_propagates_params() {
        let mut g = SourceGraph::new();
        let x = g.add_input(ValueKind::Tensor);
        let qx = quantize(&mut g, x, 0.25, 16);
        let y = g.add_node("quantized::relu6", &[qx.id], &[ValueKind::Tensor]);
        let z = g.add_node("aten::dequantize", &[y[0].id], &[ValueKind::Tensor]);
        g.set_outputs(&[z[0].id]);

        let target = convert_graph(&g).unwrap();
        let relu6 = &target.nodes[1];
        assert_eq!(relu6.op, TargetOp::QuantizedRelu6);
        assert_eq!(relu6.attr("scale").and_then(Constant::as_float), Some(0.25));
        assert_eq!(relu6.attr("zero_point").and_then(Constant::as_int), Some(16));
    }

    #[test]
    fn test_quantized_cat_checks_every_element() {
        let mut g = SourceGraph::new();
        let a = g.add_input(ValueKind::Tensor);
        let b = g.add_input(ValueKind::Tensor);
        let qa = quantize(&mut g, a, 0.1, 0);
        // b stays unquantized inside the list
        let lst = g.add_node("prim::ListConstruct", &[qa.id, b.id], &[ValueKind::List]);
        let dim = g.add_constant(Constant::Int(0));
        let scale = g.add_constant(Constant::Float(0.1));
        let zp = g.add_constant(Constant::Int(0));
        let y = g.add_node(
            "quantized::cat",
            &[lst[0].id, dim.id, scale.id, zp.id],
            &[ValueKind::Tensor],
        );
        g.set_outputs(&[y[0].id]);

        let err = convert_graph(&g).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::MissingQuantizationParams { .. }
        ));
    }
}

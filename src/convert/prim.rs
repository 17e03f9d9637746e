//! Structural and control-flow converters (`prim::*`)
//!
//! These reshape the graph rather than a tensor: aggregate construction and
//! destructuring happen purely at the context level without emitting target
//! nodes, constants are materialized from embedded literals, and `prim::If`
//! recursively drives the dispatch loop over its branches.

use indexmap::IndexMap;
use smallvec::smallvec;

use crate::context::{Binding, ConversionContext};
use crate::error::{ConvertError, ConvertResult};
use crate::registry::Registry;
use crate::source::{Block, SourceNode, ValueId};
use crate::target::{TargetBlock, TargetInput, TargetNode, TargetOp};
use crate::value::Constant;

use super::{convert_block, NodeConverter, Outcome};

/// `prim::Constant`: bind the embedded literal, emit nothing
pub struct PrimConstant;

impl NodeConverter for PrimConstant {
    fn convert(
        &self,
        node: &SourceNode,
        _ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let value = node.required_attr("value")?.clone();
        Ok(Outcome::ConstantBound(vec![(out.id, value)]))
    }
}

/// `prim::TupleConstruct` / `prim::ListConstruct`: group resolved inputs
pub struct AggregateConstruct {
    /// Whether the aggregate is a tuple (fixed arity) or a list
    pub tuple: bool,
}

impl NodeConverter for AggregateConstruct {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        // every element must already be resolved
        for &input in &node.inputs {
            ctx.resolve(input, &node.op)?;
        }
        let items: Vec<ValueId> = node.inputs.iter().copied().collect();
        let binding = if self.tuple {
            Binding::Tuple(items)
        } else {
            Binding::List(items)
        };
        Ok(Outcome::bindings_only(vec![(out.id, binding)]))
    }
}

/// `prim::DictConstruct`: inputs alternate constant-string keys and values
pub struct PrimDictConstruct;

impl NodeConverter for PrimDictConstruct {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        if node.inputs.len() % 2 != 0 {
            return Err(ConvertError::InvalidNode {
                op: node.op.as_str().to_string(),
                reason: format!("odd input count {} for key/value pairs", node.inputs.len()),
            });
        }

        let mut items = IndexMap::new();
        for pair in node.inputs.chunks(2) {
            let key = ctx
                .constant(pair[0], &node.op)?
                .as_str()
                .ok_or(ConvertError::ConstantKind {
                    op: node.op.as_str().to_string(),
                    value: pair[0].0,
                    expected: "string key",
                })?
                .to_string();
            ctx.resolve(pair[1], &node.op)?;
            items.insert(key, pair[1]);
        }
        Ok(Outcome::bindings_only(vec![(out.id, Binding::Dict(items))]))
    }
}

/// `prim::ListUnpack` / `prim::TupleUnpack`: destructure an aggregate
///
/// Each destructured element re-binds the element's existing resolution, so
/// a construct-then-unpack round trip is a no-op on the context.
pub struct AggregateUnpack;

impl NodeConverter for AggregateUnpack {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let elements: Vec<ValueId> = ctx.aggregate_elements(node.input(0)?, &node.op)?.to_vec();
        if elements.len() != node.outputs.len() {
            return Err(ConvertError::DestructureArity {
                op: node.op.as_str().to_string(),
                actual: elements.len(),
                declared: node.outputs.len(),
            });
        }

        let mut bindings = Vec::with_capacity(elements.len());
        for (out, element) in node.outputs.iter().zip(elements) {
            let binding = ctx.resolve(element, &node.op)?.clone();
            ctx.propagate_quant_params(element, out.id);
            bindings.push((out.id, binding));
        }
        Ok(Outcome::bindings_only(bindings))
    }
}

/// `prim::GetAttr`: walk the module attribute hierarchy
///
/// A leaf path binds the stored constant (parameters become inline
/// constants); a non-leaf path binds a deeper attribute handle.
pub struct PrimGetAttr;

impl NodeConverter for PrimGetAttr {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let name = node.required_attr_str("name")?;

        let parent = match ctx.resolve(node.input(0)?, &node.op)? {
            Binding::Attribute(path) => path.clone(),
            other => {
                return Err(ConvertError::InvalidNode {
                    op: node.op.as_str().to_string(),
                    reason: format!("receiver is a {:?}, expected attribute handle", other.kind()),
                })
            }
        };
        let path = if parent.is_empty() {
            name.to_string()
        } else {
            format!("{parent}.{name}")
        };

        match ctx.module_attribute(&path) {
            Some(value) => Ok(Outcome::ConstantBound(vec![(out.id, value.clone())])),
            None => Ok(Outcome::bindings_only(vec![(
                out.id,
                Binding::Attribute(path),
            )])),
        }
    }
}

/// `prim::ConstantChunk`: split one value into evenly-sized pieces
///
/// A constant source yields constant bindings; a runtime tensor yields one
/// slice node per piece. Chunk count and axis come from node attributes and
/// must be resolvable at conversion time.
pub struct PrimConstantChunk;

impl NodeConverter for PrimConstantChunk {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let chunks = node.required_attr_int("chunks")? as usize;
        let axis = node.attr_int("dim", 0);
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
                let bindings = node
                    .outputs
                    .iter()
                    .zip(pieces)
                    .map(|(out, piece)| (out.id, piece))
                    .collect();
                Ok(Outcome::ConstantBound(bindings))
            }
            Binding::Tensor(handle) => {
                let mut nodes = Vec::with_capacity(chunks);
                let mut bindings = Vec::with_capacity(chunks);
                for (index, out) in node.outputs.iter().enumerate() {
                    let piece = ctx.alloc_handle();
                    nodes.push(
                        TargetNode::new(
                            TargetOp::StridedSlice,
                            [TargetInput::Handle(handle)],
                            [piece],
                        )
                        .with_attr("axis", Constant::Int(axis))
                        .with_attr("chunk_index", Constant::Int(index as i64))
                        .with_attr("chunk_count", Constant::Int(chunks as i64)),
                    );
                    bindings.push((out.id, Binding::Tensor(piece)));
                }
                Ok(Outcome::Emitted { nodes, bindings })
            }
            other => Err(ConvertError::InvalidNode {
                op: node.op.as_str().to_string(),
                reason: format!("cannot chunk a {:?}", other.kind()),
            }),
        }
    }
}

/// `prim::NumToTensor`: box a compile-time scalar as a one-element tensor
///
/// Integer and boolean scalars keep their exact payload; the f32 tensor
/// representation would truncate integers above 2^24.
pub struct PrimNumToTensor;

impl NodeConverter for PrimNumToTensor {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let input = node.input(0)?;
        match ctx.resolve(input, &node.op)? {
            // already a runtime tensor: nothing to box
            Binding::Tensor(handle) => {
                let handle = *handle;
                ctx.propagate_quant_params(input, out.id);
                Ok(Outcome::bindings_only(vec![(
                    out.id,
                    Binding::Tensor(handle),
                )]))
            }
            Binding::Constant(c) => {
                let boxed = match c {
                    Constant::Int(v) => Constant::Int(*v),
                    Constant::Bool(b) => Constant::Int(i64::from(*b)),
                    other => {
                        let scalar = other.as_float().ok_or(ConvertError::ConstantKind {
                            op: node.op.as_str().to_string(),
                            value: input.0,
                            expected: "scalar",
                        })?;
                        Constant::tensor(&[1], vec![scalar as f32])?
                    }
                };
                Ok(Outcome::ConstantBound(vec![(out.id, boxed)]))
            }
            other => Err(ConvertError::InvalidNode {
                op: node.op.as_str().to_string(),
                reason: format!("cannot box a {:?}", other.kind()),
            }),
        }
    }
}

/// `prim::If`: the only converter requiring recursive sub-conversion
///
/// A compile-time constant condition inlines the taken branch; a runtime
/// condition converts both branches with branch-local node accumulation over
/// the shared parent bindings and emits a conditional construct whose
/// per-slot outputs must agree in kind.
pub struct PrimIf;

impl PrimIf {
    fn inline_branch(
        node: &SourceNode,
        block: &Block,
        ctx: &mut ConversionContext<'_>,
        registry: &Registry,
    ) -> ConvertResult<Outcome> {
        convert_block(&block.nodes, ctx, registry)?;
        if block.outputs.len() != node.outputs.len() {
            return Err(ConvertError::DestructureArity {
                op: node.op.as_str().to_string(),
                actual: block.outputs.len(),
                declared: node.outputs.len(),
            });
        }

        let mut bindings = Vec::with_capacity(node.outputs.len());
        for (out, &yielded) in node.outputs.iter().zip(&block.outputs) {
            let binding = ctx.resolve(yielded, &node.op)?.clone();
            ctx.propagate_quant_params(yielded, out.id);
            bindings.push((out.id, binding));
        }
        Ok(Outcome::bindings_only(bindings))
    }

    fn convert_branch(
        node: &SourceNode,
        block: &Block,
        ctx: &mut ConversionContext<'_>,
        registry: &Registry,
    ) -> ConvertResult<TargetBlock> {
        let mark = ctx.node_mark();
        convert_block(&block.nodes, ctx, registry)?;
        if block.outputs.len() != node.outputs.len() {
            return Err(ConvertError::DestructureArity {
                op: node.op.as_str().to_string(),
                actual: block.outputs.len(),
                declared: node.outputs.len(),
            });
        }
        let outputs = block
            .outputs
            .iter()
            .map(|&id| ctx.tensor_input(id, &node.op))
            .collect::<ConvertResult<_>>()?;
        Ok(TargetBlock {
            nodes: ctx.split_nodes_from(mark),
            outputs,
        })
    }
}

impl NodeConverter for PrimIf {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        registry: &Registry,
    ) -> ConvertResult<Outcome> {
        if node.blocks.len() != 2 {
            return Err(ConvertError::InvalidNode {
                op: node.op.as_str().to_string(),
                reason: format!("expected 2 branches, found {}", node.blocks.len()),
            });
        }
        let cond_id = node.input(0)?;

        if let Binding::Constant(c) = ctx.resolve(cond_id, &node.op)? {
            let taken = c.as_bool().ok_or(ConvertError::ConstantKind {
                op: node.op.as_str().to_string(),
                value: cond_id.0,
                expected: "boolean condition",
            })?;
            let block = if taken { &node.blocks[0] } else { &node.blocks[1] };
            return Self::inline_branch(node, block, ctx, registry);
        }

        let condition = ctx.tensor_input(cond_id, &node.op)?;

        // branch output kinds must agree per slot before anything merges
        let then_block = Self::convert_branch(node, &node.blocks[0], ctx, registry)?;
        let else_block = Self::convert_branch(node, &node.blocks[1], ctx, registry)?;
        for (&t, &e) in node.blocks[0].outputs.iter().zip(&node.blocks[1].outputs) {
            let then_kind = ctx.resolve(t, &node.op)?.kind();
            let else_kind = ctx.resolve(e, &node.op)?.kind();
            if then_kind != else_kind {
                return Err(ConvertError::BranchTypeMismatch {
                    then_kind,
                    else_kind,
                });
            }
        }

        let mut bindings = Vec::with_capacity(node.outputs.len());
        let mut merged = smallvec![];
        for out in &node.outputs {
            let handle = ctx.alloc_handle();
            merged.push(handle);
            bindings.push((out.id, Binding::Tensor(handle)));
        }

        let mut target = TargetNode::new(TargetOp::Cond, [condition], []);
        target.outputs = merged;
        target.blocks = vec![then_block, else_block];
        Ok(Outcome::Emitted {
            nodes: vec![target],
            bindings,
        })
    }
}

/// `aten::__getitem__`: index into a list, tuple, or dict aggregate
pub struct PrimGetItem;

impl NodeConverter for PrimGetItem {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let aggregate = node.input(0)?;
        let key = node.input(1)?;

        let element = match ctx.resolve(aggregate, &node.op)? {
            Binding::List(items) | Binding::Tuple(items) => {
                let index = ctx.constant_int(key, &node.op)?;
                let len = items.len() as i64;
                let index = if index < 0 { index + len } else { index };
                if index < 0 || index >= len {
                    return Err(ConvertError::InvalidNode {
                        op: node.op.as_str().to_string(),
                        reason: format!("index {index} out of range for {len} elements"),
                    });
                }
                items[index as usize]
            }
            Binding::Dict(items) => {
                let name = ctx
                    .constant(key, &node.op)?
                    .as_str()
                    .ok_or(ConvertError::ConstantKind {
                        op: node.op.as_str().to_string(),
                        value: key.0,
                        expected: "string key",
                    })?;
                *items
                    .get(name)
                    .ok_or_else(|| ConvertError::InvalidNode {
                        op: node.op.as_str().to_string(),
                        reason: format!("key '{name}' not present"),
                    })?
            }
            other => {
                return Err(ConvertError::InvalidNode {
                    op: node.op.as_str().to_string(),
                    reason: format!("cannot index into a {:?}", other.kind()),
                })
            }
        };

        let binding = ctx.resolve(element, &node.op)?.clone();
        ctx.propagate_quant_params(element, out.id);
        Ok(Outcome::bindings_only(vec![(out.id, binding)]))
    }
}

/// `aten::len`: arity of an aggregate or sequence, as a tracked constant
pub struct PrimLen;

impl NodeConverter for PrimLen {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let input = node.input(0)?;
        let len = match ctx.resolve(input, &node.op)? {
            Binding::List(items) | Binding::Tuple(items) => items.len(),
            Binding::Dict(items) => items.len(),
            Binding::Constant(c) => c.seq_len().ok_or(ConvertError::ConstantKind {
                op: node.op.as_str().to_string(),
                value: input.0,
                expected: "sequence",
            })?,
            other => {
                return Err(ConvertError::InvalidNode {
                    op: node.op.as_str().to_string(),
                    reason: format!("{:?} has no conversion-time length", other.kind()),
                })
            }
        };
        Ok(Outcome::ConstantBound(vec![(out.id, Constant::Int(len as i64))]))
    }
}

/// Untracked operators: consume the node, bind nothing
///
/// Used for pure shape/metadata queries and placeholder constructors whose
/// results never reach the target graph. A downstream consumer of the
/// unbound output fails fast with `UnresolvedValue`.
pub struct NoTrack;

impl NodeConverter for NoTrack {
    fn convert(
        &self,
        _node: &SourceNode,
        _ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        Ok(Outcome::Skipped)
    }
}

/// Tracked-constant operators (`aten::Int`, `aten::ScalarImplicit`)
///
/// The value computation happens at conversion time; a constant is bound
/// and no target node is emitted.
pub struct TrackConstant {
    /// Whether the result must be coerced to an integer
    pub to_int: bool,
}

impl NodeConverter for TrackConstant {
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        _registry: &Registry,
    ) -> ConvertResult<Outcome> {
        let out = node.single_output()?;
        let input = node.input(0)?;
        let c = ctx.constant(input, &node.op)?;

        let value = if self.to_int {
            Constant::Int(c.as_int().ok_or(ConvertError::ConstantKind {
                op: node.op.as_str().to_string(),
                value: input.0,
                expected: "integer scalar",
            })?)
        } else {
            match c {
                Constant::Int(v) => Constant::Int(*v),
                Constant::Bool(b) => Constant::Bool(*b),
                other => Constant::Float(other.as_float().ok_or(ConvertError::ConstantKind {
                    op: node.op.as_str().to_string(),
                    value: input.0,
                    expected: "scalar",
                })?),
            }
        };
        Ok(Outcome::ConstantBound(vec![(out.id, value)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::convert_graph;
    use crate::source::{SourceGraph, ValueKind, ValueRef};

    fn if_node(
        g: &mut SourceGraph,
        cond: ValueId,
        then_block: Block,
        else_block: Block,
        output_kind: ValueKind,
    ) -> ValueRef {
        let out = g.fresh_value(output_kind);
        let mut node = SourceNode::new("prim::If", &[cond], &[out]);
        node.blocks = vec![then_block, else_block];
        g.push(node);
        out
    }

    #[test]
    fn test_constant_materialization() {
        let mut g = SourceGraph::new();
        let c = g.add_constant(Constant::Float(3.25));
        g.set_outputs(&[c.id]);

        let target = convert_graph(&g).unwrap();
        assert_eq!(target.node_count(), 0);
        assert_eq!(target.outputs, vec![TargetInput::Constant(Constant::Float(3.25))]);
    }

    #[test]
    fn test_tuple_construct_unpack_roundtrip() {
        let mut g = SourceGraph::new();
        let a = g.add_input(ValueKind::Tensor);
        let b = g.add_constant(Constant::Int(4));
        let tup = g.add_node("prim::TupleConstruct", &[a.id, b.id], &[ValueKind::Tuple]);
        let unpacked = g.add_node(
            "prim::TupleUnpack",
            &[tup[0].id],
            &[ValueKind::Tensor, ValueKind::Constant],
        );
        g.set_outputs(&[unpacked[0].id, unpacked[1].id]);

        let target = convert_graph(&g).unwrap();
        // pure context-level regrouping: no target nodes
        assert_eq!(target.node_count(), 0);
        assert_eq!(target.outputs.len(), 2);
        assert_eq!(target.outputs[0], TargetInput::Handle(target.inputs[0]));
        assert_eq!(target.outputs[1], TargetInput::Constant(Constant::Int(4)));
    }

    #[test]
    fn test_unpack_arity_mismatch() {
        let mut g = SourceGraph::new();
        let a = g.add_input(ValueKind::Tensor);
        let lst = g.add_node("prim::ListConstruct", &[a.id], &[ValueKind::List]);
        let unpacked = g.add_node(
            "prim::ListUnpack",
            &[lst[0].id],
            &[ValueKind::Tensor, ValueKind::Tensor],
        );
        g.set_outputs(&[unpacked[0].id]);

        let err = convert_graph(&g).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::DestructureArity {
                actual: 1,
                declared: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_dict_construct_and_getitem() {
        let mut g = SourceGraph::new();
        let key = g.add_constant(Constant::Str("feat".into()));
        let val = g.add_input(ValueKind::Tensor);
        let dict = g.add_node("prim::DictConstruct", &[key.id, val.id], &[ValueKind::Dict]);
        let lookup = g.add_constant(Constant::Str("feat".into()));
        let item = g.add_node(
            "aten::__getitem__",
            &[dict[0].id, lookup.id],
            &[ValueKind::Tensor],
        );
        g.set_outputs(&[item[0].id]);

        let target = convert_graph(&g).unwrap();
        assert_eq!(target.node_count(), 0);
        assert_eq!(target.outputs[0], TargetInput::Handle(target.inputs[0]));
    }

    #[test]
    fn test_getattr_resolves_stored_parameter() {
        let mut g = SourceGraph::new();
        let this = g.add_input(ValueKind::AttributeHandle);
        g.set_attribute(
            "conv1.weight",
            Constant::tensor(&[2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap(),
        );

        let conv1 = g.fresh_value(ValueKind::AttributeHandle);
        let mut n1 = SourceNode::new("prim::GetAttr", &[this.id], &[conv1]);
        n1.attrs.push(crate::source::Attribute::new(
            "name",
            Constant::Str("conv1".into()),
        ));
        g.push(n1);

        let weight = g.fresh_value(ValueKind::Constant);
        let mut n2 = SourceNode::new("prim::GetAttr", &[conv1.id], &[weight]);
        n2.attrs.push(crate::source::Attribute::new(
            "name",
            Constant::Str("weight".into()),
        ));
        g.push(n2);
        g.set_outputs(&[weight.id]);

        let target = convert_graph(&g).unwrap();
        assert_eq!(target.node_count(), 0);
        assert!(matches!(
            target.outputs[0],
            TargetInput::Constant(Constant::Tensor(_))
        ));
    }

    #[test]
    fn test_constant_chunk_of_constant_sequence() {
        let mut g = SourceGraph::new();
        let c = g.add_constant(Constant::IntList((0..12).collect()));
        let out = g.fresh_value(ValueKind::Constant);
        let out2 = g.fresh_value(ValueKind::Constant);
        let out3 = g.fresh_value(ValueKind::Constant);
        let mut node = SourceNode::new("prim::ConstantChunk", &[c.id], &[out, out2, out3]);
        node.attrs.push(crate::source::Attribute::new("chunks", Constant::Int(3)));
        node.attrs.push(crate::source::Attribute::new("dim", Constant::Int(0)));
        g.push(node);
        g.set_outputs(&[out.id, out2.id, out3.id]);

        let target = convert_graph(&g).unwrap();
        assert_eq!(target.node_count(), 0);
        assert_eq!(target.outputs.len(), 3);
        assert_eq!(
            target.outputs[0],
            TargetInput::Constant(Constant::IntList(vec![0, 1, 2, 3]))
        );
        assert_eq!(
            target.outputs[2],
            TargetInput::Constant(Constant::IntList(vec![8, 9, 10, 11]))
        );
    }

    #[test]
    fn test_constant_chunk_uneven_fails() {
        let mut g = SourceGraph::new();
        let c = g.add_constant(Constant::IntList((0..10).collect()));
        let outs: Vec<ValueRef> = (0..3).map(|_| g.fresh_value(ValueKind::Constant)).collect();
        let mut node = SourceNode::new("prim::ConstantChunk", &[c.id], &outs);
        node.attrs.push(crate::source::Attribute::new("chunks", Constant::Int(3)));
        g.push(node);
        g.set_outputs(&[outs[0].id]);

        let err = convert_graph(&g).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::ChunkArity {
                total: 10,
                chunks: 3
            }
        ));
    }

    #[test]
    fn test_constant_chunk_of_runtime_tensor_emits_slices() {
        let mut g = SourceGraph::new();
        let x = g.add_input(ValueKind::Tensor);
        let outs: Vec<ValueRef> = (0..2).map(|_| g.fresh_value(ValueKind::Tensor)).collect();
        let mut node = SourceNode::new("prim::ConstantChunk", &[x.id], &outs);
        node.attrs.push(crate::source::Attribute::new("chunks", Constant::Int(2)));
        node.attrs.push(crate::source::Attribute::new("dim", Constant::Int(1)));
        g.push(node);
        g.set_outputs(&[outs[0].id, outs[1].id]);

        let target = convert_graph(&g).unwrap();
        assert_eq!(target.node_count(), 2);
        assert!(target.ops().all(|op| op == TargetOp::StridedSlice));
        assert_eq!(
            target.nodes[1].attr("chunk_index").and_then(Constant::as_int),
            Some(1)
        );
    }

    #[test]
    fn test_constant_chunk_negative_axis() {
        let mut g = SourceGraph::new();
        let c = g.add_constant(Constant::tensor(&[2, 4], (0..8).map(|v| v as f32).collect()).unwrap());
        let outs: Vec<ValueRef> = (0..2).map(|_| g.fresh_value(ValueKind::Constant)).collect();
        let mut node = SourceNode::new("prim::ConstantChunk", &[c.id], &outs);
        node.attrs.push(crate::source::Attribute::new("chunks", Constant::Int(2)));
        node.attrs.push(crate::source::Attribute::new("dim", Constant::Int(-1)));
        g.push(node);
        g.set_outputs(&[outs[0].id, outs[1].id]);

        let target = convert_graph(&g).unwrap();
        assert_eq!(target.node_count(), 0);
        match &target.outputs[0] {
            TargetInput::Constant(Constant::Tensor(t)) => assert_eq!(t.shape(), &[2, 2]),
            other => panic!("expected tensor piece, got {other:?}"),
        }
    }

    #[test]
    fn test_num_to_tensor_boxes_float_scalar() {
        let mut g = SourceGraph::new();
        let c = g.add_constant(Constant::Float(2.5));
        let boxed = g.add_node("prim::NumToTensor", &[c.id], &[ValueKind::Tensor]);
        g.set_outputs(&[boxed[0].id]);

        let target = convert_graph(&g).unwrap();
        assert_eq!(target.node_count(), 0);
        match &target.outputs[0] {
            TargetInput::Constant(Constant::Tensor(t)) => {
                assert_eq!(t.len(), 1);
                assert_eq!(t.iter().next().copied(), Some(2.5));
            }
            other => panic!("expected boxed tensor, got {other:?}"),
        }
    }

    #[test]
    fn test_num_to_tensor_keeps_large_int_exact() {
        // 2^33 + 1 is not representable as f32
        let big = (1i64 << 33) + 1;
        let mut g = SourceGraph::new();
        let c = g.add_constant(Constant::Int(big));
        let boxed = g.add_node("prim::NumToTensor", &[c.id], &[ValueKind::Tensor]);
        g.set_outputs(&[boxed[0].id]);

        let target = convert_graph(&g).unwrap();
        assert_eq!(target.node_count(), 0);
        assert_eq!(target.outputs[0], TargetInput::Constant(Constant::Int(big)));
    }

    #[test]
    fn test_if_with_constant_condition_inlines_taken_branch() {
        let mut g = SourceGraph::new();
        let x = g.add_input(ValueKind::Tensor);
        let cond = g.add_constant(Constant::Bool(true));

        let t_out = g.fresh_value(ValueKind::Tensor);
        let then_block = Block {
            nodes: vec![SourceNode::new("aten::relu", &[x.id], &[t_out])],
            outputs: smallvec![t_out.id],
        };
        let e_out = g.fresh_value(ValueKind::Tensor);
        let else_block = Block {
            nodes: vec![SourceNode::new("aten::tanh", &[x.id], &[e_out])],
            outputs: smallvec![e_out.id],
        };
        let merged = if_node(&mut g, cond.id, then_block, else_block, ValueKind::Tensor);
        g.set_outputs(&[merged.id]);

        let target = convert_graph(&g).unwrap();
        // only the taken branch converts; no conditional construct
        assert_eq!(target.node_count(), 1);
        assert_eq!(target.nodes[0].op, TargetOp::Relu);
        assert!(!target.contains_op(TargetOp::Cond));
    }

    #[test]
    fn test_if_with_runtime_condition_merges_branches() {
        let mut g = SourceGraph::new();
        let x = g.add_input(ValueKind::Tensor);
        let cond = g.add_input(ValueKind::Tensor);

        let t_out = g.fresh_value(ValueKind::Tensor);
        let then_block = Block {
            nodes: vec![SourceNode::new("aten::relu", &[x.id], &[t_out])],
            outputs: smallvec![t_out.id],
        };
        let e_out = g.fresh_value(ValueKind::Tensor);
        let else_block = Block {
            nodes: vec![SourceNode::new("aten::tanh", &[x.id], &[e_out])],
            outputs: smallvec![e_out.id],
        };
        let merged = if_node(&mut g, cond.id, then_block, else_block, ValueKind::Tensor);
        g.set_outputs(&[merged.id]);

        let target = convert_graph(&g).unwrap();
        // one post-merge binding, branch bodies carried by the construct
        assert_eq!(target.node_count(), 1);
        let cond_node = &target.nodes[0];
        assert_eq!(cond_node.op, TargetOp::Cond);
        assert_eq!(cond_node.outputs.len(), 1);
        assert_eq!(cond_node.blocks.len(), 2);
        assert_eq!(cond_node.blocks[0].nodes[0].op, TargetOp::Relu);
        assert_eq!(cond_node.blocks[1].nodes[0].op, TargetOp::Tanh);
    }

    #[test]
    fn test_if_branch_kind_mismatch_fails() {
        let mut g = SourceGraph::new();
        let x = g.add_input(ValueKind::Tensor);
        let cond = g.add_input(ValueKind::Tensor);

        let t_out = g.fresh_value(ValueKind::Tensor);
        let then_block = Block {
            nodes: vec![SourceNode::new("aten::relu", &[x.id], &[t_out])],
            outputs: smallvec![t_out.id],
        };
        // else branch yields a bare constant
        let e_out = g.fresh_value(ValueKind::Constant);
        let mut const_node = SourceNode::new("prim::Constant", &[], &[e_out]);
        const_node
            .attrs
            .push(crate::source::Attribute::new("value", Constant::Int(0)));
        let else_block = Block {
            nodes: vec![const_node],
            outputs: smallvec![e_out.id],
        };
        let merged = if_node(&mut g, cond.id, then_block, else_block, ValueKind::Tensor);
        g.set_outputs(&[merged.id]);

        let err = convert_graph(&g).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::BranchTypeMismatch {
                then_kind: ValueKind::Tensor,
                else_kind: ValueKind::Constant,
            }
        ));
    }

    #[test]
    fn test_len_of_list() {
        let mut g = SourceGraph::new();
        let a = g.add_input(ValueKind::Tensor);
        let b = g.add_input(ValueKind::Tensor);
        let lst = g.add_node("prim::ListConstruct", &[a.id, b.id], &[ValueKind::List]);
        let len = g.add_node("aten::len", &[lst[0].id], &[ValueKind::Constant]);
        g.set_outputs(&[len[0].id]);

        let target = convert_graph(&g).unwrap();
        assert_eq!(target.outputs[0], TargetInput::Constant(Constant::Int(2)));
    }

    #[test]
    fn test_aten_int_tracks_constant() {
        let mut g = SourceGraph::new();
        let c = g.add_constant(Constant::Float(5.0));
        let i = g.add_node("aten::Int", &[c.id], &[ValueKind::Constant]);
        g.set_outputs(&[i[0].id]);

        let target = convert_graph(&g).unwrap();
        assert_eq!(target.node_count(), 0);
        assert_eq!(target.outputs[0], TargetInput::Constant(Constant::Int(5)));
    }
}

//! Converter contract and dispatch loop
//!
//! The dispatch loop drives the whole pass: it walks source nodes in their
//! fixed dependency-respecting order, resolves each operator name through the
//! [`Registry`](crate::registry::Registry), invokes the converter, and merges
//! the outcome into the [`ConversionContext`]. The engine trusts the source
//! order invariant; a violation surfaces as `UnresolvedValue` at the
//! consuming node.

use crate::context::{Binding, ConversionContext};
use crate::error::{ConvertError, ConvertResult};
use crate::registry::Registry;
use crate::source::{SourceGraph, SourceNode, ValueId, ValueKind};
use crate::target::{TargetGraph, TargetNode};
use crate::value::Constant;

pub mod aten;
pub mod prim;
pub mod quant;

/// Result of converting one source node
#[derive(Debug)]
pub enum Outcome {
    /// Real target nodes were produced; tensor-kind outputs were bound
    Emitted {
        /// Nodes to append to the target sequence
        nodes: Vec<TargetNode>,
        /// Output bindings to merge into the context
        bindings: Vec<(ValueId, Binding)>,
    },
    /// Compile-time constants were computed; nothing was emitted
    ConstantBound(Vec<(ValueId, Constant)>),
    /// The node was consumed without binding any usable value
    Skipped,
}

impl Outcome {
    /// Convenience constructor for the single-node, single-binding case
    pub fn single(node: TargetNode, id: ValueId, binding: Binding) -> Self {
        Outcome::Emitted {
            nodes: vec![node],
            bindings: vec![(id, binding)],
        }
    }

    /// Convenience constructor for context-level bindings with no emission
    pub fn bindings_only(bindings: Vec<(ValueId, Binding)>) -> Self {
        Outcome::Emitted {
            nodes: Vec::new(),
            bindings,
        }
    }
}

/// The capability every operator converter implements
///
/// Preconditions: all of the node's inputs are already resolved in the
/// context (guaranteed by the dispatch loop's ordering invariant).
/// Postconditions: every declared output of the node is bound after the
/// outcome is merged, except for [`Outcome::Skipped`], whose outputs must
/// never be consumed downstream.
///
/// Converters must not inspect nodes other than the one passed in; this
/// locality is what keeps per-node reasoning and testing tractable.
pub trait NodeConverter: Send + Sync {
    /// Convert one source node
    fn convert(
        &self,
        node: &SourceNode,
        ctx: &mut ConversionContext<'_>,
        registry: &Registry,
    ) -> ConvertResult<Outcome>;
}

/// Run the dispatch loop over one block of dependency-ordered nodes
pub fn convert_block(
    nodes: &[SourceNode],
    ctx: &mut ConversionContext<'_>,
    registry: &Registry,
) -> ConvertResult<()> {
    for node in nodes {
        let converter = registry.lookup(&node.op)?;
        log::trace!("converting {}", node.op);

        let outcome = converter.convert(node, ctx, registry)?;
        merge_outcome(outcome, ctx);
        ctx.stats.nodes_converted += 1;
    }
    Ok(())
}

fn merge_outcome(outcome: Outcome, ctx: &mut ConversionContext<'_>) {
    match outcome {
        Outcome::Emitted { nodes, bindings } => {
            ctx.stats.nodes_emitted += nodes.len();
            for node in nodes {
                ctx.push_node(node);
            }
            for (id, binding) in bindings {
                ctx.bind(id, binding);
            }
        }
        Outcome::ConstantBound(bindings) => {
            ctx.stats.constants_bound += bindings.len();
            for (id, value) in bindings {
                ctx.bind(id, Binding::Constant(value));
            }
        }
        Outcome::Skipped => {
            ctx.stats.nodes_skipped += 1;
        }
    }
}

/// Convert a full source graph using the given registry
///
/// This is the conversion entry point: any error aborts the whole pass and
/// no partial target graph is returned.
pub fn convert_graph_with(
    graph: &SourceGraph,
    registry: &Registry,
) -> ConvertResult<TargetGraph> {
    log::info!(
        "starting conversion: {} nodes, {} inputs, {} outputs",
        graph.node_count(),
        graph.inputs.len(),
        graph.outputs.len()
    );

    let mut ctx = ConversionContext::new(graph);

    for input in &graph.inputs {
        match input.kind {
            ValueKind::Tensor => {
                let handle = ctx.alloc_input_handle();
                ctx.bind(input.id, Binding::Tensor(handle));
            }
            ValueKind::AttributeHandle => {
                ctx.bind(input.id, Binding::Attribute(String::new()));
            }
            other => {
                return Err(ConvertError::InvalidNode {
                    op: "<graph input>".to_string(),
                    reason: format!("graph input {} has unsupported kind {other:?}", input.id),
                })
            }
        }
    }

    convert_block(&graph.nodes, &mut ctx, registry)?;

    let stats = ctx.stats;
    let target = ctx.finish(&graph.outputs)?;

    log::info!(
        "conversion finished: {} source nodes -> {} target nodes ({} constants bound, {} skipped)",
        stats.nodes_converted,
        target.node_count(),
        stats.constants_bound,
        stats.nodes_skipped
    );
    Ok(target)
}

/// Convert a full source graph using the global registry
pub fn convert_graph(graph: &SourceGraph) -> ConvertResult<TargetGraph> {
    convert_graph_with(graph, Registry::global())
}

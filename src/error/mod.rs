//! Error types for torch2lite
//!
//! This module defines all error types used throughout the crate.
//!
//! Every error is fatal to the whole conversion pass: conversion is a pure,
//! deterministic batch transformation, so nothing is retried per node and no
//! partial target graph is ever returned.

use thiserror::Error;

use crate::source::ValueKind;

/// Main error type for graph conversion operations
#[derive(Error, Debug)]
pub enum ConvertError {
    /// The registry has no entry for an encountered operator name
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// A node consumed a value that was never bound (the producer was
    /// skipped/untracked, or the source order invariant was violated)
    #[error("unresolved value %{value} consumed by {op}")]
    UnresolvedValue {
        /// Identifier of the unresolved value
        value: u32,
        /// Operator of the consuming node
        op: String,
    },

    /// Declared output count does not match the aggregate's actual arity
    #[error("destructure arity mismatch in {op}: aggregate has {actual} elements, {declared} outputs declared")]
    DestructureArity {
        /// Operator of the destructuring node
        op: String,
        /// Number of elements in the aggregate
        actual: usize,
        /// Number of declared outputs
        declared: usize,
    },

    /// A constant cannot be split into the requested number of even chunks
    #[error("cannot chunk {total} elements into {chunks} even pieces")]
    ChunkArity {
        /// Total element count along the chunk axis
        total: usize,
        /// Requested number of chunks
        chunks: usize,
    },

    /// Conditional branches disagree in the kind of a declared output
    #[error("conditional branches disagree in output kind: then branch binds {then_kind:?}, else branch binds {else_kind:?}")]
    BranchTypeMismatch {
        /// Kind bound by the then branch
        then_kind: ValueKind,
        /// Kind bound by the else branch
        else_kind: ValueKind,
    },

    /// A quantized kernel's tensor input has no tracked scale/zero-point
    #[error("missing quantization parameters for input %{value} of {op}")]
    MissingQuantizationParams {
        /// Operator of the quantized node
        op: String,
        /// Identifier of the unquantized input
        value: u32,
    },

    /// A converter needed a compile-time constant and got something else
    #[error("expected a compile-time {expected} for input %{value} of {op}")]
    ConstantKind {
        /// Operator of the consuming node
        op: String,
        /// Identifier of the offending input
        value: u32,
        /// Description of the expected constant shape
        expected: &'static str,
    },

    /// A node is missing a required literal attribute
    #[error("missing attribute '{name}' on {op}")]
    MissingAttribute {
        /// Operator of the node
        op: String,
        /// Name of the missing attribute
        name: String,
    },

    /// Structurally invalid node (wrong input count, bad aggregate, ...)
    #[error("invalid node {op}: {reason}")]
    InvalidNode {
        /// Operator of the node
        op: String,
        /// Description of the violation
        reason: String,
    },
}

/// Result type alias for conversion operations
pub type ConvertResult<T> = Result<T, ConvertError>;

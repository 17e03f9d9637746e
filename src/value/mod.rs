//! Compile-time constant payloads
//!
//! Values resolved at conversion time are carried as [`Constant`] payloads:
//! scalars embedded in `prim::Constant` nodes, integer/float sequences, and
//! parameter tensors pulled out of the module attribute store. Tensor
//! payloads use `ndarray` so axis-wise operations (chunking) stay cheap.

use ndarray::{ArrayD, Axis, IxDyn};

use crate::error::{ConvertError, ConvertResult};

/// A compile-time constant value
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// The TorchScript `None` literal
    None,
    /// Boolean scalar
    Bool(bool),
    /// Integer scalar
    Int(i64),
    /// Floating-point scalar
    Float(f64),
    /// String literal
    Str(String),
    /// Integer sequence (shapes, axes, paddings, ...)
    IntList(Vec<i64>),
    /// Floating-point sequence
    FloatList(Vec<f64>),
    /// Constant tensor payload
    Tensor(ArrayD<f32>),
}

impl Constant {
    /// Build a constant tensor from a flat buffer and shape
    pub fn tensor(shape: &[usize], data: Vec<f32>) -> ConvertResult<Self> {
        let arr = ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|e| {
            ConvertError::InvalidNode {
                op: "prim::Constant".to_string(),
                reason: format!("tensor shape mismatch: {e}"),
            }
        })?;
        Ok(Constant::Tensor(arr))
    }

    /// Short human-readable name of this constant's shape, used in errors
    pub fn kind_name(&self) -> &'static str {
        match self {
            Constant::None => "none",
            Constant::Bool(_) => "bool",
            Constant::Int(_) => "int",
            Constant::Float(_) => "float",
            Constant::Str(_) => "string",
            Constant::IntList(_) => "int list",
            Constant::FloatList(_) => "float list",
            Constant::Tensor(_) => "tensor",
        }
    }

    /// Interpret as an integer scalar
    ///
    /// Accepts `Int`, `Bool`, `Float` with integral value, and one-element
    /// tensors (the `aten::Int` / `aten::ScalarImplicit` cases).
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Constant::Int(v) => Some(*v),
            Constant::Bool(b) => Some(i64::from(*b)),
            Constant::Float(f) => Some(*f as i64),
            Constant::Tensor(t) if t.len() == 1 => t.iter().next().map(|v| *v as i64),
            _ => None,
        }
    }

    /// Interpret as a floating-point scalar
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Constant::Float(f) => Some(*f),
            Constant::Int(v) => Some(*v as f64),
            Constant::Tensor(t) if t.len() == 1 => t.iter().next().map(|v| f64::from(*v)),
            _ => None,
        }
    }

    /// Interpret as a boolean scalar
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Constant::Bool(b) => Some(*b),
            Constant::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Interpret as an integer sequence (`IntList` or a single `Int`)
    pub fn as_ints(&self) -> Option<Vec<i64>> {
        match self {
            Constant::IntList(v) => Some(v.clone()),
            Constant::Int(v) => Some(vec![*v]),
            _ => None,
        }
    }

    /// Interpret as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Number of elements along the leading axis, for sequence-shaped values
    pub fn seq_len(&self) -> Option<usize> {
        match self {
            Constant::IntList(v) => Some(v.len()),
            Constant::FloatList(v) => Some(v.len()),
            Constant::Tensor(t) => t.shape().first().copied(),
            Constant::Str(s) => Some(s.len()),
            _ => None,
        }
    }

    /// Whether this constant is `None`
    pub fn is_none(&self) -> bool {
        matches!(self, Constant::None)
    }

    /// Split into `chunks` evenly-sized pieces along `axis`
    ///
    /// A negative axis counts from the back of the tensor's shape; sequences
    /// only have axis 0 (or -1). Fails with [`ConvertError::ChunkArity`] when
    /// the length along the axis is empty or not evenly divisible.
    pub fn chunk(&self, chunks: usize, axis: i64) -> ConvertResult<Vec<Constant>> {
        match self {
            Constant::IntList(v) => {
                check_sequence_axis(axis)?;
                let piece = even_chunk_len(v.len(), chunks)?;
                Ok(v.chunks(piece).map(|c| Constant::IntList(c.to_vec())).collect())
            }
            Constant::FloatList(v) => {
                check_sequence_axis(axis)?;
                let piece = even_chunk_len(v.len(), chunks)?;
                Ok(v.chunks(piece)
                    .map(|c| Constant::FloatList(c.to_vec()))
                    .collect())
            }
            Constant::Tensor(t) => {
                let axis = normalize_axis(axis, t.ndim())?;
                let total = t.shape()[axis];
                let piece = even_chunk_len(total, chunks)?;
                Ok(t.axis_chunks_iter(Axis(axis), piece)
                    .map(|c| Constant::Tensor(c.to_owned()))
                    .collect())
            }
            other => Err(ConvertError::InvalidNode {
                op: "prim::ConstantChunk".to_string(),
                reason: format!("cannot chunk a {} constant", other.kind_name()),
            }),
        }
    }
}

fn even_chunk_len(total: usize, chunks: usize) -> ConvertResult<usize> {
    if chunks == 0 || total == 0 || total % chunks != 0 {
        return Err(ConvertError::ChunkArity { total, chunks });
    }
    Ok(total / chunks)
}

fn check_sequence_axis(axis: i64) -> ConvertResult<()> {
    if axis == 0 || axis == -1 {
        return Ok(());
    }
    Err(ConvertError::InvalidNode {
        op: "prim::ConstantChunk".to_string(),
        reason: format!("axis {axis} out of range for a sequence"),
    })
}

fn normalize_axis(axis: i64, ndim: usize) -> ConvertResult<usize> {
    let resolved = if axis < 0 { axis + ndim as i64 } else { axis };
    if resolved < 0 || resolved >= ndim as i64 {
        return Err(ConvertError::InvalidNode {
            op: "prim::ConstantChunk".to_string(),
            reason: format!("axis {axis} out of range for {ndim} dimensions"),
        });
    }
    Ok(resolved as usize)
}

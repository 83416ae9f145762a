//! Tensor value types.
//!
//! [`FlatTensor`] is the caller-facing representation: a shape, an element
//! type tag and an owned byte buffer. [`NativeTensor`] is what crosses the
//! engine boundary: typed storage plus an optional level-of-detail index.

use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{InferError, Result};

/// Element types known to the crate.
///
/// New element types need a variant here and an arm in `marshal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Float32,
    Float64,
    Int32,
    Int64,
}

impl DataType {
    /// Size of one element in bytes.
    pub fn size_of(self) -> usize {
        match self {
            Self::Float32 | Self::Int32 => 4,
            Self::Float64 | Self::Int64 => 8,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float32 => write!(f, "float32"),
            Self::Float64 => write!(f, "float64"),
            Self::Int32 => write!(f, "int32"),
            Self::Int64 => write!(f, "int64"),
        }
    }
}

/// Caller-facing tensor: shape, element type and raw bytes in native byte order.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatTensor {
    /// Slot name. Filled with the fetch target name on outputs; optional on inputs.
    pub name: String,
    /// Dimensions, outermost first.
    pub shape: Vec<usize>,
    /// Element type of `data`.
    pub dtype: DataType,
    /// Raw element bytes.
    pub data: Vec<u8>,
}

impl FlatTensor {
    /// Build a tensor from raw bytes.
    pub fn new(shape: Vec<usize>, dtype: DataType, data: Vec<u8>) -> Self {
        Self {
            name: String::new(),
            shape,
            dtype,
            data,
        }
    }

    /// Build a float32 tensor from values.
    pub fn from_f32(shape: Vec<usize>, values: &[f32]) -> Self {
        let data = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Self::new(shape, DataType::Float32, data)
    }

    /// Build an int64 tensor from values.
    pub fn from_i64(shape: Vec<usize>, values: &[i64]) -> Self {
        let data = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Self::new(shape, DataType::Int64, data)
    }

    /// Set the slot name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Length of the buffer in bytes.
    pub fn byte_length(&self) -> usize {
        self.data.len()
    }

    /// Number of elements implied by the shape.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Check that the buffer holds exactly `numel * size_of(dtype)` bytes.
    pub fn validate(&self) -> Result<()> {
        let expected = self.numel() * self.dtype.size_of();
        if self.byte_length() != expected {
            return Err(InferError::tensor(format!(
                "byte length {} does not match shape {:?} of {} (expected {} bytes)",
                self.byte_length(),
                self.shape,
                self.dtype,
                expected
            )));
        }
        Ok(())
    }

    /// Decode the buffer as float32 values.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        if self.dtype != DataType::Float32 {
            return Err(InferError::tensor(format!(
                "Expected float32 tensor, got {}",
                self.dtype
            )));
        }
        self.validate()?;
        Ok(decode_f32(&self.data))
    }

    /// Decode the buffer as int64 values.
    pub fn to_i64_vec(&self) -> Result<Vec<i64>> {
        if self.dtype != DataType::Int64 {
            return Err(InferError::tensor(format!(
                "Expected int64 tensor, got {}",
                self.dtype
            )));
        }
        self.validate()?;
        Ok(decode_i64(&self.data))
    }

    /// View a float32 tensor as a dynamic-dimensional array.
    pub fn to_array_f32(&self) -> Result<ArrayD<f32>> {
        let data = self.to_f32_vec()?;
        ArrayD::from_shape_vec(IxDyn(&self.shape), data)
            .map_err(|e| InferError::tensor(format!("Array shape error: {}", e)))
    }
}

pub(crate) fn decode_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub(crate) fn decode_i64(bytes: &[u8]) -> Vec<i64> {
    bytes
        .chunks_exact(8)
        .map(|c| i64::from_ne_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect()
}

/// Level-of-detail index. Each level is a list of row offsets into the
/// concatenated buffer; `lod[0]` holds the top-level group boundaries.
pub type Lod = Vec<Vec<usize>>;

/// Typed storage of a native tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeBuffer {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

impl NativeBuffer {
    /// Element type of the storage.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::F32(_) => DataType::Float32,
            Self::F64(_) => DataType::Float64,
            Self::I32(_) => DataType::Int32,
            Self::I64(_) => DataType::Int64,
        }
    }

    /// Number of stored elements.
    pub fn len(&self) -> usize {
        match self {
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::I64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tensor in the engine's representation.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeTensor {
    /// Dense dimensions.
    pub dims: Vec<usize>,
    /// Variable-length structure; empty when the tensor is a plain dense batch.
    pub lod: Lod,
    /// Element storage.
    pub buffer: NativeBuffer,
}

impl NativeTensor {
    /// Wrap a buffer with dense dimensions and no LoD.
    pub fn new(dims: Vec<usize>, buffer: NativeBuffer) -> Self {
        Self {
            dims,
            lod: Vec::new(),
            buffer,
        }
    }

    pub fn from_f32(dims: Vec<usize>, data: Vec<f32>) -> Self {
        Self::new(dims, NativeBuffer::F32(data))
    }

    pub fn from_i64(dims: Vec<usize>, data: Vec<i64>) -> Self {
        Self::new(dims, NativeBuffer::I64(data))
    }

    /// Attach a LoD index.
    pub fn with_lod(mut self, lod: Lod) -> Self {
        self.lod = lod;
        self
    }

    pub fn data_type(&self) -> DataType {
        self.buffer.data_type()
    }

    /// Number of elements implied by `dims`.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }
}

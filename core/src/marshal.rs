//! Conversion between caller tensors and engine tensors.
//!
//! The feed path copies each [`FlatTensor`] into a freshly allocated host
//! [`NativeTensor`]. The fetch path turns engine outputs back into float32
//! [`FlatTensor`]s; outputs carrying a LoD index are variable-length batches
//! and get reassembled into one zero-padded `[batch, max_rows, ...]` tensor.

use tracing::{debug, error};

use crate::engine::FeedTargets;
use crate::error::{InferError, Result};
use crate::tensor::{decode_f32, decode_i64, DataType, FlatTensor, NativeBuffer, NativeTensor};

/// Build native feed tensors, pairing `inputs` with `feed_names` by position.
///
/// # Errors
///
/// Fails if the counts differ, an input has an element type other than
/// int64/float32, or an input's byte length disagrees with its shape.
pub fn to_native_feeds(inputs: &[FlatTensor], feed_names: &[String]) -> Result<FeedTargets> {
    if inputs.len() != feed_names.len() {
        error!(
            "wrong feed input size: expected {}, got {}",
            feed_names.len(),
            inputs.len()
        );
        return Err(InferError::FeedCount {
            expected: feed_names.len(),
            actual: inputs.len(),
        });
    }

    let mut feeds = FeedTargets::with_capacity(inputs.len());
    for (input, name) in inputs.iter().zip(feed_names) {
        let tensor = to_native(input).map_err(|e| {
            error!("failed to feed '{}': {}", name, e);
            e
        })?;
        debug!("feed {}: {:?} {}", name, tensor.dims, tensor.data_type());
        feeds.insert(name.clone(), tensor);
    }
    Ok(feeds)
}

fn to_native(input: &FlatTensor) -> Result<NativeTensor> {
    let buffer = match input.dtype {
        DataType::Int64 => {
            input.validate()?;
            NativeBuffer::I64(decode_i64(&input.data))
        }
        DataType::Float32 => {
            input.validate()?;
            NativeBuffer::F32(decode_f32(&input.data))
        }
        other => return Err(InferError::UnsupportedFeedType(other)),
    };
    Ok(NativeTensor::new(input.shape.clone(), buffer))
}

/// Convert engine outputs to float32 flat tensors, in order.
///
/// # Errors
///
/// Fails on any non-float32 output, on an output whose element count does
/// not match its dims, and on malformed or nested LoD. No partial result is
/// returned.
pub fn from_native_fetches(fetches: &[NativeTensor]) -> Result<Vec<FlatTensor>> {
    fetches
        .iter()
        .enumerate()
        .map(|(i, tensor)| {
            from_native(tensor).map_err(|e| {
                error!("failed to fetch output {}: {}", i, e);
                e
            })
        })
        .collect()
}

fn from_native(tensor: &NativeTensor) -> Result<FlatTensor> {
    let data = match &tensor.buffer {
        NativeBuffer::F32(data) => data,
        other => return Err(InferError::UnsupportedFetchType(other.data_type())),
    };
    if data.len() != tensor.numel() {
        return Err(InferError::tensor(format!(
            "output holds {} elements but dims {:?} imply {}",
            data.len(),
            tensor.dims,
            tensor.numel()
        )));
    }

    match tensor.lod.as_slice() {
        [] => Ok(FlatTensor::from_f32(tensor.dims.clone(), data)),
        [offsets] => {
            let (shape, padded) = pad_lod_batch(data, &tensor.dims, offsets)?;
            Ok(FlatTensor::from_f32(shape, &padded))
        }
        levels => Err(InferError::lod(format!(
            "nested LoD with {} levels is not supported; only one level can be padded",
            levels.len()
        ))),
    }
}

/// Reassemble a variable-length batch into a zero-padded rectangular buffer.
///
/// `data` is the concatenation of every example's rows, `dims` its dense
/// shape and `offsets` the top-level LoD level, so example `k` owns rows
/// `offsets[k]..offsets[k + 1]`. Returns the shape `[batch, max_rows] +
/// dims[1..]` and the padded values; short examples are followed by zero rows.
///
/// ```
/// use fluid_infer::marshal::pad_lod_batch;
///
/// // Two examples with 1 and 2 rows of width 2.
/// let data = [1.0, 1.0, 2.0, 2.0, 3.0, 3.0];
/// let (shape, padded) = pad_lod_batch(&data, &[3, 2], &[0, 1, 3]).unwrap();
/// assert_eq!(shape, vec![2, 2, 2]);
/// assert_eq!(padded, vec![1.0, 1.0, 0.0, 0.0, 2.0, 2.0, 3.0, 3.0]);
/// ```
pub fn pad_lod_batch(
    data: &[f32],
    dims: &[usize],
    offsets: &[usize],
) -> Result<(Vec<usize>, Vec<f32>)> {
    validate_offsets(offsets, dims)?;

    let batch = offsets.len() - 1;
    let total_rows = offsets[batch];
    let max_dim = offsets
        .windows(2)
        .map(|w| w[1] - w[0])
        .max()
        .unwrap_or(0);
    let common_dim = if total_rows == 0 {
        0
    } else {
        data.len() / total_rows
    };

    let stride = max_dim * common_dim;
    let mut padded = vec![0.0f32; batch * stride];
    for (k, w) in offsets.windows(2).enumerate() {
        let start = w[0] * common_dim;
        let end = w[1] * common_dim;
        if end > start {
            let dst = k * stride;
            padded[dst..dst + (end - start)].copy_from_slice(&data[start..end]);
        }
    }

    let mut shape = Vec::with_capacity(dims.len() + 1);
    shape.push(batch);
    shape.push(max_dim);
    shape.extend_from_slice(&dims[1..]);

    debug!(
        "padded lod batch: {} examples, {} rows -> {:?}",
        batch, total_rows, shape
    );
    Ok((shape, padded))
}

fn validate_offsets(offsets: &[usize], dims: &[usize]) -> Result<()> {
    let (first, last) = match (offsets.first(), offsets.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Err(InferError::lod("empty offset level")),
    };
    if first != 0 {
        return Err(InferError::lod(format!(
            "offsets must start at 0, got {}",
            first
        )));
    }
    if let Some(w) = offsets.windows(2).find(|w| w[1] < w[0]) {
        return Err(InferError::lod(format!(
            "offsets must be non-decreasing, found {} after {}",
            w[1], w[0]
        )));
    }
    match dims.first() {
        Some(&rows) if rows == last => Ok(()),
        Some(&rows) => Err(InferError::lod(format!(
            "last offset {} does not match row count {}",
            last, rows
        ))),
        None => Err(InferError::lod("LoD attached to a scalar output")),
    }
}

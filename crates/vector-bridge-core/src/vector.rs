//! Vector utilities and the dimension reconciler.
//!
//! Every vector handed to the vector index passes through [`reconcile`]
//! immediately before the call, which guarantees the index's exact
//! dimensionality and unit L2 norm.
//!
//! Also provides:
//! - [`l2_normalize`]: in-place normalization that leaves zero vectors untouched
//! - [`cosine_similarity`]: similarity between two vectors
//! - [`mean_pool`]: average a `[seq_len, hidden]` token matrix into one vector
//! - [`vec_to_blob`] / [`blob_to_vec`]: little-endian `f32` byte encoding

use crate::error::{BridgeError, Result};

/// Norms at or below this are treated as zero.
pub const NORM_EPSILON: f32 = 1e-12;

/// Normalize `v` to unit L2 norm in place and return the original norm.
///
/// A zero (or near-zero) vector is left unchanged; callers check the
/// returned norm to detect it.
pub fn l2_normalize(v: &mut [f32]) -> f32 {
    let norm = l2_norm(v);
    if norm > NORM_EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    norm
}

/// Euclidean norm of `v`.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Make `vector` exactly `target_dim` long and unit-norm.
///
/// Shorter vectors are zero-padded on the right, longer ones truncated to
/// their first `target_dim` components, and the result is re-normalized.
/// A result with (near-)zero norm is a [`BridgeError::DegenerateInput`].
///
/// # Example
///
/// ```rust
/// use vector_bridge_core::vector::reconcile;
///
/// let v = reconcile(vec![3.0, 4.0], 4).unwrap();
/// assert_eq!(v.len(), 4);
/// assert!((v[0] - 0.6).abs() < 1e-6);
/// assert_eq!(v[3], 0.0);
/// ```
pub fn reconcile(mut vector: Vec<f32>, target_dim: usize) -> Result<Vec<f32>> {
    if target_dim == 0 {
        return Err(BridgeError::DegenerateInput(
            "target dimension must be greater than zero".into(),
        ));
    }
    let original_dim = vector.len();
    vector.resize(target_dim, 0.0);
    let norm = l2_normalize(&mut vector);
    if !(norm > NORM_EPSILON) {
        return Err(BridgeError::DegenerateInput(format!(
            "vector of dimension {} has zero norm after reconciling to {}",
            original_dim, target_dim
        )));
    }
    Ok(vector)
}

/// Re-normalize a vector that is already at the target dimension.
///
/// Used for reference vectors fetched from the index, which are never
/// padded or truncated.
pub fn renormalize(mut vector: Vec<f32>) -> Result<Vec<f32>> {
    let norm = l2_normalize(&mut vector);
    if !(norm > NORM_EPSILON) {
        return Err(BridgeError::DegenerateInput(format!(
            "vector of dimension {} has zero norm",
            vector.len()
        )));
    }
    Ok(vector)
}

/// Average the rows of a `[seq_len, hidden]` matrix.
///
/// Returns `None` for an empty matrix or rows of unequal length.
pub fn mean_pool(rows: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = rows.first()?;
    let hidden = first.len();
    if hidden == 0 || rows.iter().any(|r| r.len() != hidden) {
        return None;
    }
    let mut sum = vec![0f32; hidden];
    for row in rows {
        for (acc, v) in sum.iter_mut().zip(row) {
            *acc += v;
        }
    }
    let count = rows.len() as f32;
    for x in &mut sum {
        *x /= count;
    }
    Some(sum)
}

/// Compute cosine similarity between two vectors.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or
/// when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Encode a float vector as little-endian `f32` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian `f32` bytes back into a float vector.
///
/// Trailing bytes that do not form a whole `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

//! Space adapter: a learned linear map from a small embedding space into
//! the target index space.
//!
//! The adapter is a dense matrix `W` of shape `(small_dim, target_dim)`;
//! projecting a small-model embedding `x` gives `y = x · W`, re-normalized
//! to unit length. `W` is fit by ridge regression without an intercept:
//!
//! ```text
//! W = argmin ‖XW − Y‖² + α‖W‖²   ⇒   (XᵀX + αI) W = XᵀY
//! ```
//!
//! solved through a Cholesky factorization of the `small_dim × small_dim`
//! normal matrix. Once loaded the adapter is immutable and shared read-only.
//!
//! # Artifact format
//!
//! Little-endian: magic `VBSA`, `u32` version, `u32` small_dim,
//! `u32` target_dim, then `small_dim × target_dim` `f32`s in row-major order.

use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use serde::Serialize;

use crate::error::{BridgeError, Result};
use crate::vector::{blob_to_vec, l2_normalize, vec_to_blob, NORM_EPSILON};

const MAGIC: &[u8; 4] = b"VBSA";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 16;

/// A linear projection into the target index space.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceAdapter {
    weights: Array2<f32>,
}

impl SpaceAdapter {
    /// Wrap a `(small_dim, target_dim)` weight matrix.
    pub fn new(weights: Array2<f32>) -> Result<Self> {
        let (rows, cols) = weights.dim();
        if rows == 0 || cols == 0 {
            return Err(BridgeError::Configuration(format!(
                "space adapter must be non-empty, got shape ({rows}, {cols})"
            )));
        }
        Ok(Self { weights })
    }

    /// Dimensionality of the small model's embeddings.
    pub fn small_dim(&self) -> usize {
        self.weights.nrows()
    }

    /// Dimensionality of the target index space.
    pub fn target_dim(&self) -> usize {
        self.weights.ncols()
    }

    pub fn weights(&self) -> &Array2<f32> {
        &self.weights
    }

    /// Project one small-space embedding into the target space and re-normalize.
    ///
    /// A length other than [`small_dim`](Self::small_dim) is a
    /// [`BridgeError::DegenerateInput`], as is a projection with zero norm.
    pub fn project(&self, x: &[f32]) -> Result<Vec<f32>> {
        if x.len() != self.small_dim() {
            return Err(BridgeError::DegenerateInput(format!(
                "small embedding dimension {} does not match adapter small_dim {}",
                x.len(),
                self.small_dim()
            )));
        }
        let mut y = ArrayView1::from(x).dot(&self.weights).to_vec();
        let norm = l2_normalize(&mut y);
        if !(norm > NORM_EPSILON) {
            return Err(BridgeError::DegenerateInput(
                "adapter projection has zero norm".into(),
            ));
        }
        Ok(y)
    }

    /// Fit `W` by ridge regression (no intercept) on rows `x[i] → y[i]`.
    ///
    /// `x` is `n × small_dim`, `y` is `n × target_dim`. Accumulation is in
    /// `f64`. With `alpha == 0` a rank-deficient `x` fails as
    /// [`BridgeError::DegenerateInput`].
    pub fn fit_ridge(x: &Array2<f32>, y: &Array2<f32>, alpha: f64) -> Result<Self> {
        let (n, d) = x.dim();
        let (ny, t) = y.dim();
        if n == 0 || d == 0 || t == 0 {
            return Err(BridgeError::DegenerateInput(
                "cannot fit an adapter on an empty training set".into(),
            ));
        }
        if n != ny {
            return Err(BridgeError::DegenerateInput(format!(
                "training inputs have {n} rows but targets have {ny}"
            )));
        }
        if !(alpha >= 0.0) {
            return Err(BridgeError::Configuration(format!(
                "ridge alpha must be non-negative, got {alpha}"
            )));
        }

        let x64 = x.mapv(f64::from);
        let y64 = y.mapv(f64::from);

        let mut gram = x64.t().dot(&x64);
        for i in 0..d {
            gram[[i, i]] += alpha;
        }
        let rhs = x64.t().dot(&y64);

        let lower = cholesky(&gram).ok_or_else(|| {
            BridgeError::DegenerateInput(
                "normal equations are singular; increase the ridge regularization strength".into(),
            )
        })?;
        let w = cholesky_solve(&lower, rhs);

        Self::new(w.mapv(|v| v as f32))
    }

    /// Serialize to the binary artifact format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.weights.len() * 4);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(self.small_dim() as u32).to_le_bytes());
        out.extend_from_slice(&(self.target_dim() as u32).to_le_bytes());
        let flat: Vec<f32> = self.weights.iter().copied().collect();
        out.extend_from_slice(&vec_to_blob(&flat));
        out
    }

    /// Parse the binary artifact format, validating header and payload length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(BridgeError::Configuration(
                "not a space adapter artifact (bad magic)".into(),
            ));
        }
        let read_u32 = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let version = read_u32(4);
        if version != FORMAT_VERSION {
            return Err(BridgeError::Configuration(format!(
                "unsupported space adapter format version {version}"
            )));
        }
        let small_dim = read_u32(8) as usize;
        let target_dim = read_u32(12) as usize;
        let payload = &bytes[HEADER_LEN..];
        let expected = small_dim
            .checked_mul(target_dim)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| {
                BridgeError::Configuration(format!(
                    "space adapter shape ({small_dim}, {target_dim}) is too large"
                ))
            })?;
        if payload.len() != expected {
            return Err(BridgeError::Configuration(format!(
                "space adapter payload is {} bytes, expected {} for shape ({}, {})",
                payload.len(),
                expected,
                small_dim,
                target_dim
            )));
        }
        let weights = Array2::from_shape_vec((small_dim, target_dim), blob_to_vec(payload))
            .map_err(|e| BridgeError::Configuration(format!("space adapter shape: {e}")))?;
        Self::new(weights)
    }
}

/// Lower-triangular `L` with `a = L Lᵀ`, or `None` if `a` is not positive definite.
fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let row_j = l.slice(s![j, ..j]);
        let diag = a[[j, j]] - row_j.dot(&row_j);
        if !(diag > 1e-12) {
            return None;
        }
        let ljj = diag.sqrt();
        l[[j, j]] = ljj;
        for i in (j + 1)..n {
            let dot = l.slice(s![i, ..j]).dot(&l.slice(s![j, ..j]));
            l[[i, j]] = (a[[i, j]] - dot) / ljj;
        }
    }
    Some(l)
}

/// Solve `L Lᵀ W = B` for every column of `B` at once.
fn cholesky_solve(l: &Array2<f64>, mut b: Array2<f64>) -> Array2<f64> {
    let n = l.nrows();
    // forward: L Z = B
    for i in 0..n {
        let mut row: Array1<f64> = b.row(i).to_owned();
        for k in 0..i {
            row.scaled_add(-l[[i, k]], &b.row(k));
        }
        row /= l[[i, i]];
        b.row_mut(i).assign(&row);
    }
    // backward: Lᵀ W = Z
    for i in (0..n).rev() {
        let mut row: Array1<f64> = b.row(i).to_owned();
        for k in (i + 1)..n {
            row.scaled_add(-l[[k, i]], &b.row(k));
        }
        row /= l[[i, i]];
        b.row_mut(i).assign(&row);
    }
    b
}

/// Distribution of cosine similarity between predicted and true target vectors.
///
/// The acceptance criterion for deploying an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlignmentReport {
    pub n: usize,
    pub mean: f32,
    pub median: f32,
    pub p10: f32,
    pub p90: f32,
}

impl AlignmentReport {
    /// Summarize a set of similarities; `None` when empty.
    pub fn from_similarities(mut sims: Vec<f32>) -> Option<Self> {
        if sims.is_empty() {
            return None;
        }
        sims.sort_by(|a, b| a.total_cmp(b));
        let n = sims.len();
        let mean = sims.iter().map(|&v| v as f64).sum::<f64>() / n as f64;
        Some(Self {
            n,
            mean: mean as f32,
            median: percentile(&sims, 50.0),
            p10: percentile(&sims, 10.0),
            p90: percentile(&sims, 90.0),
        })
    }
}

impl std::fmt::Display for AlignmentReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "n={} mean={:.4} median={:.4} p10={:.4} p90={:.4}",
            self.n, self.mean, self.median, self.p10, self.p90
        )
    }
}

/// Linear-interpolated percentile of an ascending slice.
fn percentile(sorted: &[f32], p: f64) -> f32 {
    let pos = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = (pos - lo as f64) as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Predict `Ŷ = XW`, normalize `Ŷ` and `Y` row-wise, and summarize their cosine similarity.
pub fn evaluate(adapter: &SpaceAdapter, x: &Array2<f32>, y: &Array2<f32>) -> Result<AlignmentReport> {
    if x.ncols() != adapter.small_dim() {
        return Err(BridgeError::DegenerateInput(format!(
            "evaluation inputs have dimension {} but adapter small_dim is {}",
            x.ncols(),
            adapter.small_dim()
        )));
    }
    if y.ncols() != adapter.target_dim() || y.nrows() != x.nrows() {
        return Err(BridgeError::DegenerateInput(format!(
            "evaluation targets have shape {:?}, expected ({}, {})",
            y.dim(),
            x.nrows(),
            adapter.target_dim()
        )));
    }

    let predicted = x.dot(adapter.weights());
    let sims: Vec<f32> = predicted
        .axis_iter(Axis(0))
        .zip(y.axis_iter(Axis(0)))
        .map(|(p, t)| {
            let mut p = p.to_vec();
            let mut t = t.to_vec();
            l2_normalize(&mut p);
            l2_normalize(&mut t);
            p.iter().zip(&t).map(|(a, b)| a * b).sum::<f32>()
        })
        .collect();

    AlignmentReport::from_similarities(sims).ok_or_else(|| {
        BridgeError::DegenerateInput("no evaluation pairs".into())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_matrix(rng: &mut StdRng, rows: usize, cols: usize) -> Array2<f32> {
        Array2::from_shape_fn((rows, cols), |_| rng.random_range(-1.0f32..1.0))
    }

    fn normalize_rows(m: &mut Array2<f32>) {
        for mut row in m.axis_iter_mut(Axis(0)) {
            let mut v = row.to_vec();
            l2_normalize(&mut v);
            row.assign(&Array1::from(v));
        }
    }

    #[test]
    fn test_ridge_recovers_exact_linear_map() {
        let mut rng = StdRng::seed_from_u64(7);
        let w_true = random_matrix(&mut rng, 8, 16);
        let mut x = random_matrix(&mut rng, 300, 8);
        normalize_rows(&mut x);
        let y = x.dot(&w_true);

        let adapter = SpaceAdapter::fit_ridge(&x, &y, 1e-6).unwrap();
        assert_eq!(adapter.small_dim(), 8);
        assert_eq!(adapter.target_dim(), 16);

        let report = evaluate(&adapter, &x, &y).unwrap();
        assert_eq!(report.n, 300);
        assert!(report.mean > 0.99, "mean cosine {}", report.mean);
        assert!(report.p10 > 0.99, "p10 cosine {}", report.p10);
    }

    #[test]
    fn test_ridge_strong_alpha_shrinks_weights() {
        let mut rng = StdRng::seed_from_u64(3);
        let x = random_matrix(&mut rng, 50, 4);
        let y = random_matrix(&mut rng, 50, 6);
        let weak = SpaceAdapter::fit_ridge(&x, &y, 1e-3).unwrap();
        let strong = SpaceAdapter::fit_ridge(&x, &y, 1e6).unwrap();
        let norm = |a: &SpaceAdapter| a.weights().iter().map(|v| v * v).sum::<f32>();
        assert!(norm(&strong) < norm(&weak));
    }

    #[test]
    fn test_ridge_singular_without_regularization() {
        // two identical columns make XᵀX singular
        let x = Array2::from_shape_vec((3, 2), vec![1.0, 1.0, 2.0, 2.0, 3.0, 3.0]).unwrap();
        let y = Array2::from_shape_vec((3, 1), vec![1.0, 2.0, 3.0]).unwrap();
        let err = SpaceAdapter::fit_ridge(&x, &y, 0.0).unwrap_err();
        assert!(matches!(err, BridgeError::DegenerateInput(_)));
        assert!(SpaceAdapter::fit_ridge(&x, &y, 0.1).is_ok());
    }

    #[test]
    fn test_project_checks_small_dim() {
        let adapter = SpaceAdapter::new(Array2::eye(3)).unwrap();
        let err = adapter.project(&[1.0, 0.0]).unwrap_err();
        assert!(matches!(err, BridgeError::DegenerateInput(_)));

        let y = adapter.project(&[0.0, 3.0, 4.0]).unwrap();
        assert!((y[1] - 0.6).abs() < 1e-6);
        assert!((y[2] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_project_zero_is_degenerate() {
        let adapter = SpaceAdapter::new(Array2::zeros((2, 2))).unwrap();
        assert!(adapter.project(&[1.0, 1.0]).is_err());
    }

    #[test]
    fn test_artifact_roundtrip_and_validation() {
        let w = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let adapter = SpaceAdapter::new(w).unwrap();
        let bytes = adapter.to_bytes();
        assert_eq!(bytes.len(), 16 + 6 * 4);
        assert_eq!(SpaceAdapter::from_bytes(&bytes).unwrap(), adapter);

        assert!(SpaceAdapter::from_bytes(b"NOPE").is_err());
        assert!(SpaceAdapter::from_bytes(&bytes[..bytes.len() - 4]).is_err());
        let mut bad_version = bytes.clone();
        bad_version[4] = 9;
        assert!(SpaceAdapter::from_bytes(&bad_version).is_err());

        let mut huge = Vec::new();
        huge.extend_from_slice(b"VBSA");
        huge.extend_from_slice(&1u32.to_le_bytes());
        huge.extend_from_slice(&u32::MAX.to_le_bytes());
        huge.extend_from_slice(&u32::MAX.to_le_bytes());
        huge.extend_from_slice(&[0u8; 16]);
        let err = SpaceAdapter::from_bytes(&huge).unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
    }

    #[test]
    fn test_report_percentiles() {
        let report = AlignmentReport::from_similarities(vec![0.5, 0.1, 0.9, 0.3, 0.7]).unwrap();
        assert_eq!(report.n, 5);
        assert!((report.mean - 0.5).abs() < 1e-6);
        assert!((report.median - 0.5).abs() < 1e-6);
        // pos = 0.4 between 0.1 and 0.3
        assert!((report.p10 - 0.18).abs() < 1e-6);
        assert!((report.p90 - 0.82).abs() < 1e-6);
        assert!(AlignmentReport::from_similarities(Vec::new()).is_none());
    }
}

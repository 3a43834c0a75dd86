//! Sparse-dense products on candle tensors.
//!
//! Candle has no sparse storage, so a [`SparseTensor`] keeps the COO triplets
//! as three 1-D tensors and computes `S @ X` as a gather / scale / scatter:
//!
//! ```text
//! out = zeros(rows, d)
//! out[row_idx[e]] += values[e] * X[col_idx[e]]     for every stored entry e
//! ```
//!
//! which is `index_select` + `broadcast_mul` + `index_add` and stays
//! differentiable with respect to `X`.

use candle_core::{DType, Device, Tensor};
use hetlink_core::SparseMatrix;

use crate::error::{Error, Result};

/// Sparse matrix resident on a device.
#[derive(Debug, Clone)]
pub struct SparseTensor {
    rows: usize,
    cols: usize,
    nnz: usize,
    row_idx: Tensor,
    col_idx: Tensor,
    values: Tensor,
}

impl SparseTensor {
    /// Upload a [`SparseMatrix`].
    pub fn from_matrix(matrix: &SparseMatrix, device: &Device) -> Result<Self> {
        let nnz = matrix.nnz();
        Ok(Self {
            rows: matrix.rows(),
            cols: matrix.cols(),
            nnz,
            row_idx: Tensor::from_slice(matrix.row_indices(), nnz, device)?,
            col_idx: Tensor::from_slice(matrix.col_indices(), nnz, device)?,
            values: Tensor::from_slice(matrix.values(), nnz, device)?,
        })
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Stored entries.
    pub fn nnz(&self) -> usize {
        self.nnz
    }

    /// `self @ dense` for a `(cols, d)` dense tensor, giving `(rows, d)`.
    pub fn matmul(&self, dense: &Tensor) -> Result<Tensor> {
        let (n, d) = dense.dims2()?;
        if n != self.cols {
            return Err(Error::DimensionMismatch {
                expected: self.cols,
                got: n,
            });
        }
        let out = Tensor::zeros((self.rows, d), dense.dtype(), dense.device())?;
        if self.nnz == 0 {
            return Ok(out);
        }
        let values = self.values.to_dtype(dense.dtype())?.unsqueeze(1)?;
        let gathered = dense.index_select(&self.col_idx, 0)?;
        let scaled = gathered.broadcast_mul(&values)?;
        Ok(out.index_add(&self.row_idx, &scaled, 0)?)
    }

    /// Inverted dropout on the stored values.
    ///
    /// Each non-zero survives with probability `1 - rate` and is scaled by
    /// `1 / (1 - rate)`; dropped entries contribute nothing to products.
    pub fn dropout(&self, rate: f32) -> Result<Self> {
        if !(0.0..1.0).contains(&rate) {
            return Err(Error::InvalidConfig(format!(
                "dropout rate must be in [0, 1), got {rate}"
            )));
        }
        if rate == 0.0 || self.nnz == 0 {
            return Ok(self.clone());
        }
        Ok(Self {
            values: candle_nn::ops::dropout(&self.values, rate)?,
            ..self.clone()
        })
    }

    /// Dense copy, mainly for inspection and tests.
    pub fn to_dense(&self) -> Result<Tensor> {
        let device = self.values.device();
        let eye = Tensor::eye(self.cols, DType::F32, device)?;
        self.matmul(&eye)
    }
}

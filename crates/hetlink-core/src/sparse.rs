//! Sparse matrices in sorted coordinate form.
//!
//! Adjacency matrices and node features are both stored as [`SparseMatrix`]:
//! parallel `(row, col, value)` arrays sorted by `(row, col)` with no
//! duplicate coordinates and no explicit zeros. This is the layout the
//! tensor crate consumes for sparse-dense products.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};

/// An ordered `(row, col)` pair inside one relation's adjacency matrix.
pub type Edge = (usize, usize);

/// Sparse `rows x cols` matrix of `f32` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseMatrix {
    rows: usize,
    cols: usize,
    row_idx: Vec<u32>,
    col_idx: Vec<u32>,
    values: Vec<f32>,
}

impl SparseMatrix {
    /// An all-zero matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            row_idx: Vec::new(),
            col_idx: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Build from `(row, col, value)` triplets.
    ///
    /// Duplicate coordinates are summed and resulting zeros dropped.
    /// Out-of-range coordinates are a data integrity error.
    pub fn from_triplets<I>(rows: usize, cols: usize, triplets: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, usize, f32)>,
    {
        if rows > u32::MAX as usize || cols > u32::MAX as usize {
            return Err(Error::DataIntegrity(format!(
                "matrix shape {rows}x{cols} exceeds u32 index range"
            )));
        }

        let mut entries: Vec<(usize, usize, f32)> = Vec::new();
        for (r, c, v) in triplets {
            if r >= rows || c >= cols {
                return Err(Error::DataIntegrity(format!(
                    "entry ({r}, {c}) out of bounds for {rows}x{cols} matrix"
                )));
            }
            if !v.is_finite() {
                return Err(Error::DataIntegrity(format!(
                    "entry ({r}, {c}) has non-finite value {v}"
                )));
            }
            entries.push((r, c, v));
        }
        entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut m = Self::zeros(rows, cols);
        for (r, c, v) in entries {
            let same_as_last = m
                .row_idx
                .last()
                .zip(m.col_idx.last())
                .is_some_and(|(&lr, &lc)| lr as usize == r && lc as usize == c);
            if same_as_last {
                if let Some(last) = m.values.last_mut() {
                    *last += v;
                }
            } else {
                m.row_idx.push(r as u32);
                m.col_idx.push(c as u32);
                m.values.push(v);
            }
        }
        m.drop_zeros();
        Ok(m)
    }

    /// Binary matrix with a one at every listed edge.
    pub fn from_edges(rows: usize, cols: usize, edges: &[Edge]) -> Result<Self> {
        let mut m = Self::from_triplets(rows, cols, edges.iter().map(|&(r, c)| (r, c, 1.0)))?;
        // Repeated edges stay binary.
        m.values.iter_mut().for_each(|v| *v = 1.0);
        Ok(m)
    }

    /// `n x n` identity.
    pub fn identity(n: usize) -> Self {
        let idx: Vec<u32> = (0..n as u32).collect();
        Self {
            rows: n,
            cols: n,
            row_idx: idx.clone(),
            col_idx: idx,
            values: vec![1.0; n],
        }
    }

    fn drop_zeros(&mut self) {
        if self.values.iter().all(|&v| v != 0.0) {
            return;
        }
        let keep: Vec<usize> = (0..self.values.len())
            .filter(|&i| self.values[i] != 0.0)
            .collect();
        self.row_idx = keep.iter().map(|&i| self.row_idx[i]).collect();
        self.col_idx = keep.iter().map(|&i| self.col_idx[i]).collect();
        self.values = keep.iter().map(|&i| self.values[i]).collect();
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of stored (non-zero) entries.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Fraction of non-zero cells.
    pub fn density(&self) -> f64 {
        let cells = self.rows as f64 * self.cols as f64;
        if cells == 0.0 {
            0.0
        } else {
            self.nnz() as f64 / cells
        }
    }

    /// Row indices of the stored entries.
    pub fn row_indices(&self) -> &[u32] {
        &self.row_idx
    }

    /// Column indices of the stored entries.
    pub fn col_indices(&self) -> &[u32] {
        &self.col_idx
    }

    /// Values of the stored entries.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Iterate `(row, col, value)` in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        self.row_idx
            .iter()
            .zip(&self.col_idx)
            .zip(&self.values)
            .map(|((&r, &c), &v)| (r as usize, c as usize, v))
    }

    /// Value at `(row, col)`, zero if absent.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        let start = self.row_idx.partition_point(|&r| (r as usize) < row);
        let end = self.row_idx.partition_point(|&r| (r as usize) <= row);
        self.col_idx[start..end]
            .binary_search(&(col as u32))
            .map_or(0.0, |i| self.values[start + i])
    }

    /// Whether `(row, col)` holds a non-zero entry.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.get(row, col) != 0.0
    }

    /// Transposed copy.
    pub fn transpose(&self) -> Self {
        let mut entries: Vec<(u32, u32, f32)> = self
            .row_idx
            .iter()
            .zip(&self.col_idx)
            .zip(&self.values)
            .map(|((&r, &c), &v)| (c, r, v))
            .collect();
        entries.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        Self {
            rows: self.cols,
            cols: self.rows,
            row_idx: entries.iter().map(|e| e.0).collect(),
            col_idx: entries.iter().map(|e| e.1).collect(),
            values: entries.iter().map(|e| e.2).collect(),
        }
    }

    fn filter(&self, keep: impl Fn(usize, usize) -> bool) -> Self {
        let mut out = Self::zeros(self.rows, self.cols);
        for (r, c, v) in self.iter() {
            if keep(r, c) {
                out.row_idx.push(r as u32);
                out.col_idx.push(c as u32);
                out.values.push(v);
            }
        }
        out
    }

    /// Copy with the listed coordinates removed.
    pub fn remove_edges(&self, edges: &[Edge]) -> Self {
        let removed: HashSet<Edge> = edges.iter().copied().collect();
        self.filter(|r, c| !removed.contains(&(r, c)))
    }

    /// Copy with the main diagonal removed.
    pub fn without_diagonal(&self) -> Self {
        self.filter(|r, c| r != c)
    }

    /// Non-zero coordinates, optionally skipping the main diagonal.
    pub fn positive_edges(&self, exclude_diagonal: bool) -> Vec<Edge> {
        self.iter()
            .filter(|&(r, c, _)| !(exclude_diagonal && r == c))
            .map(|(r, c, _)| (r, c))
            .collect()
    }

    /// Non-zero count per row.
    pub fn row_nnz(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.rows];
        for &r in &self.row_idx {
            counts[r as usize] += 1;
        }
        counts
    }

    /// Non-zero count per column.
    pub fn col_nnz(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.cols];
        for &c in &self.col_idx {
            counts[c as usize] += 1;
        }
        counts
    }

    /// Sum of values per row.
    pub fn row_sums(&self) -> Vec<f32> {
        let mut sums = vec![0.0f32; self.rows];
        for (r, _, v) in self.iter() {
            sums[r] += v;
        }
        sums
    }

    /// Sum of values per column.
    pub fn col_sums(&self) -> Vec<f32> {
        let mut sums = vec![0.0f32; self.cols];
        for (_, c, v) in self.iter() {
            sums[c] += v;
        }
        sums
    }

    /// Symmetric degree normalisation `D_r^{-1/2} A' D_c^{-1/2}`.
    ///
    /// With `add_self_loops`, `A' = A + I` (square matrices only), otherwise
    /// `A' = A`. Rows or columns with zero degree get a zero factor.
    pub fn normalized(&self, add_self_loops: bool) -> Result<Self> {
        let base = if add_self_loops {
            if self.rows != self.cols {
                return Err(Error::DataIntegrity(format!(
                    "cannot add self-loops to non-square {}x{} matrix",
                    self.rows, self.cols
                )));
            }
            let loops = (0..self.rows).map(|i| (i, i, 1.0));
            Self::from_triplets(self.rows, self.cols, self.iter().chain(loops))?
        } else {
            self.clone()
        };

        let inv_sqrt = |d: f32| if d > 0.0 { d.sqrt().recip() } else { 0.0 };
        let row_scale: Vec<f32> = base.row_sums().into_iter().map(inv_sqrt).collect();
        let col_scale: Vec<f32> = base.col_sums().into_iter().map(inv_sqrt).collect();

        let mut out = base;
        for i in 0..out.values.len() {
            let r = out.row_idx[i] as usize;
            let c = out.col_idx[i] as usize;
            out.values[i] *= row_scale[r] * col_scale[c];
        }
        out.drop_zeros();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_triplets_sorts_and_sums() {
        let m = SparseMatrix::from_triplets(3, 3, vec![(2, 0, 1.0), (0, 1, 2.0), (2, 0, 0.5)])
            .unwrap();
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.row_indices(), &[0, 2]);
        assert!((m.get(2, 0) - 1.5).abs() < 1e-6);
        assert_eq!(m.get(1, 1), 0.0);
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let err = SparseMatrix::from_triplets(2, 2, vec![(2, 0, 1.0)]);
        assert!(matches!(err, Err(Error::DataIntegrity(_))));
    }

    #[test]
    fn test_from_edges_binary() {
        let m = SparseMatrix::from_edges(2, 3, &[(0, 2), (0, 2), (1, 0)]).unwrap();
        assert_eq!(m.nnz(), 2);
        assert_eq!(m.get(0, 2), 1.0);
        assert!(m.contains(1, 0));
        assert!(!m.contains(1, 1));
    }

    #[test]
    fn test_transpose() {
        let m = SparseMatrix::from_edges(2, 3, &[(0, 2), (1, 0), (1, 2)]).unwrap();
        let t = m.transpose();
        assert_eq!(t.shape(), (3, 2));
        assert!(t.contains(2, 0));
        assert!(t.contains(0, 1));
        assert!(t.contains(2, 1));
        assert_eq!(t.row_indices(), &[0, 2, 2]);
    }

    #[test]
    fn test_remove_and_diagonal() {
        let m = SparseMatrix::from_edges(3, 3, &[(0, 0), (0, 1), (1, 2), (2, 2)]).unwrap();
        assert_eq!(m.positive_edges(true), vec![(0, 1), (1, 2)]);
        assert_eq!(m.without_diagonal().nnz(), 2);
        let r = m.remove_edges(&[(0, 1), (2, 2)]);
        assert_eq!(r.positive_edges(false), vec![(0, 0), (1, 2)]);
    }

    #[test]
    fn test_degree_counts() {
        let m = SparseMatrix::from_edges(2, 3, &[(0, 0), (0, 2), (1, 2)]).unwrap();
        assert_eq!(m.row_nnz(), vec![2, 1]);
        assert_eq!(m.col_nnz(), vec![1, 0, 2]);
    }

    #[test]
    fn test_normalized_bipartite() {
        // Row 0 has degree 2, column 2 has degree 2.
        let m = SparseMatrix::from_edges(2, 3, &[(0, 0), (0, 2), (1, 2)]).unwrap();
        let n = m.normalized(false).unwrap();
        let expected = 1.0 / (2.0f32.sqrt() * 2.0f32.sqrt());
        assert!((n.get(0, 2) - expected).abs() < 1e-6);
        assert!((n.get(0, 0) - 1.0 / 2.0f32.sqrt()).abs() < 1e-6);
        // Column 1 is isolated: no entries, no division by zero.
        assert_eq!(n.get(0, 1), 0.0);
    }

    #[test]
    fn test_normalized_self_loops() {
        let m = SparseMatrix::from_edges(2, 2, &[(0, 1), (1, 0)]).unwrap();
        let n = m.normalized(true).unwrap();
        // Every row/col sum of A + I is 2.
        for (_, _, v) in n.iter() {
            assert!((v - 0.5).abs() < 1e-6);
        }
        assert_eq!(n.nnz(), 4);
        assert!(SparseMatrix::zeros(2, 3).normalized(true).is_err());
    }

    #[test]
    fn test_identity() {
        let i = SparseMatrix::identity(3);
        assert_eq!(i.nnz(), 3);
        assert!(i.contains(2, 2));
        assert_eq!(i.density(), 1.0 / 3.0);
    }
}

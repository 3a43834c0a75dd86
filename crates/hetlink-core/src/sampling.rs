//! Negative edge sampling.
//!
//! Negatives are `(row, col)` pairs that are absent from a relation's
//! original adjacency matrix. Sampling is by rejection: draw a candidate,
//! reject it if it is a known positive (or a self-loop on a same-type
//! relation), draw again. Every negative has a bounded number of draws;
//! running out yields [`Error::SamplingExhausted`] instead of looping on
//! pathologically dense relations.
//!
//! # Strategies
//!
//! - [`NegativeStrategy::Uniform`]: row and column drawn uniformly.
//! - [`NegativeStrategy::DegreeWeighted`]: for training batches, the row of
//!   the positive edge is kept and the column is drawn with probability
//!   proportional to `degree^distortion`. When the weighted draws cannot
//!   find a free column for that row within the budget, a second budget of
//!   uniform column draws is spent before failing. Held-out negatives are
//!   always uniform.

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::catalog::RelationType;
use crate::degree::{Axis, DegreeTable};
use crate::error::{Error, Result};
use crate::sparse::{Edge, SparseMatrix};

/// Hash set of edges with O(1) membership.
#[derive(Debug, Clone, Default)]
pub struct EdgeSet {
    edges: HashSet<Edge>,
}

impl EdgeSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every non-zero coordinate of a matrix, diagonal included.
    pub fn from_matrix(matrix: &SparseMatrix) -> Self {
        Self {
            edges: matrix.positive_edges(false).into_iter().collect(),
        }
    }

    /// Set of the given edges.
    pub fn from_edges(edges: &[Edge]) -> Self {
        Self {
            edges: edges.iter().copied().collect(),
        }
    }

    /// Membership test.
    pub fn contains(&self, edge: &Edge) -> bool {
        self.edges.contains(edge)
    }

    /// Insert, returning whether the edge was new.
    pub fn insert(&mut self, edge: Edge) -> bool {
        self.edges.insert(edge)
    }

    /// Number of edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Iterate in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }
}

/// How training negatives are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegativeStrategy {
    /// Uniform over the full `rows x cols` index range.
    #[default]
    Uniform,
    /// Keep the positive's row, draw the column by `degree^distortion`.
    DegreeWeighted {
        /// Exponent applied to column degrees (0.75 is customary).
        distortion: f64,
    },
}

/// Rejection sampler for one relation type.
#[derive(Debug, Clone)]
pub struct NegativeSampler {
    relation: RelationType,
    rows: usize,
    cols: usize,
    positives: EdgeSet,
    max_attempts: usize,
    column_weights: Option<WeightedIndex<f64>>,
}

impl NegativeSampler {
    /// Create a sampler rejecting every non-zero entry of `adjacency`.
    ///
    /// `max_attempts` bounds the draws spent on each negative. For
    /// [`NegativeStrategy::DegreeWeighted`] the degree table must cover the
    /// relation; if every column degree is zero the sampler falls back to
    /// uniform columns.
    pub fn new(
        relation: RelationType,
        adjacency: &SparseMatrix,
        strategy: NegativeStrategy,
        degrees: Option<&DegreeTable>,
        max_attempts: usize,
    ) -> Result<Self> {
        if max_attempts == 0 {
            return Err(Error::Configuration(
                "max_sampling_attempts must be positive".into(),
            ));
        }
        let column_weights = match strategy {
            NegativeStrategy::Uniform => None,
            NegativeStrategy::DegreeWeighted { distortion } => {
                if !distortion.is_finite() || distortion < 0.0 {
                    return Err(Error::Configuration(format!(
                        "degree distortion must be finite and non-negative, got {distortion}"
                    )));
                }
                let weights = degrees
                    .and_then(|d| d.sampling_weights(&relation, Axis::Col, distortion))
                    .ok_or(Error::UnknownRelation(relation))?;
                WeightedIndex::new(weights).ok()
            }
        };
        Ok(Self {
            relation,
            rows: adjacency.rows(),
            cols: adjacency.cols(),
            positives: EdgeSet::from_matrix(adjacency),
            max_attempts,
            column_weights,
        })
    }

    /// Relation being sampled.
    pub fn relation(&self) -> RelationType {
        self.relation
    }

    /// Known positives, used for rejection.
    pub fn positives(&self) -> &EdgeSet {
        &self.positives
    }

    fn is_valid_negative(&self, edge: &Edge) -> bool {
        !(self.relation.is_homogeneous() && edge.0 == edge.1) && !self.positives.contains(edge)
    }

    /// Cells that can ever be a negative.
    fn capacity(&self) -> usize {
        let cells = self.rows * self.cols;
        let mut invalid = self.positives.len();
        if self.relation.is_homogeneous() {
            let diag_positives = self.positives.iter().filter(|(r, c)| r == c).count();
            invalid += self.rows - diag_positives;
        }
        cells.saturating_sub(invalid)
    }

    fn exhausted(&self, requested: usize, sampled: usize, attempts: usize) -> Error {
        Error::SamplingExhausted {
            relation: self.relation,
            requested,
            sampled,
            attempts,
        }
    }

    /// Draw `count` distinct uniform negatives for a validation or test split.
    pub fn sample_held_out<R: Rng + ?Sized>(&self, rng: &mut R, count: usize) -> Result<Vec<Edge>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        if count > self.capacity() {
            return Err(self.exhausted(count, 0, 0));
        }

        let mut seen = EdgeSet::new();
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            let mut accepted = false;
            for _ in 0..self.max_attempts {
                let edge = (rng.random_range(0..self.rows), rng.random_range(0..self.cols));
                if self.is_valid_negative(&edge) && seen.insert(edge) {
                    out.push(edge);
                    accepted = true;
                    break;
                }
            }
            if !accepted {
                return Err(self.exhausted(count, out.len(), self.max_attempts));
            }
        }
        Ok(out)
    }

    /// Draw `per_positive` negatives for each positive of a training batch.
    ///
    /// The output is positive-major: negatives of `positives[i]` occupy
    /// `[i * per_positive, (i + 1) * per_positive)`. Repeats across
    /// positives are allowed.
    pub fn sample_for_batch<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        positives: &[Edge],
        per_positive: usize,
    ) -> Result<Vec<Edge>> {
        let requested = positives.len() * per_positive;
        let mut out = Vec::with_capacity(requested);
        for &(row, _) in positives {
            for _ in 0..per_positive {
                let edge = match &self.column_weights {
                    Some(dist) => self
                        .draw(|| (row, dist.sample(rng)))
                        .or_else(|| self.draw(|| (row, rng.random_range(0..self.cols)))),
                    None => self.draw(|| {
                        (rng.random_range(0..self.rows), rng.random_range(0..self.cols))
                    }),
                };
                match edge {
                    Some(edge) => out.push(edge),
                    None => return Err(self.exhausted(requested, out.len(), self.max_attempts)),
                }
            }
        }
        Ok(out)
    }

    /// First valid candidate within the attempt budget.
    fn draw(&self, mut candidate: impl FnMut() -> Edge) -> Option<Edge> {
        (0..self.max_attempts)
            .map(|_| candidate())
            .find(|e| self.is_valid_negative(e))
    }
}

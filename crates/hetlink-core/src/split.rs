//! Train / validation / test partition of one relation's positive edges.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::catalog::RelationType;
use crate::error::{Error, Result};
use crate::sampling::NegativeSampler;
use crate::sparse::Edge;

/// Edge partition for one relation slot.
///
/// `train`, `val` and `test` are pairwise disjoint and together hold every
/// positive edge. `val_negatives` / `test_negatives` match their positive
/// counts.
#[derive(Debug, Clone)]
pub struct EdgeSplit {
    /// Relation the edges belong to.
    pub relation: RelationType,
    /// Training positives.
    pub train: Vec<Edge>,
    /// Validation positives.
    pub val: Vec<Edge>,
    /// Test positives.
    pub test: Vec<Edge>,
    /// Validation negatives.
    pub val_negatives: Vec<Edge>,
    /// Test negatives.
    pub test_negatives: Vec<Edge>,
}

impl EdgeSplit {
    /// Permute `positives` and carve off `floor(fraction * total)` edges for
    /// validation and the same number for test, then sample held-out
    /// negatives.
    pub fn new<R: Rng + ?Sized>(
        relation: RelationType,
        mut positives: Vec<Edge>,
        held_out_fraction: f64,
        sampler: &NegativeSampler,
        rng: &mut R,
    ) -> Result<Self> {
        if !(0.0..0.5).contains(&held_out_fraction) {
            return Err(Error::Configuration(format!(
                "held_out_fraction must be in [0, 0.5), got {held_out_fraction}"
            )));
        }

        let total = positives.len();
        let n_held = (held_out_fraction * total as f64).floor() as usize;
        positives.shuffle(rng);

        let train = positives.split_off(2 * n_held);
        let test = positives.split_off(n_held);
        let val = positives;

        let val_negatives = sampler.sample_held_out(rng, val.len())?;
        let test_negatives = sampler.sample_held_out(rng, test.len())?;

        tracing::debug!(
            relation = %relation,
            train = train.len(),
            val = val.len(),
            test = test.len(),
            "split relation edges"
        );

        Ok(Self {
            relation,
            train,
            val,
            test,
            val_negatives,
            test_negatives,
        })
    }

    /// Total positive edges.
    pub fn total(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    /// Validation plus test positives.
    pub fn held_out(&self) -> impl Iterator<Item = &Edge> {
        self.val.iter().chain(self.test.iter())
    }
}

//! Multi-relational minibatch iterator.
//!
//! The iterator owns one *slot* per entry of the relation selection. The
//! selection is a multiset: listing a relation twice creates two slots with
//! independent splits that both train the same relation's parameters.
//!
//! ```text
//! selection   [(0,0,0), (1,1,3), (1,1,3)]
//!                 |        |        |
//! slots         slot 0   slot 1   slot 2     each: EdgeSplit + cursor
//!                 \________|________/
//!                          |
//!          round-robin over slots with edges left
//!                          |
//!     Minibatch { relation, positives[..batch_size], negatives }
//! ```
//!
//! At construction every selected relation is split and its held-out
//! negatives are drawn. The union of all held-out positives is removed from
//! the adjacency matrices handed to the encoder, so no slot leaks validation
//! or test edges into message passing.
//!
//! # Epochs
//!
//! [`shuffle`](EdgeMinibatchIterator::shuffle) starts an epoch: it permutes
//! the slot visit order and each slot's training edges and rewinds the
//! cursors. Splits are never regenerated. [`end`](EdgeMinibatchIterator::end)
//! turns true once every slot's training edges are consumed.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::catalog::RelationType;
use crate::error::{Error, Result};
use crate::graph::GraphData;
use crate::sampling::{NegativeSampler, NegativeStrategy};
use crate::sparse::{Edge, SparseMatrix};
use crate::split::EdgeSplit;

/// Iterator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IteratorConfig {
    /// Maximum positives per minibatch.
    pub batch_size: usize,
    /// Fraction of each relation's edges for validation, and again for test.
    pub held_out_fraction: f64,
    /// Training negatives per positive.
    pub neg_sample_size: usize,
    /// Draws allowed per negative before giving up.
    pub max_sampling_attempts: usize,
    /// How training negatives are drawn.
    pub negative_strategy: NegativeStrategy,
    /// Seed for splits, shuffles and negatives.
    pub seed: u64,
}

impl Default for IteratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 512,
            held_out_fraction: 0.1,
            neg_sample_size: 1,
            max_sampling_attempts: 1000,
            negative_strategy: NegativeStrategy::Uniform,
            seed: 0,
        }
    }
}

impl IteratorConfig {
    /// Set batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the held-out fraction.
    pub fn with_held_out_fraction(mut self, fraction: f64) -> Self {
        self.held_out_fraction = fraction;
        self
    }

    /// Set negatives per positive.
    pub fn with_neg_sample_size(mut self, n: usize) -> Self {
        self.neg_sample_size = n;
        self
    }

    /// Set the per-negative attempt cap.
    pub fn with_max_sampling_attempts(mut self, n: usize) -> Self {
        self.max_sampling_attempts = n;
        self
    }

    /// Set the training negative strategy.
    pub fn with_negative_strategy(mut self, strategy: NegativeStrategy) -> Self {
        self.negative_strategy = strategy;
        self
    }

    /// Set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Reject values that make iteration meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Configuration("batch_size must be positive".into()));
        }
        if self.neg_sample_size == 0 {
            return Err(Error::Configuration(
                "neg_sample_size must be positive".into(),
            ));
        }
        if self.max_sampling_attempts == 0 {
            return Err(Error::Configuration(
                "max_sampling_attempts must be positive".into(),
            ));
        }
        if !(0.0..0.5).contains(&self.held_out_fraction) {
            return Err(Error::Configuration(format!(
                "held_out_fraction must be in [0, 0.5), got {}",
                self.held_out_fraction
            )));
        }
        Ok(())
    }
}

/// One entry of the relation selection with its split and epoch cursor.
#[derive(Debug, Clone)]
pub struct RelationSlot {
    relation: RelationType,
    relation_index: usize,
    split: EdgeSplit,
    sampler: NegativeSampler,
    train_order: Vec<Edge>,
    cursor: usize,
}

impl RelationSlot {
    /// Relation trained by this slot.
    pub fn relation(&self) -> RelationType {
        self.relation
    }

    /// Catalog index of the relation.
    pub fn relation_index(&self) -> usize {
        self.relation_index
    }

    /// Train/val/test partition.
    pub fn split(&self) -> &EdgeSplit {
        &self.split
    }

    /// Sampler holding the relation's original positives.
    pub fn sampler(&self) -> &NegativeSampler {
        &self.sampler
    }

    /// Training edges not yet emitted this epoch.
    pub fn remaining(&self) -> usize {
        self.train_order.len() - self.cursor
    }

    /// Batches per epoch at the given batch size.
    pub fn num_batches(&self, batch_size: usize) -> usize {
        self.train_order.len().div_ceil(batch_size)
    }
}

/// Positive and negative edges of one relation for one training step.
#[derive(Debug, Clone)]
pub struct Minibatch {
    /// Slot that produced the batch.
    pub slot: usize,
    /// Relation of every edge in the batch.
    pub relation: RelationType,
    /// Catalog index of `relation`.
    pub relation_index: usize,
    /// Positive edges, at most `batch_size`.
    pub positives: Vec<Edge>,
    /// `neg_sample_size` negatives per positive, positive-major.
    pub negatives: Vec<Edge>,
}

impl Minibatch {
    /// Number of positives.
    pub fn len(&self) -> usize {
        self.positives.len()
    }

    /// Whether the batch has no positives.
    pub fn is_empty(&self) -> bool {
        self.positives.is_empty()
    }
}

/// Schedules training batches across relation slots.
#[derive(Debug, Clone)]
pub struct EdgeMinibatchIterator {
    config: IteratorConfig,
    slots: Vec<RelationSlot>,
    order: Vec<usize>,
    turn: usize,
    epoch: usize,
    train_adjacency: BTreeMap<RelationType, SparseMatrix>,
    rng: XorShiftRng,
}

impl EdgeMinibatchIterator {
    /// Split every selected relation and prepare the encoder's adjacency.
    ///
    /// Fails with [`Error::EmptyRelation`] if any selected relation has no
    /// positive edges, before any sampling happens.
    pub fn new(graph: &GraphData, selection: &[RelationType], config: IteratorConfig) -> Result<Self> {
        config.validate()?;
        if selection.is_empty() {
            return Err(Error::Configuration("relation selection is empty".into()));
        }

        let catalog = graph.catalog();
        let mut positives = Vec::with_capacity(selection.len());
        for rel in selection {
            let adj = graph.adjacency(rel)?;
            let edges = adj.positive_edges(rel.is_homogeneous());
            if edges.is_empty() {
                return Err(Error::EmptyRelation {
                    relation: *rel,
                    rows: adj.rows(),
                    cols: adj.cols(),
                });
            }
            positives.push(edges);
        }

        let degrees = match config.negative_strategy {
            NegativeStrategy::DegreeWeighted { .. } => Some(graph.degree_table()),
            NegativeStrategy::Uniform => None,
        };

        let mut rng = XorShiftRng::seed_from_u64(config.seed);
        let mut slots = Vec::with_capacity(selection.len());
        for (rel, edges) in selection.iter().zip(positives) {
            let relation_index = catalog
                .relation_index(rel)
                .ok_or(Error::UnknownRelation(*rel))?;
            let sampler = NegativeSampler::new(
                *rel,
                graph.adjacency(rel)?,
                config.negative_strategy,
                degrees.as_ref(),
                config.max_sampling_attempts,
            )?;
            let split = EdgeSplit::new(*rel, edges, config.held_out_fraction, &sampler, &mut rng)?;
            slots.push(RelationSlot {
                relation: *rel,
                relation_index,
                train_order: split.train.clone(),
                split,
                sampler,
                cursor: 0,
            });
        }

        let mut held_out: BTreeMap<RelationType, HashSet<Edge>> = BTreeMap::new();
        for slot in &slots {
            held_out
                .entry(slot.relation)
                .or_default()
                .extend(slot.split.held_out().copied());
        }

        let mut train_adjacency = BTreeMap::new();
        for (rel, adj) in graph.adjacency_map() {
            let mut adj = if rel.is_homogeneous() {
                adj.without_diagonal()
            } else {
                adj.clone()
            };
            if let Some(removed) = held_out.get(rel) {
                let removed: Vec<Edge> = removed.iter().copied().collect();
                adj = adj.remove_edges(&removed);
            }
            train_adjacency.insert(*rel, adj);
        }

        let order = (0..slots.len()).collect();
        let it = Self {
            config,
            slots,
            order,
            turn: 0,
            epoch: 0,
            train_adjacency,
            rng,
        };
        tracing::info!(
            slots = it.slots.len(),
            batches_per_epoch = it.batches_per_epoch(),
            "minibatch iterator ready"
        );
        Ok(it)
    }

    /// Iterator configuration.
    pub fn config(&self) -> &IteratorConfig {
        &self.config
    }

    /// Relation slots in selection order.
    pub fn slots(&self) -> &[RelationSlot] {
        &self.slots
    }

    /// Training-time adjacency for every catalog relation: held-out
    /// positives and same-type self-loops removed.
    pub fn train_adjacency(&self) -> &BTreeMap<RelationType, SparseMatrix> {
        &self.train_adjacency
    }

    /// Batches in one full epoch.
    pub fn batches_per_epoch(&self) -> usize {
        self.slots
            .iter()
            .map(|s| s.num_batches(self.config.batch_size))
            .sum()
    }

    /// Number of times [`shuffle`](Self::shuffle) has been called.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Start a new epoch with fresh slot and edge orders.
    pub fn shuffle(&mut self) {
        self.order.shuffle(&mut self.rng);
        for slot in &mut self.slots {
            slot.train_order.shuffle(&mut self.rng);
            slot.cursor = 0;
        }
        self.turn = 0;
        self.epoch += 1;
    }

    /// Whether every slot's training edges have been emitted this epoch.
    pub fn end(&self) -> bool {
        self.slots.iter().all(|s| s.remaining() == 0)
    }

    /// Next batch, cycling over slots that still have training edges.
    ///
    /// Returns `Ok(None)` once [`end`](Self::end) is true. The final batch of
    /// a slot may be shorter than `batch_size`.
    pub fn next_minibatch(&mut self) -> Result<Option<Minibatch>> {
        for _ in 0..self.order.len() {
            let slot_idx = self.order[self.turn];
            self.turn = (self.turn + 1) % self.order.len();

            let slot = &mut self.slots[slot_idx];
            if slot.remaining() == 0 {
                continue;
            }
            let start = slot.cursor;
            let stop = (start + self.config.batch_size).min(slot.train_order.len());
            let positives = slot.train_order[start..stop].to_vec();
            slot.cursor = stop;

            let negatives = slot.sampler.sample_for_batch(
                &mut self.rng,
                &positives,
                self.config.neg_sample_size,
            )?;
            tracing::trace!(
                slot = slot_idx,
                relation = %slot.relation,
                size = positives.len(),
                "minibatch"
            );
            return Ok(Some(Minibatch {
                slot: slot_idx,
                relation: slot.relation,
                relation_index: slot.relation_index,
                positives,
                negatives,
            }));
        }
        Ok(None)
    }
}

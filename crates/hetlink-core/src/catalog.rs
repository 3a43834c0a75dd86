//! Relation catalog for multi-relational graphs.
//!
//! A heterogeneous graph has several node types (drugs, genes, ...) and,
//! between any two node types, zero or more relation types. A relation type
//! is identified by the triple `(row type, column type, index)`, where
//! `index` counts the relations between that ordered pair of node types.
//!
//! ```text
//!   (0, 0, 0)  gene  -- interacts  --> gene
//!   (0, 1, 0)  gene  -- targeted   --> drug
//!   (1, 0, 0)  drug  -- targets    --> gene
//!   (1, 1, k)  drug  -- side effect k --> drug
//! ```
//!
//! The catalog is pure data: node counts, relation counts per node-type
//! pair, and which decoder scores each relation.
//!
//! # Example
//!
//! ```rust
//! use hetlink_core::{DecoderKind, RelationCatalog, RelationType};
//!
//! let mut catalog = RelationCatalog::new();
//! catalog.add_node_type(0, 100).unwrap();
//! catalog.add_node_type(1, 40).unwrap();
//! catalog.add_relations(0, 1, 2).unwrap();
//! catalog.set_pair_decoder(0, 1, DecoderKind::DistMult);
//!
//! assert_eq!(catalog.num_relation_types(), 2);
//! assert_eq!(catalog.decoder_for(&RelationType::new(0, 1, 1)), DecoderKind::DistMult);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

/// Integer identifier of a node type.
pub type NodeTypeId = usize;

/// One relation type: `(row node type, column node type, relation index)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RelationType {
    /// Node type indexing the adjacency rows.
    pub row: NodeTypeId,
    /// Node type indexing the adjacency columns.
    pub col: NodeTypeId,
    /// Index among the relations between `row` and `col`.
    pub index: usize,
}

impl RelationType {
    /// Create a new relation type.
    pub fn new(row: NodeTypeId, col: NodeTypeId, index: usize) -> Self {
        Self { row, col, index }
    }

    /// The `(row, col)` node-type pair.
    pub fn node_pair(&self) -> (NodeTypeId, NodeTypeId) {
        (self.row, self.col)
    }

    /// Whether rows and columns index the same node type.
    ///
    /// Self-loops are not valid edges for such relations.
    pub fn is_homogeneous(&self) -> bool {
        self.row == self.col
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:02}, {:02}, {:02}]", self.row, self.col, self.index)
    }
}

impl From<(NodeTypeId, NodeTypeId, usize)> for RelationType {
    fn from((row, col, index): (NodeTypeId, NodeTypeId, usize)) -> Self {
        Self::new(row, col, index)
    }
}

/// Decoder used to score a relation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderKind {
    /// `u^T R v` with a full relation matrix `R`.
    #[default]
    Bilinear,
    /// `u^T L R^T v`, a rank-limited bilinear form.
    LowRankBilinear {
        /// Rank of the factorisation.
        rank: usize,
    },
    /// `u^T D_k R D_k v`: global interaction `R` shared across the node-type
    /// pair, diagonal local variation `D_k` per relation.
    Dedicom,
    /// `u^T diag(r) v`.
    #[serde(rename = "distmult", alias = "dist_mult")]
    DistMult,
    /// `u^T v`, no relation parameters.
    #[serde(rename = "innerproduct", alias = "inner_product")]
    InnerProduct,
}

impl fmt::Display for DecoderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bilinear => write!(f, "bilinear"),
            Self::LowRankBilinear { rank } => write!(f, "low_rank_bilinear(rank={rank})"),
            Self::Dedicom => write!(f, "dedicom"),
            Self::DistMult => write!(f, "distmult"),
            Self::InnerProduct => write!(f, "innerproduct"),
        }
    }
}

/// Enumerates node types, relation types, and their decoders.
#[derive(Debug, Clone, Default)]
pub struct RelationCatalog {
    node_counts: BTreeMap<NodeTypeId, usize>,
    relation_counts: BTreeMap<(NodeTypeId, NodeTypeId), usize>,
    pair_decoders: BTreeMap<(NodeTypeId, NodeTypeId), DecoderKind>,
    relation_decoders: BTreeMap<RelationType, DecoderKind>,
}

impl RelationCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type with its node count.
    pub fn add_node_type(&mut self, node_type: NodeTypeId, count: usize) -> Result<()> {
        if count == 0 {
            return Err(Error::DataIntegrity(format!(
                "node type {node_type} has no nodes"
            )));
        }
        match self.node_counts.get(&node_type) {
            Some(&existing) if existing != count => Err(Error::DataIntegrity(format!(
                "node type {node_type} registered twice ({existing} vs {count} nodes)"
            ))),
            Some(_) => Ok(()),
            None => {
                self.node_counts.insert(node_type, count);
                Ok(())
            }
        }
    }

    /// Register `count` relation types between `row` and `col`.
    ///
    /// Calling this twice for the same pair adds to the existing count.
    pub fn add_relations(&mut self, row: NodeTypeId, col: NodeTypeId, count: usize) -> Result<()> {
        for t in [row, col] {
            if !self.node_counts.contains_key(&t) {
                return Err(Error::UnknownNodeType(t));
            }
        }
        *self.relation_counts.entry((row, col)).or_insert(0) += count;
        Ok(())
    }

    /// Choose the decoder for every relation between `row` and `col`.
    pub fn set_pair_decoder(&mut self, row: NodeTypeId, col: NodeTypeId, decoder: DecoderKind) {
        self.pair_decoders.insert((row, col), decoder);
    }

    /// Choose the decoder for a single relation type (overrides the pair).
    pub fn set_decoder(&mut self, relation: RelationType, decoder: DecoderKind) {
        self.relation_decoders.insert(relation, decoder);
    }

    /// Decoder for a relation type: relation override, then pair, then bilinear.
    pub fn decoder_for(&self, relation: &RelationType) -> DecoderKind {
        self.relation_decoders
            .get(relation)
            .or_else(|| self.pair_decoders.get(&relation.node_pair()))
            .copied()
            .unwrap_or_default()
    }

    /// Node count of a node type.
    pub fn node_count(&self, node_type: NodeTypeId) -> Option<usize> {
        self.node_counts.get(&node_type).copied()
    }

    /// Node types in ascending order.
    pub fn node_types(&self) -> impl Iterator<Item = NodeTypeId> + '_ {
        self.node_counts.keys().copied()
    }

    /// Number of node types.
    pub fn num_node_types(&self) -> usize {
        self.node_counts.len()
    }

    /// Number of relations between an ordered pair of node types.
    pub fn relations_between(&self, row: NodeTypeId, col: NodeTypeId) -> usize {
        self.relation_counts.get(&(row, col)).copied().unwrap_or(0)
    }

    /// `(row, col, count)` for every node-type pair with relations.
    pub fn node_pairs(&self) -> impl Iterator<Item = (NodeTypeId, NodeTypeId, usize)> + '_ {
        self.relation_counts
            .iter()
            .map(|(&(row, col), &count)| (row, col, count))
    }

    /// All relation types, ordered by `(row, col, index)`.
    ///
    /// The position of a relation in this list is its catalog index.
    pub fn relation_types(&self) -> Vec<RelationType> {
        self.relation_counts
            .iter()
            .flat_map(|(&(row, col), &count)| (0..count).map(move |k| RelationType::new(row, col, k)))
            .collect()
    }

    /// Total number of relation types.
    pub fn num_relation_types(&self) -> usize {
        self.relation_counts.values().sum()
    }

    /// Whether a relation type is registered.
    pub fn contains(&self, relation: &RelationType) -> bool {
        relation.index < self.relations_between(relation.row, relation.col)
    }

    /// Position of a relation in [`relation_types`](Self::relation_types).
    pub fn relation_index(&self, relation: &RelationType) -> Option<usize> {
        if !self.contains(relation) {
            return None;
        }
        let before: usize = self
            .relation_counts
            .range(..(relation.row, relation.col))
            .map(|(_, &c)| c)
            .sum();
        Some(before + relation.index)
    }

    /// Relation type at a catalog index.
    pub fn relation_at(&self, idx: usize) -> Option<RelationType> {
        let mut remaining = idx;
        for (&(row, col), &count) in &self.relation_counts {
            if remaining < count {
                return Some(RelationType::new(row, col, remaining));
            }
            remaining -= count;
        }
        None
    }
}

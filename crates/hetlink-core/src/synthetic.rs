//! Synthetic heterogeneous graphs with planted communities.
//!
//! Node `i` of every type belongs to community `i % communities`. Relation
//! `k` between two node types links `u` to `v` with probability `p_in` when
//! `(community(u) + k) % communities == community(v)` and `p_out` otherwise,
//! so relations between the same pair of node types have distinct, learnable
//! structure. Same-type relations are symmetric and loop-free.

use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use std::collections::BTreeMap;

use crate::catalog::{DecoderKind, NodeTypeId, RelationCatalog, RelationType};
use crate::error::{Error, Result};
use crate::graph::GraphData;
use crate::sparse::{Edge, SparseMatrix};

/// Generator settings.
#[derive(Debug, Clone)]
pub struct SyntheticGraph {
    node_counts: Vec<usize>,
    relations: Vec<(NodeTypeId, NodeTypeId, usize)>,
    pair_decoders: Vec<(NodeTypeId, NodeTypeId, DecoderKind)>,
    communities: usize,
    p_in: f64,
    p_out: f64,
    seed: u64,
}

impl Default for SyntheticGraph {
    /// Two node types (60 and 40 nodes) with four node-type pairs and five
    /// relations, the same-type pair of type 1 decoded with dedicom.
    fn default() -> Self {
        Self {
            node_counts: vec![60, 40],
            relations: vec![(0, 0, 1), (0, 1, 1), (1, 0, 1), (1, 1, 2)],
            pair_decoders: vec![(1, 1, DecoderKind::Dedicom)],
            communities: 3,
            p_in: 0.3,
            p_out: 0.02,
            seed: 0,
        }
    }
}

impl SyntheticGraph {
    /// Default generator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Node counts; node type ids are the positions.
    pub fn with_node_types(mut self, counts: Vec<usize>) -> Self {
        self.node_counts = counts;
        self
    }

    /// `(row, col, count)` relation groups.
    pub fn with_relations(mut self, relations: Vec<(NodeTypeId, NodeTypeId, usize)>) -> Self {
        self.relations = relations;
        self
    }

    /// Decoder for a node-type pair.
    pub fn with_pair_decoder(mut self, row: NodeTypeId, col: NodeTypeId, decoder: DecoderKind) -> Self {
        self.pair_decoders.retain(|&(r, c, _)| (r, c) != (row, col));
        self.pair_decoders.push((row, col, decoder));
        self
    }

    /// Number of planted communities.
    pub fn with_communities(mut self, communities: usize) -> Self {
        self.communities = communities;
        self
    }

    /// Within- and between-community edge probabilities.
    pub fn with_probabilities(mut self, p_in: f64, p_out: f64) -> Self {
        self.p_in = p_in;
        self.p_out = p_out;
        self
    }

    /// RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sample a graph. Every relation gets at least one edge.
    pub fn generate(&self) -> Result<GraphData> {
        if self.communities == 0 {
            return Err(Error::Configuration("communities must be positive".into()));
        }
        for p in [self.p_in, self.p_out] {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::Configuration(format!(
                    "edge probability {p} outside [0, 1]"
                )));
            }
        }
        if let Some(n) = self.node_counts.iter().find(|&&n| n < 2) {
            return Err(Error::Configuration(format!(
                "synthetic node types need at least 2 nodes, got {n}"
            )));
        }

        let mut catalog = RelationCatalog::new();
        for (id, &count) in self.node_counts.iter().enumerate() {
            catalog.add_node_type(id, count)?;
        }
        for &(row, col, count) in &self.relations {
            catalog.add_relations(row, col, count)?;
        }
        for &(row, col, decoder) in &self.pair_decoders {
            catalog.set_pair_decoder(row, col, decoder);
        }

        let mut rng = XorShiftRng::seed_from_u64(self.seed);
        let mut adjacency = BTreeMap::new();
        for rel in catalog.relation_types() {
            let rows = self.node_counts[rel.row];
            let cols = self.node_counts[rel.col];
            let edges = self.sample_relation(&mut rng, rel, rows, cols);
            adjacency.insert(rel, SparseMatrix::from_edges(rows, cols, &edges)?);
        }

        tracing::debug!(
            node_types = self.node_counts.len(),
            relations = adjacency.len(),
            "generated synthetic graph"
        );
        GraphData::with_identity_features(catalog, adjacency)
    }

    fn sample_relation(
        &self,
        rng: &mut XorShiftRng,
        rel: RelationType,
        rows: usize,
        cols: usize,
    ) -> Vec<Edge> {
        let c = self.communities;
        let linked = |u: usize, v: usize| (u % c + rel.index) % c == v % c;
        let mut edges = Vec::new();

        if rel.is_homogeneous() {
            for u in 0..rows {
                for v in (u + 1)..cols {
                    let p = if linked(u, v) || linked(v, u) { self.p_in } else { self.p_out };
                    if rng.random_bool(p) {
                        edges.push((u, v));
                        edges.push((v, u));
                    }
                }
            }
            if edges.is_empty() {
                edges.extend([(0, 1), (1, 0)]);
            }
        } else {
            for u in 0..rows {
                for v in 0..cols {
                    let p = if linked(u, v) { self.p_in } else { self.p_out };
                    if rng.random_bool(p) {
                        edges.push((u, v));
                    }
                }
            }
            if edges.is_empty() {
                edges.push((0, 0));
            }
        }
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_generates_all_relations() {
        let g = SyntheticGraph::default().generate().unwrap();
        assert_eq!(g.catalog().num_relation_types(), 5);
        for rel in g.catalog().relation_types() {
            assert!(!g.positive_edges(&rel).unwrap().is_empty(), "{rel} empty");
        }
        assert_eq!(
            g.catalog().decoder_for(&RelationType::new(1, 1, 1)),
            DecoderKind::Dedicom
        );
    }

    #[test]
    fn test_same_type_symmetric_without_loops() {
        let g = SyntheticGraph::default().generate().unwrap();
        let adj = g.adjacency(&RelationType::new(0, 0, 0)).unwrap();
        for (r, c, _) in adj.iter() {
            assert_ne!(r, c);
            assert!(adj.contains(c, r));
        }
    }

    #[test]
    fn test_seed_is_deterministic() {
        let a = SyntheticGraph::default().with_seed(5).generate().unwrap();
        let b = SyntheticGraph::default().with_seed(5).generate().unwrap();
        assert_eq!(a.adjacency_map(), b.adjacency_map());
    }

    #[test]
    fn test_zero_probability_still_has_an_edge() {
        let g = SyntheticGraph::default()
            .with_probabilities(0.0, 0.0)
            .generate()
            .unwrap();
        assert_eq!(g.positive_edges(&RelationType::new(0, 1, 0)).unwrap(), vec![(0, 0)]);
        assert_eq!(g.stats().relations[0].edges, 2);
    }

    #[test]
    fn test_invalid_settings() {
        assert!(SyntheticGraph::default().with_communities(0).generate().is_err());
        assert!(SyntheticGraph::default()
            .with_probabilities(1.5, 0.0)
            .generate()
            .is_err());
        assert!(SyntheticGraph::default()
            .with_node_types(vec![1, 5])
            .generate()
            .is_err());
    }
}

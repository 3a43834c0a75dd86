//! Per-relation degree counts.
//!
//! Computed once from the original (pre-split) adjacency matrices and used to
//! weight negative sampling. Self-loops on same-type relations are not
//! counted.

use std::collections::BTreeMap;

use crate::catalog::RelationType;
use crate::graph::GraphData;

/// Which side of an adjacency matrix a degree refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// Out-degree of row nodes.
    Row,
    /// In-degree of column nodes.
    Col,
}

#[derive(Debug, Clone)]
struct RelationDegrees {
    rows: Vec<usize>,
    cols: Vec<usize>,
}

/// Immutable table of row and column degrees per relation type.
#[derive(Debug, Clone, Default)]
pub struct DegreeTable {
    degrees: BTreeMap<RelationType, RelationDegrees>,
}

impl DegreeTable {
    /// Count degrees for every relation in the graph.
    pub fn from_graph(graph: &GraphData) -> Self {
        let degrees = graph
            .adjacency_map()
            .iter()
            .map(|(rel, adj)| {
                let adj = if rel.is_homogeneous() {
                    adj.without_diagonal()
                } else {
                    adj.clone()
                };
                (
                    *rel,
                    RelationDegrees {
                        rows: adj.row_nnz(),
                        cols: adj.col_nnz(),
                    },
                )
            })
            .collect();
        Self { degrees }
    }

    /// Degrees along one axis of a relation.
    pub fn degrees(&self, relation: &RelationType, axis: Axis) -> Option<&[usize]> {
        self.degrees.get(relation).map(|d| match axis {
            Axis::Row => d.rows.as_slice(),
            Axis::Col => d.cols.as_slice(),
        })
    }

    /// Unnormalised sampling weights `degree^distortion`.
    ///
    /// A distortion of `0.75` is the classic unigram smoothing used for
    /// word2vec-style negatives.
    pub fn sampling_weights(
        &self,
        relation: &RelationType,
        axis: Axis,
        distortion: f64,
    ) -> Option<Vec<f64>> {
        self.degrees(relation, axis).map(|d| {
            d.iter()
                .map(|&deg| if deg == 0 { 0.0 } else { (deg as f64).powf(distortion) })
                .collect()
        })
    }

    /// Relations covered by the table.
    pub fn relations(&self) -> impl Iterator<Item = &RelationType> {
        self.degrees.keys()
    }
}

//! Device-resident graph: features and message-passing channels.
//!
//! Every relation `(row, col, k)` contributes a *forward* channel that sends
//! messages from `col` nodes to `row` nodes through the normalised training
//! adjacency, and, with [`Propagation::Bidirectional`], a *reverse* channel
//! from `row` nodes to `col` nodes through the normalised transpose.
//!
//! ```text
//!   relation (1, 0, 0): drug x gene
//!
//!   forward  target=drug  source=gene   A_norm   @ (X_gene W)
//!   reverse  target=gene  source=drug   A^T_norm @ (X_drug W')
//! ```
//!
//! Same-type relations are normalised with self-loops added.

use candle_core::Device;
use hetlink_core::{GraphData, NodeTypeId, RelationType, SparseMatrix};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::sparse::SparseTensor;

/// Which directions messages travel along each relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagation {
    /// Column nodes to row nodes only.
    Forward,
    /// Both directions, each with its own transform.
    #[default]
    Bidirectional,
}

/// One directed message-passing path.
#[derive(Debug, Clone)]
pub struct Channel {
    /// Relation the channel derives from.
    pub relation: RelationType,
    /// Whether messages flow row -> col.
    pub reverse: bool,
    /// Node type receiving messages.
    pub target: NodeTypeId,
    /// Node type sending messages.
    pub source: NodeTypeId,
    /// Normalised `(target count x source count)` adjacency.
    pub adjacency: SparseTensor,
}

impl Channel {
    /// Parameter name for a per-relation transform.
    pub fn relation_key(&self) -> String {
        let RelationType { row, col, index } = self.relation;
        let suffix = if self.reverse { "_rev" } else { "" };
        format!("rel_{row}_{col}_{index}{suffix}")
    }

    /// Parameter name for a transform shared by the node-type pair.
    pub fn pair_key(&self) -> String {
        let RelationType { row, col, .. } = self.relation;
        let suffix = if self.reverse { "_rev" } else { "" };
        format!("pair_{row}_{col}{suffix}")
    }
}

/// Message-passing channels of a graph.
#[derive(Debug, Clone)]
pub struct PropagationGraph {
    channels: Vec<Channel>,
    node_counts: BTreeMap<NodeTypeId, usize>,
}

impl PropagationGraph {
    /// Normalise and upload the training adjacency.
    pub fn new(
        node_counts: BTreeMap<NodeTypeId, usize>,
        adjacency: &BTreeMap<RelationType, SparseMatrix>,
        propagation: Propagation,
        device: &Device,
    ) -> Result<Self> {
        let mut channels = Vec::new();
        for (rel, adj) in adjacency {
            for t in [rel.row, rel.col] {
                if !node_counts.contains_key(&t) {
                    return Err(Error::MissingNodeType(t));
                }
            }
            let self_loops = rel.is_homogeneous();
            channels.push(Channel {
                relation: *rel,
                reverse: false,
                target: rel.row,
                source: rel.col,
                adjacency: SparseTensor::from_matrix(&adj.normalized(self_loops)?, device)?,
            });
            if propagation == Propagation::Bidirectional {
                channels.push(Channel {
                    relation: *rel,
                    reverse: true,
                    target: rel.col,
                    source: rel.row,
                    adjacency: SparseTensor::from_matrix(
                        &adj.transpose().normalized(self_loops)?,
                        device,
                    )?,
                });
            }
        }
        Ok(Self {
            channels,
            node_counts,
        })
    }

    /// Every channel.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Channels delivering messages to `target`.
    pub fn channels_into(&self, target: NodeTypeId) -> impl Iterator<Item = &Channel> {
        self.channels.iter().filter(move |c| c.target == target)
    }

    /// Node count per type.
    pub fn node_counts(&self) -> &BTreeMap<NodeTypeId, usize> {
        &self.node_counts
    }
}

/// Features and propagation channels on one device.
#[derive(Debug, Clone)]
pub struct GraphTensors {
    features: BTreeMap<NodeTypeId, SparseTensor>,
    propagation: PropagationGraph,
}

impl GraphTensors {
    /// Upload features from `graph` and channels from `train_adjacency`.
    ///
    /// `train_adjacency` is the held-out-free adjacency produced by the
    /// minibatch iterator, never the original matrices.
    pub fn new(
        graph: &GraphData,
        train_adjacency: &BTreeMap<RelationType, SparseMatrix>,
        propagation: Propagation,
        device: &Device,
    ) -> Result<Self> {
        let catalog = graph.catalog();
        let node_counts: BTreeMap<NodeTypeId, usize> = catalog
            .node_types()
            .filter_map(|t| catalog.node_count(t).map(|n| (t, n)))
            .collect();

        for (rel, adj) in train_adjacency {
            let expected = (node_counts.get(&rel.row), node_counts.get(&rel.col));
            if expected != (Some(&adj.rows()), Some(&adj.cols())) {
                return Err(hetlink_core::Error::DataIntegrity(format!(
                    "training adjacency for {rel} is {}x{}, catalog disagrees",
                    adj.rows(),
                    adj.cols()
                ))
                .into());
            }
        }

        let mut features = BTreeMap::new();
        for (t, m) in graph.features_map() {
            features.insert(*t, SparseTensor::from_matrix(m, device)?);
        }

        let propagation = PropagationGraph::new(node_counts, train_adjacency, propagation, device)?;
        tracing::debug!(
            channels = propagation.channels().len(),
            node_types = features.len(),
            "uploaded graph tensors"
        );
        Ok(Self {
            features,
            propagation,
        })
    }

    /// Sparse input features of a node type.
    pub fn features(&self, node_type: NodeTypeId) -> Result<&SparseTensor> {
        self.features
            .get(&node_type)
            .ok_or(Error::MissingNodeType(node_type))
    }

    /// Input feature width per node type.
    pub fn feature_dims(&self) -> BTreeMap<NodeTypeId, usize> {
        self.features.iter().map(|(t, f)| (*t, f.cols())).collect()
    }

    /// Message-passing channels.
    pub fn propagation(&self) -> &PropagationGraph {
        &self.propagation
    }

    /// Node types in ascending order.
    pub fn node_types(&self) -> impl Iterator<Item = NodeTypeId> + '_ {
        self.propagation.node_counts.keys().copied()
    }

    /// Node count of a type.
    pub fn node_count(&self, node_type: NodeTypeId) -> Result<usize> {
        self.propagation
            .node_counts
            .get(&node_type)
            .copied()
            .ok_or(Error::MissingNodeType(node_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hetlink_core::RelationCatalog;

    fn graph() -> GraphData {
        let mut c = RelationCatalog::new();
        c.add_node_type(0, 3).unwrap();
        c.add_node_type(1, 2).unwrap();
        c.add_relations(0, 0, 1).unwrap();
        c.add_relations(0, 1, 1).unwrap();
        let mut adj = BTreeMap::new();
        adj.insert(
            RelationType::new(0, 0, 0),
            SparseMatrix::from_edges(3, 3, &[(0, 1), (1, 0)]).unwrap(),
        );
        adj.insert(
            RelationType::new(0, 1, 0),
            SparseMatrix::from_edges(3, 2, &[(0, 1), (2, 1)]).unwrap(),
        );
        GraphData::with_identity_features(c, adj).unwrap()
    }

    #[test]
    fn test_bidirectional_channels() {
        let g = graph();
        let t = GraphTensors::new(&g, g.adjacency_map(), Propagation::Bidirectional, &Device::Cpu)
            .unwrap();
        let channels = t.propagation().channels();
        assert_eq!(channels.len(), 4);
        assert_eq!(t.propagation().channels_into(1).count(), 1);
        let rev = t.propagation().channels_into(1).next().unwrap();
        assert!(rev.reverse);
        assert_eq!((rev.adjacency.rows(), rev.adjacency.cols()), (2, 3));
        assert_eq!(rev.relation_key(), "rel_0_1_0_rev");
        assert_eq!(rev.pair_key(), "pair_0_1_rev");
    }

    #[test]
    fn test_forward_only() {
        let g = graph();
        let t = GraphTensors::new(&g, g.adjacency_map(), Propagation::Forward, &Device::Cpu)
            .unwrap();
        assert_eq!(t.propagation().channels().len(), 2);
        assert_eq!(t.propagation().channels_into(1).count(), 0);
    }

    #[test]
    fn test_self_loops_on_same_type() {
        let g = graph();
        let t = GraphTensors::new(&g, g.adjacency_map(), Propagation::Forward, &Device::Cpu)
            .unwrap();
        let homo = &t.propagation().channels()[0];
        // Two edges plus three self-loops.
        assert_eq!(homo.adjacency.nnz(), 5);
        assert_eq!(t.feature_dims()[&0], 3);
    }

    #[test]
    fn test_mismatched_adjacency() {
        let g = graph();
        let mut bad = g.adjacency_map().clone();
        bad.insert(RelationType::new(0, 1, 0), SparseMatrix::zeros(2, 2));
        assert!(GraphTensors::new(&g, &bad, Propagation::Forward, &Device::Cpu).is_err());
    }
}

//! Validated multi-relational graph data.
//!
//! [`GraphData`] bundles the [`RelationCatalog`] with one adjacency matrix per
//! relation type and one feature matrix per node type. Every shape is checked
//! against the catalog once, at construction, so downstream components can
//! index by [`RelationType`] without re-validating.
//!
//! # JSON exchange format
//!
//! ```json
//! {
//!   "node_types": [
//!     {"id": 0, "count": 3},
//!     {"id": 1, "count": 2, "features": {"dim": 4, "entries": [[0, 1, 1.0]]}}
//!   ],
//!   "relations": [
//!     {"row": 0, "col": 1, "index": 0, "edges": [[0, 1], [2, 0]]},
//!     {"row": 1, "col": 1, "index": 0, "decoder": "distmult", "edges": [[0, 1]]}
//!   ],
//!   "pair_decoders": [{"row": 0, "col": 1, "decoder": "dedicom"}]
//! }
//! ```
//!
//! Node types without `features` get identity (one-hot) features.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::catalog::{DecoderKind, NodeTypeId, RelationCatalog, RelationType};
use crate::degree::DegreeTable;
use crate::error::{Error, Result};
use crate::sparse::{Edge, SparseMatrix};

/// Adjacency and feature matrices checked against a catalog.
#[derive(Debug, Clone)]
pub struct GraphData {
    catalog: RelationCatalog,
    adjacency: BTreeMap<RelationType, SparseMatrix>,
    features: BTreeMap<NodeTypeId, SparseMatrix>,
}

impl GraphData {
    /// Validate and bundle graph matrices.
    ///
    /// Fails with [`Error::UnknownRelation`] / [`Error::UnknownNodeType`] for
    /// keys outside the catalog and [`Error::DataIntegrity`] for missing
    /// matrices or shapes that disagree with the node counts.
    pub fn new(
        catalog: RelationCatalog,
        adjacency: BTreeMap<RelationType, SparseMatrix>,
        features: BTreeMap<NodeTypeId, SparseMatrix>,
    ) -> Result<Self> {
        for rel in adjacency.keys() {
            if !catalog.contains(rel) {
                return Err(Error::UnknownRelation(*rel));
            }
        }
        for nt in features.keys() {
            if catalog.node_count(*nt).is_none() {
                return Err(Error::UnknownNodeType(*nt));
            }
        }

        for rel in catalog.relation_types() {
            let adj = adjacency.get(&rel).ok_or_else(|| {
                Error::DataIntegrity(format!("relation {rel} has no adjacency matrix"))
            })?;
            let rows = catalog
                .node_count(rel.row)
                .ok_or(Error::UnknownNodeType(rel.row))?;
            let cols = catalog
                .node_count(rel.col)
                .ok_or(Error::UnknownNodeType(rel.col))?;
            if adj.shape() != (rows, cols) {
                return Err(Error::DataIntegrity(format!(
                    "relation {rel}: adjacency is {}x{}, catalog expects {rows}x{cols}",
                    adj.rows(),
                    adj.cols()
                )));
            }
        }

        for nt in catalog.node_types() {
            let feat = features.get(&nt).ok_or_else(|| {
                Error::DataIntegrity(format!("node type {nt} has no feature matrix"))
            })?;
            let count = catalog.node_count(nt).unwrap_or(0);
            if feat.rows() != count {
                return Err(Error::DataIntegrity(format!(
                    "node type {nt}: feature matrix has {} rows, catalog expects {count}",
                    feat.rows()
                )));
            }
            if feat.cols() == 0 {
                return Err(Error::DataIntegrity(format!(
                    "node type {nt}: feature matrix has zero columns"
                )));
            }
        }

        Ok(Self {
            catalog,
            adjacency,
            features,
        })
    }

    /// Like [`new`](Self::new) with one-hot features for every node type.
    pub fn with_identity_features(
        catalog: RelationCatalog,
        adjacency: BTreeMap<RelationType, SparseMatrix>,
    ) -> Result<Self> {
        let features = catalog
            .node_types()
            .map(|nt| (nt, SparseMatrix::identity(catalog.node_count(nt).unwrap_or(0))))
            .collect();
        Self::new(catalog, adjacency, features)
    }

    /// The relation catalog.
    pub fn catalog(&self) -> &RelationCatalog {
        &self.catalog
    }

    /// Adjacency matrix of a relation.
    pub fn adjacency(&self, relation: &RelationType) -> Result<&SparseMatrix> {
        self.adjacency
            .get(relation)
            .ok_or(Error::UnknownRelation(*relation))
    }

    /// All adjacency matrices keyed by relation.
    pub fn adjacency_map(&self) -> &BTreeMap<RelationType, SparseMatrix> {
        &self.adjacency
    }

    /// Feature matrix of a node type.
    pub fn features(&self, node_type: NodeTypeId) -> Result<&SparseMatrix> {
        self.features
            .get(&node_type)
            .ok_or(Error::UnknownNodeType(node_type))
    }

    /// All feature matrices keyed by node type.
    pub fn features_map(&self) -> &BTreeMap<NodeTypeId, SparseMatrix> {
        &self.features
    }

    /// Positive edges of a relation (diagonal excluded for same-type relations).
    pub fn positive_edges(&self, relation: &RelationType) -> Result<Vec<Edge>> {
        Ok(self
            .adjacency(relation)?
            .positive_edges(relation.is_homogeneous()))
    }

    /// Per-relation degree counts.
    pub fn degree_table(&self) -> DegreeTable {
        DegreeTable::from_graph(self)
    }

    /// Summary statistics.
    pub fn stats(&self) -> GraphStats {
        let node_types = self
            .catalog
            .node_types()
            .map(|nt| NodeTypeStats {
                id: nt,
                count: self.catalog.node_count(nt).unwrap_or(0),
                feature_dim: self.features.get(&nt).map_or(0, SparseMatrix::cols),
            })
            .collect();
        let relations = self
            .adjacency
            .iter()
            .map(|(rel, adj)| {
                let edges = adj.positive_edges(rel.is_homogeneous()).len();
                RelationStats {
                    relation: *rel,
                    rows: adj.rows(),
                    cols: adj.cols(),
                    edges,
                    density: if adj.rows() * adj.cols() == 0 {
                        0.0
                    } else {
                        edges as f64 / (adj.rows() as f64 * adj.cols() as f64)
                    },
                    decoder: self.catalog.decoder_for(rel),
                }
            })
            .collect();
        GraphStats {
            node_types,
            relations,
        }
    }

    /// Parse the JSON exchange format.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: GraphFile = serde_json::from_str(json)?;
        file.into_graph()
    }

    /// Read the JSON exchange format from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Export to the JSON exchange format.
    ///
    /// Identity features are omitted. Every relation carries its resolved
    /// decoder.
    pub fn to_graph_file(&self) -> GraphFile {
        let node_types = self
            .catalog
            .node_types()
            .map(|nt| {
                let count = self.catalog.node_count(nt).unwrap_or(0);
                let features = self
                    .features
                    .get(&nt)
                    .filter(|f| **f != SparseMatrix::identity(count))
                    .map(|f| FeatureFile {
                        dim: f.cols(),
                        entries: f.iter().collect(),
                    });
                NodeTypeFile {
                    id: nt,
                    count,
                    features,
                }
            })
            .collect();
        let relations = self
            .adjacency
            .iter()
            .map(|(rel, adj)| RelationFile {
                row: rel.row,
                col: rel.col,
                index: rel.index,
                decoder: Some(self.catalog.decoder_for(rel)),
                edges: adj.positive_edges(false),
            })
            .collect();
        GraphFile {
            node_types,
            relations,
            pair_decoders: Vec::new(),
        }
    }
}

/// Per-node-type statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTypeStats {
    /// Node type id.
    pub id: NodeTypeId,
    /// Node count.
    pub count: usize,
    /// Feature columns.
    pub feature_dim: usize,
}

/// Per-relation statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationStats {
    /// Relation type.
    pub relation: RelationType,
    /// Adjacency rows.
    pub rows: usize,
    /// Adjacency columns.
    pub cols: usize,
    /// Positive edges (self-loops excluded on same-type relations).
    pub edges: usize,
    /// `edges / (rows * cols)`.
    pub density: f64,
    /// Decoder scoring this relation.
    pub decoder: DecoderKind,
}

/// Graph summary produced by [`GraphData::stats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    /// Node types.
    pub node_types: Vec<NodeTypeStats>,
    /// Relations.
    pub relations: Vec<RelationStats>,
}

impl GraphStats {
    /// Total positive edges across relations.
    pub fn total_edges(&self) -> usize {
        self.relations.iter().map(|r| r.edges).sum()
    }
}

/// Sparse features in the exchange format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureFile {
    /// Feature columns.
    pub dim: usize,
    /// `(row, col, value)` triplets.
    pub entries: Vec<(usize, usize, f32)>,
}

/// Node type in the exchange format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTypeFile {
    /// Node type id.
    pub id: NodeTypeId,
    /// Node count.
    pub count: usize,
    /// Optional features; identity when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<FeatureFile>,
}

/// Relation in the exchange format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationFile {
    /// Row node type.
    pub row: NodeTypeId,
    /// Column node type.
    pub col: NodeTypeId,
    /// Relation index within the node-type pair.
    pub index: usize,
    /// Decoder override for this relation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoder: Option<DecoderKind>,
    /// Positive edges.
    pub edges: Vec<Edge>,
}

/// Decoder choice for a node-type pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairDecoderFile {
    /// Row node type.
    pub row: NodeTypeId,
    /// Column node type.
    pub col: NodeTypeId,
    /// Decoder for every relation in the pair.
    pub decoder: DecoderKind,
}

/// Top-level JSON exchange document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphFile {
    /// Node types.
    pub node_types: Vec<NodeTypeFile>,
    /// Relations.
    pub relations: Vec<RelationFile>,
    /// Per-pair decoder choices.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pair_decoders: Vec<PairDecoderFile>,
}

impl GraphFile {
    /// Build the catalog and matrices, then validate.
    ///
    /// Relation indices within a node-type pair must be `0..n` with no gaps.
    pub fn into_graph(self) -> Result<GraphData> {
        let mut catalog = RelationCatalog::new();
        for nt in &self.node_types {
            catalog.add_node_type(nt.id, nt.count)?;
        }

        let mut indices: BTreeMap<(NodeTypeId, NodeTypeId), Vec<usize>> = BTreeMap::new();
        for rel in &self.relations {
            indices.entry((rel.row, rel.col)).or_default().push(rel.index);
        }
        for ((row, col), mut idx) in indices {
            idx.sort_unstable();
            let expected: Vec<usize> = (0..idx.len()).collect();
            if idx != expected {
                return Err(Error::DataIntegrity(format!(
                    "relations between node types {row} and {col} have indices {idx:?}, expected 0..{}",
                    idx.len()
                )));
            }
            catalog.add_relations(row, col, idx.len())?;
        }

        for pd in &self.pair_decoders {
            catalog.set_pair_decoder(pd.row, pd.col, pd.decoder);
        }

        let mut adjacency = BTreeMap::new();
        for rel in self.relations {
            let ty = RelationType::new(rel.row, rel.col, rel.index);
            if let Some(decoder) = rel.decoder {
                catalog.set_decoder(ty, decoder);
            }
            let rows = catalog
                .node_count(rel.row)
                .ok_or(Error::UnknownNodeType(rel.row))?;
            let cols = catalog
                .node_count(rel.col)
                .ok_or(Error::UnknownNodeType(rel.col))?;
            adjacency.insert(ty, SparseMatrix::from_edges(rows, cols, &rel.edges)?);
        }

        let mut features = BTreeMap::new();
        for nt in self.node_types {
            let matrix = match nt.features {
                Some(f) => SparseMatrix::from_triplets(nt.count, f.dim, f.entries)?,
                None => SparseMatrix::identity(nt.count),
            };
            features.insert(nt.id, matrix);
        }

        GraphData::new(catalog, adjacency, features)
    }
}

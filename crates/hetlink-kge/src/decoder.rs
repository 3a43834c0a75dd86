//! Relation decoders.
//!
//! A decoder maps a (row embedding, column embedding) pair to a real-valued
//! compatibility score for one relation type. All variants are bilinear
//! forms `u^T M_r v` that differ in how `M_r` is parameterised:
//!
//! | Decoder | `M_r` | Parameters per relation |
//! |---------|-------|-------------------------|
//! | Bilinear | full `R` | d² |
//! | LowRankBilinear | `L R^T` | 2·d·rank |
//! | Dedicom | `D_r G D_r`, `G` shared per node-type pair | d (+ d² per pair) |
//! | DistMult | `diag(r)` | d |
//! | InnerProduct | `I` | 0 |
//!
//! Decoders are chosen per relation in the [`RelationCatalog`] and never
//! look at the encoder; they only consume [`Embeddings`].
//!
//! # References
//!
//! - Nickel et al. (2011): RESCAL (bilinear)
//! - Yang et al. (2015): DistMult
//! - Trouillon et al. (2016) and Zitnik et al. (2018): DEDICOM decoders

use candle_core::{Tensor, D};
use candle_nn::{Init, VarBuilder};
use hetlink_core::{DecoderKind, Edge, RelationCatalog, RelationType};
use hetlink_nn::conv::glorot_bound;
use hetlink_nn::Embeddings;
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Decoder parameters for one relation type.
#[derive(Debug, Clone)]
pub enum Decoder {
    /// `u^T R v`.
    Bilinear {
        /// `(d, d)` relation matrix.
        relation: Tensor,
    },
    /// `u^T L R^T v`.
    LowRankBilinear {
        /// `(d, rank)` left factor.
        left: Tensor,
        /// `(d, rank)` right factor.
        right: Tensor,
    },
    /// `u^T D G D v` with diagonal `D` local to the relation.
    Dedicom {
        /// `(d, d)` interaction shared by the node-type pair.
        global: Tensor,
        /// `(d,)` diagonal of `D`.
        local: Tensor,
    },
    /// `u^T diag(r) v`.
    DistMult {
        /// `(d,)` relation vector.
        relation: Tensor,
    },
    /// `u^T v`.
    InnerProduct,
}

fn uniform(bound: f64) -> Init {
    Init::Uniform {
        lo: -bound,
        up: bound,
    }
}

impl Decoder {
    /// Allocate parameters for `relation` with embedding width `dim`.
    pub fn new(kind: DecoderKind, relation: RelationType, dim: usize, vb: &VarBuilder) -> Result<Self> {
        let RelationType { row, col, index } = relation;
        let name = format!("rel_{row}_{col}_{index}");
        Ok(match kind {
            DecoderKind::Bilinear => Self::Bilinear {
                relation: vb.get_with_hints((dim, dim), &name, uniform(glorot_bound(dim, dim)))?,
            },
            DecoderKind::LowRankBilinear { rank } => {
                if rank == 0 || rank > dim {
                    return Err(Error::Configuration(format!(
                        "low-rank decoder for {relation} needs 1 <= rank <= {dim}, got {rank}"
                    )));
                }
                let init = uniform(glorot_bound(dim, rank));
                Self::LowRankBilinear {
                    left: vb.get_with_hints((dim, rank), &format!("{name}_left"), init)?,
                    right: vb.get_with_hints((dim, rank), &format!("{name}_right"), init)?,
                }
            }
            DecoderKind::Dedicom => Self::Dedicom {
                // Same name for every relation of the pair: the var store
                // hands back the existing tensor.
                global: vb.get_with_hints(
                    (dim, dim),
                    &format!("global_{row}_{col}"),
                    uniform(glorot_bound(dim, dim)),
                )?,
                local: vb.get_with_hints(dim, &format!("{name}_local"), uniform(glorot_bound(dim, 1)))?,
            },
            DecoderKind::DistMult => Self::DistMult {
                relation: vb.get_with_hints(dim, &name, uniform(glorot_bound(dim, 1)))?,
            },
            DecoderKind::InnerProduct => Self::InnerProduct,
        })
    }

    /// Decoder family.
    pub fn kind(&self) -> DecoderKind {
        match self {
            Self::Bilinear { .. } => DecoderKind::Bilinear,
            Self::LowRankBilinear { left, .. } => DecoderKind::LowRankBilinear {
                rank: left.dims().get(1).copied().unwrap_or(0),
            },
            Self::Dedicom { .. } => DecoderKind::Dedicom,
            Self::DistMult { .. } => DecoderKind::DistMult,
            Self::InnerProduct => DecoderKind::InnerProduct,
        }
    }

    /// `u M_r` for a batch of row embeddings `(n, d)`.
    fn transform(&self, u: &Tensor) -> Result<Tensor> {
        Ok(match self {
            Self::Bilinear { relation } => u.matmul(relation)?,
            Self::LowRankBilinear { left, right } => u.matmul(left)?.matmul(&right.t()?)?,
            Self::Dedicom { global, local } => u
                .broadcast_mul(local)?
                .matmul(global)?
                .broadcast_mul(local)?,
            Self::DistMult { relation } => u.broadcast_mul(relation)?,
            Self::InnerProduct => u.clone(),
        })
    }

    /// Scores of `edges`, one per edge, given row and column embeddings.
    pub fn score_pairs(&self, row_emb: &Tensor, col_emb: &Tensor, edges: &[Edge]) -> Result<Tensor> {
        if edges.is_empty() {
            return Ok(Tensor::zeros(0, row_emb.dtype(), row_emb.device())?);
        }
        let device = row_emb.device();
        let rows: Vec<u32> = edges.iter().map(|&(r, _)| r as u32).collect();
        let cols: Vec<u32> = edges.iter().map(|&(_, c)| c as u32).collect();
        let rows = Tensor::from_vec(rows, edges.len(), device)?;
        let cols = Tensor::from_vec(cols, edges.len(), device)?;

        let u = row_emb.index_select(&rows, 0)?;
        let v = col_emb.index_select(&cols, 0)?;
        Ok(self.transform(&u)?.mul(&v)?.sum(D::Minus1)?)
    }

    /// Full `(rows, cols)` score matrix.
    pub fn score_matrix(&self, row_emb: &Tensor, col_emb: &Tensor) -> Result<Tensor> {
        Ok(self.transform(row_emb)?.matmul(&col_emb.t()?)?)
    }

    /// Score of a single pair of `(d,)` embeddings.
    pub fn score(&self, u: &Tensor, v: &Tensor) -> Result<f32> {
        let s = self
            .transform(&u.unsqueeze(0)?)?
            .squeeze(0)?
            .mul(v)?
            .sum_all()?;
        Ok(s.to_dtype(candle_core::DType::F32)?.to_scalar::<f32>()?)
    }
}

/// One decoder per catalog relation.
#[derive(Debug, Clone)]
pub struct DecoderBank {
    decoders: BTreeMap<RelationType, Decoder>,
}

impl DecoderBank {
    /// Build the decoder recorded in the catalog for every relation.
    pub fn new(catalog: &RelationCatalog, dim: usize, vb: VarBuilder) -> Result<Self> {
        let mut decoders = BTreeMap::new();
        for rel in catalog.relation_types() {
            let decoder = Decoder::new(catalog.decoder_for(&rel), rel, dim, &vb)?;
            decoders.insert(rel, decoder);
        }
        Ok(Self { decoders })
    }

    /// Decoder of a relation.
    pub fn get(&self, relation: &RelationType) -> Result<&Decoder> {
        self.decoders
            .get(relation)
            .ok_or(Error::UnknownRelation(*relation))
    }

    /// Score `edges` of `relation` from a set of embeddings.
    pub fn score_edges(
        &self,
        embeddings: &Embeddings,
        relation: &RelationType,
        edges: &[Edge],
    ) -> Result<Tensor> {
        let decoder = self.get(relation)?;
        decoder.score_pairs(
            embeddings.get(relation.row)?,
            embeddings.get(relation.col)?,
            edges,
        )
    }

    /// Iterate `(relation, decoder)`.
    pub fn iter(&self) -> impl Iterator<Item = (&RelationType, &Decoder)> {
        self.decoders.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn emb(rows: &[[f32; 2]]) -> Tensor {
        let data: Vec<f32> = rows.iter().flatten().copied().collect();
        Tensor::from_vec(data, (rows.len(), 2), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_known_scores() {
        let u = emb(&[[1.0, 2.0], [0.0, 1.0]]);
        let v = emb(&[[3.0, 4.0], [1.0, 0.0]]);
        let r = emb(&[[1.0, 0.0], [0.0, 2.0]]);
        let edges = [(0, 0), (1, 1), (0, 1)];

        let bilinear = Decoder::Bilinear { relation: r.clone() };
        let s = bilinear.score_pairs(&u, &v, &edges).unwrap().to_vec1::<f32>().unwrap();
        // [1,2] R = [1,4]; . [3,4] = 19; [0,1] R = [0,2] . [1,0] = 0; [1,4] . [1,0] = 1
        assert_eq!(s, vec![19.0, 0.0, 1.0]);

        let ip = Decoder::InnerProduct;
        let s = ip.score_pairs(&u, &v, &edges).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(s, vec![11.0, 0.0, 1.0]);

        let dm = Decoder::DistMult {
            relation: Tensor::new(&[2f32, -1.0], &Device::Cpu).unwrap(),
        };
        let s = dm.score_pairs(&u, &v, &edges).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(s, vec![-2.0, 0.0, 2.0]);
    }

    #[test]
    fn test_dedicom_matches_formula() {
        let global = emb(&[[1.0, 1.0], [0.0, 1.0]]);
        let local = Tensor::new(&[2f32, 3.0], &Device::Cpu).unwrap();
        let d = Decoder::Dedicom { global, local };
        let u = Tensor::new(&[1f32, 1.0], &Device::Cpu).unwrap();
        let v = Tensor::new(&[1f32, 2.0], &Device::Cpu).unwrap();
        // u D = [2, 3]; G -> [2, 5]; D -> [4, 15]; . v = 4 + 30
        assert_eq!(d.score(&u, &v).unwrap(), 34.0);
    }

    #[test]
    fn test_matrix_agrees_with_pairs() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let rel = RelationType::new(0, 1, 0);
        for kind in [
            DecoderKind::Bilinear,
            DecoderKind::LowRankBilinear { rank: 2 },
            DecoderKind::Dedicom,
            DecoderKind::DistMult,
            DecoderKind::InnerProduct,
        ] {
            let d = Decoder::new(kind, rel, 4, &vb.pp(kind.to_string())).unwrap();
            assert_eq!(d.kind(), kind);
            let u = Tensor::randn(0f32, 1.0, (3, 4), &Device::Cpu).unwrap();
            let v = Tensor::randn(0f32, 1.0, (5, 4), &Device::Cpu).unwrap();
            let m = d.score_matrix(&u, &v).unwrap().to_vec2::<f32>().unwrap();
            let edges: Vec<Edge> = vec![(0, 4), (2, 1), (1, 1)];
            let p = d.score_pairs(&u, &v, &edges).unwrap().to_vec1::<f32>().unwrap();
            for (i, &(r, c)) in edges.iter().enumerate() {
                assert!((m[r][c] - p[i]).abs() < 1e-4, "{kind}: {} vs {}", m[r][c], p[i]);
            }
        }
    }

    #[test]
    fn test_dedicom_shares_global_within_pair() {
        let mut catalog = RelationCatalog::new();
        catalog.add_node_type(0, 5).unwrap();
        catalog.add_relations(0, 0, 3).unwrap();
        catalog.set_pair_decoder(0, 0, DecoderKind::Dedicom);

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let bank = DecoderBank::new(&catalog, 6, vb).unwrap();
        // One global matrix and three local diagonals.
        assert_eq!(varmap.all_vars().len(), 4);
        assert_eq!(bank.iter().count(), 3);
    }

    #[test]
    fn test_invalid_rank() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let err = Decoder::new(
            DecoderKind::LowRankBilinear { rank: 9 },
            RelationType::new(0, 0, 0),
            4,
            &vb,
        );
        assert!(matches!(err, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_empty_edges() {
        let u = emb(&[[1.0, 2.0]]);
        let s = Decoder::InnerProduct.score_pairs(&u, &u, &[]).unwrap();
        assert_eq!(s.dims(), &[0]);
    }
}

//! Training objectives.
//!
//! Both losses take raw decoder scores. Negatives are laid out
//! positive-major: the `k` negatives of positive `i` sit at
//! `i * k .. (i + 1) * k`.

use candle_core::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Objective minimised by the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    /// `mean(max(0, margin - s(pos) + s(neg)))`.
    #[default]
    Hinge,
    /// Sigmoid cross-entropy with label 1 for positives and 0 for negatives.
    CrossEntropy,
}

impl LossKind {
    /// Evaluate the objective on one batch of scores.
    pub fn compute(self, pos: &Tensor, neg: &Tensor, margin: f64) -> Result<Tensor> {
        match self {
            Self::Hinge => hinge_loss(pos, neg, margin),
            Self::CrossEntropy => cross_entropy_loss(pos, neg),
        }
    }
}

impl std::fmt::Display for LossKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hinge => write!(f, "hinge"),
            Self::CrossEntropy => write!(f, "cross_entropy"),
        }
    }
}

/// Negatives per positive, checking the layout.
fn negatives_per_positive(pos: &Tensor, neg: &Tensor) -> Result<usize> {
    let n = pos.elem_count();
    let m = neg.elem_count();
    if n == 0 || m == 0 || m % n != 0 {
        return Err(Error::Configuration(format!(
            "loss needs a non-empty batch with k negatives per positive, got {n} positives and {m} negatives"
        )));
    }
    Ok(m / n)
}

/// Max-margin ranking loss.
///
/// Every negative is compared with the positive it was drawn for; the
/// result is averaged over all `n * k` pairs.
pub fn hinge_loss(pos: &Tensor, neg: &Tensor, margin: f64) -> Result<Tensor> {
    let k = negatives_per_positive(pos, neg)?;
    let n = pos.elem_count();
    let pos = pos.reshape((n, 1))?;
    let neg = neg.reshape((n, k))?;
    let gap = neg.broadcast_sub(&pos)?.affine(1.0, margin)?;
    Ok(gap.relu()?.mean_all()?)
}

/// `log(1 + exp(x))` without overflow.
fn softplus(x: &Tensor) -> Result<Tensor> {
    let tail = x.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    Ok(x.relu()?.add(&tail)?)
}

/// Binary cross-entropy on logits, averaged over positives and negatives.
pub fn cross_entropy_loss(pos: &Tensor, neg: &Tensor) -> Result<Tensor> {
    negatives_per_positive(pos, neg)?;
    let total = (pos.elem_count() + neg.elem_count()) as f64;
    let pos_term = softplus(&pos.neg()?)?.sum_all()?;
    let neg_term = softplus(neg)?.sum_all()?;
    Ok(pos_term.add(&neg_term)?.affine(1.0 / total, 0.0)?)
}

/// `weight_decay * sum(w^2) / 2` over `weights`.
///
/// Returns `None` when there is nothing to penalise.
pub fn l2_penalty(weights: &[Tensor], weight_decay: f64) -> Result<Option<Tensor>> {
    if weight_decay == 0.0 || weights.is_empty() {
        return Ok(None);
    }
    let mut total: Option<Tensor> = None;
    for w in weights {
        let sq = w.sqr()?.sum_all()?;
        total = Some(match total {
            Some(t) => t.add(&sq)?,
            None => sq,
        });
    }
    match total {
        Some(t) => Ok(Some(t.affine(weight_decay / 2.0, 0.0)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn t(v: &[f32]) -> Tensor {
        Tensor::new(v, &Device::Cpu).unwrap()
    }

    fn scalar(x: Tensor) -> f32 {
        x.to_scalar::<f32>().unwrap()
    }

    #[test]
    fn test_hinge_zero_when_separated() {
        let loss = hinge_loss(&t(&[5.0, 4.0]), &t(&[0.0, 1.0]), 1.0).unwrap();
        assert_eq!(scalar(loss), 0.0);
    }

    #[test]
    fn test_hinge_pairs_negatives_with_their_positive() {
        // pos 0 -> negs [0.5, 2.0], pos 1 -> negs [0.0, 0.0], margin 1
        // terms: 1.5, 3.0, 0.0, 0.0
        let loss = hinge_loss(&t(&[0.0, 3.0]), &t(&[0.5, 2.0, 0.0, 0.0]), 1.0).unwrap();
        assert!((scalar(loss) - 1.125).abs() < 1e-6);
    }

    #[test]
    fn test_cross_entropy_at_zero_logits() {
        let loss = cross_entropy_loss(&t(&[0.0]), &t(&[0.0])).unwrap();
        assert!((scalar(loss) - std::f32::consts::LN_2).abs() < 1e-6);
    }

    #[test]
    fn test_softplus_is_stable() {
        let loss = cross_entropy_loss(&t(&[-100.0]), &t(&[100.0])).unwrap();
        assert!((scalar(loss) - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_l2_penalty() {
        let w = vec![t(&[1.0, 2.0]), t(&[3.0])];
        let p = l2_penalty(&w, 0.1).unwrap().unwrap();
        assert!((scalar(p) - 0.7).abs() < 1e-6);
        assert!(l2_penalty(&w, 0.0).unwrap().is_none());
    }

    #[test]
    fn test_layout_mismatch() {
        assert!(hinge_loss(&t(&[1.0, 2.0]), &t(&[1.0, 2.0, 3.0]), 0.1).is_err());
        assert!(hinge_loss(&t(&[]), &t(&[]), 0.1).is_err());
    }

    #[test]
    fn test_gradient_reaches_scores() {
        let pos = candle_core::Var::new(&[0.0f32, 0.0], &Device::Cpu).unwrap();
        let neg = t(&[0.0, 0.0]);
        let loss = LossKind::Hinge.compute(pos.as_tensor(), &neg, 1.0).unwrap();
        let grads = loss.backward().unwrap();
        let g = grads.get(&pos).unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(g, vec![-0.5, -0.5]);
    }
}

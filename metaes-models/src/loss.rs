//! Categorical cross-entropy and accuracy
use rayon::prelude::*;

use metaes_data::dataset::LabeledSet;

use crate::nn::Network;

/// Probabilities are clipped to `[EPSILON, 1 - EPSILON]` before taking logs
pub const EPSILON: f32 = 1e-7;

/// Categorical cross-entropy between a predicted distribution and a target row.
/// The prediction is renormalized to sum to one before clipping.
pub fn cross_entropy(pred: &[f32], target: &[f32]) -> f32 {
    assert_eq!(pred.len(), target.len());
    let total: f32 = pred.iter().sum();
    let total = if total > 0.0 { total } else { 1.0 };
    -pred
        .iter()
        .zip(target.iter())
        .map(|(p, t)| t * (p / total).max(EPSILON).min(1.0 - EPSILON).ln())
        .sum::<f32>()
}

/// Index of the largest value.  The first index wins ties.
pub fn argmax(v: &[f32]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, x) in v.iter().enumerate() {
        match best {
            Some(b) if !(*x > v[b]) => (),
            _ => best = Some(i),
        }
    }
    best
}

/// Whether the prediction and target agree on the most likely class
pub fn is_correct(pred: &[f32], target: &[f32]) -> bool {
    argmax(pred) == argmax(target)
}

/// Accuracy and mean weighted loss over a set of examples
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Score {
    /// Fraction of examples whose most likely class is correct
    pub accuracy: f32,
    /// Mean of the per example weighted cross-entropy
    pub loss: f32,
}

/// Scores `network` on the examples of `ds` at `idxs` (all examples when `None`).
/// Missing weights count as one.  An empty selection scores zero.
pub fn score(
    network: &Network,
    ds: &LabeledSet,
    weights: Option<&[f32]>,
    idxs: Option<&[usize]>,
) -> Score {
    let n = idxs.map(|i| i.len()).unwrap_or_else(|| ds.len());
    if n == 0 {
        return Score::default();
    }

    let one = |i: usize| -> (f32, f32) {
        let out = network.forward(&ds.x()[i]);
        let target = &ds.y()[i];
        let w = weights.map(|w| w[i]).unwrap_or(1.0);
        let hit = if is_correct(&out, target) { 1.0 } else { 0.0 };
        (hit, w * cross_entropy(&out, target))
    };
    let add = |a: (f32, f32), b: (f32, f32)| (a.0 + b.0, a.1 + b.1);

    let (hits, loss) = match idxs {
        Some(idxs) => idxs.par_iter().map(|&i| one(i)).reduce(|| (0., 0.), add),
        None => (0..ds.len())
            .into_par_iter()
            .map(one)
            .reduce(|| (0., 0.), add),
    };
    Score {
        accuracy: hits / n as f32,
        loss: loss / n as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::NonLinearity;

    #[test]
    fn test_cross_entropy() {
        let ce = cross_entropy(&[0.25, 0.75], &[0.0, 1.0]);
        assert!((ce - 0.2876821).abs() < 1e-6);

        // Confident mistakes are clipped rather than infinite
        let ce = cross_entropy(&[1.0, 0.0], &[0.0, 1.0]);
        assert!((ce - 16.118095).abs() < 1e-3);
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[0.5, 0.5]), Some(0));
        assert_eq!(argmax(&[]), None);
        assert!(is_correct(&[0.2, 0.8], &[0.0, 1.0]));
        assert!(!is_correct(&[0.9, 0.1], &[0.0, 1.0]));
    }

    #[test]
    fn test_score() {
        // A single softmax layer with a bias favouring class 1
        let mut network = Network::new(1, &[2], NonLinearity::Linear, NonLinearity::Softmax);
        network.set_weights(&[0.0, 0.0, 0.0, 2.0]).unwrap();

        let ds = LabeledSet::from_classes(vec![vec![0.0]; 4], &[1, 1, 1, 0], 2).unwrap();
        let s = score(&network, &ds, None, None);
        assert!((s.accuracy - 0.75).abs() < 1e-6);

        let p1 = network.forward(&[0.0])[1];
        let expected = (3.0 * -p1.ln() + -(1.0 - p1).ln()) / 4.0;
        assert!((s.loss - expected).abs() < 1e-5);

        let weighted = score(&network, &ds, Some(&[1.0, 1.0, 1.0, 3.0]), Some(&[2, 3]));
        assert!((weighted.accuracy - 0.5).abs() < 1e-6);
        let expected = (-p1.ln() + 3.0 * -(1.0 - p1).ln()) / 2.0;
        assert!((weighted.loss - expected).abs() < 1e-5);

        assert_eq!(score(&network, &ds, None, Some(&[])), Score::default());
    }
}

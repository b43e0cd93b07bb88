//! Environments which score classifiers on labelled data
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use tracing::debug;

use metaes_core::optimizer::{Environment, ScoreLogger};
use metaes_data::dataset::LabeledSet;
use metaes_data::intrinsics::l2norm;
use metaes_models::loss::{score, Score};
use metaes_models::nn::Network;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// What a classifier is rewarded for
pub enum Reward {
    /// Fraction of correctly classified examples
    Accuracy,
    /// Negative mean weighted cross-entropy
    NegLoss,
}

impl Reward {
    fn of(&self, s: &Score) -> f32 {
        match self {
            Reward::Accuracy => s.accuracy,
            Reward::NegLoss => -s.loss,
        }
    }
}

/// Evaluation environment for a classifier network
pub struct ClassifierEnv {
    /// Training data
    train: LabeledSet,
    /// Per example weights of the training data
    weights: Option<Vec<f32>>,
    /// Optional validation data
    valid: Option<LabeledSet>,
    /// Reward for a score
    reward: Reward,
    /// Weight decay
    weight_decay: f32,
    /// Batch size and sampler, when evaluating on minibatches
    batch: Option<(usize, XorShiftRng)>,
    /// Indices of the current minibatch
    current: Option<Vec<usize>>,
    /// Number of steps
    count: usize,
}

impl ClassifierEnv {
    /// Returns a new environment scoring against the full training set
    pub fn new(train: LabeledSet, reward: Reward) -> Self {
        ClassifierEnv {
            train: train,
            weights: None,
            valid: None,
            reward: reward,
            weight_decay: 0.0,
            batch: None,
            current: None,
            count: 0,
        }
    }

    /// Reports the reward on held out data as well
    pub fn with_validation(mut self, valid: LabeledSet) -> Self {
        self.valid = Some(valid);
        self
    }

    /// Weighs every class equally in the loss
    pub fn with_balanced_classes(mut self) -> Self {
        self.weights = Some(self.train.balanced_weights());
        self
    }

    /// Penalizes the reward by `coef` times the L2 norm of the weights
    pub fn with_weight_decay(mut self, coef: f32) -> Self {
        self.weight_decay = coef;
        self
    }

    /// Evaluates on a fresh random minibatch of `size` examples after every step.
    /// Sizes of zero or past the dataset size fall back to the full set.
    pub fn with_minibatch(mut self, size: usize, seed: u64) -> Self {
        if size > 0 && size < self.train.len() {
            self.batch = Some((size, XorShiftRng::seed_from_u64(seed)));
            self.resample();
        }
        self
    }

    /// Training data
    pub fn train(&self) -> &LabeledSet {
        &self.train
    }

    /// Validation data
    pub fn valid(&self) -> Option<&LabeledSet> {
        self.valid.as_ref()
    }

    /// How models are rewarded
    pub fn reward(&self) -> Reward {
        self.reward
    }

    fn resample(&mut self) {
        if let Some((size, ref mut rng)) = self.batch {
            let mut idxs: Vec<usize> = (0..self.train.len()).collect();
            idxs.shuffle(rng);
            idxs.truncate(size);
            self.current = Some(idxs);
        }
    }

    fn penalty(&self, state: &Network) -> f32 {
        if self.weight_decay > 0.0 {
            self.weight_decay * l2norm(&state.get_weights())
        } else {
            0.0
        }
    }

    fn logged(s: &Score, prefix: &str) -> ScoreLogger {
        let mut logger = ScoreLogger::new(None);
        logger.insert(format!("{}accuracy", prefix), s.accuracy);
        logger.insert(format!("{}loss", prefix), s.loss);
        logger
    }
}

impl Environment<Network> for ClassifierEnv {
    /// Draws the next minibatch.
    /// `true` indicates scores from the previous batch are stale
    fn step(&mut self) -> bool {
        self.count += 1;
        if self.batch.is_some() {
            self.resample();
            debug!("step {}: resampled minibatch", self.count);
            true
        } else {
            false
        }
    }

    fn eval(&self, state: &Network) -> (f32, Option<ScoreLogger>) {
        let s = score(
            state,
            &self.train,
            self.weights.as_ref().map(|w| w.as_slice()),
            self.current.as_ref().map(|c| c.as_slice()),
        );
        (
            self.reward.of(&s) - self.penalty(state),
            Some(ClassifierEnv::logged(&s, "")),
        )
    }

    fn validate(&self, state: &Network) -> (Option<f32>, Option<ScoreLogger>) {
        if let Some(ref valid) = self.valid {
            let s = score(state, valid, None, None);
            (
                Some(self.reward.of(&s)),
                Some(ClassifierEnv::logged(&s, "valid_")),
            )
        } else {
            (None, None)
        }
    }
}

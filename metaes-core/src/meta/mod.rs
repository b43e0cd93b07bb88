//! Meta learning of the evolution strategy's hyperparameters.
//!
//! The outer loop is itself a small evolution strategy over the pair (lr, σ).  Each
//! round draws `pop_meta` perturbations of the pair, trains a copy of the current
//! model with each perturbed pair for a few inner iterations, and then moves the pair
//! along the reward-weighted perturbations:
//!
//! ```text
//! lr    += lr_meta / (sigma_meta_lr    * pop_meta) * Σ (R_i - mean(R)) * δlr_i
//! sigma += lr_meta / (sigma_meta_sigma * pop_meta) * Σ (R_i - mean(R)) * δσ_i
//! ```
//!
//! The weights of the best candidate become the starting point of the next round.

use std::f32;

use rand::distributions::{Distribution, Normal};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use tracing::{debug, info};

use crate::error::{EsError, Result};
use crate::es::{EvolutionStrategy, RewardShaping};
use crate::model::WeightUpdater;
use crate::optimizer::{Environment, GradientSampler, Optimizer};

/// Settings for the outer loop and the inner runs it launches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetaParams {
    /// Number of outer rounds
    pub iterations: usize,
    /// Population of each inner run
    pub population: usize,
    /// Initial learning rate
    pub lr_start: f32,
    /// Initial noise scale
    pub sigma_start: f32,
    /// Number of hyperparameter candidates per round
    pub pop_meta: usize,
    /// Step size of the hyperparameter updates
    pub lr_meta: f32,
    /// Standard deviation of the learning rate perturbations
    pub sigma_meta_lr: f32,
    /// Standard deviation of the noise scale perturbations
    pub sigma_meta_sigma: f32,
    /// Number of passes of each inner run
    pub inner_iterations: usize,
    /// Antithetic sampling in the inner runs
    pub mirrored: bool,
    /// Reward shaping in the inner runs
    pub shaping: RewardShaping,
    /// Smallest noise scale a candidate is trained with
    pub min_sigma: f32,
    /// Seed for the hyperparameter perturbations
    pub seed: u64,
}

impl Default for MetaParams {
    fn default() -> Self {
        MetaParams {
            iterations: 100,
            population: 100,
            lr_start: 0.0003,
            sigma_start: 0.2,
            pop_meta: 5,
            lr_meta: 0.00001,
            sigma_meta_lr: 0.00001,
            sigma_meta_sigma: 0.01,
            inner_iterations: 5,
            mirrored: true,
            shaping: RewardShaping::Standardized,
            min_sigma: 1e-4,
            seed: 2019,
        }
    }
}

impl MetaParams {
    /// Checks the settings the outer loop depends on.  Inner settings are checked
    /// by the inner optimizer on every run.
    pub fn check(&self) -> Result<()> {
        if self.pop_meta == 0 {
            return Err(EsError::config("pop_meta", "needs at least one candidate"));
        }
        if !(self.sigma_meta_lr > 0.0) {
            return Err(EsError::config(
                "sigma_meta_lr",
                format!("must be positive, got {}", self.sigma_meta_lr),
            ));
        }
        if !(self.sigma_meta_sigma > 0.0) {
            return Err(EsError::config(
                "sigma_meta_sigma",
                format!("must be positive, got {}", self.sigma_meta_sigma),
            ));
        }
        if !(self.min_sigma > 0.0) {
            return Err(EsError::config(
                "min_sigma",
                format!("must be positive, got {}", self.min_sigma),
            ));
        }
        if self.population < 2 {
            return Err(EsError::config("population", "needs at least two members"));
        }
        Ok(())
    }

    /// Noise scale a candidate actually trains with
    pub fn candidate_sigma(&self, sigma: f32, sigma_noise: f32) -> f32 {
        (sigma + sigma_noise).max(self.min_sigma)
    }

    fn inner(&self, lr: f32, sigma: f32) -> EvolutionStrategy {
        EvolutionStrategy {
            population: self.population,
            iterations: self.inner_iterations,
            sigma: sigma,
            lr: lr,
            report_iter: self.inner_iterations.max(1),
            mirrored: self.mirrored,
            shaping: self.shaping,
            momentum: None,
        }
    }
}

/// One trained hyperparameter candidate
#[derive(Debug, Clone)]
pub struct Candidate<S> {
    /// Reward reported by the inner run
    pub reward: f32,
    /// Perturbation applied to the learning rate
    pub lr_noise: f32,
    /// Perturbation applied to the noise scale
    pub sigma_noise: f32,
    /// Model after the inner run
    pub model: S,
}

/// Summary of one outer round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaStep {
    /// Round index
    pub iteration: usize,
    /// Highest candidate reward
    pub best_reward: f32,
    /// Mean candidate reward
    pub mean_reward: f32,
    /// Learning rate after the update
    pub lr: f32,
    /// Noise scale after the update
    pub sigma: f32,
}

/// Applies the reward-weighted hyperparameter update for one round, returning the
/// new (lr, sigma) pair.  Uses the raw perturbations, not the floored noise scale.
pub fn meta_update<S>(
    params: &MetaParams,
    lr: f32,
    sigma: f32,
    candidates: &[Candidate<S>],
) -> (f32, f32) {
    let n = candidates.len() as f32;
    let mean = candidates.iter().map(|c| c.reward).sum::<f32>() / n;

    let lr_rate = params.lr_meta / (params.sigma_meta_lr * params.pop_meta as f32);
    let sigma_rate = params.lr_meta / (params.sigma_meta_sigma * params.pop_meta as f32);

    candidates.iter().fold((lr, sigma), |(lr, sigma), c| {
        let advantage = c.reward - mean;
        (
            lr + lr_rate * advantage * c.lr_noise,
            sigma + sigma_rate * advantage * c.sigma_noise,
        )
    })
}

// First candidate wins ties
fn best_index<S>(candidates: &[Candidate<S>]) -> usize {
    let mut best = 0;
    for (i, c) in candidates.iter().enumerate().skip(1) {
        if c.reward > candidates[best].reward {
            best = i;
        }
    }
    best
}

/// Holds a model and tunes the learning rate and noise scale used to train it
pub struct MetaLearner<S> {
    model: S,
    params: MetaParams,
    lr: f32,
    sigma: f32,
    rng: XorShiftRng,
    history: Vec<MetaStep>,
}

impl<S: Clone + Send + Sync> MetaLearner<S> {
    /// Creates a learner holding its own copy of `model`
    pub fn new(model: &S, params: MetaParams) -> Self {
        MetaLearner {
            model: model.clone(),
            lr: params.lr_start,
            sigma: params.sigma_start,
            rng: XorShiftRng::seed_from_u64(params.seed),
            params: params,
            history: Vec::new(),
        }
    }

    /// Current model
    pub fn model(&self) -> &S {
        &self.model
    }

    /// Consumes the learner, returning the model
    pub fn into_model(self) -> S {
        self.model
    }

    /// Current learning rate
    pub fn lr(&self) -> f32 {
        self.lr
    }

    /// Current noise scale
    pub fn sigma(&self) -> f32 {
        self.sigma
    }

    /// Settings
    pub fn params(&self) -> &MetaParams {
        &self.params
    }

    /// Per round summaries of the last call to `train`
    pub fn history(&self) -> &[MetaStep] {
        &self.history
    }

    /// Trains `pop_meta` copies of the current model, each with its own perturbed
    /// learning rate and noise scale.
    pub fn sample_candidates<E, GS>(
        &mut self,
        iteration: usize,
        env: &mut E,
        gs: &mut GS,
    ) -> Result<Vec<Candidate<S>>>
    where
        E: Environment<S>,
        GS: GradientSampler<S, E>,
        GS::Gradient: WeightUpdater + Send,
    {
        self.params.check()?;
        let lr_dist = Normal::new(0.0, self.params.sigma_meta_lr as f64);
        let sigma_dist = Normal::new(0.0, self.params.sigma_meta_sigma as f64);

        let mut candidates = Vec::with_capacity(self.params.pop_meta);
        while candidates.len() < self.params.pop_meta {
            let lr_noise = lr_dist.sample(&mut self.rng) as f32;
            let sigma_noise = sigma_dist.sample(&mut self.rng) as f32;

            let lr = self.lr + lr_noise;
            let sigma = self.params.candidate_sigma(self.sigma, sigma_noise);
            debug!("candidate -- lr: {}, sigma: {}", lr, sigma);

            let state = self
                .params
                .inner(lr, sigma)
                .run(self.model.clone(), env, gs)?;
            if !state.fitness.is_finite() {
                return Err(EsError::NonFiniteReward(iteration));
            }

            candidates.push(Candidate {
                reward: state.fitness,
                lr_noise: lr_noise,
                sigma_noise: sigma_noise,
                model: state.model,
            });
        }
        Ok(candidates)
    }

    /// Runs the outer loop from the starting learning rate and noise scale.  On
    /// return the learner holds the best model of the final round.
    pub fn train<E, GS>(&mut self, env: &mut E, gs: &mut GS) -> Result<MetaOutcome>
    where
        E: Environment<S>,
        GS: GradientSampler<S, E>,
        GS::Gradient: WeightUpdater + Send,
    {
        self.params.check()?;

        self.lr = self.params.lr_start;
        self.sigma = self.params.sigma_start;
        self.history.clear();

        for iteration in 0..self.params.iterations {
            let mut candidates = self.sample_candidates(iteration, env, gs)?;

            let mean_reward =
                candidates.iter().map(|c| c.reward).sum::<f32>() / candidates.len() as f32;
            let (lr, sigma) = meta_update(&self.params, self.lr, self.sigma, &candidates);
            self.lr = lr;
            self.sigma = sigma;

            let best = candidates.swap_remove(best_index(&candidates));
            self.model = best.model;

            info!(
                "Iteration: {},\tmax reward is {}, lr is {}, sigma is {}",
                iteration, best.reward, self.lr, self.sigma
            );
            self.history.push(MetaStep {
                iteration: iteration,
                best_reward: best.reward,
                mean_reward: mean_reward,
                lr: self.lr,
                sigma: self.sigma,
            });
        }

        Ok(MetaOutcome {
            lr: self.lr,
            sigma: self.sigma,
            best_reward: self
                .history
                .last()
                .map(|s| s.best_reward)
                .unwrap_or(f32::NEG_INFINITY),
        })
    }
}

/// Final hyperparameters and reward of a meta training run
#[derive(Debug, Clone, PartialEq)]
pub struct MetaOutcome {
    /// Learning rate after the last round
    pub lr: f32,
    /// Noise scale after the last round
    pub sigma: f32,
    /// Best candidate reward of the last round
    pub best_reward: f32,
}

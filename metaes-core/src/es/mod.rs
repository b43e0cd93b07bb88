//! Optimizer for Evolution Strategies in the style of Salimans et al.
//!
//! Each pass samples λ Gaussian directions around the current parameters θ, scores
//! θ + σε for every direction and moves θ along the reward-weighted sum of the
//! directions, scaled by `lr / (λσ)`.

use std::f32;
use std::mem;
use std::time::Instant;

use float_ord::FloatOrd;
use rayon::prelude::*;
use tracing::info;

use crate::error::{EsError, Result};
use crate::model::WeightUpdater;
use crate::optimizer::*;

/// How raw rewards are turned into blending weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RewardShaping {
    /// Subtracts the mean reward
    Centered,
    /// Subtracts the mean and divides by the standard deviation
    Standardized,
    /// Rank based utilities (Wierstra et al.), robust to reward outliers
    Ranked,
}

impl Default for RewardShaping {
    fn default() -> Self {
        RewardShaping::Standardized
    }
}

// Contains the momentum vector
struct Momentum<G: WeightUpdater> {
    gradient: G,
    mu: f32,
}

impl<G: WeightUpdater> Momentum<G> {
    fn update(&mut self, new_gradient: &mut G) -> () {
        self.gradient.scale_gradients(self.mu);
        self.gradient.add_gradients(&new_gradient);
        self.gradient.copy_gradients(new_gradient);
    }
}

/// Settings for the evolution strategy
#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionStrategy {
    /// Number of perturbations (λ) scored each pass
    pub population: usize,

    /// Number of passes to take before exiting the optimizer
    pub iterations: usize,

    /// Noise scale applied to the sampled directions
    pub sigma: f32,

    /// Learning rate
    pub lr: f32,

    /// Number of passes between progress reports
    pub report_iter: usize,

    /// When set, every other direction is the negation of the one before it
    pub mirrored: bool,

    /// Reward shaping applied before blending
    pub shaping: RewardShaping,

    /// When provided, blends the previous update into the next one
    pub momentum: Option<f32>,
}

impl EvolutionStrategy {
    /// Mirrored, standardized strategy reporting every pass
    pub fn new(population: usize, iterations: usize, sigma: f32, lr: f32) -> Self {
        EvolutionStrategy {
            population: population,
            iterations: iterations,
            sigma: sigma,
            lr: lr,
            report_iter: 1,
            mirrored: true,
            shaping: RewardShaping::Standardized,
            momentum: None,
        }
    }

    fn check(&self) -> Result<()> {
        if self.population < 2 {
            return Err(EsError::config("population", "needs at least two members"));
        }
        if !self.sigma.is_finite() || self.sigma == 0.0 {
            return Err(EsError::config(
                "sigma",
                format!("must be finite and non-zero, got {}", self.sigma),
            ));
        }
        if !self.lr.is_finite() {
            return Err(EsError::config("lr", format!("must be finite, got {}", self.lr)));
        }
        if self.report_iter == 0 {
            return Err(EsError::config("report_iter", "must be positive"));
        }
        Ok(())
    }

    // With mirroring, odd slots hold the negation of the slot before them. An odd
    // population leaves its last direction unpaired.
    fn sample_directions<S, E, GS>(
        &self,
        env: &E,
        model: &S,
        gs: &mut GS,
        noise: &mut [GS::Gradient],
        pass: usize,
    ) -> ()
    where
        S: Clone + Send,
        E: Environment<S>,
        GS: GradientSampler<S, E>,
        GS::Gradient: WeightUpdater,
    {
        for i in 0..noise.len() {
            if self.mirrored && i % 2 == 1 {
                let (head, tail) = noise.split_at_mut(i);
                head[i - 1].copy_gradients(&mut tail[0]);
                tail[0].scale_gradients(-1f32);
            } else {
                gs.generate(env, model, &mut noise[i], pass);
            }
        }
    }

    // Rank utilities are already normalized, the rest average over the population
    fn step_size(&self) -> f32 {
        match self.shaping {
            RewardShaping::Ranked => self.lr / self.sigma,
            _ => self.lr / (self.population as f32 * self.sigma),
        }
    }
}

/// Subtracts the mean from each score
pub fn center(scores: &mut [f32]) -> () {
    let mu = scores.iter().sum::<f32>() / scores.len() as f32;
    for s in scores.iter_mut() {
        *s -= mu;
    }
}

// Takes a list of scores and performs z-whitening.  Identical scores carry no
// information and all get zero weight.
fn standardize(scores: &mut [f32]) -> () {
    let n_scores = scores.len() as f32;
    assert!(n_scores > 1f32);

    let mu = scores.iter().sum::<f32>() / n_scores;
    let var: f32 = scores.iter().map(|v| (v - mu).powi(2)).sum::<f32>() / n_scores;
    let std = var.sqrt();

    if std == 0f32 {
        for s in scores.iter_mut() {
            *s = 0f32;
        }
    } else {
        // Epsilon keeps tiny deviations from blowing up
        let denom = std + 1e-6;
        for s in scores.iter_mut() {
            *s = (*s - mu) / denom;
        }
    }
}

// Reweights the scores based on rank-based fitness shaping
fn fitness_shape(scores: &mut [f32]) -> () {
    let mut i_scores: Vec<_> = scores.iter().cloned().enumerate().collect();
    i_scores.sort_by_key(|(_i, x)| FloatOrd(-*x));

    let len = scores.len();
    let log_len = (len as f32 / 2. + 1.).ln();
    let mut sum = 0.;
    for (rank, (i, _s)) in i_scores.into_iter().enumerate() {
        let nom = (0f32).max(log_len - ((rank + 1) as f32).ln());
        scores[i] = nom;
        sum += nom;
    }
    for s in scores.iter_mut() {
        *s = *s / sum - 1. / len as f32;
    }
}

fn shape_rewards(shaping: RewardShaping, scores: &mut [f32]) -> () {
    match shaping {
        RewardShaping::Centered => center(scores),
        RewardShaping::Standardized => standardize(scores),
        RewardShaping::Ranked => fitness_shape(scores),
    }
}

impl Optimizer for EvolutionStrategy {
    fn run<S, E, GS>(&self, init: S, env: &mut E, gs: &mut GS) -> Result<State<S>>
    where
        S: Clone + Send + Sync,
        E: Environment<S>,
        GS: GradientSampler<S, E>,
        GS::Gradient: WeightUpdater + Send,
    {
        self.check()?;

        let mut noise = vec![gs.zero_gradient(); self.population];
        let mut scores = vec![0f32; self.population];
        let mut next = init.clone();

        let (fitness, logger) = env.eval(&init);
        let (valid, valid_logger) = env.validate(&init);
        let mut parent = State::new(init, fitness, logger);
        let mut best = match valid {
            Some(score) => State::new(parent.model.clone(), score, valid_logger),
            None => parent.clone(),
        };
        let mut last_valid = valid;

        let mut mom = self.momentum.map(|mu| Momentum {
            gradient: gs.zero_gradient(),
            mu: mu,
        });

        let now = Instant::now();

        for pass in 0..(self.iterations) {
            // Let the environment update itself, if needed
            if env.step() {
                let (fitness, logger) = env.eval(&parent.model);
                parent.fitness = fitness;
                parent.logger = logger;
            }

            if pass % self.report_iter == 0 {
                let e = now.elapsed();
                info!(
                    "Time: {}.{:03},\tIteration: {},\tFitness: {},\tValid: {},\t\
                     Last Valid: {:?},\tStats: {:?}",
                    e.as_secs(),
                    e.subsec_millis(),
                    pass,
                    parent.fitness,
                    best.fitness,
                    last_valid,
                    parent.logger
                );
            }

            self.sample_directions(&*env, &parent.model, gs, &mut noise, pass);

            // Score every perturbed child in parallel
            {
                let sigma = self.sigma;
                let parent_model = &parent.model;
                let env_ref = &*env;
                let gs_ref = &*gs;
                scores
                    .par_iter_mut()
                    .zip(noise.par_iter())
                    .for_each(|(s, eps)| {
                        let mut perturbation = eps.clone();
                        perturbation.scale_gradients(sigma);
                        let mut child = parent_model.clone();
                        gs_ref.apply(parent_model, &perturbation, &mut child);
                        *s = env_ref.eval(&child).0;
                    });
            }

            if scores.iter().any(|s| !s.is_finite()) {
                return Err(EsError::NonFiniteReward(pass));
            }

            shape_rewards(self.shaping, &mut scores);

            // Blend the directions into a single update
            let mut update = gs.zero_gradient();
            for (eps, w) in noise.iter_mut().zip(scores.iter()) {
                eps.scale_gradients(*w);
                update.add_gradients(eps);
            }
            update.scale_gradients(self.step_size());

            if let Some(ref mut m) = mom {
                m.update(&mut update);
            }

            gs.apply(&parent.model, &update, &mut next);
            mem::swap(&mut parent.model, &mut next);

            let (fitness, logger) = env.eval(&parent.model);
            parent.fitness = fitness;
            parent.logger = logger;

            // Check validation
            match env.validate(&parent.model) {
                (Some(score), logger) => {
                    if score > best.fitness {
                        best = State::new(parent.model.clone(), score, logger);
                    }
                    last_valid = Some(score);
                }
                (None, _) => {
                    best = parent.clone();
                }
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::sampler::ModelGS;
    use crate::testing::{Point, PointInit, Sphere};

    fn assert_vectors(expected: &[f32], actual: &[f32]) -> () {
        assert_eq!(expected.len(), actual.len());
        for (e, a) in expected.iter().zip(actual) {
            assert!((e - a).abs() < 1e-5, "expected {}, got {}", e, a);
        }
    }

    #[test]
    fn test_fitness_shape() {
        let mut scores = vec![0f32, 0.1, 0.05, 0.7, 0.2];
        fitness_shape(&mut scores);
        let expected = [-0.2, -0.12161282, -0.2, 0.43704253, 0.084570274];
        assert_vectors(&expected, &scores);
    }

    #[test]
    fn test_znorm() {
        let mut scores = vec![-1.0, 0.0, 0.5];
        standardize(&mut scores);
        assert_vectors(&[-1.33630621, 0.26726124, 1.06904497], &scores);

        let mut flat = vec![2.0, 2.0, 2.0];
        standardize(&mut flat);
        assert_vectors(&[0.0, 0.0, 0.0], &flat);
    }

    #[test]
    fn test_center() {
        let mut scores = vec![1.0, 2.0, 6.0];
        center(&mut scores);
        assert_vectors(&[-2.0, -1.0, 3.0], &scores);
    }

    #[test]
    fn test_rejects_bad_settings() {
        let mut env = Sphere::new(vec![0.0; 2]);
        let mut gs = ModelGS::standard(PointInit(2), 1);

        let es = EvolutionStrategy::new(1, 10, 0.1, 0.01);
        match es.run(Point(vec![0.0; 2]), &mut env, &mut gs) {
            Err(EsError::InvalidConfig { field, .. }) => assert_eq!(field, "population"),
            other => panic!("unexpected result: {:?}", other.map(|s| s.fitness)),
        }

        let es = EvolutionStrategy::new(10, 10, 0.0, 0.01);
        assert!(es.run(Point(vec![0.0; 2]), &mut env, &mut gs).is_err());

        let mut es = EvolutionStrategy::new(10, 10, 0.1, 0.01);
        es.report_iter = 0;
        assert!(es.run(Point(vec![0.0; 2]), &mut env, &mut gs).is_err());
    }

    #[test]
    fn test_mirrored_directions() {
        let env = Sphere::new(vec![0.0; 3]);
        let mut gs = ModelGS::standard(PointInit(3), 21);
        let parent = Point(vec![0.0; 3]);
        let es = EvolutionStrategy::new(5, 1, 0.1, 0.01);

        let mut noise = vec![Point(vec![0.0; 3]); 5];
        es.sample_directions(&env, &parent, &mut gs, &mut noise, 0);
        for k in 0..2 {
            let neg: Vec<f32> = noise[2 * k].0.iter().map(|x| -x).collect();
            assert_eq!(noise[2 * k + 1].0, neg);
            assert!(noise[2 * k].0.iter().any(|x| *x != 0.0));
        }
        // The odd one out is a fresh draw
        let neg: Vec<f32> = noise[3].0.iter().map(|x| -x).collect();
        assert_ne!(noise[4].0, neg);
        assert_ne!(noise[4].0, noise[2].0);

        let mut es = es;
        es.mirrored = false;
        let mut noise = vec![Point(vec![0.0; 3]); 2];
        es.sample_directions(&env, &parent, &mut gs, &mut noise, 0);
        let neg: Vec<f32> = noise[0].0.iter().map(|x| -x).collect();
        assert_ne!(noise[1].0, neg);
    }

    #[test]
    fn test_zero_iterations_returns_init() {
        let mut env = Sphere::new(vec![1.0, 1.0]);
        let mut gs = ModelGS::standard(PointInit(2), 1);
        let es = EvolutionStrategy::new(4, 0, 0.1, 0.01);
        let state = es.run(Point(vec![0.0; 2]), &mut env, &mut gs).unwrap();
        assert_eq!(state.model.0, vec![0.0, 0.0]);
        assert_eq!(state.fitness, -2.0);
    }

    #[test]
    fn test_converges_on_sphere() {
        let target = vec![1.0, -2.0, 0.5];
        let mut env = Sphere::new(target.clone());
        let mut gs = ModelGS::standard(PointInit(3), 1234);
        let mut es = EvolutionStrategy::new(40, 200, 0.1, 0.02);
        es.report_iter = 50;

        let state = es.run(Point(vec![0.0; 3]), &mut env, &mut gs).unwrap();
        assert!(state.fitness > -0.5, "fitness {}", state.fitness);
    }

    #[test]
    fn test_ranked_with_momentum_improves() {
        let mut env = Sphere::new(vec![3.0, 3.0]);
        let mut gs = ModelGS::standard(PointInit(2), 99);
        let mut es = EvolutionStrategy::new(20, 50, 0.2, 0.05);
        es.shaping = RewardShaping::Ranked;
        es.momentum = Some(0.5);
        es.mirrored = false;

        let state = es.run(Point(vec![0.0; 2]), &mut env, &mut gs).unwrap();
        assert!(state.fitness > -18.0, "fitness {}", state.fitness);
    }

    #[test]
    fn test_validation_keeps_best() {
        let mut env = Sphere::new(vec![1.0, 1.0]).with_validation(vec![1.0, 1.0]);
        let mut gs = ModelGS::standard(PointInit(2), 5);
        let es = EvolutionStrategy::new(20, 30, 0.1, 0.02);

        let state = es.run(Point(vec![0.0; 2]), &mut env, &mut gs).unwrap();
        // Returned fitness is the best validation score seen
        assert!(state.fitness >= -2.0);
        assert_eq!(env.validate(&state.model).0, Some(state.fitness));
    }
}

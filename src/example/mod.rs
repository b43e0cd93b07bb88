//! Example Environments on two dimensional benchmark functions
use std::f32::consts::{E, PI};

use rand::distributions::{Distribution, Normal};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

use metaes_core::model::WeightUpdater;
use metaes_core::optimizer::{Environment, GradientSampler, ScoreLogger};

#[derive(Clone, Debug, Copy, PartialEq)]
/// Model state
pub struct Pair(pub (f32, f32));

/// Matyas function, negated so the optimum at (0, 0) scores 0
pub struct MatyasEnv;

impl Environment<Pair> for MatyasEnv {
    fn step(&mut self) -> bool {
        false
    }

    fn eval(&self, state: &Pair) -> (f32, Option<ScoreLogger>) {
        let (x, y) = state.0;
        (-(0.26 * (x.powi(2) + y.powi(2)) - 0.48 * x * y), None)
    }
}

/// Ackley function, negated so the optimum at (0, 0) scores 0
pub struct AckleyEnv;

impl Environment<Pair> for AckleyEnv {
    fn step(&mut self) -> bool {
        false
    }

    fn eval(&self, state: &Pair) -> (f32, Option<ScoreLogger>) {
        let (x, y) = state.0;
        let ack = -20. * (-0.2 * (0.5 * (x.powi(2) + y.powi(2))).sqrt()).exp()
            - (0.5 * ((2. * PI * x).cos() + (2. * PI * y).cos())).exp()
            + E
            + 20.;

        (-ack, None)
    }
}

/// Samples standard normal search directions for a `Pair`
pub struct PairSampler {
    /// Normal distribution to sample from
    n: Normal,
    /// Rng to use when sampling
    rng: XorShiftRng,
}

impl PairSampler {
    /// Create a new PairSampler
    pub fn new(seed: u64) -> Self {
        PairSampler {
            n: Normal::new(0., 1.),
            rng: XorShiftRng::seed_from_u64(seed),
        }
    }
}

impl<E: Environment<Pair>> GradientSampler<Pair, E> for PairSampler {
    type Gradient = Pair;

    fn zero_gradient(&self) -> Self::Gradient {
        Pair((0f32, 0f32))
    }

    fn generate(&mut self, _env: &E, _s: &Pair, g: &mut Self::Gradient, _seed: usize) -> () {
        (g.0).0 = self.n.sample(&mut self.rng) as f32;
        (g.0).1 = self.n.sample(&mut self.rng) as f32;
    }

    fn apply(&self, s: &Pair, g: &Self::Gradient, ns: &mut Pair) -> () {
        (ns.0).0 = (s.0).0 + (g.0).0;
        (ns.0).1 = (s.0).1 + (g.0).1;
    }
}

impl WeightUpdater for Pair {
    fn num_weights(&self) -> usize {
        2
    }

    fn update_gradients<F>(&mut self, f: &mut F) -> ()
    where
        F: FnMut() -> f32,
    {
        let x = f();
        let y = f();
        self.0 = (x, y);
    }

    fn scale_gradients(&mut self, scale: f32) -> () {
        let (x, y) = self.0;
        self.0 = (x * scale, y * scale);
    }

    fn copy_gradients(&self, other: &mut Self) -> () {
        other.0 = self.0;
    }

    fn add_gradients(&mut self, other: &Self) -> () {
        (self.0).0 += (other.0).0;
        (self.0).1 += (other.0).1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaes_core::es::EvolutionStrategy;
    use metaes_core::meta::{MetaLearner, MetaParams};
    use metaes_core::optimizer::Optimizer;

    #[test]
    fn test_optima() {
        let origin = Pair((0.0, 0.0));
        assert!(MatyasEnv.eval(&origin).0.abs() < 1e-6);
        assert!(AckleyEnv.eval(&origin).0.abs() < 1e-5);

        let away = Pair((1.0, -2.0));
        assert!(MatyasEnv.eval(&away).0 < 0.0);
        // 20 - 20 e^{-0.2 sqrt(2.5)} - e + e = 5.4221...
        let expected = -(20. - 20. * (-0.2 * 2.5f32.sqrt()).exp());
        assert!((AckleyEnv.eval(&away).0 - expected).abs() < 1e-4);
    }

    #[test]
    fn test_sampler_is_seeded() {
        let mut a = PairSampler::new(3);
        let mut b = PairSampler::new(3);
        let mut ga = Pair((0.0, 0.0));
        let mut gb = Pair((0.0, 0.0));
        GradientSampler::<Pair, MatyasEnv>::generate(&mut a, &MatyasEnv, &ga.clone(), &mut ga, 0);
        GradientSampler::<Pair, MatyasEnv>::generate(&mut b, &MatyasEnv, &gb.clone(), &mut gb, 0);
        assert_eq!(ga, gb);
        assert_ne!(ga, Pair((0.0, 0.0)));
    }

    #[test]
    fn test_es_descends_matyas() {
        let es = EvolutionStrategy::new(20, 50, 0.5, 0.5);
        let init = Pair((5.0, 5.0));
        let start = MatyasEnv.eval(&init).0;
        let best = es.run(init, &mut MatyasEnv, &mut PairSampler::new(11)).unwrap();
        assert!(best.fitness > start);
    }

    #[test]
    fn test_meta_learner_on_matyas() {
        let params = MetaParams {
            iterations: 3,
            population: 10,
            lr_start: 0.1,
            sigma_start: 0.5,
            pop_meta: 3,
            lr_meta: 0.001,
            sigma_meta_lr: 0.01,
            sigma_meta_sigma: 0.05,
            inner_iterations: 5,
            ..MetaParams::default()
        };
        let init = Pair((5.0, 5.0));
        let start = MatyasEnv.eval(&init).0;
        let mut learner = MetaLearner::new(&init, params);
        let outcome = learner
            .train(&mut MatyasEnv, &mut PairSampler::new(5))
            .unwrap();
        assert_eq!(learner.history().len(), 3);
        assert!(outcome.best_reward > start);
        assert_eq!(MatyasEnv.eval(learner.model()).0, outcome.best_reward);
    }
}

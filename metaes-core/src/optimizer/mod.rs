use std::fmt::Debug;

use hashbrown::HashMap;

use crate::error::Result;
use crate::model::WeightUpdater;

#[derive(Clone, Default)]
/// Named scores collected while evaluating a model
pub struct ScoreLogger {
    /// Score name to score value
    counts: HashMap<String, f32>,
}

impl ScoreLogger {
    /// Returns a new ScoreLogger
    pub fn new(counts_opt: Option<HashMap<String, f32>>) -> ScoreLogger {
        ScoreLogger {
            counts: counts_opt.unwrap_or_else(HashMap::new),
        }
    }

    #[inline]
    /// Adds a score
    pub fn insert<K: Into<String>>(&mut self, key: K, value: f32) -> () {
        self.counts.insert(key.into(), value);
    }

    #[inline]
    /// Gets a score
    pub fn get(&self, key: &str) -> Option<f32> {
        self.counts.get(key).cloned()
    }
}

impl Debug for ScoreLogger {
    /// Prints the scores sorted by name
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let mut data: Vec<(&String, &f32)> = self.counts.iter().collect();
        data.sort_by_key(|(k, _v)| *k);
        write!(f, "{:?}", data)
    }
}

#[derive(Clone, Debug)]
/// Current state
pub struct State<S: Clone> {
    /// Underlying model
    pub model: S,
    /// Latest fitness computed
    pub fitness: f32,
    /// The logged scores from the last run
    pub logger: Option<ScoreLogger>,
}

impl<S: Clone> State<S> {
    /// Returns a new state
    pub fn new(model: S, fitness: f32, logger: Option<ScoreLogger>) -> Self {
        State {
            model: model,
            fitness: fitness,
            logger: logger,
        }
    }
}

/// Fitness function which evaluates state
pub trait Environment<State>: Send + Sync {
    /// Updates the environment, e.g. by drawing a new minibatch.
    /// `true` indicates the environment changed and old scores are stale
    fn step(&mut self) -> bool;

    /// Evaluates a given state, returning the fitness.
    /// Higher is better.
    fn eval(&self, s: &State) -> (f32, Option<ScoreLogger>);

    /// Evaluates a given state against held out data.
    /// If there is no validation, returns None
    fn validate(&self, _s: &State) -> (Option<f32>, Option<ScoreLogger>) {
        (None, None)
    }
}

/// Computes a new search direction given a state
pub trait GradientSampler<State: Clone + Send, E: Environment<State>>: Send + Sync {
    /// Gradient type used to compute children
    type Gradient: Clone + Send + Sync;

    /// Produces a new gradient type representing Zero.  This should hold that a model
    /// + zero gradient == the original model.
    fn zero_gradient(&self) -> Self::Gradient;

    /// Loads a new gradient, given a state
    fn generate(&mut self, env: &E, s: &State, g: &mut Self::Gradient, seed: usize) -> ();

    /// Applies a gradient to a state
    fn apply(&self, s: &State, g: &Self::Gradient, ns: &mut State) -> ();
}

/// Trait to define optimizer methods
pub trait Optimizer {
    /// Runs the optimizer.  Each optimizer expects an initial model state, an
    /// environment that can evaluate states and emit a fitness score for that state,
    /// and a gradient sampler which produces search directions around a state.
    /// Settings are checked before any work is done.
    fn run<S, E, GS>(&self, init: S, env: &mut E, gs: &mut GS) -> Result<State<S>>
    where
        S: Clone + Send + Sync,
        E: Environment<S>,
        GS: GradientSampler<S, E>,
        GS::Gradient: WeightUpdater + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logger_insert_get() {
        let mut logger = ScoreLogger::new(None);
        logger.insert("accuracy", 0.5);
        logger.insert("accuracy", 1.0);
        assert_eq!(logger.get("accuracy"), Some(1.0));
        assert_eq!(logger.get("missing"), None);
    }

    #[test]
    fn test_logger_debug_sorted() {
        let mut logger = ScoreLogger::default();
        logger.insert("b", 2.0);
        logger.insert("a", 1.0);
        assert_eq!(format!("{:?}", logger), "[(\"a\", 1.0), (\"b\", 2.0)]");
    }
}

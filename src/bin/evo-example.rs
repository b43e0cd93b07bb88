use std::error::Error;

use tracing::info;

use metaes::example::{MatyasEnv, Pair, PairSampler};
use metaes_core::meta::{MetaLearner, MetaParams};

fn main() -> Result<(), Box<dyn Error>> {
    metaes::init_logging("info");

    // Learn the step size and noise scale while descending the Matyas function
    let params = MetaParams {
        iterations: 20,
        population: 50,
        lr_start: 0.1,
        sigma_start: 0.5,
        pop_meta: 5,
        lr_meta: 0.001,
        sigma_meta_lr: 0.01,
        sigma_meta_sigma: 0.05,
        inner_iterations: 10,
        ..MetaParams::default()
    };

    let init = Pair((10f32, 10f32));
    let mut learner = MetaLearner::new(&init, params);
    let outcome = learner.train(&mut MatyasEnv, &mut PairSampler::new(645342312))?;

    let model = learner.model();
    info!(
        "Best Score: {}, Best Model: {},{}, lr: {}, sigma: {}",
        outcome.best_reward,
        (model.0).0,
        (model.0).1,
        outcome.lr,
        outcome.sigma
    );
    Ok(())
}

#[macro_use]
extern crate clap;

use std::error::Error;
use std::time::Instant;

use clap::{App, Arg, ArgMatches};
use tracing::info;

use metaes_core::meta::MetaLearner;
use metaes_core::optimizer::Environment;

use metaes::bin_utils::args::{ArgAugmenter, DatasetArgs, MetaArgs, ModelArgs};
use metaes::bin_utils::loaders::{build_datasets, build_env, build_init, write_model};

fn parse<'a>() -> ArgMatches<'a> {
    let base = App::new("meta-es")
        .version("0.1.0")
        .about("Trains a classifier with an evolution strategy whose learning rate and noise scale are learned");

    let base = MetaArgs.add_args(base);
    let base = DatasetArgs.add_args(base);
    let base = ModelArgs.add_args(base);
    base.arg(
        Arg::with_name("weight_decay")
            .short("w")
            .long("weight-decay")
            .takes_value(true)
            .help("Coefficient for weight decay"),
    )
    .get_matches()
}

fn main() -> Result<(), Box<dyn Error>> {
    metaes::init_logging("info");
    let args = parse();

    let params = MetaArgs.load_from_args(&args)?;
    let dm = DatasetArgs.load_from_args(&args)?;
    let mp = ModelArgs.load_from_args(&args)?;
    let weight_decay = match args.value_of("weight_decay") {
        Some(_) => value_t!(args, "weight_decay", f32)?,
        None => 0f32,
    };

    let (train, valid, classes) = build_datasets(&dm)?;
    let (init, mut gs) = build_init(&mp, dm.dims, classes.len())?;
    let mut env = build_env(&dm, train, valid, mp.seed).with_weight_decay(weight_decay);
    info!("Meta settings: {:?}", params);

    let now = Instant::now();
    let mut learner = MetaLearner::new(&init, params);
    let outcome = learner.train(&mut env, &mut gs)?;
    info!("Train runtime (secs): {}", now.elapsed().as_secs());

    info!(
        "Final lr: {}, sigma: {}, best reward: {}",
        outcome.lr, outcome.sigma, outcome.best_reward
    );
    let (valid_fitness, valid_logger) = env.validate(learner.model());
    if let Some(fitness) = valid_fitness {
        info!("Valid fitness: {}", fitness);
        info!("Valid Logger: {:?}", valid_logger);
    }

    write_model(learner.model(), mp.save_model_path.as_ref().map(|s| s.as_str()))?;
    Ok(())
}

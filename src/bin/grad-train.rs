use std::error::Error;
use std::time::Instant;

use clap::{App, ArgMatches};
use tracing::info;

use metaes::bin_utils::args::{ArgAugmenter, DatasetArgs, ModelArgs, TrainerArgs};
use metaes::bin_utils::loaders::{build_datasets, build_init, write_model};
use metaes::trainer::GradientTrainer;

use metaes_models::loss::score;

fn parse<'a>() -> ArgMatches<'a> {
    let base = App::new("grad-train")
        .version("0.1.0")
        .about("Trains a classifier with Adam as a baseline for the evolution strategies");

    let base = TrainerArgs.add_args(base);
    let base = DatasetArgs.add_args(base);
    ModelArgs.add_args(base).get_matches()
}

fn main() -> Result<(), Box<dyn Error>> {
    metaes::init_logging("info");
    let args = parse();

    let tm = TrainerArgs.load_from_args(&args)?;
    let dm = DatasetArgs.load_from_args(&args)?;
    let mp = ModelArgs.load_from_args(&args)?;

    let (train, valid, classes) = build_datasets(&dm)?;
    let (init, _gs) = build_init(&mp, dm.dims, classes.len())?;

    let mut config = tm.config;
    config.balance_classes = dm.balance;
    let mut trainer = GradientTrainer::from_dataset(&init, train)?.with_config(config)?;

    let now = Instant::now();
    let history = trainer.fit(tm.epochs, &tm.params, true)?;
    info!("Train runtime (secs): {}", now.elapsed().as_secs());
    info!("History: {}", serde_json::to_string(&history)?);

    let model = trainer.model();
    if let Some(ref v) = valid {
        let s = score(&model, v, None, None);
        info!("Valid accuracy: {}, loss: {}", s.accuracy, s.loss);
    }

    write_model(&model, mp.save_model_path.as_ref().map(|s| s.as_str()))?;
    Ok(())
}

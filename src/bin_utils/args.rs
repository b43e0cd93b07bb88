use std::fs::File;
use std::str::FromStr;

use clap::{App, Arg, ArgMatches};

use metaes_core::es::RewardShaping;
use metaes_core::meta::MetaParams;
use metaes_models::nn::NonLinearity;

use crate::env::Reward;
use crate::trainer::TrainerConfig;

use super::model_params::{parse_activation, ModelParams};
use super::{BinError, Result};

/// Trait to add new arguments to the current app
pub trait ArgAugmenter {
    /// Type of struct to output from this parser
    type Output;

    /// Specifies arguments to add
    fn add_args<'a, 'b>(&self, app: App<'a, 'b>) -> App<'a, 'b>;

    /// Parses the arguments
    fn load_from_args<'a>(&self, args: &ArgMatches<'a>) -> Result<Self::Output>;
}

/// Parses an optional argument, failing on malformed values
fn optional<T: FromStr>(args: &ArgMatches, name: &str) -> Result<Option<T>> {
    if args.value_of(name).is_none() {
        return Ok(None);
    }
    value_t!(args, name, T)
        .map(Some)
        .map_err(|e| BinError::Arg(e.message))
}

/// Parses a required argument
fn required<T: FromStr>(args: &ArgMatches, name: &str) -> Result<T> {
    optional(args, name)?.ok_or_else(|| BinError::Arg(format!("--{} is required", name)))
}

/// Struct defining the meta learner arguments using ArgAugmenter.  Values given on
/// the command line override those of the `--config` file, which override the
/// defaults.
pub struct MetaArgs;

impl ArgAugmenter for MetaArgs {
    type Output = MetaParams;

    fn add_args<'a, 'b>(&self, app: App<'a, 'b>) -> App<'a, 'b> {
        app.arg(
            Arg::with_name("config")
                .long("config")
                .takes_value(true)
                .help("Json file with the meta learner settings"),
        )
        .arg(
            Arg::with_name("iters")
                .short("i")
                .long("iters")
                .takes_value(true)
                .help("Number of meta iterations to run before exiting"),
        )
        .arg(
            Arg::with_name("lambda")
                .short("l")
                .long("lambda")
                .takes_value(true)
                .help("Population of each inner run"),
        )
        .arg(
            Arg::with_name("lr")
                .long("lr")
                .takes_value(true)
                .help("Starting learning rate"),
        )
        .arg(
            Arg::with_name("sigma")
                .long("sigma")
                .takes_value(true)
                .help("Starting noise scale"),
        )
        .arg(
            Arg::with_name("pop_meta")
                .long("pop-meta")
                .takes_value(true)
                .help("Number of hyperparameter candidates per meta iteration"),
        )
        .arg(
            Arg::with_name("lr_meta")
                .long("lr-meta")
                .takes_value(true)
                .help("Step size of the hyperparameter updates"),
        )
        .arg(
            Arg::with_name("sigma_meta_lr")
                .long("sigma-meta-lr")
                .takes_value(true)
                .help("Standard deviation of the learning rate perturbations"),
        )
        .arg(
            Arg::with_name("sigma_meta_sigma")
                .long("sigma-meta-sigma")
                .takes_value(true)
                .help("Standard deviation of the noise scale perturbations"),
        )
        .arg(
            Arg::with_name("inner_iters")
                .long("inner-iters")
                .takes_value(true)
                .help("Passes of each inner run"),
        )
        .arg(
            Arg::with_name("no_mirror")
                .long("no-mirror")
                .help("Disables antithetic sampling in the inner runs"),
        )
        .arg(
            Arg::with_name("shaping")
                .long("shaping")
                .takes_value(true)
                .possible_values(&["centered", "standardized", "ranked"])
                .help("Reward shaping of the inner runs"),
        )
        .arg(
            Arg::with_name("min_sigma")
                .long("min-sigma")
                .takes_value(true)
                .help("Smallest noise scale a candidate trains with"),
        )
        .arg(
            Arg::with_name("meta_seed")
                .long("meta-seed")
                .takes_value(true)
                .help("Seed for the hyperparameter perturbations"),
        )
    }

    fn load_from_args<'a>(&self, args: &ArgMatches<'a>) -> Result<Self::Output> {
        let mut params = match args.value_of("config") {
            Some(path) => load_meta_params(path)?,
            None => MetaParams::default(),
        };

        if let Some(v) = optional(args, "iters")? {
            params.iterations = v;
        }
        if let Some(v) = optional(args, "lambda")? {
            params.population = v;
        }
        if let Some(v) = optional(args, "lr")? {
            params.lr_start = v;
        }
        if let Some(v) = optional(args, "sigma")? {
            params.sigma_start = v;
        }
        if let Some(v) = optional(args, "pop_meta")? {
            params.pop_meta = v;
        }
        if let Some(v) = optional(args, "lr_meta")? {
            params.lr_meta = v;
        }
        if let Some(v) = optional(args, "sigma_meta_lr")? {
            params.sigma_meta_lr = v;
        }
        if let Some(v) = optional(args, "sigma_meta_sigma")? {
            params.sigma_meta_sigma = v;
        }
        if let Some(v) = optional(args, "inner_iters")? {
            params.inner_iterations = v;
        }
        if args.is_present("no_mirror") {
            params.mirrored = false;
        }
        if let Some(v) = args.value_of("shaping") {
            params.shaping = match v {
                "centered" => RewardShaping::Centered,
                "ranked" => RewardShaping::Ranked,
                _ => RewardShaping::Standardized,
            };
        }
        if let Some(v) = optional(args, "min_sigma")? {
            params.min_sigma = v;
        }
        if let Some(v) = optional(args, "meta_seed")? {
            params.seed = v;
        }
        params.check()?;
        Ok(params)
    }
}

/// Reads meta learner settings from a json file.  Missing fields take their defaults.
pub fn load_meta_params(path: &str) -> Result<MetaParams> {
    let f = File::open(path).map_err(|e| BinError::File {
        path: path.into(),
        source: e,
    })?;
    Ok(serde_json::from_reader(f)?)
}

/// Specifies the metadata for the dataset
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetMeta {
    /// Name of training set file
    pub fname: String,
    /// Name of validation set file
    pub vname: Option<String>,
    /// Number of dimensions of the feature vector
    pub dims: usize,
    /// If provided, use mini-batches of the provided size
    pub mini_batch: Option<usize>,
    /// How the evolution strategies reward a model
    pub reward: Reward,
    /// Whether every class weighs the same in the loss
    pub balance: bool,
}

/// Struct defining the dataset arguments using ArgAugmenter
pub struct DatasetArgs;

impl ArgAugmenter for DatasetArgs {
    type Output = DatasetMeta;

    fn add_args<'a, 'b>(&self, app: App<'a, 'b>) -> App<'a, 'b> {
        app.arg(
            Arg::with_name("train")
                .index(1)
                .required(true)
                .help("Training file"),
        )
        .arg(
            Arg::with_name("valid")
                .short("v")
                .long("valid")
                .takes_value(true)
                .help("Use validation data"),
        )
        .arg(
            Arg::with_name("features")
                .long("features")
                .takes_value(true)
                .required(true)
                .help("Number of features in the feature vector"),
        )
        .arg(
            Arg::with_name("minibatch")
                .short("m")
                .long("minibatch")
                .takes_value(true)
                .help("Number of examples to score each pass"),
        )
        .arg(
            Arg::with_name("reward")
                .long("reward")
                .takes_value(true)
                .possible_values(&["accuracy", "neg-loss"])
                .help("What models are rewarded for.  Defaults to accuracy"),
        )
        .arg(
            Arg::with_name("unbalanced")
                .long("unbalanced")
                .help("Weighs examples equally rather than classes"),
        )
    }

    fn load_from_args<'a>(&self, args: &ArgMatches<'a>) -> Result<Self::Output> {
        let fname = required(args, "train")?;
        let reward = match args.value_of("reward") {
            Some("neg-loss") => Reward::NegLoss,
            _ => Reward::Accuracy,
        };

        let dims = required(args, "features")?;
        if dims == 0 {
            return Err(BinError::Arg("--features must be positive".into()));
        }

        Ok(DatasetMeta {
            fname: fname,
            vname: optional(args, "valid")?,
            dims: dims,
            mini_batch: optional(args, "minibatch")?,
            reward: reward,
            balance: !args.is_present("unbalanced"),
        })
    }
}

/// Struct defining the network arguments using ArgAugmenter
pub struct ModelArgs;

impl ArgAugmenter for ModelArgs {
    type Output = ModelParams;

    fn add_args<'a, 'b>(&self, app: App<'a, 'b>) -> App<'a, 'b> {
        app.arg(
            Arg::with_name("hidden_nodes")
                .long("hidden")
                .multiple(true)
                .takes_value(true)
                .help("Sizes of the hidden layers"),
        )
        .arg(
            Arg::with_name("activation")
                .long("activation")
                .takes_value(true)
                .possible_values(&["relu", "sigmoid", "tanh", "elu", "linear"])
                .help("Activation function to use for hidden nodes"),
        )
        .arg(
            Arg::with_name("seed")
                .short("s")
                .long("seed")
                .takes_value(true)
                .help("Random seed for the initial weights"),
        )
        .arg(
            Arg::with_name("save_model")
                .long("save-model")
                .takes_value(true)
                .help("Saves final model to a path"),
        )
        .arg(
            Arg::with_name("load_model")
                .long("load-model")
                .takes_value(true)
                .help("Load model from path"),
        )
    }

    fn load_from_args<'a>(&self, args: &ArgMatches<'a>) -> Result<Self::Output> {
        let mut hidden_nodes = Vec::new();
        if let Some(vals) = args.values_of("hidden_nodes") {
            for v in vals {
                match v.parse() {
                    Ok(n) if n > 0 => hidden_nodes.push(n),
                    _ => return Err(BinError::Arg(format!("bad hidden layer size `{}`", v))),
                }
            }
        }

        let act = args
            .value_of("activation")
            .and_then(parse_activation)
            .unwrap_or(NonLinearity::ReLu);

        Ok(ModelParams {
            hidden_nodes: hidden_nodes,
            act: act,
            seed: optional(args, "seed")?.unwrap_or(2018),
            load_model_path: optional(args, "load_model")?,
            save_model_path: optional(args, "save_model")?,
        })
    }
}

/// Settings of a gradient training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerMeta {
    /// Number of epochs
    pub epochs: usize,
    /// `[lr, beta1, beta2]` for Adam
    pub params: Vec<f32>,
    /// Trainer settings
    pub config: TrainerConfig,
}

/// Struct defining the gradient trainer arguments using ArgAugmenter
pub struct TrainerArgs;

impl ArgAugmenter for TrainerArgs {
    type Output = TrainerMeta;

    fn add_args<'a, 'b>(&self, app: App<'a, 'b>) -> App<'a, 'b> {
        app.arg(
            Arg::with_name("epochs")
                .short("e")
                .long("epochs")
                .takes_value(true)
                .help("Number of passes over the training data"),
        )
        .arg(
            Arg::with_name("lr")
                .long("lr")
                .takes_value(true)
                .help("Adam learning rate.  Defaults to 0.001"),
        )
        .arg(
            Arg::with_name("beta1")
                .long("beta1")
                .takes_value(true)
                .help("Adam first moment decay.  Defaults to 0.9"),
        )
        .arg(
            Arg::with_name("beta2")
                .long("beta2")
                .takes_value(true)
                .help("Adam second moment decay.  Defaults to 0.999"),
        )
        .arg(
            Arg::with_name("batch_size")
                .short("b")
                .long("batch-size")
                .takes_value(true)
                .help("Examples per update"),
        )
        .arg(
            Arg::with_name("validation_split")
                .long("validation-split")
                .takes_value(true)
                .help("Fraction of the training data, from the end, to hold out"),
        )
        .arg(
            Arg::with_name("no_shuffle")
                .long("no-shuffle")
                .help("Keeps the training data in file order"),
        )
    }

    fn load_from_args<'a>(&self, args: &ArgMatches<'a>) -> Result<Self::Output> {
        let defaults = TrainerConfig::default();
        let params = vec![
            optional(args, "lr")?.unwrap_or(0.001),
            optional(args, "beta1")?.unwrap_or(0.9),
            optional(args, "beta2")?.unwrap_or(0.999),
        ];
        let config = TrainerConfig {
            batch_size: optional(args, "batch_size")?.unwrap_or(defaults.batch_size),
            validation_split: optional(args, "validation_split")?
                .unwrap_or(defaults.validation_split),
            shuffle: !args.is_present("no_shuffle"),
            ..defaults
        };

        Ok(TrainerMeta {
            epochs: optional(args, "epochs")?.unwrap_or(10),
            params: params,
            config: config,
        })
    }
}

//! Gradient trained baseline.
//!
//! Trains the same networks the evolution strategies optimize, but with Adam on the
//! back-propagated categorical cross-entropy, so the two can be compared on equal
//! footing.
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use thiserror::Error;
use tracing::{debug, info};

use metaes_data::dataset::LabeledSet;
use metaes_data::intrinsics::scale;
use metaes_data::DataError;
use metaes_models::loss::{is_correct, score};
use metaes_models::nn::Network;
use metaes_models::optim::Adam;
use metaes_models::ModelError;

/// Error conditions of the gradient trainer
#[derive(Debug, Error)]
pub enum TrainerError {
    /// Training parameters must be exactly `[lr, beta1, beta2]`
    #[error("expected 3 training parameters [lr, beta1, beta2], got {0}")]
    InvalidParams(usize),

    /// A setting is out of range
    #[error("invalid {field}: {reason}")]
    Config {
        /// Offending setting
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Error raised by the dataset
    #[error(transparent)]
    Data(#[from] DataError),

    /// Error raised by the model
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Result type of the trainer
pub type Result<T> = std::result::Result<T, TrainerError>;

/// Settings of the gradient trainer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Examples per update
    pub batch_size: usize,
    /// Fraction of the examples, taken from the end, held out for validation
    pub validation_split: f32,
    /// Weighs every class equally in the loss
    pub balance_classes: bool,
    /// Shuffles the training examples every epoch
    pub shuffle: bool,
    /// Seed for the shuffling
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            batch_size: 1,
            validation_split: 0.0,
            balance_classes: true,
            shuffle: true,
            seed: 2019,
        }
    }
}

/// Per epoch metrics of a training run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct History {
    /// Training accuracy of the predictions made before each update
    pub acc: Vec<f32>,
    /// Mean weighted training loss
    pub loss: Vec<f32>,
    /// Validation accuracy at the end of the epoch, if any examples were held out
    pub val_acc: Vec<f32>,
    /// Mean weighted validation loss at the end of the epoch
    pub val_loss: Vec<f32>,
}

/// Trains a network by gradient descent
pub struct GradientTrainer {
    model: Network,
    data: LabeledSet,
    config: TrainerConfig,
    rng: XorShiftRng,
}

impl GradientTrainer {
    /// Creates a trainer over feature rows `x` and label rows `y`, holding its own
    /// copy of `model`.
    pub fn new(model: &Network, x: Vec<Vec<f32>>, y: Vec<Vec<f32>>) -> Result<Self> {
        GradientTrainer::from_dataset(model, LabeledSet::new(x, y)?)
    }

    /// Creates a trainer over an existing dataset
    pub fn from_dataset(model: &Network, data: LabeledSet) -> Result<Self> {
        check_shape(model, &data)?;
        let config = TrainerConfig::default();
        Ok(GradientTrainer {
            model: model.clone(),
            data: data,
            rng: XorShiftRng::seed_from_u64(config.seed),
            config: config,
        })
    }

    /// Copy of the current model
    pub fn model(&self) -> Network {
        self.model.clone()
    }

    /// Replaces the model with a copy of `model`
    pub fn set_model(&mut self, model: &Network) -> Result<()> {
        check_shape(model, &self.data)?;
        self.model = model.clone();
        Ok(())
    }

    /// Current settings
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Changes the provided settings, leaving the others as they are
    pub fn configure(
        &mut self,
        validation_split: Option<f32>,
        batch_size: Option<usize>,
        balance_classes: Option<bool>,
    ) -> Result<()> {
        if let Some(split) = validation_split {
            if !(split >= 0.0 && split < 1.0) {
                return Err(TrainerError::Config {
                    field: "validation_split",
                    reason: format!("must be in [0, 1), got {}", split),
                });
            }
            self.config.validation_split = split;
        }
        if let Some(bs) = batch_size {
            if bs == 0 {
                return Err(TrainerError::Config {
                    field: "batch_size",
                    reason: "must be at least 1".into(),
                });
            }
            self.config.batch_size = bs;
        }
        if let Some(balance) = balance_classes {
            self.config.balance_classes = balance;
        }
        Ok(())
    }

    /// Replaces all the settings at once, reseeding the shuffling
    pub fn with_config(mut self, config: TrainerConfig) -> Result<Self> {
        self.configure(
            Some(config.validation_split),
            Some(config.batch_size),
            Some(config.balance_classes),
        )?;
        self.config = config;
        self.rng = XorShiftRng::seed_from_u64(config.seed);
        Ok(self)
    }

    /// Trains for `iterations` epochs, returning the training accuracy of each epoch.
    /// `params` is `[lr, beta1, beta2]` for Adam.
    pub fn train(&mut self, iterations: usize, params: &[f32], verbose: bool) -> Result<Vec<f32>> {
        Ok(self.fit(iterations, params, verbose)?.acc)
    }

    /// Trains for `iterations` epochs, returning the full metric history
    pub fn fit(&mut self, iterations: usize, params: &[f32], verbose: bool) -> Result<History> {
        if params.len() != 3 {
            return Err(TrainerError::InvalidParams(params.len()));
        }
        let mut adam = Adam::new(params[0], params[1], params[2]);

        let weights = if self.config.balance_classes {
            self.data.balanced_weights()
        } else {
            vec![1.0; self.data.len()]
        };
        let (train, valid) = self.data.split_validation(self.config.validation_split)?;
        if train.is_empty() {
            return Err(TrainerError::Config {
                field: "data",
                reason: "no training examples".into(),
            });
        }
        let (train_w, valid_w) = weights.split_at(train.len());

        let mut params = self.model.get_weights();
        let mut grads = vec![0f32; params.len()];
        let mut history = History::default();

        for epoch in 0..iterations {
            let batches = train.minibatches(self.config.batch_size, self.config.shuffle, &mut self.rng);

            let mut correct = 0usize;
            let mut total_loss = 0.0;
            for batch in batches.iter() {
                for g in grads.iter_mut() {
                    *g = 0.0;
                }

                for &i in batch.iter() {
                    let (out, loss) =
                        self.model
                            .backward(&train.x()[i], &train.y()[i], train_w[i], &mut grads)?;
                    if is_correct(&out, &train.y()[i]) {
                        correct += 1;
                    }
                    total_loss += train_w[i] * loss;
                }

                scale(&mut grads, 1.0 / batch.len() as f32);
                adam.step(&mut params, &grads);
                self.model.set_weights(&params)?;
            }

            let acc = correct as f32 / train.len() as f32;
            let loss = total_loss / train.len() as f32;
            history.acc.push(acc);
            history.loss.push(loss);

            if valid.is_empty() {
                report(verbose, format_args!("Epoch {}: acc {}, loss {}", epoch, acc, loss));
            } else {
                let s = score(&self.model, &valid, Some(valid_w), None);
                history.val_acc.push(s.accuracy);
                history.val_loss.push(s.loss);
                report(
                    verbose,
                    format_args!(
                        "Epoch {}: acc {}, loss {}, val_acc {}, val_loss {}",
                        epoch, acc, loss, s.accuracy, s.loss
                    ),
                );
            }
        }

        Ok(history)
    }
}

fn report(verbose: bool, msg: std::fmt::Arguments) {
    if verbose {
        info!("{}", msg);
    } else {
        debug!("{}", msg);
    }
}

fn check_shape(model: &Network, data: &LabeledSet) -> Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    if data.dims() != model.input_dims() {
        return Err(ModelError::Width {
            what: "features",
            expected: model.input_dims(),
            got: data.dims(),
        }
        .into());
    }
    if data.n_classes() != model.output_dims() {
        return Err(ModelError::Width {
            what: "labels",
            expected: model.output_dims(),
            got: data.n_classes(),
        }
        .into());
    }
    Ok(())
}

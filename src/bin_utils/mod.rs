//! Defines methods that can be shared by the meta-es and grad-train binaries
use std::io;

use thiserror::Error;

use metaes_core::error::EsError;
use metaes_data::DataError;
use metaes_models::ModelError;

use crate::trainer::TrainerError;

/// Methods for reading arguments
pub mod args;
/// Methods for loading data and models
pub mod loaders;
/// Structs to capture model parameters
pub mod model_params;

/// Errors raised while setting up or running a binary
#[derive(Debug, Error)]
pub enum BinError {
    /// A command line argument is missing or malformed
    #[error("bad argument: {0}")]
    Arg(String),

    /// A file could not be opened
    #[error("{path}: {source}")]
    File {
        /// Path of the file
        path: String,
        /// Underlying error
        source: io::Error,
    },

    /// A json config could not be parsed
    #[error("unable to parse config: {0}")]
    Json(#[from] serde_json::Error),

    /// Dataset error
    #[error(transparent)]
    Data(#[from] DataError),

    /// Model error
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Optimizer error
    #[error(transparent)]
    Es(#[from] EsError),

    /// Gradient trainer error
    #[error(transparent)]
    Trainer(#[from] TrainerError),
}

/// Result type of the binary helpers
pub type Result<T> = std::result::Result<T, BinError>;

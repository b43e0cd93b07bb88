//! Library for labelled dataset methods
#![warn(missing_docs, unused)]

#[macro_use]
extern crate serde_derive;

use std::io;

use thiserror::Error;

/// Labelled datasets, class balancing and minibatching
pub mod dataset;
/// Helper methods for vector arithmetic
pub mod intrinsics;
/// Defines methods for loading data from a file
pub mod load;

/// Errors raised while building or loading datasets
#[derive(Debug, Error)]
pub enum DataError {
    /// Reading the file failed
    #[error("unable to read dataset: {0}")]
    Io(#[from] io::Error),

    /// A line could not be parsed
    #[error("line {line}: {reason}")]
    Parse {
        /// One-based line number
        line: usize,
        /// What went wrong
        reason: String,
    },

    /// Rows and labels don't line up
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// A setting is out of range
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Name of the setting
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Result type for dataset operations
pub type Result<T> = std::result::Result<T, DataError>;

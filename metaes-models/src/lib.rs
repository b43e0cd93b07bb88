//! Library defining the models trained by MetaES
#![warn(missing_docs, unused)]

#[macro_use]
extern crate serde_derive;

use thiserror::Error;

/// Loss and accuracy helpers
pub mod loss;
/// Defines neural networks
pub mod nn;
/// Gradient based parameter updates
pub mod optim;

use metaes_data::intrinsics::inplace_sum;

/// Error conditions for building, updating and serializing models
#[derive(Debug, Error)]
pub enum ModelError {
    /// Error when reading or writing the json
    #[error("unable to (de)serialize model: {0}")]
    SerDe(#[from] serde_json::Error),

    /// A flat weight vector has the wrong length
    #[error("expected {expected} weights, got {got}")]
    WeightCount {
        /// Weights in the model
        expected: usize,
        /// Weights provided
        got: usize,
    },

    /// A payload or target has the wrong width
    #[error("expected {expected} values for {what}, got {got}")]
    Width {
        /// Which input was wrong
        what: &'static str,
        /// Width the model needs
        expected: usize,
        /// Width provided
        got: usize,
    },

    /// The operation isn't defined for this model configuration
    #[error("unsupported: {0}")]
    Unsupported(String),
}

// We make proxy versions of standard updates since we can't directly
// implement the traits for slices from another library.
// This takes in a noise function which generates new values into a vector.
/// Method to update a vector in place
fn update_vec<F>(x: &mut [f32], f: &mut F)
where
    F: FnMut() -> f32,
{
    for e in x.iter_mut() {
        *e = f();
    }
}

/// Method to copy from one vector to another
fn copy_vec(from: &[f32], other: &mut [f32]) {
    assert_eq!(from.len(), other.len());
    other.copy_from_slice(from);
}

/// Method to add two vectors in place
fn add_vec(into: &mut [f32], other: &[f32]) {
    inplace_sum(into, other);
}

//! MetaES-Core
//! ===
//!
//! This library contains the components for optimizing models with black-box
//! evolution strategies, and for tuning the strategy itself with a second,
//! outer strategy.
//!
//! Evolution Strategies
//! ---
//!
//! The inner optimizer is a (1+λ) Evolution Strategy in the style of Salimans et al:
//! λ noise vectors are sampled around the current parameters, each perturbed model
//! is scored by an `Environment`, and the parameters move along the reward-weighted
//! average of the noise.  Rewards can be centered, z-whitened, or rank shaped
//! (Wierstra et al.) before blending, and antithetic (mirrored) sampling halves the
//! variance of the estimate.
//!
//! Meta Learning
//! ---
//!
//! The `MetaLearner` wraps the inner optimizer in an outer loop which perturbs the
//! learning rate and noise scale, runs a short inner optimization for each
//! candidate, and moves the hyperparameters along the reward-weighted noise.  The
//! best candidate's weights are carried into the next round.
//!

#![warn(missing_docs, unused)]

#[macro_use]
extern crate serde_derive;

/// Error conditions raised by the optimizers
pub mod error;

/// Defines the interfaces for Model types for use in neuro-evolution optimizers.
pub mod model;

/// Defines interfaces for Environments and States
pub mod optimizer;

/// Defines the inner evolution strategy optimizer
pub mod es;

/// Defines the outer loop which tunes the evolution strategy
pub mod meta;

#[cfg(test)]
mod testing;

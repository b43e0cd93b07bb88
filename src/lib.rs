//! MetaES
//!
//! MetaES is a library and a set of executables to train classifiers with evolution
//! strategies whose learning rate and noise scale are themselves learned, along with
//! a gradient trained baseline to compare against.
#![warn(missing_docs, unused)]

#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate clap;

use tracing_subscriber::EnvFilter;

/// Tools for binaries
pub mod bin_utils;
/// Environments scoring classifiers
pub mod env;
/// Example environment
pub mod example;
/// Gradient trained baseline
pub mod trainer;

/// Installs the log subscriber used by the binaries.  The `RUST_LOG` variable
/// overrides `default_level`.
pub fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A subscriber may already be installed, e.g. by a test harness
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

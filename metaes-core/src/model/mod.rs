/// Noise samplers for models implementing `WeightUpdater`
pub mod sampler;

use std::io::{Read, Write};

/// Builds empty models of a fixed shape.  The zero model doubles as the zero gradient.
pub trait Initializer {
    /// Type of model produced
    type Model: Clone + Send + Sync;

    /// Returns a model with every weight set to zero
    fn zero(&self) -> Self::Model;
}

/// Evaluates a model with a given payload to a given output
pub trait Evaluator<Payload: ?Sized, Output: ?Sized>: Sync {
    /// Runs the model forward on the payload
    fn evaluate(&self, payload: &Payload) -> Output;
}

/// Updates a given model's weights.  Gradients and models share a representation,
/// so the same operations are used to build, blend, and apply search directions.
pub trait WeightUpdater {
    #[inline]
    /// Total number of trainable weights
    fn num_weights(&self) -> usize;

    #[inline]
    /// Overwrites every weight with successive values from `f`
    fn update_gradients<F>(&mut self, f: &mut F) -> ()
    where
        F: FnMut() -> f32;

    #[inline]
    /// Multiplies every weight by `f`
    fn scale_gradients(&mut self, f: f32) -> ();

    #[inline]
    /// Copies these weights into `other`
    fn copy_gradients(&self, other: &mut Self) -> ();

    #[inline]
    /// Adds `other` to these weights
    fn add_gradients(&mut self, other: &Self) -> ();
}

/// Updates a model with a gradient
pub trait GradientFuser<A> {
    /// Writes `self + grad` into `into`
    fn update(&self, grad: &A, into: &mut Self) -> ();
}

/// Serialization for models
pub trait SerDe: Sized {
    /// Error conditions due to writing
    type Error;

    /// Writes out a model to writer
    fn save<A: Write>(&self, writer: &mut A) -> Result<(), Self::Error>;

    /// Loads a model from a reader.  All necessary metadata should be
    /// stored within the model
    fn load<A: Read>(reader: &mut A) -> Result<Self, Self::Error>;
}

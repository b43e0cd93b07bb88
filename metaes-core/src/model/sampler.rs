use rand::distributions::{Distribution, Normal, Uniform};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

use crate::error::{EsError, Result};
use crate::model::{GradientFuser, Initializer, WeightUpdater};
use crate::optimizer::{Environment, GradientSampler};

/// Samples Gaussian search directions for any model built by an `Initializer`.
///
/// Each weight is drawn from `N(0, sd)` with probability `p` and left at zero
/// otherwise.  The optimizers scale the direction by their own noise scale, so the
/// usual setting is `sd = 1` and `p = 1`.
pub struct ModelGS<B>
where
    B: Initializer,
{
    p: f32,
    fixed_mask: bool,
    n: Normal,
    uniform: Uniform<f32>,
    rng: XorShiftRng,
    builder: B,
}

impl<B> ModelGS<B>
where
    B: Initializer,
{
    /// Creates a new sampler.  With `fixed_mask`, the sparsity pattern is derived
    /// from the pass number so every child of a pass perturbs the same weights.
    pub fn new(b: B, mask: f32, sd: f32, fixed_mask: bool, seed: u32) -> Result<Self> {
        if !(sd.is_finite() && sd >= 0.0) {
            return Err(EsError::config(
                "sd",
                format!("must be finite and non-negative, got {}", sd),
            ));
        }
        if !(mask > 0.0 && mask <= 1.0) {
            return Err(EsError::config("mask", format!("must be in (0, 1], got {}", mask)));
        }
        Ok(ModelGS::build(b, mask, sd, fixed_mask, seed))
    }

    /// Dense standard-normal sampler
    pub fn standard(b: B, seed: u32) -> Self {
        ModelGS::build(b, 1.0, 1.0, false, seed)
    }

    fn build(b: B, mask: f32, sd: f32, fixed_mask: bool, seed: u32) -> Self {
        ModelGS {
            p: mask,
            fixed_mask: fixed_mask,
            n: Normal::new(0.0, sd as f64),
            uniform: Uniform::new_inclusive(0.0, 1.0),
            rng: XorShiftRng::seed_from_u64(seed as u64),
            builder: b,
        }
    }
}

impl<B: Send + Sync, E> GradientSampler<B::Model, E> for ModelGS<B>
where
    B: Initializer,
    B::Model: Clone + WeightUpdater + GradientFuser<B::Model> + Send + Sync,
    E: Environment<B::Model>,
{
    type Gradient = B::Model;

    fn zero_gradient(&self) -> Self::Gradient {
        self.builder.zero()
    }

    fn generate(&mut self, _env: &E, _s: &B::Model, g: &mut Self::Gradient, seed: usize) -> () {
        let p = self.p;
        let n = &self.n;
        let uniform = &self.uniform;
        let rng = &mut self.rng;
        if p == 1.0 {
            g.update_gradients(&mut || n.sample(&mut *rng) as f32);
        } else if self.fixed_mask {
            let mut mask_rng = XorShiftRng::seed_from_u64(seed as u64);
            g.update_gradients(&mut || {
                if uniform.sample(&mut mask_rng) < p {
                    n.sample(&mut *rng) as f32
                } else {
                    0.0
                }
            });
        } else {
            g.update_gradients(&mut || {
                if uniform.sample(&mut *rng) < p {
                    n.sample(&mut *rng) as f32
                } else {
                    0.0
                }
            });
        }
    }

    fn apply(&self, s: &B::Model, g: &Self::Gradient, ns: &mut B::Model) -> () {
        s.update(g, ns);
    }
}

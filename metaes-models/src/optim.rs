//! Adam optimizer over flat parameter vectors

use metaes_data::intrinsics::axpy;

/// Adam optimizer (Kingma & Ba) with optional learning rate decay.
///
/// Uses the bias-corrected step size
/// `lr_t = lr * sqrt(1 - β2^t) / (1 - β1^t)` and the update
/// `θ -= lr_t * m / (sqrt(v) + ε)`.
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    decay: f32,
    t: u64,
    m: Vec<f32>,
    v: Vec<f32>,
}

impl Adam {
    /// Creates an Adam optimizer with ε = 1e-7 and no decay
    pub fn new(lr: f32, beta1: f32, beta2: f32) -> Self {
        Adam {
            lr: lr,
            beta1: beta1,
            beta2: beta2,
            epsilon: 1e-7,
            decay: 0.0,
            t: 0,
            m: Vec::new(),
            v: Vec::new(),
        }
    }

    /// Sets the numerical stability constant
    pub fn with_epsilon(mut self, epsilon: f32) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Sets the per-step learning rate decay, `lr / (1 + decay * t)`
    pub fn with_decay(mut self, decay: f32) -> Self {
        self.decay = decay;
        self
    }

    /// Number of steps taken
    pub fn step_count(&self) -> u64 {
        self.t
    }

    /// Applies one update given the gradient of the loss
    pub fn step(&mut self, params: &mut [f32], grads: &[f32]) {
        assert_eq!(params.len(), grads.len());
        if self.m.len() != params.len() {
            self.m = vec![0f32; params.len()];
            self.v = vec![0f32; params.len()];
        }

        let lr = if self.decay > 0.0 {
            self.lr / (1.0 + self.decay * self.t as f32)
        } else {
            self.lr
        };
        self.t += 1;
        let t = self.t as i32;
        let lr_t = lr * (1.0 - self.beta2.powi(t)).sqrt() / (1.0 - self.beta1.powi(t));

        // m = β1 m + (1 - β1) g
        for m in self.m.iter_mut() {
            *m *= self.beta1;
        }
        axpy(1.0 - self.beta1, grads, &mut self.m);

        // v = β2 v + (1 - β2) g²
        for (v, g) in self.v.iter_mut().zip(grads.iter()) {
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
        }

        for ((p, m), v) in params.iter_mut().zip(self.m.iter()).zip(self.v.iter()) {
            *p -= lr_t * m / (v.sqrt() + self.epsilon);
        }
    }
}

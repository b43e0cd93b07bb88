//! Defines a fully connected neural network for use with MetaES
use std::f32::consts::E;
use std::io::{Read, Write};

use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

use metaes_core::model::SerDe;
use metaes_core::model::{Evaluator, GradientFuser, Initializer, WeightUpdater};
use metaes_data::intrinsics::{dot, inplace_sum, scale, sum};

use crate::loss::cross_entropy;
use crate::ModelError;

use super::*;

#[derive(Serialize, Deserialize, Clone, Debug, Copy, PartialEq)]
/// Defines the different types of functions between layers
pub enum NonLinearity {
    /// ReLu
    ReLu,

    /// Tanh
    Tanh,

    /// Linear. Note this isn't non-linear
    Linear,

    /// Sigmoid
    Sigmoid,

    /// ELU
    ELU,

    /// Softmax over the whole layer.  Only meaningful on the output layer
    Softmax,
}

impl NonLinearity {
    #[inline]
    /// Applies the specified function to a single unit
    fn eval(&self, f: f32) -> f32 {
        use self::NonLinearity::*;
        match self {
            &ReLu => f.max(0f32),
            &Tanh => f.tanh(),
            &Sigmoid => 1. / (1. + E.powf(-f)),
            &Linear | &Softmax => f,
            &ELU => {
                if f > 0. {
                    f
                } else {
                    f.exp() - 1.
                }
            }
        }
    }

    #[inline]
    /// Derivative expressed in terms of the unit's output
    fn derivative(&self, out: f32) -> f32 {
        use self::NonLinearity::*;
        match self {
            &ReLu => {
                if out > 0. {
                    1.
                } else {
                    0.
                }
            }
            &Tanh => 1. - out * out,
            &Sigmoid => out * (1. - out),
            &Linear => 1.,
            &ELU => {
                if out > 0. {
                    1.
                } else {
                    out + 1.
                }
            }
            // Softmax is only handled jointly with cross-entropy
            &Softmax => 1.,
        }
    }

    /// Applies the function to a full layer output
    fn activate(&self, out: &mut [f32]) {
        match self {
            NonLinearity::Softmax => softmax(out),
            nl => {
                for o in out.iter_mut() {
                    *o = nl.eval(*o);
                }
            }
        }
    }
}

/// Numerically stable softmax, in place
pub fn softmax(v: &mut [f32]) {
    let max = v.iter().cloned().fold(std::f32::NEG_INFINITY, f32::max);
    let mut total = 0.;
    for x in v.iter_mut() {
        *x = (*x - max).exp();
        total += *x;
    }
    scale(v, 1. / total);
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
/// Represents a layer of a neural network
struct Layer {
    /// The weights of the layer, one row per output unit
    w: Vec<Vec<f32>>,
    /// The bias
    bias: Vec<f32>,
    /// The type of non-linearity to apply
    nl: NonLinearity,
}

impl Layer {
    /// Creates a new layer
    pub fn new(input_dim: usize, hidden_dims: usize, nl: NonLinearity) -> Self {
        let w = (0..hidden_dims).map(|_x| vec![0f32; input_dim]).collect();

        Layer {
            w: w,
            bias: vec![0f32; hidden_dims],
            nl: nl,
        }
    }

    /// Gets the dimensions of the layer
    fn dims(&self) -> (usize, usize) {
        (self.w[0].len(), self.bias.len())
    }

    /// Given a dense payload, applies the weights, bias, and non-linearity to it
    fn eval(&self, payload: &[f32], output: &mut [f32]) -> () {
        for i in 0..self.w.len() {
            output[i] = dot(&self.w[i], payload);
        }

        inplace_sum(&mut output[0..self.bias.len()], &self.bias);
        self.nl.activate(output);
    }
}

impl WeightUpdater for Layer {
    #[inline]
    fn num_weights(&self) -> usize {
        self.w.len() * (self.w[0].len() + 1)
    }

    fn update_gradients<F>(&mut self, f: &mut F) -> ()
    where
        F: FnMut() -> f32,
    {
        for r in self.w.iter_mut() {
            update_vec(r, f);
        }

        update_vec(&mut self.bias, f);
    }

    fn scale_gradients(&mut self, s: f32) -> () {
        for r in self.w.iter_mut() {
            scale(r, s);
        }

        scale(&mut self.bias, s);
    }

    fn copy_gradients(&self, other: &mut Self) {
        assert_eq!(self.num_weights(), other.num_weights());
        for i in 0..self.w.len() {
            copy_vec(&self.w[i], &mut other.w[i]);
        }
        copy_vec(&self.bias, &mut other.bias);
    }

    fn add_gradients(&mut self, other: &Self) {
        assert_eq!(self.num_weights(), other.num_weights());
        for i in 0..self.w.len() {
            add_vec(&mut self.w[i], &other.w[i]);
        }
        add_vec(&mut self.bias, &other.bias);
    }
}

impl GradientFuser<Layer> for Layer {
    fn update(&self, grad: &Layer, into: &mut Self) -> () {
        assert_eq!(self.w.len(), grad.w.len());
        assert_eq!(self.bias.len(), grad.bias.len());

        for i in 0..self.w.len() {
            sum(&self.w[i], &grad.w[i], &mut into.w[i]);
        }

        sum(&self.bias, &grad.bias, &mut into.bias);
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
/// Representation of a full network
pub struct Network {
    /// All the layers
    layers: Vec<Layer>,
}

impl Network {
    /// Initializes a zeroed network.  Every layer but the last uses `nl`; the last
    /// layer uses `output`.
    pub fn new(input_dim: usize, sizes: &[usize], nl: NonLinearity, output: NonLinearity) -> Self {
        assert!(!sizes.is_empty());
        let mut input = input_dim;
        let mut layers = Vec::with_capacity(sizes.len());
        for (i, &s) in sizes.iter().enumerate() {
            let lnl = if i + 1 == sizes.len() { output } else { nl };
            layers.push(Layer::new(input, s, lnl));
            input = s;
        }

        Network { layers: layers }
    }

    /// Width of the input vector
    pub fn input_dims(&self) -> usize {
        self.layers[0].dims().0
    }

    /// Width of the output vector
    pub fn output_dims(&self) -> usize {
        self.layers[self.layers.len() - 1].dims().1
    }

    /// Activation of the hidden layers
    pub fn hidden_activation(&self) -> NonLinearity {
        self.layers[0].nl
    }

    /// Activation of the output layer
    pub fn output_activation(&self) -> NonLinearity {
        self.layers[self.layers.len() - 1].nl
    }

    /// Output sizes of every layer
    pub fn sizes(&self) -> Vec<usize> {
        self.layers.iter().map(|l| l.bias.len()).collect()
    }

    // Outputs of every layer, starting with the payload itself
    fn trace(&self, payload: &[f32]) -> Vec<Vec<f32>> {
        let mut acts = Vec::with_capacity(self.layers.len() + 1);
        acts.push(payload.to_vec());
        for layer in self.layers.iter() {
            let mut out = vec![0f32; layer.bias.len()];
            layer.eval(&acts[acts.len() - 1], &mut out);
            acts.push(out);
        }
        acts
    }

    /// Runs the network forward
    pub fn forward(&self, payload: &[f32]) -> Vec<f32> {
        assert_eq!(payload.len(), self.input_dims());
        let mut input = payload.to_vec();
        for layer in self.layers.iter() {
            let mut out = vec![0f32; layer.bias.len()];
            layer.eval(&input, &mut out);
            input = out;
        }
        input
    }

    /// Flattens all the weights, layer by layer: each row of weights, then the bias
    pub fn get_weights(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.num_weights());
        for layer in self.layers.iter() {
            for r in layer.w.iter() {
                out.extend_from_slice(r);
            }
            out.extend_from_slice(&layer.bias);
        }
        out
    }

    /// Loads weights in the layout produced by `get_weights`
    pub fn set_weights(&mut self, weights: &[f32]) -> Result<(), ModelError> {
        if weights.len() != self.num_weights() {
            return Err(ModelError::WeightCount {
                expected: self.num_weights(),
                got: weights.len(),
            });
        }
        let mut it = weights.iter();
        self.update_gradients(&mut || *it.next().unwrap_or(&0.0));
        Ok(())
    }

    /// Backpropagates the categorical cross-entropy of a softmax output.
    ///
    /// Adds `weight * dLoss/dθ` into `grads`, which uses the `get_weights` layout, and
    /// returns the network output with the unweighted loss.
    pub fn backward(
        &self,
        payload: &[f32],
        target: &[f32],
        weight: f32,
        grads: &mut [f32],
    ) -> Result<(Vec<f32>, f32), ModelError> {
        if self.output_activation() != NonLinearity::Softmax {
            return Err(ModelError::Unsupported(format!(
                "cross-entropy needs a Softmax output layer, found {:?}",
                self.output_activation()
            )));
        }
        if payload.len() != self.input_dims() {
            return Err(ModelError::Width {
                what: "payload",
                expected: self.input_dims(),
                got: payload.len(),
            });
        }
        if target.len() != self.output_dims() {
            return Err(ModelError::Width {
                what: "target",
                expected: self.output_dims(),
                got: target.len(),
            });
        }
        if grads.len() != self.num_weights() {
            return Err(ModelError::WeightCount {
                expected: self.num_weights(),
                got: grads.len(),
            });
        }

        let acts = self.trace(payload);
        let output = acts[acts.len() - 1].clone();
        let loss = cross_entropy(&output, target);

        // Softmax + cross-entropy: dL/dz = p * Σt - t
        let t_sum: f32 = target.iter().sum();
        let mut delta: Vec<f32> = output
            .iter()
            .zip(target.iter())
            .map(|(p, t)| weight * (p * t_sum - t))
            .collect();

        let mut offsets = Vec::with_capacity(self.layers.len());
        let mut offset = 0;
        for layer in self.layers.iter() {
            offsets.push(offset);
            offset += layer.num_weights();
        }

        for l in (0..self.layers.len()).rev() {
            let layer = &self.layers[l];
            let input = &acts[l];
            let (in_dim, out_dim) = layer.dims();
            let base = offsets[l];

            for j in 0..out_dim {
                let row = &mut grads[base + j * in_dim..base + (j + 1) * in_dim];
                for i in 0..in_dim {
                    row[i] += delta[j] * input[i];
                }
                grads[base + out_dim * in_dim + j] += delta[j];
            }

            if l > 0 {
                let prev_nl = self.layers[l - 1].nl;
                delta = (0..in_dim)
                    .map(|i| {
                        let back: f32 = (0..out_dim).map(|j| layer.w[j][i] * delta[j]).sum();
                        back * prev_nl.derivative(input[i])
                    })
                    .collect();
            }
        }

        Ok((output, loss))
    }
}

impl Evaluator<[f32], Vec<f32>> for Network {
    fn evaluate(&self, payload: &[f32]) -> Vec<f32> {
        self.forward(payload)
    }
}

impl WeightUpdater for Network {
    fn num_weights(&self) -> usize {
        self.layers.iter().map(|l| l.num_weights()).sum()
    }

    fn update_gradients<F>(&mut self, f: &mut F) -> ()
    where
        F: FnMut() -> f32,
    {
        for l in self.layers.iter_mut() {
            l.update_gradients(f);
        }
    }

    fn scale_gradients(&mut self, s: f32) -> () {
        for l in self.layers.iter_mut() {
            l.scale_gradients(s);
        }
    }

    fn copy_gradients(&self, other: &mut Self) {
        assert_eq!(self.num_weights(), other.num_weights());
        for i in 0..self.layers.len() {
            self.layers[i].copy_gradients(&mut other.layers[i]);
        }
    }

    fn add_gradients(&mut self, other: &Self) {
        assert_eq!(self.num_weights(), other.num_weights());
        for i in 0..self.layers.len() {
            self.layers[i].add_gradients(&other.layers[i]);
        }
    }
}

impl GradientFuser<Network> for Network {
    fn update(&self, grad: &Network, into: &mut Self) -> () {
        assert_eq!(self.num_weights(), grad.num_weights());
        assert_eq!(self.num_weights(), into.num_weights());
        for i in 0..self.layers.len() {
            self.layers[i].update(&grad.layers[i], &mut into.layers[i]);
        }
    }
}

/// Shape of a neural network model
#[derive(Clone, Debug, PartialEq)]
pub struct NNModel {
    /// Size of the input dimensions
    input_dims: usize,
    /// Output size of every layer, the last being the output layer
    sizes: Vec<usize>,
    /// Type of non-linearity to apply between layers
    nl: NonLinearity,
    /// Type of non-linearity to apply on the output
    output: NonLinearity,
}

impl NNModel {
    /// Describes a network mapping `input_dims` features to the last of `sizes`
    pub fn new(input_dims: usize, sizes: &[usize], nl: NonLinearity, output: NonLinearity) -> Self {
        assert!(input_dims > 0);
        assert!(!sizes.is_empty());
        sizes.iter().for_each(|d| assert!(*d > 0));
        NNModel {
            input_dims: input_dims,
            sizes: sizes.to_vec(),
            nl: nl,
            output: output,
        }
    }

    /// A classifier with the given hidden layers and a softmax over `n_classes`
    pub fn classifier(input_dims: usize, hidden: &[usize], nl: NonLinearity, n_classes: usize) -> Self {
        let mut sizes = hidden.to_vec();
        sizes.push(n_classes);
        NNModel::new(input_dims, &sizes, nl, NonLinearity::Softmax)
    }

    /// Recovers the shape of an existing network
    pub fn from_network(network: &Network) -> Self {
        NNModel::new(
            network.input_dims(),
            &network.sizes(),
            network.hidden_activation(),
            network.output_activation(),
        )
    }

    /// Builds a network with Glorot uniform weights and zero bias
    pub fn init(&self, seed: u32) -> Network {
        let mut network = self.zero();
        let mut prng = XorShiftRng::seed_from_u64(seed as u64);
        for layer in network.layers.iter_mut() {
            let (fan_in, fan_out) = layer.dims();
            let limit = (6. / (fan_in + fan_out) as f32).sqrt();
            let uniform = Uniform::new_inclusive(-limit, limit);
            for r in layer.w.iter_mut() {
                update_vec(r, &mut || uniform.sample(&mut prng));
            }
        }
        network
    }
}

impl Initializer for NNModel {
    type Model = Network;

    fn zero(&self) -> Self::Model {
        Network::new(self.input_dims, &self.sizes, self.nl, self.output)
    }
}

impl Network {
    // Layers must be non-empty, rectangular and chain into each other
    fn check_shape(&self) -> Result<(), ModelError> {
        if self.layers.is_empty() || self.layers.iter().any(|l| l.w.is_empty()) {
            return Err(ModelError::Unsupported("network has an empty layer".into()));
        }
        let mut width = self.layers[0].w[0].len();
        if width == 0 {
            return Err(ModelError::Unsupported("network has no inputs".into()));
        }
        for layer in self.layers.iter() {
            if let Some(row) = layer.w.iter().find(|r| r.len() != width) {
                return Err(ModelError::Width {
                    what: "layer inputs",
                    expected: width,
                    got: row.len(),
                });
            }
            if layer.bias.len() != layer.w.len() {
                return Err(ModelError::Width {
                    what: "bias",
                    expected: layer.w.len(),
                    got: layer.bias.len(),
                });
            }
            width = layer.w.len();
        }
        Ok(())
    }
}

impl SerDe for Network {
    type Error = ModelError;

    fn save<A: Write>(&self, writer: &mut A) -> Result<(), Self::Error> {
        Ok(serde_json::to_writer(writer, &self)?)
    }

    fn load<A: Read>(reader: &mut A) -> Result<Self, Self::Error> {
        let network: Network = serde_json::from_reader(reader)?;
        network.check_shape()?;
        Ok(network)
    }
}

#[cfg(test)]
mod test_nn {
    use super::*;
    use crate::loss::cross_entropy;

    fn small() -> Network {
        NNModel::classifier(3, &[4], NonLinearity::Tanh, 2).init(17)
    }

    #[test]
    fn test_weights_layout() {
        let mut network = Network::new(5, &[2, 3], NonLinearity::ReLu, NonLinearity::Softmax);
        assert_eq!(network.num_weights(), 2 * 6 + 3 * 3);

        let w: Vec<f32> = (0..network.num_weights()).map(|i| i as f32).collect();
        network.set_weights(&w).unwrap();
        assert_eq!(network.get_weights(), w);
        assert_eq!(network.layers[0].w[1][0], 5.0);
        assert_eq!(network.layers[0].bias, vec![10.0, 11.0]);

        match network.set_weights(&w[1..]) {
            Err(ModelError::WeightCount { expected, got }) => {
                assert_eq!(expected, 21);
                assert_eq!(got, 20);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_softmax_output() {
        let network = small();
        let out = network.forward(&[0.5, -1.0, 2.0]);
        assert_eq!(out.len(), 2);
        assert!((out.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(out.iter().all(|p| *p > 0.0));
        assert_eq!(network.evaluate(&[0.5, -1.0, 2.0][..]), out);
    }

    #[test]
    fn test_init_is_seeded_and_bounded() {
        let model = NNModel::classifier(3, &[4], NonLinearity::Tanh, 2);
        assert_eq!(model.init(1), model.init(1));
        assert_ne!(model.init(1), model.init(2));

        let limit = (6f32 / 7.).sqrt();
        let network = model.init(1);
        assert!(network.layers[0].w.iter().flatten().all(|w| w.abs() <= limit));
        assert!(network.layers[0].bias.iter().all(|b| *b == 0.0));
        assert_eq!(NNModel::from_network(&network), model);
    }

    #[test]
    fn test_backward_matches_finite_differences() {
        let network = small();
        let x = [0.3, -0.7, 1.1];
        let y = [0.0, 1.0];
        let mut grads = vec![0f32; network.num_weights()];
        let (out, loss) = network.backward(&x, &y, 1.0, &mut grads).unwrap();
        assert_eq!(out, network.forward(&x));
        assert!((loss - cross_entropy(&out, &y)).abs() < 1e-6);

        let w = network.get_weights();
        let h = 1e-2;
        for i in 0..w.len() {
            let mut plus = network.clone();
            let mut wp = w.clone();
            wp[i] += h;
            plus.set_weights(&wp).unwrap();

            let mut minus = network.clone();
            let mut wm = w.clone();
            wm[i] -= h;
            minus.set_weights(&wm).unwrap();

            let numeric = (cross_entropy(&plus.forward(&x), &y)
                - cross_entropy(&minus.forward(&x), &y))
                / (2. * h);
            assert!(
                (numeric - grads[i]).abs() < 1e-3,
                "weight {}: numeric {} vs analytic {}",
                i,
                numeric,
                grads[i]
            );
        }
    }

    #[test]
    fn test_backward_accumulates_weighted() {
        let network = small();
        let x = [0.3, -0.7, 1.1];
        let y = [1.0, 0.0];
        let mut once = vec![0f32; network.num_weights()];
        network.backward(&x, &y, 2.0, &mut once).unwrap();

        let mut twice = vec![0f32; network.num_weights()];
        network.backward(&x, &y, 1.0, &mut twice).unwrap();
        network.backward(&x, &y, 1.0, &mut twice).unwrap();

        for (a, b) in once.iter().zip(twice.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_backward_rejects_bad_input() {
        let linear = Network::new(3, &[2], NonLinearity::Tanh, NonLinearity::Linear);
        let mut grads = vec![0f32; linear.num_weights()];
        assert!(linear.backward(&[0.; 3], &[1., 0.], 1.0, &mut grads).is_err());

        let network = small();
        let mut grads = vec![0f32; network.num_weights()];
        assert!(network.backward(&[0.; 2], &[1., 0.], 1.0, &mut grads).is_err());
        assert!(network.backward(&[0.; 3], &[1.], 1.0, &mut grads).is_err());
    }

    #[test]
    fn test_gradient_fusion() {
        let network = small();
        let mut grad = NNModel::from_network(&network).zero();
        grad.update_gradients(&mut || 1.0);
        grad.scale_gradients(0.5);

        let mut out = network.clone();
        network.update(&grad, &mut out);
        for (a, b) in network.get_weights().iter().zip(out.get_weights().iter()) {
            assert!((b - a - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_serde_round_trip() {
        let network = small();
        let mut buf = Vec::new();
        network.save(&mut buf).unwrap();
        let loaded = Network::load(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded, network);

        assert!(Network::load(&mut "{\"layers\": []}".as_bytes()).is_err());
        assert!(Network::load(&mut "not json".as_bytes()).is_err());
    }

    #[test]
    fn test_load_rejects_broken_layers() {
        let unchained = r#"{"layers": [
            {"w": [[1.0, 0.0]], "bias": [0.0], "nl": "Tanh"},
            {"w": [[1.0, 2.0, 3.0], [0.0, 0.0, 0.0]], "bias": [0.0, 0.0], "nl": "Softmax"}
        ]}"#;
        match Network::load(&mut unchained.as_bytes()) {
            Err(ModelError::Width { what, expected, got }) => {
                assert_eq!(what, "layer inputs");
                assert_eq!((expected, got), (1, 3));
            }
            other => panic!("expected a width error, got {:?}", other),
        }

        let short_bias = r#"{"layers": [
            {"w": [[1.0, 0.0], [0.0, 1.0]], "bias": [0.0], "nl": "Softmax"}
        ]}"#;
        match Network::load(&mut short_bias.as_bytes()) {
            Err(ModelError::Width { what, .. }) => assert_eq!(what, "bias"),
            other => panic!("expected a width error, got {:?}", other),
        }

        let ragged = r#"{"layers": [
            {"w": [[1.0, 0.0], [0.0]], "bias": [0.0, 0.0], "nl": "Softmax"}
        ]}"#;
        assert!(Network::load(&mut ragged.as_bytes()).is_err());
    }
}

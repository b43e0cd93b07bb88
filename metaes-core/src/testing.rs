//! Small vector model and quadratic environment shared by the unit tests

use crate::model::{GradientFuser, Initializer, WeightUpdater};
use crate::optimizer::{Environment, ScoreLogger};

#[derive(Clone, Debug, PartialEq)]
pub struct Point(pub Vec<f32>);

pub struct PointInit(pub usize);

impl Initializer for PointInit {
    type Model = Point;

    fn zero(&self) -> Point {
        Point(vec![0.0; self.0])
    }
}

impl WeightUpdater for Point {
    fn num_weights(&self) -> usize {
        self.0.len()
    }

    fn update_gradients<F>(&mut self, f: &mut F) -> ()
    where
        F: FnMut() -> f32,
    {
        for x in self.0.iter_mut() {
            *x = f();
        }
    }

    fn scale_gradients(&mut self, s: f32) -> () {
        for x in self.0.iter_mut() {
            *x *= s;
        }
    }

    fn copy_gradients(&self, other: &mut Self) -> () {
        other.0.copy_from_slice(&self.0);
    }

    fn add_gradients(&mut self, other: &Self) -> () {
        for (x, o) in self.0.iter_mut().zip(other.0.iter()) {
            *x += o;
        }
    }
}

impl GradientFuser<Point> for Point {
    fn update(&self, grad: &Point, into: &mut Self) -> () {
        for i in 0..self.0.len() {
            into.0[i] = self.0[i] + grad.0[i];
        }
    }
}

/// Negative squared distance to a target
pub struct Sphere {
    target: Vec<f32>,
    valid: Option<Vec<f32>>,
}

impl Sphere {
    pub fn new(target: Vec<f32>) -> Self {
        Sphere {
            target: target,
            valid: None,
        }
    }

    pub fn with_validation(mut self, valid: Vec<f32>) -> Self {
        self.valid = Some(valid);
        self
    }
}

fn neg_dist(p: &Point, target: &[f32]) -> f32 {
    -p.0
        .iter()
        .zip(target.iter())
        .map(|(x, t)| (x - t).powi(2))
        .sum::<f32>()
}

impl Environment<Point> for Sphere {
    fn step(&mut self) -> bool {
        false
    }

    fn eval(&self, s: &Point) -> (f32, Option<ScoreLogger>) {
        let score = neg_dist(s, &self.target);
        let mut logger = ScoreLogger::new(None);
        logger.insert("dist", -score);
        (score, Some(logger))
    }

    fn validate(&self, s: &Point) -> (Option<f32>, Option<ScoreLogger>) {
        (self.valid.as_ref().map(|v| neg_dist(s, v)), None)
    }
}

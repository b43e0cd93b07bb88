//! Helper functions for dense vector arithmetic.
//!
//! The loops work on lanes of eight so the compiler can vectorize them on any target.

const LANES: usize = 8;

/// Element-wise summation of two vectors into a third
pub fn sum(v1: &[f32], v2: &[f32], v3: &mut [f32]) -> () {
    assert_eq!(v1.len(), v2.len());
    assert_eq!(v1.len(), v3.len());
    for ((o, l), r) in v3.iter_mut().zip(v1.iter()).zip(v2.iter()) {
        *o = l + r;
    }
}

/// In place summation, `v1 += v2`
pub fn inplace_sum(v1: &mut [f32], v2: &[f32]) -> () {
    axpy(1.0, v2, v1);
}

/// `y += a * x`
pub fn axpy(a: f32, x: &[f32], y: &mut [f32]) -> () {
    assert_eq!(x.len(), y.len());
    let mut ys = y.chunks_exact_mut(LANES);
    let mut xs = x.chunks_exact(LANES);
    for (yc, xc) in (&mut ys).zip(&mut xs) {
        for j in 0..LANES {
            yc[j] += a * xc[j];
        }
    }

    // Remainder
    for (yi, xi) in ys.into_remainder().iter_mut().zip(xs.remainder()) {
        *yi += a * xi;
    }
}

/// Dot product
pub fn dot(v1: &[f32], v2: &[f32]) -> f32 {
    assert_eq!(v1.len(), v2.len());
    let mut acc = [0f32; LANES];
    let l = v1.chunks_exact(LANES);
    let r = v2.chunks_exact(LANES);
    let tail: f32 = l
        .remainder()
        .iter()
        .zip(r.remainder())
        .map(|(a, b)| a * b)
        .sum();

    for (lc, rc) in l.zip(r) {
        for j in 0..LANES {
            acc[j] += lc[j] * rc[j];
        }
    }
    acc.iter().sum::<f32>() + tail
}

/// L2 norm of a vector
pub fn l2norm(v1: &[f32]) -> f32 {
    dot(v1, v1).sqrt()
}

/// Scales a vector in place
pub fn scale(v1: &mut [f32], s: f32) -> () {
    for x in v1.iter_mut() {
        *x *= s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum() {
        let v1 = [1., 2., 3., 4., 5., 6., 7., 8., 9., 10.];
        let mut res = [0.0; 10];
        sum(&v1, &v1, &mut res);
        assert_eq!(res, [2., 4., 6., 8., 10., 12., 14., 16., 18., 20.]);

        let v1 = [1., 2., 3., 4., 5.];
        let mut res = [0.0; 5];
        sum(&v1, &v1, &mut res);
        assert_eq!(res, [2., 4., 6., 8., 10.]);
    }

    #[test]
    fn test_inplace_sum_and_axpy() {
        let mut v1: Vec<f32> = (0..11).map(|x| x as f32).collect();
        let v2 = vec![1f32; 11];
        inplace_sum(&mut v1, &v2);
        assert_eq!(v1[0], 1.);
        assert_eq!(v1[10], 11.);

        axpy(-2.0, &v2, &mut v1);
        assert_eq!(v1[0], -1.);
        assert_eq!(v1[10], 9.);
    }

    #[test]
    fn test_dot() {
        let v1 = [1., 2., 3., 4., 5., 6., 7., 8., 9., 10.];
        assert_eq!(dot(&v1, &v1), 385.);

        let v1 = [1., 2., 3., 4., 5.];
        let v2 = [0.0; 5];
        assert_eq!(dot(&v1, &v2), 0.);
        assert_eq!(dot(&[], &[]), 0.);
    }

    #[test]
    fn test_l2norm() {
        let v1 = [1., 2., 3., 4., 5., 6., 7., 8., 9., 10.];
        assert!((l2norm(&v1) - 19.6214168).abs() < 1e-5);

        let v1 = [1.];
        assert_eq!(l2norm(&v1), 1.);
    }

    #[test]
    fn test_scale() {
        let mut v1 = [1., 2., 3., 4., 5., 6., 7., 8., 9., 10.];
        scale(&mut v1, 2.);
        assert_eq!(v1, [2., 4., 6., 8., 10., 12., 14., 16., 18., 20.]);
    }
}

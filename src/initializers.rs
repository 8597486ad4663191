use crate::error::{Error, Result};
use crate::value::Value;
use ndarray::Array2;
use rand::rng;
use rand_distr::{Distribution, Normal, Uniform};

fn sample_matrix(rows: usize, cols: usize, dist: impl Distribution<f64>) -> Result<Value> {
    if rows == 0 || cols == 0 {
        return Err(Error::invalid_argument(
            "shape",
            format!("matrix dimensions must be positive, got ({rows}, {cols})"),
        ));
    }
    let mut rng = rng();
    let data = (0..rows * cols).map(|_| dist.sample(&mut rng)).collect();
    Ok(Value::Matrix(Array2::from_shape_vec((rows, cols), data)?))
}

fn uniform_dist(low: f64, high: f64) -> Result<Uniform<f64>> {
    Uniform::new(low, high).map_err(|e| Error::invalid_argument("range", e.to_string()))
}

fn normal_dist(mean: f64, std: f64) -> Result<Normal<f64>> {
    // rand_distr accepts a negative std.
    if !std.is_finite() || std < 0.0 {
        return Err(Error::invalid_argument(
            "std",
            format!("standard deviation must be finite and non-negative, got {std}"),
        ));
    }
    Normal::new(mean, std).map_err(|e| Error::invalid_argument("std", e.to_string()))
}

/// Matrix with entries drawn from U(low, high).
pub fn uniform(rows: usize, cols: usize, low: f64, high: f64) -> Result<Value> {
    sample_matrix(rows, cols, uniform_dist(low, high)?)
}

/// Matrix with entries drawn from N(mean, std).
pub fn normal(rows: usize, cols: usize, mean: f64, std: f64) -> Result<Value> {
    sample_matrix(rows, cols, normal_dist(mean, std)?)
}

/// Xavier/Glorot uniform initialization
/// Samples from U(-a, a) where a = gain * sqrt(6 / (rows + cols))
pub fn xavier_uniform(rows: usize, cols: usize, gain: f64) -> Result<Value> {
    let a = gain * (6.0 / (rows + cols) as f64).sqrt();
    uniform(rows, cols, -a, a)
}

/// Xavier/Glorot normal initialization
/// Samples from N(0, std) where std = gain * sqrt(2 / (rows + cols))
pub fn xavier_normal(rows: usize, cols: usize, gain: f64) -> Result<Value> {
    let std = gain * (2.0 / (rows + cols) as f64).sqrt();
    normal(rows, cols, 0.0, std)
}

/// Scalar drawn from U(low, high).
pub fn uniform_scalar(low: f64, high: f64) -> Result<Value> {
    let dist = uniform_dist(low, high)?;
    Ok(Value::Scalar(dist.sample(&mut rng())))
}

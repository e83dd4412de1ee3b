//! Ordinary least squares on standardised features.

use ndarray::{Array1, Array2, Axis};
use tracing::warn;

use super::Regressor;
use crate::error::PipelineError;

/// Per-column z-scoring fitted on training data (population standard deviation).
#[derive(Debug, Clone, Default)]
pub struct StandardScaler {
    pub means: Array1<f64>,
    pub stds: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Self {
        let n = x.nrows().max(1) as f64;
        let means = x.sum_axis(Axis(0)) / n;
        let stds = x
            .axis_iter(Axis(1))
            .zip(means.iter())
            .map(|(col, mean)| (col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt())
            .collect();
        Self { means, stds }
    }

    /// Zero-variance columns map to 0.
    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut z = x.clone();
        for (j, mut col) in z.axis_iter_mut(Axis(1)).enumerate() {
            let (mean, std) = (self.means[j], self.stds[j]);
            col.mapv_inplace(|v| if std > 0.0 { (v - mean) / std } else { 0.0 });
        }
        z
    }
}

#[derive(Debug, Clone, Default)]
pub struct LinearRegression {
    scaler: StandardScaler,
    /// Coefficients on standardised inputs.
    pub coefficients: Array1<f64>,
    pub intercept: f64,
}

impl Regressor for LinearRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(), PipelineError> {
        let n = x.nrows();
        if n == 0 {
            return Err(PipelineError::InsufficientData(
                "linear regression needs at least one row".to_string(),
            ));
        }

        let scaler = StandardScaler::fit(x);
        let z = scaler.transform(x);
        let y_mean = y.sum() / n as f64;
        let centered = y.mapv(|v| v - y_mean);

        // Standardised columns are centred, so the intercept is the target mean
        // and constant columns drop out of the normal equations.
        let active: Vec<usize> = (0..x.ncols()).filter(|&j| scaler.stds[j] > 0.0).collect();
        let mut coefficients = Array1::<f64>::zeros(x.ncols());

        if !active.is_empty() {
            let za = z.select(Axis(1), &active);
            let xtx = za.t().dot(&za);
            let xty = za.t().dot(&centered);
            let beta = cholesky_solve(&xtx, &xty).ok_or_else(|| {
                PipelineError::Numerical("normal equations are singular".to_string())
            })?;
            for (k, &j) in active.iter().enumerate() {
                coefficients[j] = beta[k];
            }
        }

        self.scaler = scaler;
        self.coefficients = coefficients;
        self.intercept = y_mean;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Array1<f64> {
        self.scaler.transform(x).dot(&self.coefficients) + self.intercept
    }

    fn attribution(&self) -> Vec<f64> {
        self.coefficients.to_vec()
    }
}

/// Solves `a·x = b` for symmetric positive-definite `a`, retrying once with a tiny ridge.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    if let Some(x) = cholesky_solve_exact(a, b) {
        return Some(x);
    }
    let n = a.nrows();
    let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64;
    warn!(ridge, "Normal equations not positive definite; retrying with ridge");
    let mut reg = a.clone();
    for k in 0..n {
        reg[[k, k]] += ridge.max(1e-12);
    }
    cholesky_solve_exact(&reg, b)
}

fn cholesky_solve_exact(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l: Array2<f64> = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 1e-12 * a[[i, i]].abs() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    let mut y: Array1<f64> = Array1::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    let mut x: Array1<f64> = Array1::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    Some(x)
}

//! Expectation-Maximization imputation of numeric cells.
//!
//! Each iteration re-estimates the mean vector and covariance matrix from the
//! current (partially imputed) batch, then replaces every missing cell with its
//! conditional mean given the observed cells of the same row:
//!
//! ```text
//! x_m = μ_m + Σ_ma · Σ_aa⁻¹ · (x_a − μ_a)
//! ```
//!
//! On the first iteration a zero-mean residual drawn through the Cholesky
//! factor of the conditional covariance `Σ_mm − Σ_ma Σ_aa⁻¹ Σ_am` is added.
//! Iteration stops once both the average of the means and the determinant of
//! the covariance move by less than the tolerance, or at the iteration cap.

use super::linalg::{cholesky, determinant, inverse_or_pseudo};
use crate::config::ImputationConfig;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// How an EM run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmStatus {
    /// Mean and covariance settled within the tolerance.
    Converged,
    /// The iteration cap was reached; the last estimate is kept.
    IterationCap,
    /// Too few records or usable attributes; cells hold column means.
    MeanFallback,
    /// Nothing was missing.
    Complete,
}

/// Imputed batch plus run diagnostics.
#[derive(Debug, Clone)]
pub struct EmEstimate {
    /// Batch with missing cells filled. Columns with no observed value stay
    /// `NaN`.
    pub values: Array2<f64>,
    pub iterations: usize,
    pub status: EmStatus,
}

impl EmEstimate {
    /// Value at `(row, column)` if it is finite.
    pub fn get(&self, row: usize, column: usize) -> Option<f64> {
        let v = self.values[[row, column]];
        v.is_finite().then_some(v)
    }
}

#[derive(Debug, Clone)]
pub struct EmImputer {
    max_iterations: usize,
    tolerance: f64,
    seed: u64,
}

impl Default for EmImputer {
    fn default() -> Self {
        Self::from_config(&ImputationConfig::default())
    }
}

impl EmImputer {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
            tolerance,
            seed: 42,
        }
    }

    pub fn from_config(config: &ImputationConfig) -> Self {
        Self::new(config.em_max_iterations, config.em_tolerance).with_seed(config.random_seed)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Impute a batch given as rows of optional values.
    pub fn impute_rows(&self, rows: &[Vec<Option<f64>>]) -> EmEstimate {
        let n = rows.len();
        let p = rows.first().map_or(0, Vec::len);
        let mut data = Array2::from_elem((n, p), f64::NAN);
        let mut missing = Array2::from_elem((n, p), true);
        for (i, row) in rows.iter().enumerate() {
            for (j, cell) in row.iter().enumerate().take(p) {
                if let Some(v) = cell.filter(|v| v.is_finite()) {
                    data[[i, j]] = v;
                    missing[[i, j]] = false;
                }
            }
        }
        self.impute(data, &missing)
    }

    /// Impute every cell flagged in `missing`. Values under the mask are
    /// ignored.
    pub fn impute(&self, mut data: Array2<f64>, missing: &Array2<bool>) -> EmEstimate {
        let (n, p) = data.dim();
        if !missing.iter().any(|&m| m) {
            return EmEstimate {
                values: data,
                iterations: 0,
                status: EmStatus::Complete,
            };
        }

        // Observed-cell means seed every missing cell.
        let observed_means: Vec<f64> = (0..p)
            .map(|j| {
                let (sum, count) = (0..n)
                    .filter(|&i| !missing[[i, j]])
                    .fold((0.0, 0usize), |(s, c), i| (s + data[[i, j]], c + 1));
                if count > 0 { sum / count as f64 } else { f64::NAN }
            })
            .collect();
        for ((i, j), cell) in data.indexed_iter_mut() {
            if missing[[i, j]] {
                *cell = observed_means[j];
            }
        }

        // Constant or unobserved columns keep their mean.
        let columns: Vec<usize> = (0..p)
            .filter(|&j| distinct_observed(&data, missing, j) >= 2)
            .collect();
        let needs_em = (0..n).any(|i| columns.iter().any(|&j| missing[[i, j]]));
        if columns.is_empty() || !needs_em || n <= columns.len() {
            trace!(records = n, attributes = columns.len(), "EM skipped, mean imputation");
            return EmEstimate {
                values: data,
                iterations: 0,
                status: EmStatus::MeanFallback,
            };
        }

        let mut batch = data.select(Axis(1), &columns);
        let mask = missing.select(Axis(1), &columns);
        let (iterations, status) = self.iterate(&mut batch, &mask);

        for (k, &j) in columns.iter().enumerate() {
            for i in 0..n {
                if missing[[i, j]] {
                    let v = batch[[i, k]];
                    data[[i, j]] = if v.is_finite() { v } else { observed_means[j] };
                }
            }
        }
        EmEstimate {
            values: data,
            iterations,
            status,
        }
    }

    fn iterate(&self, data: &mut Array2<f64>, missing: &Array2<bool>) -> (usize, EmStatus) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let incomplete: Vec<usize> = (0..data.nrows())
            .filter(|&i| missing.row(i).iter().any(|&m| m))
            .collect();

        for iteration in 0..self.max_iterations {
            let (mean, cov) = mean_and_covariance(data);
            for &row in &incomplete {
                let perturb = (iteration == 0).then_some(&mut rng);
                conditional_mean(data, missing, row, &mean, &cov, perturb);
            }

            let (next_mean, next_cov) = mean_and_covariance(data);
            let mean_delta = (average(&next_mean) - average(&mean)).abs();
            let det_delta = (determinant(&next_cov) - determinant(&cov)).abs();
            if mean_delta < self.tolerance && det_delta < self.tolerance {
                trace!(iterations = iteration + 1, "EM converged");
                return (iteration + 1, EmStatus::Converged);
            }
        }
        trace!(iterations = self.max_iterations, "EM reached the iteration cap");
        (self.max_iterations, EmStatus::IterationCap)
    }
}

fn distinct_observed(data: &Array2<f64>, missing: &Array2<bool>, column: usize) -> usize {
    let mut values: Vec<f64> = (0..data.nrows())
        .filter(|&i| !missing[[i, column]])
        .map(|i| data[[i, column]])
        .collect();
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup();
    values.len()
}

fn average(v: &Array1<f64>) -> f64 {
    if v.is_empty() { 0.0 } else { v.sum() / v.len() as f64 }
}

/// Column means and the population covariance (divided by `n`).
pub fn mean_and_covariance(data: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let n = data.nrows().max(1) as f64;
    let mean = data.sum_axis(Axis(0)) / n;
    let centered = data - &mean;
    let cov = centered.t().dot(&centered) / n;
    (mean, cov)
}

fn conditional_mean(
    data: &mut Array2<f64>,
    missing: &Array2<bool>,
    row: usize,
    mean: &Array1<f64>,
    cov: &Array2<f64>,
    perturb: Option<&mut StdRng>,
) {
    let p = data.ncols();
    let (m_idx, a_idx): (Vec<usize>, Vec<usize>) = (0..p).partition(|&j| missing[[row, j]]);
    let mu_m = mean.select(Axis(0), &m_idx);

    let estimate = if a_idx.is_empty() {
        mu_m
    } else {
        let x_a = data.row(row).select(Axis(0), &a_idx);
        let mu_a = mean.select(Axis(0), &a_idx);
        let cov_aa = cov.select(Axis(0), &a_idx).select(Axis(1), &a_idx);
        let cov_ma = cov.select(Axis(0), &m_idx).select(Axis(1), &a_idx);
        let inv_aa = inverse_or_pseudo(&cov_aa);
        let b = cov_ma.dot(&inv_aa);
        let mut x_m = &mu_m + &b.dot(&(&x_a - &mu_a));

        if let Some(rng) = perturb {
            let cov_mm = cov.select(Axis(0), &m_idx).select(Axis(1), &m_idx);
            let residual_cov = &cov_mm - &b.dot(&cov_ma.t());
            if let Some(l) = cholesky(&residual_cov) {
                let z: Array1<f64> = (0..m_idx.len()).map(|_| standard_normal(rng)).collect();
                x_m = x_m + l.dot(&z);
            }
        }
        if x_m.iter().all(|v| v.is_finite()) { x_m } else { mu_m }
    };

    for (k, &j) in m_idx.iter().enumerate() {
        data[[row, j]] = estimate[k];
    }
}

/// Box-Muller draw from N(0, 1).
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.r#gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.r#gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn rows(data: &[&[Option<f64>]]) -> Vec<Vec<Option<f64>>> {
        data.iter().map(|r| r.to_vec()).collect()
    }

    // ========================================================================
    // Complete batches
    // ========================================================================

    #[test]
    fn test_complete_batch_is_unchanged() {
        let data = array![[1.0, 2.0], [3.0, 5.0], [4.0, 4.5]];
        let missing = Array2::from_elem((3, 2), false);
        let estimate = EmImputer::new(100, 1e-10).impute(data.clone(), &missing);
        assert_eq!(estimate.values, data);
        assert_eq!(estimate.status, EmStatus::Complete);
        assert_eq!(estimate.iterations, 0);
    }

    // ========================================================================
    // Imputation
    // ========================================================================

    #[test]
    fn test_single_missing_cell_among_six_complete_records() {
        let batch = rows(&[
            &[Some(1.0), Some(2.1), Some(10.0)],
            &[Some(2.0), Some(3.9), Some(11.0)],
            &[Some(3.0), Some(6.2), Some(9.5)],
            &[Some(4.0), Some(7.8), Some(12.0)],
            &[Some(5.0), Some(10.1), Some(10.5)],
            &[Some(6.0), Some(12.0), Some(11.5)],
            &[Some(3.5), None, Some(10.0)],
        ]);
        let estimate = EmImputer::new(1000, 1e-10).impute_rows(&batch);
        let value = estimate.get(6, 1).unwrap();
        assert!(value.is_finite());
        // Strong linear relation with the first column.
        assert!((value - 7.0).abs() < 2.0, "imputed {}", value);
        assert!(estimate.iterations <= 1000);
        assert!(matches!(
            estimate.status,
            EmStatus::Converged | EmStatus::IterationCap
        ));
    }

    #[test]
    fn test_iteration_cap_bounds_run() {
        let batch = rows(&[
            &[Some(1.0), Some(2.0)],
            &[Some(2.0), None],
            &[Some(3.0), Some(5.0)],
            &[None, Some(8.0)],
            &[Some(5.0), Some(9.0)],
        ]);
        let estimate = EmImputer::new(3, 0.0).impute_rows(&batch);
        assert_eq!(estimate.iterations, 3);
        assert_eq!(estimate.status, EmStatus::IterationCap);
        assert!(estimate.get(1, 1).is_some());
        assert!(estimate.get(3, 0).is_some());
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let batch = rows(&[
            &[Some(1.0), Some(2.0), Some(0.5)],
            &[Some(2.0), None, Some(1.5)],
            &[Some(3.0), Some(5.0), Some(1.0)],
            &[Some(4.0), Some(8.0), None],
            &[Some(5.0), Some(9.0), Some(3.0)],
        ]);
        let a = EmImputer::new(50, 1e-10).with_seed(7).impute_rows(&batch);
        let b = EmImputer::new(50, 1e-10).with_seed(7).impute_rows(&batch);
        assert_eq!(a.values, b.values);
    }

    // ========================================================================
    // Fallbacks
    // ========================================================================

    #[test]
    fn test_too_few_records_falls_back_to_mean() {
        let batch = rows(&[&[Some(1.0), Some(4.0), Some(7.0)], &[Some(3.0), None, Some(8.0)]]);
        let estimate = EmImputer::new(100, 1e-10).impute_rows(&batch);
        assert_eq!(estimate.status, EmStatus::MeanFallback);
        assert_relative_eq!(estimate.values[[1, 1]], 4.0);
    }

    #[test]
    fn test_constant_column_is_mean_imputed() {
        let batch = rows(&[
            &[Some(1.0), Some(5.0)],
            &[Some(2.0), Some(5.0)],
            &[Some(3.0), None],
            &[Some(4.0), Some(5.0)],
        ]);
        let estimate = EmImputer::new(100, 1e-10).impute_rows(&batch);
        assert_relative_eq!(estimate.values[[2, 1]], 5.0);
    }

    #[test]
    fn test_unobserved_column_stays_nan() {
        let batch = rows(&[&[Some(1.0), None], &[Some(2.0), None], &[Some(3.0), None]]);
        let estimate = EmImputer::new(100, 1e-10).impute_rows(&batch);
        assert!(estimate.get(0, 1).is_none());
        assert_eq!(estimate.get(0, 0), Some(1.0));
    }

    #[test]
    fn test_mean_and_covariance_divides_by_n() {
        let (mean, cov) = mean_and_covariance(&array![[1.0, 2.0], [3.0, 6.0]]);
        assert_eq!(mean, array![2.0, 4.0]);
        assert_relative_eq!(cov[[0, 0]], 1.0);
        assert_relative_eq!(cov[[0, 1]], 2.0);
        assert_relative_eq!(cov[[1, 1]], 4.0);
    }
}

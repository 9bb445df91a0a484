//! Configuration types for the imputation pipeline.
//!
//! This module provides configuration options using the builder pattern.
//! A validated [`ImputationConfig`] is constructed once and threaded through
//! tree induction, pruning and EM; none of those components keep global state.

use serde::{Deserialize, Serialize};

/// Split-search policy used when inducing decision trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TreeAlgorithm {
    /// Multiway categorical splits and single-threshold numeric splits,
    /// ranked by gain ratio.
    #[default]
    Strict,
    /// Binary "value / not value" categorical splits and windowed numeric
    /// splits, ranked by ultimate gain ratio. An attribute may be re-tested
    /// deeper on the same path.
    Exploratory,
}

/// How the pruner estimates the pessimistic error rate of a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ErrorEstimate {
    /// Bisection on the binomial CDF up to `exact_error_limit` records,
    /// normal approximation beyond.
    #[default]
    Auto,
    /// Always solve the binomial CDF by bisection.
    Exact,
    /// Always use the normal approximation.
    NormalApproximation,
}

/// Configuration for the imputation pipeline.
///
/// Use [`ImputationConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use kdmi_impute::config::{ImputationConfig, TreeAlgorithm};
///
/// let config = ImputationConfig::builder()
///     .tree_algorithm(TreeAlgorithm::Exploratory)
///     .min_records(5)
///     .confidence_factor(0.25)
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImputationConfig {
    /// Split-search policy.
    /// Default: Strict
    pub tree_algorithm: TreeAlgorithm,

    /// Minimum number of records a partition needs to be split, and the
    /// minimum size of every child partition a split may produce.
    /// Default: 20
    pub min_records: usize,

    /// Splits whose (ultimate) gain ratio is not above this value are rejected.
    /// Default: 0.01
    pub min_gain_ratio: f64,

    /// Confidence factor of the pessimistic pruning estimate, in (0, 1).
    /// Default: 0.25
    pub confidence_factor: f64,

    /// Whether trees are pruned after induction.
    /// Default: true
    pub enable_pruning: bool,

    /// Estimator used for pessimistic leaf errors.
    /// Default: Auto
    pub error_estimate: ErrorEstimate,

    /// Largest leaf size solved exactly when `error_estimate` is `Auto`.
    /// Default: 1000
    pub exact_error_limit: usize,

    /// Convergence tolerance of the confidence-factor bisection.
    /// Default: 1e-9
    pub bisection_tolerance: f64,

    /// Hard cap on EM iterations.
    /// Default: 1000
    pub em_max_iterations: usize,

    /// EM stops once both the average mean and the covariance determinant
    /// move by less than this between iterations.
    /// Default: 1e-10
    pub em_tolerance: f64,

    /// Seed for the first-iteration EM perturbation.
    /// Default: 42
    pub random_seed: u64,

    /// Build per-attribute trees and evaluate neighbourhood sizes with rayon.
    /// Default: true
    pub parallel: bool,
}

impl Default for ImputationConfig {
    fn default() -> Self {
        Self {
            tree_algorithm: TreeAlgorithm::default(),
            min_records: 20,
            min_gain_ratio: 0.01,
            confidence_factor: 0.25,
            enable_pruning: true,
            error_estimate: ErrorEstimate::default(),
            exact_error_limit: 1000,
            bisection_tolerance: 1e-9,
            em_max_iterations: 1000,
            em_tolerance: 1e-10,
            random_seed: 42,
            parallel: true,
        }
    }
}

impl ImputationConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ImputationConfigBuilder {
        ImputationConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.min_records == 0 {
            return Err(ConfigValidationError::InvalidMinRecords(self.min_records));
        }

        if !self.min_gain_ratio.is_finite() || self.min_gain_ratio < 0.0 {
            return Err(ConfigValidationError::InvalidGainRatio(self.min_gain_ratio));
        }

        if !(self.confidence_factor > 0.0 && self.confidence_factor < 1.0) {
            return Err(ConfigValidationError::InvalidConfidenceFactor(
                self.confidence_factor,
            ));
        }

        if self.em_max_iterations == 0 {
            return Err(ConfigValidationError::InvalidIterationCap(
                self.em_max_iterations,
            ));
        }

        for (field, value) in [
            ("bisection_tolerance", self.bisection_tolerance),
            ("em_tolerance", self.em_tolerance),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigValidationError::InvalidTolerance {
                    field: field.to_string(),
                    value,
                });
            }
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid minimum records: {0} (must be at least 1)")]
    InvalidMinRecords(usize),

    #[error("Invalid minimum gain ratio: {0} (must be finite and non-negative)")]
    InvalidGainRatio(f64),

    #[error("Invalid confidence factor: {0} (must be strictly between 0.0 and 1.0)")]
    InvalidConfidenceFactor(f64),

    #[error("Invalid EM iteration cap: {0} (must be at least 1)")]
    InvalidIterationCap(usize),

    #[error("Invalid tolerance for '{field}': {value} (must be positive)")]
    InvalidTolerance { field: String, value: f64 },
}

/// Builder for [`ImputationConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct ImputationConfigBuilder {
    tree_algorithm: Option<TreeAlgorithm>,
    min_records: Option<usize>,
    min_gain_ratio: Option<f64>,
    confidence_factor: Option<f64>,
    enable_pruning: Option<bool>,
    error_estimate: Option<ErrorEstimate>,
    exact_error_limit: Option<usize>,
    bisection_tolerance: Option<f64>,
    em_max_iterations: Option<usize>,
    em_tolerance: Option<f64>,
    random_seed: Option<u64>,
    parallel: Option<bool>,
}

impl ImputationConfigBuilder {
    /// Set the split-search policy.
    pub fn tree_algorithm(mut self, algorithm: TreeAlgorithm) -> Self {
        self.tree_algorithm = Some(algorithm);
        self
    }

    /// Set the minimum partition size.
    ///
    /// Partitions smaller than this are never split, and a split is discarded
    /// if any of its children would be smaller than this.
    pub fn min_records(mut self, min_records: usize) -> Self {
        self.min_records = Some(min_records);
        self
    }

    /// Set the minimum (ultimate) gain ratio a split must exceed.
    pub fn min_gain_ratio(mut self, ratio: f64) -> Self {
        self.min_gain_ratio = Some(ratio);
        self
    }

    /// Set the pruning confidence factor.
    ///
    /// # Arguments
    /// * `cf` - Value strictly between 0.0 and 1.0 (e.g., 0.25)
    pub fn confidence_factor(mut self, cf: f64) -> Self {
        self.confidence_factor = Some(cf);
        self
    }

    /// Enable or disable pruning.
    pub fn enable_pruning(mut self, enable: bool) -> Self {
        self.enable_pruning = Some(enable);
        self
    }

    /// Set the pessimistic error estimator.
    pub fn error_estimate(mut self, estimate: ErrorEstimate) -> Self {
        self.error_estimate = Some(estimate);
        self
    }

    /// Set the largest leaf size solved by bisection in `Auto` mode.
    pub fn exact_error_limit(mut self, limit: usize) -> Self {
        self.exact_error_limit = Some(limit);
        self
    }

    /// Set the bisection tolerance.
    pub fn bisection_tolerance(mut self, tolerance: f64) -> Self {
        self.bisection_tolerance = Some(tolerance);
        self
    }

    /// Set the EM iteration cap.
    pub fn em_max_iterations(mut self, iterations: usize) -> Self {
        self.em_max_iterations = Some(iterations);
        self
    }

    /// Set the EM convergence tolerance.
    pub fn em_tolerance(mut self, tolerance: f64) -> Self {
        self.em_tolerance = Some(tolerance);
        self
    }

    /// Set the random seed.
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Enable or disable rayon parallelism.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = Some(parallel);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `ImputationConfig` or an error if validation fails.
    pub fn build(self) -> Result<ImputationConfig, ConfigValidationError> {
        let defaults = ImputationConfig::default();
        let config = ImputationConfig {
            tree_algorithm: self.tree_algorithm.unwrap_or_default(),
            min_records: self.min_records.unwrap_or(defaults.min_records),
            min_gain_ratio: self.min_gain_ratio.unwrap_or(defaults.min_gain_ratio),
            confidence_factor: self
                .confidence_factor
                .unwrap_or(defaults.confidence_factor),
            enable_pruning: self.enable_pruning.unwrap_or(defaults.enable_pruning),
            error_estimate: self.error_estimate.unwrap_or_default(),
            exact_error_limit: self
                .exact_error_limit
                .unwrap_or(defaults.exact_error_limit),
            bisection_tolerance: self
                .bisection_tolerance
                .unwrap_or(defaults.bisection_tolerance),
            em_max_iterations: self
                .em_max_iterations
                .unwrap_or(defaults.em_max_iterations),
            em_tolerance: self.em_tolerance.unwrap_or(defaults.em_tolerance),
            random_seed: self.random_seed.unwrap_or(defaults.random_seed),
            parallel: self.parallel.unwrap_or(defaults.parallel),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ImputationConfig::default();
        assert_eq!(config.tree_algorithm, TreeAlgorithm::Strict);
        assert_eq!(config.min_records, 20);
        assert_eq!(config.min_gain_ratio, 0.01);
        assert_eq!(config.confidence_factor, 0.25);
        assert_eq!(config.error_estimate, ErrorEstimate::Auto);
        assert!(config.enable_pruning);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = ImputationConfig::builder()
            .tree_algorithm(TreeAlgorithm::Exploratory)
            .min_records(5)
            .min_gain_ratio(0.05)
            .confidence_factor(0.1)
            .enable_pruning(false)
            .em_max_iterations(50)
            .random_seed(7)
            .parallel(false)
            .build()
            .unwrap();

        assert_eq!(config.tree_algorithm, TreeAlgorithm::Exploratory);
        assert_eq!(config.min_records, 5);
        assert_eq!(config.min_gain_ratio, 0.05);
        assert_eq!(config.confidence_factor, 0.1);
        assert!(!config.enable_pruning);
        assert_eq!(config.em_max_iterations, 50);
        assert_eq!(config.random_seed, 7);
        assert!(!config.parallel);
    }

    #[test]
    fn test_validation_confidence_factor_bounds() {
        for cf in [0.0, 1.0, -0.3, f64::NAN] {
            let result = ImputationConfig::builder().confidence_factor(cf).build();
            assert!(matches!(
                result,
                Err(ConfigValidationError::InvalidConfidenceFactor(_))
            ));
        }
    }

    #[test]
    fn test_validation_zero_min_records() {
        let result = ImputationConfig::builder().min_records(0).build();
        assert!(matches!(
            result,
            Err(ConfigValidationError::InvalidMinRecords(0))
        ));
    }

    #[test]
    fn test_validation_iteration_cap() {
        let result = ImputationConfig::builder().em_max_iterations(0).build();
        assert!(matches!(
            result,
            Err(ConfigValidationError::InvalidIterationCap(0))
        ));
    }

    #[test]
    fn test_validation_tolerance() {
        let result = ImputationConfig::builder().em_tolerance(0.0).build();
        assert!(matches!(
            result,
            Err(ConfigValidationError::InvalidTolerance { .. })
        ));
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "tree_algorithm": "Exploratory",
            "min_records": 4,
            "min_gain_ratio": 0.02,
            "confidence_factor": 0.3,
            "enable_pruning": true,
            "error_estimate": "NormalApproximation",
            "exact_error_limit": 50,
            "bisection_tolerance": 1e-8,
            "em_max_iterations": 200,
            "em_tolerance": 1e-9,
            "random_seed": 11,
            "parallel": false
        }"#;

        let config: ImputationConfig =
            serde_json::from_str(json).expect("Should deserialize from JSON");
        assert_eq!(config.tree_algorithm, TreeAlgorithm::Exploratory);
        assert_eq!(config.min_records, 4);
        assert_eq!(config.error_estimate, ErrorEstimate::NormalApproximation);
        assert_eq!(config.exact_error_limit, 50);
        assert_eq!(config.random_seed, 11);
        assert!(config.validate().is_ok());
    }
}

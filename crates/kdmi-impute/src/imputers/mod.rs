//! Imputation engines.
//!
//! - [`EmImputer`]: EM estimation of missing numeric cells
//! - [`NeighborhoodSearch`]: mixed-distance k-NN with automatic `k`
//! - [`StatisticalImputer`]: mean, mode and majority vote

mod em;
pub mod linalg;
mod knn;
mod statistical;

pub use em::{EmEstimate, EmImputer, EmStatus, mean_and_covariance};
pub use knn::{Neighborhood, NeighborhoodSearch, numeric_columns};
pub use statistical::{FallbackReport, StatisticalImputer};

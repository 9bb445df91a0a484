//! Pipeline module.
//!
//! This module provides the imputation pipeline and its stages: one tree per
//! incomplete attribute, leaf assignment, and record-by-record imputation.

mod builder;
mod executor;
mod forest;
pub mod progress;
mod state;

pub use builder::{Pipeline, PipelineBuilder};
pub use executor::RecordImputer;
pub use forest::{AttributeTrees, Band, band_label, coarsen_bands};
pub use progress::{
    CancellationToken, ClosureProgressReporter, ImputationStage, ProgressReporter, ProgressUpdate,
};
pub use state::ImputationState;

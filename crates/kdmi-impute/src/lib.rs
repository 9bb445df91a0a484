//! kDMI Imputation Library
//!
//! Missing-value imputation for tabular data that combines decision-tree
//! partitioning with EM estimation, built with Rust and Polars.
//!
//! # Overview
//!
//! For every attribute with missing values a decision tree is induced on the
//! complete records, with that attribute as the class. The tree's leaves group
//! records that are alike with respect to the attribute. Each incomplete
//! record is then imputed from the leaf it falls into:
//!
//! - **Numeric cells**: the nearest neighbours inside the leaf are chosen with
//!   an automatically sized k-NN, and EM over those neighbours fills the cell
//! - **Categorical cells**: the majority value of the leaf, or the mode of the
//!   neighbours when the leaf is borrowed from another attribute's tree
//! - **Unclassified records**: neighbours come from the whole dataset
//! - **Progress Reporting**: Real-time progress updates with cancellation support
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use kdmi_impute::{Dataset, ImputationConfig, Pipeline, TreeAlgorithm};
//! use std::path::Path;
//!
//! let dataset = Dataset::load_text(Path::new("data.txt"), Path::new("attributes.txt"))?;
//!
//! let config = ImputationConfig::builder()
//!     .tree_algorithm(TreeAlgorithm::Exploratory)
//!     .min_records(5)
//!     .build()?;
//!
//! let result = Pipeline::builder()
//!     .config(config)
//!     .build()?
//!     .process(dataset)?;
//!
//! println!("Imputed {} cells", result.summary.cells_imputed.total());
//! result.dataset.write_text(Path::new("imputed.txt"))?;
//! ```
//!
//! # Trees and rules
//!
//! Trees can be built and inspected on their own:
//!
//! ```rust,ignore
//! use kdmi_impute::tree::{Pruner, RuleSet, TreeBuilder};
//!
//! let mut tree = TreeBuilder::from_config(&config).build(&dataset.with_class(2)?)?;
//! Pruner::from_config(&config).prune(&mut tree)?;
//! println!("{}", tree.render());
//! println!("{}", RuleSet::from_tree(&tree).to_text());
//! ```
//!
//! # Progress Reporting
//!
//! ```rust,ignore
//! use kdmi_impute::{CancellationToken, ImputationError, Pipeline};
//!
//! let token = CancellationToken::new();
//!
//! let result = Pipeline::builder()
//!     .cancellation_token(token.clone())
//!     .on_progress(|update| {
//!         println!("[{:?}] {}", update.stage, update.message);
//!     })
//!     .build()?
//!     .process(dataset);
//!
//! match result {
//!     Ok(result) => println!("Success!"),
//!     Err(ImputationError::Cancelled) => println!("Cancelled by user"),
//!     Err(e) => println!("Error: {}", e),
//! }
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod imputers;
pub mod pipeline;
pub mod tree;
pub mod types;

// Re-exports for convenient access
pub use config::{
    ConfigValidationError, ErrorEstimate, ImputationConfig, ImputationConfigBuilder, TreeAlgorithm,
};
pub use dataset::{Attribute, AttributeType, Dataset, Domain, Record, Schema, Value};
pub use error::{ImputationError, ResultExt};
pub use imputers::{
    EmEstimate, EmImputer, EmStatus, Neighborhood, NeighborhoodSearch, StatisticalImputer,
};
pub use pipeline::{
    AttributeTrees, CancellationToken, ClosureProgressReporter, ImputationStage, ImputationState,
    Pipeline, PipelineBuilder, ProgressReporter, ProgressUpdate, RecordImputer,
};
pub use tree::{DecisionTree, PruneOutcome, Pruner, RuleSet, TreeBuilder};
pub use types::{
    AttributeSummary, AttributeTreeReport, ImputationResult, ImputationSummary, NeighborhoodSource,
    SourceCounts,
};

//! Main imputation pipeline module.
//!
//! This module provides the core `Pipeline` struct and builder for
//! orchestrating tree induction, leaf assignment and per-record imputation.

use crate::config::ImputationConfig;
use crate::dataset::Dataset;
use crate::error::{ImputationError, Result};
use crate::imputers::{EmImputer, NeighborhoodSearch, StatisticalImputer};
use crate::pipeline::executor::RecordImputer;
use crate::pipeline::forest::AttributeTrees;
use crate::pipeline::progress::{
    CancellationToken, ClosureProgressReporter, ImputationStage, ProgressReporter, ProgressUpdate,
};
use crate::pipeline::state::ImputationState;
use crate::types::{AttributeSummary, ImputationResult, ImputationSummary, NeighborhoodSource};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Records between two progress updates of the imputing stage.
const PROGRESS_INTERVAL: usize = 25;

/// The main imputation pipeline.
///
/// Use [`Pipeline::builder()`] to create a new pipeline with custom configuration.
///
/// # Example
///
/// ```rust,ignore
/// use kdmi_impute::{CancellationToken, Dataset, ImputationConfig, Pipeline};
/// use std::path::Path;
///
/// let dataset = Dataset::load_text(Path::new("data.txt"), Path::new("attributes.txt"))?;
/// let token = CancellationToken::new();
///
/// let result = Pipeline::builder()
///     .cancellation_token(token.clone())
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .config(ImputationConfig::builder().min_records(5).build()?)
///     .build()?
///     .process(dataset)?;
///
/// result.dataset.write_text(Path::new("imputed.txt"))?;
/// ```
pub struct Pipeline {
    config: ImputationConfig,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
}

// Ensure Pipeline is Send (can be moved to another thread)
static_assertions::assert_impl_all!(Pipeline: Send);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &ImputationConfig {
        &self.config
    }

    /// Impute every missing cell of `dataset`.
    ///
    /// # Errors
    ///
    /// Returns `Err(ImputationError::Cancelled)` if the pipeline was cancelled
    /// via the cancellation token, and `Err(ImputationError::EmptyDataset)`
    /// for a dataset without records.
    pub fn process(&self, dataset: Dataset) -> Result<ImputationResult> {
        match self.process_internal(dataset) {
            Ok(result) => {
                self.report_progress(ProgressUpdate::complete(format!(
                    "Imputed {} of {} missing cells",
                    result.summary.cells_imputed.total(),
                    result.summary.missing_before
                )));
                Ok(result)
            }
            Err(e) => {
                if e.is_cancelled() {
                    self.report_progress(ProgressUpdate::cancelled());
                } else {
                    self.report_progress(ProgressUpdate::failed(e.to_string()));
                }
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    /// Check if cancellation has been requested.
    fn check_cancelled(&self) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(ImputationError::Cancelled);
        }
        Ok(())
    }

    /// Report progress if a reporter is configured.
    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn process_internal(&self, dataset: Dataset) -> Result<ImputationResult> {
        let start_time = Instant::now();

        info!("Starting imputation pipeline...");
        self.report_progress(ProgressUpdate::new(
            ImputationStage::Initializing,
            0.0,
            "Starting imputation pipeline...",
        ));
        if dataset.is_empty() {
            return Err(ImputationError::EmptyDataset);
        }

        let mut summary = ImputationSummary::new();
        summary.started_at = chrono::Utc::now().to_rfc3339();
        let mut processing_steps: Vec<String> = Vec::new();

        self.check_cancelled()?;

        // Step 1: Missing-value overview
        self.report_progress(ProgressUpdate::new(
            ImputationStage::Analyzing,
            0.0,
            "Analyzing missing values...",
        ));
        info!("Step 1: Analyzing missing values...");

        summary.records = dataset.len();
        summary.attributes = dataset.attribute_count();
        summary.missing_before = dataset.total_missing();
        summary.incomplete_records = dataset
            .records()
            .iter()
            .filter(|r| !r.is_complete())
            .count();
        summary.attribute_summaries = dataset
            .schema()
            .attributes()
            .iter()
            .enumerate()
            .map(|(a, attribute)| AttributeSummary::new(&attribute.name, dataset.missing_count(a)))
            .collect();
        for attribute in &summary.attribute_summaries {
            if attribute.missing_before > 0 {
                debug!(
                    attribute = %attribute.name,
                    missing = attribute.missing_before,
                    "Attribute has missing values"
                );
            }
        }
        processing_steps.push(format!(
            "Found {} missing cell(s) in {} of {} record(s)",
            summary.missing_before, summary.incomplete_records, summary.records
        ));

        self.report_progress(ProgressUpdate::new(
            ImputationStage::Analyzing,
            1.0,
            format!("Found {} missing cells", summary.missing_before),
        ));

        if summary.missing_before == 0 {
            info!("Dataset is complete, nothing to impute");
            processing_steps.push("Dataset is complete, nothing to impute".to_string());
            summary.duration_ms = start_time.elapsed().as_millis() as u64;
            return Ok(ImputationResult {
                dataset,
                trees: Vec::new(),
                summary,
                processing_steps,
            });
        }

        self.check_cancelled()?;

        // Step 2: One tree per incomplete attribute
        self.report_progress(ProgressUpdate::new(
            ImputationStage::BuildingTrees,
            0.0,
            "Building decision trees...",
        ));
        info!("Step 2: Building decision trees...");

        let trees = AttributeTrees::build(&dataset, &self.config, &self.cancellation_token)?;
        if trees.is_empty() {
            warn!("No tree could be built, every record uses the whole dataset");
            summary.add_warning(
                "No complete record to induce trees from; neighbourhoods span the whole dataset",
            );
        }
        for report in trees.reports() {
            summary.attribute_summaries[report.attribute_index].has_tree = true;
            processing_steps.push(format!(
                "Built tree for '{}': {} leaves, {} -> {} nodes after pruning{}",
                report.attribute,
                report.leaf_count,
                report.nodes_before_pruning,
                report.nodes_after_pruning,
                if report.coarsened { " (coarsened target)" } else { "" }
            ));
        }
        summary.trees_built = trees.len();
        info!("Built {} tree(s)", trees.len());

        self.report_progress(ProgressUpdate::new(
            ImputationStage::BuildingTrees,
            1.0,
            format!("Built {} trees", trees.len()),
        ));

        self.check_cancelled()?;

        // Step 3: Leaf assignment on the data as loaded
        self.report_progress(ProgressUpdate::new(
            ImputationStage::Classifying,
            0.0,
            "Assigning records to leaves...",
        ));
        info!("Step 3: Assigning records to leaves...");

        let mut state = ImputationState::new(&dataset, &trees, self.config.parallel);

        self.report_progress(ProgressUpdate::new(
            ImputationStage::Classifying,
            1.0,
            "Leaf assignment complete",
        ));

        self.check_cancelled()?;

        // Step 4: Record-by-record imputation
        info!("Step 4: Imputing records...");
        let search = NeighborhoodSearch::new(EmImputer::from_config(&self.config))
            .with_parallel(self.config.parallel);
        let imputer = RecordImputer::new(dataset.schema(), &search);
        let mut records = dataset.records().to_vec();
        let targets = state.incomplete_records();

        for (done, &target) in targets.iter().enumerate() {
            self.check_cancelled()?;
            if done % PROGRESS_INTERVAL == 0 {
                self.report_progress(ProgressUpdate::with_items(
                    ImputationStage::Imputing,
                    "records",
                    done,
                    targets.len(),
                    format!("Imputing record {} of {}", done + 1, targets.len()),
                ));
            }
            imputer.impute(&mut records, &mut state, target, &mut summary.cells_imputed);
        }
        processing_steps.push(format!(
            "Imputed {} cell(s) from own leaves, {} from borrowed leaves, {} from the whole dataset",
            summary.cells_imputed.own_leaf,
            summary.cells_imputed.borrowed_leaf,
            summary.cells_imputed.whole_dataset
        ));

        self.report_progress(ProgressUpdate::with_items(
            ImputationStage::Imputing,
            "records",
            targets.len(),
            targets.len(),
            "Record imputation complete",
        ));

        self.check_cancelled()?;

        // Step 5: Dataset-wide mean/mode for whatever is left
        self.report_progress(ProgressUpdate::new(
            ImputationStage::Finalizing,
            0.0,
            "Filling remaining cells...",
        ));
        info!("Step 5: Finalizing...");

        let remaining = state.remaining_missing();
        if remaining > 0 {
            warn!(
                "{} cell(s) could not be imputed from a neighbourhood, using mean/mode",
                remaining
            );
            let fallback =
                StatisticalImputer::fill_remaining(&mut records, dataset.schema(), &mut processing_steps);
            summary
                .cells_imputed
                .add(NeighborhoodSource::Fallback, fallback.filled);
            for name in fallback.unfillable {
                summary.add_warning(format!(
                    "Attribute '{}' has no observed value; its cells stay missing",
                    name
                ));
            }
        }

        let imputed = dataset.with_records(records)?;
        summary.missing_after = imputed.total_missing();
        for (a, attribute) in summary.attribute_summaries.iter_mut().enumerate() {
            attribute.missing_after = imputed.missing_count(a);
        }
        summary.duration_ms = start_time.elapsed().as_millis() as u64;

        self.report_progress(ProgressUpdate::new(
            ImputationStage::Finalizing,
            1.0,
            "Imputation finalized",
        ));
        info!(
            imputed = summary.cells_imputed.total(),
            remaining = summary.missing_after,
            duration_ms = summary.duration_ms,
            "Imputation complete"
        );

        Ok(ImputationResult {
            dataset: imputed,
            trees: trees.into_reports(),
            summary,
            processing_steps,
        })
    }
}

/// Builder for creating a [`Pipeline`] instance.
///
/// Use [`Pipeline::builder()`] to get started.
///
/// # Example
///
/// ```rust,ignore
/// use kdmi_impute::{Pipeline, ImputationConfig, CancellationToken};
///
/// let token = CancellationToken::new();
///
/// let pipeline = Pipeline::builder()
///     .config(ImputationConfig::default())
///     .cancellation_token(token)
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?;
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<ImputationConfig>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
}

// Ensure PipelineBuilder is Send (can be moved to another thread during construction)
static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: ImputationConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a progress reporter for receiving updates during processing.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use kdmi_impute::{ProgressReporter, ProgressUpdate};
    /// use std::sync::Arc;
    ///
    /// struct MyReporter;
    ///
    /// impl ProgressReporter for MyReporter {
    ///     fn report(&self, update: ProgressUpdate) {
    ///         println!("{}: {}", update.stage.display_name(), update.message);
    ///     }
    /// }
    ///
    /// let pipeline = Pipeline::builder()
    ///     .progress_reporter(Arc::new(MyReporter))
    ///     .build()?;
    /// ```
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// This is a convenience method for simple progress handling.
    /// For more complex scenarios, use [`progress_reporter`](Self::progress_reporter).
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Set a cancellation token for stopping the pipeline.
    ///
    /// Clone the token and call [`CancellationToken::cancel()`] from
    /// any thread to request cancellation. The pipeline checks the token
    /// between stages and between records and returns
    /// [`ImputationError::Cancelled`] once cancellation is requested.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use kdmi_impute::{Pipeline, CancellationToken, ImputationError};
    /// use std::thread;
    /// use std::time::Duration;
    ///
    /// let token = CancellationToken::new();
    /// let token_for_cancel = token.clone();
    ///
    /// thread::spawn(move || {
    ///     thread::sleep(Duration::from_secs(5));
    ///     token_for_cancel.cancel();
    /// });
    ///
    /// let result = Pipeline::builder()
    ///     .cancellation_token(token)
    ///     .build()?
    ///     .process(dataset);
    ///
    /// if let Err(ImputationError::Cancelled) = result {
    ///     println!("Imputation was cancelled");
    /// }
    /// ```
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<Pipeline, crate::config::ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(Pipeline {
            config,
            progress_reporter: self.progress_reporter,
            cancellation_token: self.cancellation_token.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Value;
    use crate::dataset::test_support::weather;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn with_holes(holes: &[(usize, usize)]) -> Dataset {
        let ds = weather();
        let mut records = ds.records().to_vec();
        for &(r, a) in holes {
            records[r].values[a] = Value::Missing;
        }
        ds.with_records(records).unwrap()
    }

    fn small_config() -> ImputationConfig {
        ImputationConfig::builder()
            .min_records(2)
            .parallel(false)
            .build()
            .unwrap()
    }

    #[test]
    fn test_pipeline_builder_default() {
        let pipeline = Pipeline::builder().build().unwrap();
        assert!(pipeline.progress_reporter.is_none());
        assert_eq!(pipeline.config.min_records, 20);
    }

    #[test]
    fn test_pipeline_builder_rejects_invalid_config() {
        let mut config = ImputationConfig::default();
        config.confidence_factor = 1.5;
        assert!(Pipeline::builder().config(config).build().is_err());
    }

    #[test]
    fn test_pipeline_builder_with_cancellation_token() {
        let token = CancellationToken::new();
        let token_clone = token.clone();

        let pipeline = Pipeline::builder()
            .cancellation_token(token)
            .build()
            .unwrap();

        assert!(!pipeline.cancellation_token.is_cancelled());

        token_clone.cancel();

        assert!(pipeline.cancellation_token.is_cancelled());
    }

    #[test]
    fn test_pipeline_builder_with_progress_callback() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let pipeline = Pipeline::builder()
            .on_progress(move |_update| {
                call_count_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        pipeline.report_progress(ProgressUpdate::new(
            ImputationStage::BuildingTrees,
            0.5,
            "Test",
        ));

        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_check_cancelled() {
        let token = CancellationToken::new();

        let pipeline = Pipeline::builder()
            .cancellation_token(token.clone())
            .build()
            .unwrap();

        assert!(pipeline.check_cancelled().is_ok());

        token.cancel();
        let result = pipeline.check_cancelled();
        assert!(matches!(result.unwrap_err(), ImputationError::Cancelled));
    }

    // ========================================================================
    // process
    // ========================================================================

    #[test]
    fn test_process_fills_every_cell() {
        let ds = with_holes(&[(0, 0), (3, 1), (6, 2), (9, 3), (12, 1), (12, 3)]);
        let result = Pipeline::builder()
            .config(small_config())
            .build()
            .unwrap()
            .process(ds)
            .unwrap();

        assert!(!result.dataset.has_missing());
        assert_eq!(result.summary.missing_before, 6);
        assert_eq!(result.summary.missing_after, 0);
        assert_eq!(result.summary.cells_imputed.total(), 6);
        assert_eq!(result.summary.trees_built, 4);
        assert_eq!(result.trees.len(), 4);
        assert_eq!(result.dataset.len(), 14);
        assert!(result.summary.attribute_summaries.iter().all(|a| a.has_tree));
    }

    #[test]
    fn test_process_complete_dataset_is_unchanged() {
        let ds = weather();
        let result = Pipeline::builder().build().unwrap().process(ds.clone()).unwrap();

        assert_eq!(result.summary.missing_before, 0);
        assert!(result.trees.is_empty());
        assert_eq!(result.dataset.records(), ds.records());
    }

    #[test]
    fn test_process_reports_stages_in_order() {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let sink = stages.clone();
        let ds = with_holes(&[(2, 1)]);

        Pipeline::builder()
            .config(small_config())
            .on_progress(move |update| sink.lock().push(update.stage))
            .build()
            .unwrap()
            .process(ds)
            .unwrap();

        let stages = stages.lock();
        assert_eq!(stages.first(), Some(&ImputationStage::Initializing));
        assert_eq!(stages.last(), Some(&ImputationStage::Complete));
        assert!(stages.contains(&ImputationStage::Imputing));
        let progress_order: Vec<f32> = stages.iter().map(|s| s.base_progress()).collect();
        assert!(progress_order.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_process_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let last = Arc::new(Mutex::new(None));
        let sink = last.clone();

        let err = Pipeline::builder()
            .cancellation_token(token)
            .on_progress(move |update| *sink.lock() = Some(update.stage))
            .build()
            .unwrap()
            .process(with_holes(&[(1, 1)]))
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(*last.lock(), Some(ImputationStage::Cancelled));
    }

    #[test]
    fn test_process_empty_dataset() {
        let empty = weather().partition(|_| false);
        let err = Pipeline::builder().build().unwrap().process(empty).unwrap_err();
        assert!(matches!(err, ImputationError::EmptyDataset));
    }
}

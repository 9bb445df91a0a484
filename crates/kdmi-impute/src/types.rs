use crate::dataset::Dataset;
use crate::tree::{DecisionTree, RuleSet};
use serde::{Deserialize, Serialize};

/// Where the neighbourhood for an imputed cell came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborhoodSource {
    /// The leaf of the attribute's own tree.
    OwnLeaf,
    /// The leaf of another attribute's tree that classified the record.
    BorrowedLeaf,
    /// No tree classified the record; every record was a candidate.
    WholeDataset,
    /// Dataset-wide mean or mode.
    Fallback,
}

impl NeighborhoodSource {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OwnLeaf => "Own Leaf",
            Self::BorrowedLeaf => "Borrowed Leaf",
            Self::WholeDataset => "Whole Dataset",
            Self::Fallback => "Mean/Mode Fallback",
        }
    }
}

/// Number of imputed cells per [`NeighborhoodSource`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCounts {
    pub own_leaf: usize,
    pub borrowed_leaf: usize,
    pub whole_dataset: usize,
    pub fallback: usize,
}

impl SourceCounts {
    pub fn record(&mut self, source: NeighborhoodSource) {
        self.add(source, 1);
    }

    pub fn add(&mut self, source: NeighborhoodSource, cells: usize) {
        match source {
            NeighborhoodSource::OwnLeaf => self.own_leaf += cells,
            NeighborhoodSource::BorrowedLeaf => self.borrowed_leaf += cells,
            NeighborhoodSource::WholeDataset => self.whole_dataset += cells,
            NeighborhoodSource::Fallback => self.fallback += cells,
        }
    }

    pub fn get(&self, source: NeighborhoodSource) -> usize {
        match source {
            NeighborhoodSource::OwnLeaf => self.own_leaf,
            NeighborhoodSource::BorrowedLeaf => self.borrowed_leaf,
            NeighborhoodSource::WholeDataset => self.whole_dataset,
            NeighborhoodSource::Fallback => self.fallback,
        }
    }

    pub fn total(&self) -> usize {
        self.own_leaf + self.borrowed_leaf + self.whole_dataset + self.fallback
    }
}

/// The tree built for one incomplete attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeTreeReport {
    pub attribute: String,
    pub attribute_index: usize,
    /// Numeric targets are coarsened into bands before induction.
    pub coarsened: bool,
    /// Complete records the tree was trained on.
    pub training_records: usize,
    pub nodes_before_pruning: usize,
    pub nodes_after_pruning: usize,
    pub leaf_count: usize,
    pub tree: DecisionTree,
    pub rules: RuleSet,
}

/// Missing-value counts of one attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeSummary {
    pub name: String,
    pub missing_before: usize,
    pub missing_after: usize,
    pub has_tree: bool,
}

impl AttributeSummary {
    pub fn new(name: impl Into<String>, missing_before: usize) -> Self {
        Self {
            name: name.into(),
            missing_before,
            missing_after: missing_before,
            has_tree: false,
        }
    }

    /// Percentage of this attribute's missing cells that were filled.
    pub fn imputation_percentage(&self) -> f32 {
        if self.missing_before == 0 {
            0.0
        } else {
            let imputed = self.missing_before.saturating_sub(self.missing_after);
            (imputed as f32 / self.missing_before as f32) * 100.0
        }
    }
}

/// Summary of one imputation run.
///
/// # Example
///
/// ```rust,ignore
/// let summary = &result.summary;
/// println!(
///     "Filled {} of {} cells in {}ms",
///     summary.cells_imputed.total(),
///     summary.missing_before,
///     summary.duration_ms
/// );
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImputationSummary {
    /// Start of the run, RFC 3339.
    pub started_at: String,
    /// Total execution time in milliseconds.
    pub duration_ms: u64,

    pub records: usize,
    pub attributes: usize,
    /// Records with at least one missing cell before imputation.
    pub incomplete_records: usize,

    pub missing_before: usize,
    pub missing_after: usize,
    pub cells_imputed: SourceCounts,

    pub trees_built: usize,
    pub attribute_summaries: Vec<AttributeSummary>,

    /// Warnings and notes generated during the run.
    pub warnings: Vec<String>,
}

impl ImputationSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Percentage of the initially missing cells that were filled.
    pub fn imputed_percentage(&self) -> f32 {
        if self.missing_before == 0 {
            0.0
        } else {
            let imputed = self.missing_before.saturating_sub(self.missing_after);
            (imputed as f32 / self.missing_before as f32) * 100.0
        }
    }
}

/// Output of [`Pipeline::process`](crate::Pipeline::process).
#[derive(Debug, Clone)]
pub struct ImputationResult {
    /// The dataset with missing cells filled.
    pub dataset: Dataset,
    /// One report per attribute that got a tree.
    pub trees: Vec<AttributeTreeReport>,
    pub summary: ImputationSummary,
    pub processing_steps: Vec<String>,
}

impl ImputationResult {
    pub fn tree_for(&self, attribute: &str) -> Option<&AttributeTreeReport> {
        self.trees.iter().find(|t| t.attribute == attribute)
    }

    /// Summary as pretty-printed JSON.
    pub fn summary_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(&self.summary)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

//! One decision tree per incomplete attribute.
//!
//! Each tree predicts its attribute from the others and is induced on the
//! complete records only. A numeric target is first coarsened into bands so
//! the tree has categorical classes; the bands exist only for induction.

use crate::config::ImputationConfig;
use crate::dataset::{AttributeType, Dataset, Record, Value};
use crate::error::{ImputationError, Result, ResultExt};
use crate::pipeline::progress::CancellationToken;
use crate::tree::{Pruner, RuleSet, TreeBuilder};
use crate::types::AttributeTreeReport;
use rayon::prelude::*;
use tracing::{debug, warn};

/// Inclusive value band of a coarsened numeric attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

impl Band {
    pub fn label(&self) -> String {
        format!("{}-{}", self.low, self.high)
    }
}

/// Split the sorted distinct values into roughly `√d` contiguous bands.
///
/// A remainder larger than half the band count gets a band of its own;
/// otherwise it is absorbed by the last band.
pub fn coarsen_bands(distinct: &[f64]) -> Vec<Band> {
    let d = distinct.len();
    if d == 0 {
        return Vec::new();
    }
    let mut groups = if d > 2 {
        ((d as f64).sqrt().round() as usize).max(1)
    } else {
        d
    };
    let size = (d / groups).max(1);
    let mut remainder = d % groups;
    if remainder as f64 > groups as f64 / 2.0 {
        groups += 1;
        remainder = 0;
    }

    let mut bands: Vec<Band> = (0..groups)
        .map(|g| g * size)
        .take_while(|&low| low < d)
        .map(|low| Band {
            low: distinct[low],
            high: distinct[(low + size - 1).min(d - 1)],
        })
        .collect();
    if remainder > 0 {
        if let Some(last) = bands.last_mut() {
            last.high = distinct[d - 1];
        }
    }
    bands
}

/// Band label of `value`; values outside every band label themselves.
pub fn band_label(bands: &[Band], value: f64) -> String {
    bands
        .iter()
        .find(|b| b.low <= value && value <= b.high)
        .map(Band::label)
        .unwrap_or_else(|| format!("{}-{}", value, value))
}

/// Copy of `training` whose numeric `attribute` is replaced by band labels.
fn coarsen(training: &Dataset, attribute: usize) -> Result<Dataset> {
    let bands = coarsen_bands(training.domain(attribute).numbers());
    let records = training
        .records()
        .iter()
        .map(|r| {
            let mut values = r.values.clone();
            if let Some(x) = r.value(attribute).as_number() {
                values[attribute] = Value::Category(band_label(&bands, x));
            }
            Record::new(r.id, values)
        })
        .collect();
    let schema = training
        .schema()
        .with_kind(attribute, AttributeType::Categorical);
    Dataset::new(schema, records)
}

/// Trees of every attribute that has missing cells.
#[derive(Debug, Clone, Default)]
pub struct AttributeTrees {
    reports: Vec<AttributeTreeReport>,
    /// Attribute position to index in `reports`.
    index: Vec<Option<usize>>,
}

impl AttributeTrees {
    /// Build a tree for every attribute of `dataset` with at least one
    /// missing cell.
    ///
    /// Returns no trees when the dataset has no complete record.
    pub fn build(
        dataset: &Dataset,
        config: &ImputationConfig,
        cancel: &CancellationToken,
    ) -> Result<AttributeTrees> {
        let targets: Vec<usize> = (0..dataset.attribute_count())
            .filter(|&a| dataset.missing_count(a) > 0)
            .collect();
        let mut trees = AttributeTrees {
            reports: Vec::new(),
            index: vec![None; dataset.attribute_count()],
        };
        if targets.is_empty() {
            return Ok(trees);
        }

        let training = dataset.complete_records();
        if training.is_empty() {
            warn!("No complete record, skipping tree induction");
            return Ok(trees);
        }

        let build_one = |&attribute: &usize| -> Result<AttributeTreeReport> {
            if cancel.is_cancelled() {
                return Err(ImputationError::Cancelled);
            }
            let name = &dataset.schema().attribute(attribute).name;
            Self::build_for(&training, attribute, config)
                .context(format!("While building the tree for '{}'", name))
        };
        let reports: Vec<AttributeTreeReport> = if config.parallel {
            targets.par_iter().map(build_one).collect::<Result<_>>()?
        } else {
            targets.iter().map(build_one).collect::<Result<_>>()?
        };

        for (i, report) in reports.iter().enumerate() {
            trees.index[report.attribute_index] = Some(i);
        }
        trees.reports = reports;
        Ok(trees)
    }

    fn build_for(
        training: &Dataset,
        attribute: usize,
        config: &ImputationConfig,
    ) -> Result<AttributeTreeReport> {
        let kind = training.schema().attribute(attribute).kind;
        let coarsened = kind == AttributeType::Numeric;
        let targeted = if coarsened {
            coarsen(training, attribute)?.with_class(attribute)?
        } else {
            training.with_class(attribute)?
        };

        let mut tree = TreeBuilder::from_config(config).build(&targeted)?;
        let nodes_before_pruning = tree.node_count();
        if config.enable_pruning {
            Pruner::from_config(config).prune(&mut tree)?;
        }
        let rules = RuleSet::from_tree(&tree);

        let name = training.schema().attribute(attribute).name.clone();
        debug!(
            attribute = %name,
            classes = tree.class_values().len(),
            nodes_before = nodes_before_pruning,
            nodes_after = tree.node_count(),
            leaves = tree.leaf_count(),
            "Built tree"
        );
        Ok(AttributeTreeReport {
            attribute: name,
            attribute_index: attribute,
            coarsened,
            training_records: targeted.len(),
            nodes_before_pruning,
            nodes_after_pruning: tree.node_count(),
            leaf_count: tree.leaf_count(),
            tree,
            rules,
        })
    }

    pub fn rules(&self, attribute: usize) -> Option<&RuleSet> {
        self.report(attribute).map(|r| &r.rules)
    }

    pub fn report(&self, attribute: usize) -> Option<&AttributeTreeReport> {
        self.index
            .get(attribute)
            .copied()
            .flatten()
            .map(|i| &self.reports[i])
    }

    pub fn has_tree(&self, attribute: usize) -> bool {
        self.report(attribute).is_some()
    }

    pub fn reports(&self) -> &[AttributeTreeReport] {
        &self.reports
    }

    pub fn into_reports(self) -> Vec<AttributeTreeReport> {
        self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }
}

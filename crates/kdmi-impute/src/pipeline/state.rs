//! Bookkeeping shared by every record during imputation.

use super::forest::AttributeTrees;
use crate::dataset::{AttributeType, Dataset};
use rayon::prelude::*;

/// Missing cells, leaf assignments and leaf contents of one run.
///
/// Leaves are assigned once, on the data as loaded, before any cell is
/// filled. The missing mask is updated as cells are imputed so later records
/// see earlier imputations as observed values.
#[derive(Debug, Clone)]
pub struct ImputationState {
    missing: Vec<Vec<bool>>,
    incomplete: Vec<bool>,
    /// `[record][attribute]`: index of the rule that classified the record.
    leaves: Vec<Vec<Option<usize>>>,
    /// `[attribute][leaf]`: positions of the records in the leaf.
    members: Vec<Vec<Vec<usize>>>,
    /// `[attribute][leaf]`: majority class of a categorical attribute's leaf.
    majority: Vec<Vec<Option<String>>>,
}

impl ImputationState {
    pub fn new(dataset: &Dataset, trees: &AttributeTrees, parallel: bool) -> Self {
        let attributes = dataset.attribute_count();
        let missing = dataset.missing_mask();
        let incomplete = missing.iter().map(|row| row.iter().any(|&m| m)).collect();

        let classify = |position: usize| -> Vec<Option<usize>> {
            let record = dataset.record(position);
            (0..attributes)
                .map(|a| trees.rules(a).and_then(|rules| rules.classify(record)))
                .collect()
        };
        let leaves: Vec<Vec<Option<usize>>> = if parallel {
            (0..dataset.len()).into_par_iter().map(classify).collect()
        } else {
            (0..dataset.len()).map(classify).collect()
        };

        let mut members: Vec<Vec<Vec<usize>>> = (0..attributes)
            .map(|a| vec![Vec::new(); trees.rules(a).map_or(0, |r| r.len())])
            .collect();
        for (position, row) in leaves.iter().enumerate() {
            for (attribute, leaf) in row.iter().enumerate() {
                if let Some(leaf) = *leaf {
                    members[attribute][leaf].push(position);
                }
            }
        }

        let majority = (0..attributes)
            .map(|a| match trees.rules(a) {
                Some(rules) if dataset.schema().attribute(a).kind == AttributeType::Categorical => {
                    (0..rules.len())
                        .map(|leaf| rules.majority(leaf).map(str::to_string))
                        .collect()
                }
                _ => Vec::new(),
            })
            .collect();

        Self {
            missing,
            incomplete,
            leaves,
            members,
            majority,
        }
    }

    /// State assembled by hand, for exercising the fallback chain directly.
    #[cfg(test)]
    pub(crate) fn from_parts(
        missing: Vec<Vec<bool>>,
        leaves: Vec<Vec<Option<usize>>>,
        members: Vec<Vec<Vec<usize>>>,
        majority: Vec<Vec<Option<String>>>,
    ) -> Self {
        let incomplete = missing.iter().map(|row| row.iter().any(|&m| m)).collect();
        Self {
            missing,
            incomplete,
            leaves,
            members,
            majority,
        }
    }

    pub fn is_missing(&self, record: usize, attribute: usize) -> bool {
        self.missing[record][attribute]
    }

    pub fn mark_filled(&mut self, record: usize, attribute: usize) {
        self.missing[record][attribute] = false;
    }

    /// Whether the record had a missing cell before imputation started.
    pub fn is_incomplete(&self, record: usize) -> bool {
        self.incomplete[record]
    }

    pub fn incomplete_records(&self) -> Vec<usize> {
        (0..self.incomplete.len())
            .filter(|&r| self.incomplete[r])
            .collect()
    }

    /// Leaf of `attribute`'s tree that classified `record`.
    pub fn leaf(&self, record: usize, attribute: usize) -> Option<usize> {
        self.leaves[record][attribute]
    }

    /// Attributes whose tree classified `record`.
    pub fn classified(&self, record: usize) -> impl Iterator<Item = usize> + '_ {
        self.leaves[record]
            .iter()
            .enumerate()
            .filter(|(_, leaf)| leaf.is_some())
            .map(|(a, _)| a)
    }

    pub fn leaf_members(&self, attribute: usize, leaf: usize) -> &[usize] {
        &self.members[attribute][leaf]
    }

    pub fn leaf_majority(&self, attribute: usize, leaf: usize) -> Option<&str> {
        self.majority[attribute]
            .get(leaf)
            .and_then(|m| m.as_deref())
    }

    pub fn remaining_missing(&self) -> usize {
        self.missing
            .iter()
            .map(|row| row.iter().filter(|&&m| m).count())
            .sum()
    }
}

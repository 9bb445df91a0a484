//! Best-split search over a dataset partition.
//!
//! Two variants are available. [`TreeAlgorithm::Strict`] follows See5: one
//! child per value of a categorical attribute and a single `<=`/`>` threshold
//! for numeric attributes. [`TreeAlgorithm::Exploratory`] tests one category
//! against the rest, scored by the ultimate gain ratio, and searches contiguous
//! value windows of numeric attributes, scored by the penalised gain ratio.

use super::entropy::{
    entropy, gain_ratio, numeric_penalty, split_information, ultimate_multiplier,
    weighted_entropy,
};
use super::node::Branch;
use crate::config::TreeAlgorithm;
use crate::dataset::{AttributeType, Dataset, Domain, Schema};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SplitKind {
    /// One child per observed value.
    Multiway,
    /// `<= value` / `> value`; `index` is the value's position in the domain.
    Threshold { value: f64, index: usize },
    /// `= value` / `!= value`.
    Category { value: String, index: usize },
    /// Closed window `[low, high]` / everything outside it.
    Window {
        low: f64,
        high: f64,
        low_index: usize,
        high_index: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub attribute: usize,
    pub attribute_type: AttributeType,
    /// Gain ratio, or ultimate gain ratio for an exploratory categorical test.
    pub score: f64,
    pub kind: SplitKind,
}

impl Split {
    /// Descending by score.
    pub fn rank(a: &Split, b: &Split) -> Ordering {
        b.score.total_cmp(&a.score)
    }

    /// Child predicates in child order.
    pub fn branches(&self, partition: &Dataset) -> Vec<Branch> {
        match &self.kind {
            SplitKind::Multiway => partition
                .domain(self.attribute)
                .categories()
                .iter()
                .map(|v| Branch::Category(v.clone()))
                .collect(),
            SplitKind::Threshold { value, .. } => {
                vec![Branch::AtMost(*value), Branch::Above(*value)]
            }
            SplitKind::Category { value, .. } => vec![
                Branch::Category(value.clone()),
                Branch::NotCategory(value.clone()),
            ],
            SplitKind::Window { low, high, .. } => {
                vec![Branch::Within(*low, *high), Branch::Outside(*low, *high)]
            }
        }
    }

    pub fn description(&self, schema: &Schema) -> String {
        let name = &schema.attribute(self.attribute).name;
        match &self.kind {
            SplitKind::Multiway => format!("{} (multiway)", name),
            SplitKind::Threshold { value, .. } => format!("{} <= {}", name, value),
            SplitKind::Category { value, .. } => format!("{} = {}", name, value),
            SplitKind::Window { low, high, .. } => format!("{} in [{}, {}]", name, low, high),
        }
    }
}

/// Split search parameters.
#[derive(Debug, Clone, Copy)]
pub struct SplitSearch {
    pub algorithm: TreeAlgorithm,
    pub min_records: usize,
    pub min_gain_ratio: f64,
}

impl SplitSearch {
    pub fn new(algorithm: TreeAlgorithm, min_records: usize, min_gain_ratio: f64) -> Self {
        Self {
            algorithm,
            min_records,
            min_gain_ratio,
        }
    }

    /// Best split of `partition`, or `None` when the partition is too small,
    /// already pure, or no candidate scores above the minimum gain ratio.
    ///
    /// Ties between attributes keep the lower attribute index.
    pub fn find_best(&self, partition: &Dataset) -> Option<Split> {
        let n = partition.len();
        if n < self.min_records {
            return None;
        }
        let class_entropy = entropy(&partition.class_counts());
        if class_entropy == 0.0 {
            return None;
        }

        let mut best: Option<Split> = None;
        for attribute in 0..partition.attribute_count() {
            if attribute == partition.class_index() {
                continue;
            }
            let candidate = match (self.algorithm, partition.domain(attribute)) {
                (TreeAlgorithm::Strict, Domain::Categorical(_)) => {
                    multiway(partition, attribute, class_entropy)
                }
                (TreeAlgorithm::Strict, Domain::Numeric(_)) => {
                    threshold(partition, attribute, class_entropy)
                }
                (TreeAlgorithm::Exploratory, Domain::Categorical(_)) => {
                    one_against_rest(partition, attribute, class_entropy)
                }
                (TreeAlgorithm::Exploratory, Domain::Numeric(_)) => {
                    window(partition, attribute, class_entropy)
                }
            };
            if let Some(candidate) = candidate
                && best.as_ref().is_none_or(|b| candidate.score > b.score)
            {
                best = Some(candidate);
            }
        }

        best.filter(|split| split.score > self.min_gain_ratio)
    }
}

fn add_into(total: &mut [usize], counts: &[usize]) {
    for (t, c) in total.iter_mut().zip(counts) {
        *t += c;
    }
}

fn subtract(total: &[usize], counts: &[usize]) -> Vec<usize> {
    total.iter().zip(counts).map(|(t, c)| t - c).collect()
}

/// Class counts of every domain value of `attribute`.
fn value_class_counts(partition: &Dataset, attribute: usize) -> Vec<Vec<usize>> {
    partition
        .attribute_support(attribute)
        .values
        .iter()
        .map(|support| support.class_counts())
        .collect()
}

fn multiway(partition: &Dataset, attribute: usize, class_entropy: f64) -> Option<Split> {
    let counts = value_class_counts(partition, attribute);
    if counts.len() < 2 {
        return None;
    }
    let n = partition.len();
    let groups: Vec<&[usize]> = counts.iter().map(Vec::as_slice).collect();
    let sizes: Vec<usize> = counts.iter().map(|c| c.iter().sum()).collect();
    let gain = class_entropy - weighted_entropy(&groups, n);
    Some(Split {
        attribute,
        attribute_type: AttributeType::Categorical,
        score: gain_ratio(gain, split_information(&sizes)),
        kind: SplitKind::Multiway,
    })
}

fn threshold(partition: &Dataset, attribute: usize, class_entropy: f64) -> Option<Split> {
    let values = partition.domain(attribute).numbers();
    if values.len() < 2 {
        return None;
    }
    let n = partition.len();
    let counts = value_class_counts(partition, attribute);
    let total = partition.class_counts();

    let mut below = vec![0usize; total.len()];
    let mut best: Option<(usize, f64, [usize; 2])> = None;
    for index in 0..values.len() - 1 {
        add_into(&mut below, &counts[index]);
        let above = subtract(&total, &below);
        let we = weighted_entropy(&[below.as_slice(), above.as_slice()], n);
        if best.is_none_or(|(_, best_we, _)| we < best_we) {
            let left: usize = below.iter().sum();
            best = Some((index, we, [left, n - left]));
        }
    }

    let (index, we, sizes) = best?;
    let gain = class_entropy - we - numeric_penalty(values.len(), n);
    Some(Split {
        attribute,
        attribute_type: AttributeType::Numeric,
        score: gain_ratio(gain, split_information(&sizes)),
        kind: SplitKind::Threshold {
            value: values[index],
            index,
        },
    })
}

fn one_against_rest(partition: &Dataset, attribute: usize, class_entropy: f64) -> Option<Split> {
    let counts = value_class_counts(partition, attribute);
    if counts.len() < 2 {
        return None;
    }
    let n = partition.len();
    let total = partition.class_counts();
    let categories = partition.domain(attribute).categories();

    let mut best: Option<Split> = None;
    for (index, inside) in counts.iter().enumerate() {
        let size: usize = inside.iter().sum();
        if size <= 2 {
            continue;
        }
        let outside = subtract(&total, inside);
        let we = weighted_entropy(&[inside.as_slice(), outside.as_slice()], n);
        let score = gain_ratio(class_entropy - we, split_information(&[size, n - size]))
            * ultimate_multiplier(size);
        if best.as_ref().is_none_or(|b| score > b.score) {
            best = Some(Split {
                attribute,
                attribute_type: AttributeType::Categorical,
                score,
                kind: SplitKind::Category {
                    value: categories[index].clone(),
                    index,
                },
            });
        }
    }
    best
}

/// Window search over the sorted domain. A window touching the lower end of
/// the domain becomes a `<=` threshold at its upper value; otherwise a window
/// touching the upper end becomes a `>` threshold at the value just below it.
/// The window spanning the whole domain is never a candidate. Windows are
/// ranked by plain gain ratio less the numeric penalty, whatever their size.
fn window(partition: &Dataset, attribute: usize, class_entropy: f64) -> Option<Split> {
    let values = partition.domain(attribute).numbers();
    let d = values.len();
    if d < 2 {
        return None;
    }
    let n = partition.len();
    let counts = value_class_counts(partition, attribute);
    let total = partition.class_counts();
    let penalty = numeric_penalty(d, n);

    let mut best: Option<Split> = None;
    for low in 0..d {
        let mut inside = vec![0usize; total.len()];
        for high in low..d {
            add_into(&mut inside, &counts[high]);
            if low == 0 && high == d - 1 {
                continue;
            }
            let size: usize = inside.iter().sum();
            let outside = subtract(&total, &inside);
            let we = weighted_entropy(&[inside.as_slice(), outside.as_slice()], n);
            let gain = class_entropy - we - penalty;
            let score = gain_ratio(gain, split_information(&[size, n - size]));
            if best.as_ref().is_none_or(|b| score > b.score) {
                let kind = if low == 0 {
                    SplitKind::Threshold {
                        value: values[high],
                        index: high,
                    }
                } else if high == d - 1 {
                    SplitKind::Threshold {
                        value: values[low - 1],
                        index: low - 1,
                    }
                } else {
                    SplitKind::Window {
                        low: values[low],
                        high: values[high],
                        low_index: low,
                        high_index: high,
                    }
                };
                best = Some(Split {
                    attribute,
                    attribute_type: AttributeType::Numeric,
                    score,
                    kind,
                });
            }
        }
    }
    best
}

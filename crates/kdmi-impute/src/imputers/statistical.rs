//! Statistical imputation: mean, mode and majority vote.
//!
//! Used for categorical cells inside a neighbourhood and as the final
//! dataset-wide fallback for cells no other strategy could fill.

use crate::dataset::{AttributeType, Record, Schema, Value};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Outcome of [`StatisticalImputer::fill_remaining`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FallbackReport {
    /// Cells filled with a dataset-wide mean or mode.
    pub filled: usize,
    /// Attributes with no observed value; their cells stay missing.
    pub unfillable: Vec<String>,
}

/// Statistical imputation methods for filling missing values.
pub struct StatisticalImputer;

impl StatisticalImputer {
    /// Mean of the observed numeric values of `attribute`.
    pub fn mean<'a>(records: impl IntoIterator<Item = &'a Record>, attribute: usize) -> Option<f64> {
        let (sum, count) = records
            .into_iter()
            .filter_map(|r| r.value(attribute).as_number())
            .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
        (count > 0).then(|| sum / count as f64)
    }

    /// Most frequent observed category of `attribute`; ties go to the value
    /// seen first.
    pub fn mode<'a>(
        records: impl IntoIterator<Item = &'a Record>,
        attribute: usize,
    ) -> Option<String> {
        Self::majority(
            records
                .into_iter()
                .filter_map(|r| r.value(attribute).as_category()),
        )
        .map(str::to_string)
    }

    /// Most frequent value of `values`; ties go to the value seen first.
    pub fn majority<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for value in values {
            match counts.iter_mut().find(|(v, _)| *v == value) {
                Some((_, c)) => *c += 1,
                None => counts.push((value, 1)),
            }
        }
        let mut best: Option<(&str, usize)> = None;
        for (value, count) in counts {
            if best.is_none_or(|(_, b)| count > b) {
                best = Some((value, count));
            }
        }
        best.map(|(v, _)| v)
    }

    /// Dataset-wide replacement value for `attribute`.
    pub fn fill_value(records: &[Record], schema: &Schema, attribute: usize) -> Option<Value> {
        match schema.attribute(attribute).kind {
            AttributeType::Numeric => Self::mean(records, attribute).map(Value::Number),
            AttributeType::Categorical => Self::mode(records, attribute).map(Value::Category),
        }
    }

    /// Fill every remaining missing cell with the mean (numeric) or mode
    /// (categorical) of its attribute.
    pub fn fill_remaining(
        records: &mut [Record],
        schema: &Schema,
        processing_steps: &mut Vec<String>,
    ) -> FallbackReport {
        let mut report = FallbackReport::default();
        for attribute in 0..schema.len() {
            let missing: Vec<usize> = records
                .iter()
                .enumerate()
                .filter(|(_, r)| r.value(attribute).is_missing())
                .map(|(i, _)| i)
                .collect();
            if missing.is_empty() {
                continue;
            }
            let name = &schema.attribute(attribute).name;
            let Some(fill) = Self::fill_value(records, schema, attribute) else {
                warn!(attribute = %name, cells = missing.len(), "No observed value, cells left missing");
                report.unfillable.push(name.clone());
                continue;
            };

            for &i in &missing {
                records[i].values[attribute] = fill.clone();
            }
            report.filled += missing.len();
            processing_steps.push(format!(
                "Filled {} remaining cell(s) of '{}' with {}: {}",
                missing.len(),
                name,
                match schema.attribute(attribute).kind {
                    AttributeType::Numeric => "mean",
                    AttributeType::Categorical => "mode",
                },
                fill
            ));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Attribute;
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        Schema::new(vec![
            Attribute::numeric("x"),
            Attribute::categorical("color"),
            Attribute::numeric("empty"),
        ])
    }

    fn records() -> Vec<Record> {
        let rows = [
            (Some(1.0), Some("red")),
            (None, Some("blue")),
            (Some(5.0), None),
            (Some(3.0), Some("blue")),
            (None, Some("red")),
        ];
        rows.iter()
            .enumerate()
            .map(|(id, (x, c))| {
                Record::new(
                    id,
                    vec![
                        x.map(Value::Number).unwrap_or(Value::Missing),
                        c.map(|c| Value::Category(c.to_string()))
                            .unwrap_or(Value::Missing),
                        Value::Missing,
                    ],
                )
            })
            .collect()
    }

    // ========================================================================
    // mean / mode / majority
    // ========================================================================

    #[test]
    fn test_mean_ignores_missing() {
        assert_eq!(StatisticalImputer::mean(&records(), 0), Some(3.0));
        assert_eq!(StatisticalImputer::mean(&records(), 2), None);
    }

    #[test]
    fn test_mode_ties_go_to_first_seen() {
        // red and blue both appear twice; red comes first
        assert_eq!(StatisticalImputer::mode(&records(), 1), Some("red".to_string()));
    }

    #[test]
    fn test_majority() {
        assert_eq!(StatisticalImputer::majority(["a", "b", "b"]), Some("b"));
        assert_eq!(StatisticalImputer::majority(Vec::<&str>::new()), None);
    }

    // ========================================================================
    // fill_remaining
    // ========================================================================

    #[test]
    fn test_fill_remaining() {
        let mut records = records();
        let mut steps = Vec::new();
        let report = StatisticalImputer::fill_remaining(&mut records, &schema(), &mut steps);

        assert_eq!(report.filled, 3);
        assert_eq!(report.unfillable, vec!["empty".to_string()]);
        assert_eq!(records[1].values[0], Value::Number(3.0));
        assert_eq!(records[2].values[1], Value::Category("red".to_string()));
        assert!(records[0].values[2].is_missing());
        assert_eq!(steps.len(), 2);
        assert!(steps[0].contains("mean"));
    }
}

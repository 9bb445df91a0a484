//! Tabular dataset abstraction shared by every stage of the pipeline.
//!
//! A [`Dataset`] owns its records, the observed domain of every attribute and a
//! [`SupportIndex`] keyed by the current class attribute. Record contents never
//! change after construction: partitioning, re-targeting and imputation all
//! produce a new `Dataset` with a freshly built index.

mod frame;
mod schema;
mod store;
mod support;
mod text;
mod value;

pub use schema::{Attribute, AttributeType, CLASS_ROLE_CODE, Schema};
pub use store::{InMemoryPartitionStore, PartitionId, PartitionStore};
pub use support::{AttributeSupport, Domain, SupportIndex, ValueSupport};
pub use value::{Record, Value, decimal_places, is_missing_token};

use crate::error::{ImputationError, Result};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Dataset {
    schema: Arc<Schema>,
    class_index: usize,
    records: Vec<Record>,
    domains: Vec<Domain>,
    supports: SupportIndex,
    /// Maximum decimal places observed per attribute, used when writing.
    precision: Vec<usize>,
}

impl Dataset {
    /// Create a dataset, checking every record against the schema.
    ///
    /// The class attribute defaults to the one declared by the schema, or the
    /// last attribute.
    pub fn new(schema: Schema, records: Vec<Record>) -> Result<Dataset> {
        if schema.is_empty() {
            return Err(ImputationError::InvalidConfig(
                "schema has no attributes".to_string(),
            ));
        }
        for record in &records {
            validate_record(&schema, record)?;
        }
        let class_index = schema.declared_class().unwrap_or(schema.len() - 1);
        let precision = observed_precision(&schema, &records);
        Ok(Self::assemble(Arc::new(schema), class_index, records, None, precision))
    }

    /// Create a dataset from rows, numbering records from zero.
    pub fn from_rows(schema: Schema, rows: Vec<Vec<Value>>) -> Result<Dataset> {
        let records = rows
            .into_iter()
            .enumerate()
            .map(|(id, values)| Record::new(id, values))
            .collect();
        Dataset::new(schema, records)
    }

    fn assemble(
        schema: Arc<Schema>,
        class_index: usize,
        records: Vec<Record>,
        class_domain: Option<Domain>,
        precision: Vec<usize>,
    ) -> Dataset {
        let mut domains: Vec<Domain> = schema
            .attributes()
            .iter()
            .enumerate()
            .map(|(i, attribute)| Domain::observe(attribute.kind, &records, i))
            .collect();
        if let Some(class_domain) = class_domain {
            domains[class_index] = class_domain;
        }
        let supports = SupportIndex::build(&schema, &records, &domains, class_index);
        Dataset {
            schema,
            class_index,
            records,
            domains,
            supports,
            precision,
        }
    }

    /// Same records with a different class attribute.
    pub fn with_class(&self, class_index: usize) -> Result<Dataset> {
        if class_index >= self.schema.len() {
            return Err(ImputationError::AttributeNotFound(format!(
                "#{}",
                class_index
            )));
        }
        Ok(Self::assemble(
            self.schema.clone(),
            class_index,
            self.records.clone(),
            None,
            self.precision.clone(),
        ))
    }

    /// Replace the records while keeping schema, class attribute and precision.
    pub fn with_records(&self, records: Vec<Record>) -> Result<Dataset> {
        for record in &records {
            validate_record(&self.schema, record)?;
        }
        Ok(Self::assemble(
            self.schema.clone(),
            self.class_index,
            records,
            None,
            self.precision.clone(),
        ))
    }

    /// New dataset holding the records for which `keep` returns `true`.
    ///
    /// Records are deep-copied and the support index is rebuilt. The class
    /// domain is inherited so class-support vectors of sibling partitions stay
    /// aligned with the parent's.
    pub fn partition<F>(&self, keep: F) -> Dataset
    where
        F: Fn(&Record) -> bool,
    {
        let records = self.records.iter().filter(|r| keep(r)).cloned().collect();
        Self::assemble(
            self.schema.clone(),
            self.class_index,
            records,
            Some(self.domains[self.class_index].clone()),
            self.precision.clone(),
        )
    }

    /// New dataset of the records without any missing cell.
    pub fn complete_records(&self) -> Dataset {
        let records = self
            .records
            .iter()
            .filter(|r| r.is_complete())
            .cloned()
            .collect();
        Self::assemble(
            self.schema.clone(),
            self.class_index,
            records,
            None,
            self.precision.clone(),
        )
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn record(&self, position: usize) -> &Record {
        &self.records[position]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn attribute_count(&self) -> usize {
        self.schema.len()
    }

    pub fn class_index(&self) -> usize {
        self.class_index
    }

    pub fn domain(&self, attribute: usize) -> &Domain {
        &self.domains[attribute]
    }

    pub fn class_domain(&self) -> &Domain {
        &self.domains[self.class_index]
    }

    pub fn supports(&self) -> &SupportIndex {
        &self.supports
    }

    pub fn attribute_support(&self, attribute: usize) -> &AttributeSupport {
        self.supports.attribute(attribute)
    }

    /// Record count per class value, indexed like [`Dataset::class_domain`].
    pub fn class_counts(&self) -> Vec<usize> {
        self.supports
            .attribute(self.class_index)
            .values
            .iter()
            .map(ValueSupport::count)
            .collect()
    }

    /// Smallest observed value of a numeric attribute.
    pub fn low_domain(&self, attribute: usize) -> Option<f64> {
        self.domains[attribute].numbers().first().copied()
    }

    /// Largest observed value of a numeric attribute.
    pub fn high_domain(&self, attribute: usize) -> Option<f64> {
        self.domains[attribute].numbers().last().copied()
    }

    pub fn precision(&self, attribute: usize) -> usize {
        self.precision[attribute]
    }

    pub(crate) fn with_precision(mut self, precision: Vec<usize>) -> Dataset {
        self.precision = precision;
        self
    }

    /// `mask[r][a]` is `true` when attribute `a` of record `r` is missing.
    pub fn missing_mask(&self) -> Vec<Vec<bool>> {
        self.records
            .iter()
            .map(|r| r.values.iter().map(Value::is_missing).collect())
            .collect()
    }

    pub fn has_missing(&self) -> bool {
        self.records.iter().any(|r| !r.is_complete())
    }

    pub fn missing_count(&self, attribute: usize) -> usize {
        self.supports.attribute(attribute).missing.len()
    }

    pub fn total_missing(&self) -> usize {
        (0..self.attribute_count())
            .map(|a| self.missing_count(a))
            .sum()
    }
}

fn validate_record(schema: &Schema, record: &Record) -> Result<()> {
    if record.values.len() != schema.len() {
        return Err(ImputationError::AttributeCountMismatch {
            line: record.id + 1,
            expected: schema.len(),
            found: record.values.len(),
        });
    }
    for (value, attribute) in record.values.iter().zip(schema.attributes()) {
        let consistent = match (value, attribute.kind) {
            (Value::Missing, _) => true,
            (Value::Number(v), AttributeType::Numeric) => v.is_finite(),
            (Value::Category(_), AttributeType::Categorical) => true,
            _ => false,
        };
        if !consistent {
            return Err(ImputationError::MalformedRecord {
                line: record.id + 1,
                reason: format!(
                    "value '{}' does not fit {:?} attribute '{}'",
                    value, attribute.kind, attribute.name
                ),
            });
        }
        // Text data and rule files split tokens on commas and whitespace.
        if let Value::Category(v) = value
            && v.chars().any(|c| c == ',' || c.is_whitespace())
        {
            return Err(ImputationError::MalformedRecord {
                line: record.id + 1,
                reason: format!(
                    "category '{}' of attribute '{}' contains a comma or whitespace",
                    v, attribute.name
                ),
            });
        }
    }
    Ok(())
}

fn observed_precision(schema: &Schema, records: &[Record]) -> Vec<usize> {
    (0..schema.len())
        .map(|a| {
            records
                .iter()
                .filter_map(|r| r.value(a).as_number())
                .map(|v| decimal_places(&v.to_string()))
                .max()
                .unwrap_or(0)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Weather-style dataset: outlook (c), temperature (n), humidity (n), play (c).
    pub fn weather() -> Dataset {
        let schema = Schema::new(vec![
            Attribute::categorical("outlook"),
            Attribute::numeric("temperature"),
            Attribute::numeric("humidity"),
            Attribute::categorical("play"),
        ]);
        let rows = [
            ("sunny", 85.0, 85.0, "no"),
            ("sunny", 80.0, 90.0, "no"),
            ("overcast", 83.0, 86.0, "yes"),
            ("rainy", 70.0, 96.0, "yes"),
            ("rainy", 68.0, 80.0, "yes"),
            ("rainy", 65.0, 70.0, "no"),
            ("overcast", 64.0, 65.0, "yes"),
            ("sunny", 72.0, 95.0, "no"),
            ("sunny", 69.0, 70.0, "yes"),
            ("rainy", 75.0, 80.0, "yes"),
            ("sunny", 75.0, 70.0, "yes"),
            ("overcast", 72.0, 90.0, "yes"),
            ("overcast", 81.0, 75.0, "yes"),
            ("rainy", 71.0, 91.0, "no"),
        ];
        let rows = rows
            .iter()
            .map(|(o, t, h, p)| {
                vec![
                    Value::Category(o.to_string()),
                    Value::Number(*t),
                    Value::Number(*h),
                    Value::Category(p.to_string()),
                ]
            })
            .collect();
        Dataset::from_rows(schema, rows).expect("valid weather dataset")
    }
}

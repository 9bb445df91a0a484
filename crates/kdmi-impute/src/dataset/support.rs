//! Observed domains and the class-support index.

use super::schema::{AttributeType, Schema};
use super::value::{Record, Value};
use serde::{Deserialize, Serialize};

/// Observed values of one attribute.
///
/// Numeric domains are sorted ascending; categorical domains keep the order in
/// which values first appear in the records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Domain {
    Categorical(Vec<String>),
    Numeric(Vec<f64>),
}

impl Domain {
    pub(crate) fn observe(kind: AttributeType, records: &[Record], attribute: usize) -> Domain {
        match kind {
            AttributeType::Categorical => {
                let mut values: Vec<String> = Vec::new();
                for record in records {
                    if let Value::Category(v) = record.value(attribute)
                        && !values.iter().any(|known| known == v)
                    {
                        values.push(v.clone());
                    }
                }
                Domain::Categorical(values)
            }
            AttributeType::Numeric => {
                let mut values: Vec<f64> = records
                    .iter()
                    .filter_map(|r| r.value(attribute).as_number())
                    .map(signless_zero)
                    .collect();
                values.sort_by(|a, b| a.total_cmp(b));
                values.dedup();
                Domain::Numeric(values)
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Domain::Categorical(values) => values.len(),
            Domain::Numeric(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of `value` in this domain, `None` for missing or unseen values.
    pub fn index_of(&self, value: &Value) -> Option<usize> {
        match (self, value) {
            (Domain::Categorical(values), Value::Category(v)) => {
                values.iter().position(|known| known == v)
            }
            (Domain::Numeric(values), Value::Number(v)) => {
                let v = signless_zero(*v);
                values.binary_search_by(|known| known.total_cmp(&v)).ok()
            }
            _ => None,
        }
    }

    /// Human-readable label of the value at `index`.
    pub fn label(&self, index: usize) -> String {
        match self {
            Domain::Categorical(values) => values[index].clone(),
            Domain::Numeric(values) => values[index].to_string(),
        }
    }

    pub fn categories(&self) -> &[String] {
        match self {
            Domain::Categorical(values) => values,
            Domain::Numeric(_) => &[],
        }
    }

    pub fn numbers(&self) -> &[f64] {
        match self {
            Domain::Numeric(values) => values,
            Domain::Categorical(_) => &[],
        }
    }
}

/// `-0.0` as `0.0`, so both zeros share one domain slot under `total_cmp`.
fn signless_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

/// Records sharing one attribute value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueSupport {
    /// Positions (into the owning dataset) of every record with this value.
    pub records: Vec<usize>,
    /// The same positions split by class value, indexed like the class domain.
    pub by_class: Vec<Vec<usize>>,
}

impl ValueSupport {
    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn class_counts(&self) -> Vec<usize> {
        self.by_class.iter().map(Vec::len).collect()
    }
}

/// Support of every value of one attribute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeSupport {
    pub values: Vec<ValueSupport>,
    /// Positions of records where this attribute is missing.
    pub missing: Vec<usize>,
}

impl AttributeSupport {
    /// Sum of all value buckets plus the missing bucket.
    pub fn total(&self) -> usize {
        self.values.iter().map(ValueSupport::count).sum::<usize>() + self.missing.len()
    }
}

/// For every (attribute, value) pair, the records sharing that value, split by
/// class value. Rebuilt from scratch whenever the record set changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupportIndex {
    attributes: Vec<AttributeSupport>,
}

impl SupportIndex {
    pub(crate) fn build(
        schema: &Schema,
        records: &[Record],
        domains: &[Domain],
        class_index: usize,
    ) -> SupportIndex {
        let class_domain = &domains[class_index];
        let class_positions: Vec<Option<usize>> = records
            .iter()
            .map(|r| class_domain.index_of(r.value(class_index)))
            .collect();

        let attributes = (0..schema.len())
            .map(|attribute| {
                let domain = &domains[attribute];
                let mut support = AttributeSupport {
                    values: vec![
                        ValueSupport {
                            records: Vec::new(),
                            by_class: vec![Vec::new(); class_domain.len()],
                        };
                        domain.len()
                    ],
                    missing: Vec::new(),
                };
                for (position, record) in records.iter().enumerate() {
                    match domain.index_of(record.value(attribute)) {
                        Some(value_index) => {
                            let bucket = &mut support.values[value_index];
                            bucket.records.push(position);
                            if let Some(class) = class_positions[position] {
                                bucket.by_class[class].push(position);
                            }
                        }
                        None => support.missing.push(position),
                    }
                }
                support
            })
            .collect();

        SupportIndex { attributes }
    }

    pub fn attribute(&self, index: usize) -> &AttributeSupport {
        &self.attributes[index]
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::schema::Attribute;

    fn records() -> Vec<Record> {
        vec![
            Record::new(0, vec![Value::Number(2.0), Value::Category("a".into())]),
            Record::new(1, vec![Value::Number(1.0), Value::Category("b".into())]),
            Record::new(2, vec![Value::Missing, Value::Category("a".into())]),
            Record::new(3, vec![Value::Number(2.0), Value::Category("b".into())]),
        ]
    }

    #[test]
    fn test_numeric_domain_sorted_and_deduplicated() {
        let domain = Domain::observe(AttributeType::Numeric, &records(), 0);
        assert_eq!(domain, Domain::Numeric(vec![1.0, 2.0]));
        assert_eq!(domain.index_of(&Value::Number(2.0)), Some(1));
        assert_eq!(domain.index_of(&Value::Number(3.0)), None);
        assert_eq!(domain.index_of(&Value::Missing), None);
    }

    #[test]
    fn test_negative_zero_shares_the_zero_slot() {
        let records = vec![
            Record::new(0, vec![Value::Number(-0.0)]),
            Record::new(1, vec![Value::Number(0.0)]),
            Record::new(2, vec![Value::Number(1.5)]),
        ];
        let domain = Domain::observe(AttributeType::Numeric, &records, 0);

        assert_eq!(domain.len(), 2);
        assert_eq!(domain.index_of(&Value::Number(0.0)), Some(0));
        assert_eq!(domain.index_of(&Value::Number(-0.0)), Some(0));
    }

    #[test]
    fn test_categorical_domain_first_seen_order() {
        let domain = Domain::observe(AttributeType::Categorical, &records(), 1);
        assert_eq!(
            domain,
            Domain::Categorical(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_support_counts_sum_to_record_count() {
        let schema = Schema::new(vec![Attribute::numeric("x"), Attribute::categorical("y")]);
        let records = records();
        let domains = vec![
            Domain::observe(AttributeType::Numeric, &records, 0),
            Domain::observe(AttributeType::Categorical, &records, 1),
        ];
        let index = SupportIndex::build(&schema, &records, &domains, 1);

        assert_eq!(index.attribute(0).total(), records.len());
        assert_eq!(index.attribute(1).total(), records.len());
        assert_eq!(index.attribute(0).missing, vec![2]);

        // x = 2.0 appears with class a (record 0) and class b (record 3)
        let bucket = &index.attribute(0).values[1];
        assert_eq!(bucket.records, vec![0, 3]);
        assert_eq!(bucket.class_counts(), vec![1, 1]);
    }
}

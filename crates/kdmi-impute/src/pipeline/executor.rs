//! Per-record imputation.
//!
//! Records are processed in order and filled in place, so a cell imputed for
//! one record counts as observed for every later record. For each missing
//! cell the neighbourhood comes from, in order of preference:
//!
//! 1. the leaf of the cell's own attribute tree that classified the record;
//! 2. a leaf borrowed from another attribute's tree, searched cyclically from
//!    the next attribute;
//! 3. the whole dataset, in which case the rest of the row is filled at once.

use super::state::ImputationState;
use crate::dataset::{AttributeType, Record, Schema, Value};
use crate::imputers::{NeighborhoodSearch, StatisticalImputer, numeric_columns};
use crate::types::{NeighborhoodSource, SourceCounts};
use tracing::debug;

/// Fills the missing cells of one record at a time.
pub struct RecordImputer<'a> {
    schema: &'a Schema,
    search: &'a NeighborhoodSearch,
    /// Attribute position to column of the EM estimate.
    em_column: Vec<Option<usize>>,
}

impl<'a> RecordImputer<'a> {
    pub fn new(schema: &'a Schema, search: &'a NeighborhoodSearch) -> Self {
        let mut em_column = vec![None; schema.len()];
        for (column, attribute) in numeric_columns(schema).into_iter().enumerate() {
            em_column[attribute] = Some(column);
        }
        Self {
            schema,
            search,
            em_column,
        }
    }

    fn kind(&self, attribute: usize) -> AttributeType {
        self.schema.attribute(attribute).kind
    }

    /// Impute every missing cell of `records[target]` that a neighbourhood
    /// can fill. Cells left missing are for the dataset-wide fallback.
    pub fn impute(
        &self,
        records: &mut [Record],
        state: &mut ImputationState,
        target: usize,
        counts: &mut SourceCounts,
    ) {
        let attributes = self.schema.len();
        let mut z = 0;
        while z < attributes {
            if !state.is_missing(target, z) {
                z += 1;
                continue;
            }

            if let Some(leaf) = state.leaf(target, z) {
                self.impute_own_leaf(records, state, target, z, leaf, counts);
                z += 1;
                continue;
            }

            match self.borrowed_attribute(state, target, z) {
                Some(borrowed) => {
                    z = self.impute_borrowed_leaf(records, state, target, z, borrowed, counts);
                }
                None => {
                    self.impute_whole_dataset(records, state, target, counts);
                    break;
                }
            }
        }
    }

    fn impute_own_leaf(
        &self,
        records: &mut [Record],
        state: &mut ImputationState,
        target: usize,
        z: usize,
        leaf: usize,
        counts: &mut SourceCounts,
    ) {
        let value = match self.kind(z) {
            AttributeType::Numeric => {
                let candidates = state.leaf_members(z, leaf);
                self.search
                    .select(self.schema, records, target, candidates)
                    .and_then(|n| self.estimate(records, target, &n.members))
                    .and_then(|estimate| self.estimated_value(&estimate, z))
            }
            AttributeType::Categorical => state
                .leaf_majority(z, leaf)
                .map(|v| Value::Category(v.to_string())),
        };
        if let Some(value) = value {
            fill(records, state, target, z, value);
            counts.record(NeighborhoodSource::OwnLeaf);
        }
    }

    /// Attribute whose leaf `z` borrows: the first classified attribute after
    /// `z`, wrapping around. While some classified attribute is still missing
    /// on the record, only such attributes qualify.
    fn borrowed_attribute(&self, state: &ImputationState, target: usize, z: usize) -> Option<usize> {
        let classified: Vec<usize> = state.classified(target).collect();
        if classified.is_empty() {
            return None;
        }
        let need_missing = classified.iter().any(|&a| state.is_missing(target, a));
        let attributes = self.schema.len();
        (1..attributes)
            .map(|offset| (z + offset) % attributes)
            .find(|&a| {
                classified.contains(&a) && (!need_missing || state.is_missing(target, a))
            })
    }

    /// Fill `z` from the leaf of `borrowed`, and `borrowed` itself when it is
    /// still missing and comes after `z`. Returns the next attribute to scan.
    fn impute_borrowed_leaf(
        &self,
        records: &mut [Record],
        state: &mut ImputationState,
        target: usize,
        z: usize,
        borrowed: usize,
        counts: &mut SourceCounts,
    ) -> usize {
        let Some(leaf) = state.leaf(target, borrowed) else {
            return z + 1;
        };
        let candidates = state.leaf_members(borrowed, leaf).to_vec();
        let Some(neighborhood) = self.search.select(self.schema, records, target, &candidates)
        else {
            return z + 1;
        };
        debug!(
            record = records[target].id,
            attribute = z,
            borrowed,
            k = neighborhood.k,
            "Borrowing leaf"
        );

        let needs_em = self.kind(z) == AttributeType::Numeric
            || self.kind(borrowed) == AttributeType::Numeric;
        let estimate = if needs_em {
            self.estimate(records, target, &neighborhood.members)
        } else {
            None
        };

        let value = match self.kind(z) {
            AttributeType::Numeric => estimate
                .as_ref()
                .and_then(|e| self.estimated_value(e, z)),
            AttributeType::Categorical => self.neighbour_mode(records, &neighborhood.members, z),
        };
        if let Some(value) = value {
            fill(records, state, target, z, value);
            counts.record(NeighborhoodSource::BorrowedLeaf);
        }

        if borrowed <= z {
            return z + 1;
        }
        if state.is_missing(target, borrowed) {
            let value = match self.kind(borrowed) {
                AttributeType::Numeric => estimate
                    .as_ref()
                    .and_then(|e| self.estimated_value(e, borrowed)),
                AttributeType::Categorical => state
                    .leaf_majority(borrowed, leaf)
                    .map(|v| Value::Category(v.to_string()))
                    .or_else(|| self.neighbour_mode(records, &neighborhood.members, borrowed)),
            };
            if let Some(value) = value {
                fill(records, state, target, borrowed, value);
                counts.record(NeighborhoodSource::BorrowedLeaf);
            }
        }
        borrowed + 1
    }

    /// No tree classified the record: select neighbours among all records and
    /// fill the whole row.
    fn impute_whole_dataset(
        &self,
        records: &mut [Record],
        state: &mut ImputationState,
        target: usize,
        counts: &mut SourceCounts,
    ) {
        let candidates: Vec<usize> = (0..records.len()).collect();
        let Some(neighborhood) = self.search.select(self.schema, records, target, &candidates)
        else {
            return;
        };
        let missing: Vec<usize> = (0..self.schema.len())
            .filter(|&a| state.is_missing(target, a))
            .collect();
        let estimate = if missing
            .iter()
            .any(|&a| self.kind(a) == AttributeType::Numeric)
        {
            self.estimate(records, target, &neighborhood.members)
        } else {
            None
        };
        debug!(
            record = records[target].id,
            cells = missing.len(),
            k = neighborhood.k,
            "Imputing from the whole dataset"
        );

        for attribute in missing {
            let value = match self.kind(attribute) {
                AttributeType::Numeric => estimate
                    .as_ref()
                    .and_then(|e| self.estimated_value(e, attribute)),
                AttributeType::Categorical => {
                    self.neighbour_mode(records, &neighborhood.members, attribute)
                }
            };
            if let Some(value) = value {
                fill(records, state, target, attribute, value);
                counts.record(NeighborhoodSource::WholeDataset);
            }
        }
    }

    fn estimate(&self, records: &[Record], target: usize, members: &[usize]) -> Option<Vec<Option<f64>>> {
        self.search
            .estimate(self.schema, records, &records[target], members)
    }

    fn estimated_value(&self, estimate: &[Option<f64>], attribute: usize) -> Option<Value> {
        let column = self.em_column[attribute]?;
        estimate
            .get(column)
            .copied()
            .flatten()
            .map(Value::Number)
    }

    fn neighbour_mode(&self, records: &[Record], members: &[usize], attribute: usize) -> Option<Value> {
        StatisticalImputer::mode(members.iter().map(|&p| &records[p]), attribute)
            .map(Value::Category)
    }
}

fn fill(
    records: &mut [Record],
    state: &mut ImputationState,
    target: usize,
    attribute: usize,
    value: Value,
) {
    records[target].values[attribute] = value;
    state.mark_filled(target, attribute);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImputationConfig;
    use crate::dataset::{Attribute, Dataset};
    use crate::imputers::EmImputer;
    use crate::pipeline::forest::AttributeTrees;
    use crate::pipeline::progress::CancellationToken;
    use pretty_assertions::assert_eq;

    /// Two clusters: `x` near 1 with colour "red", `x` near 10 with "blue";
    /// `y` is about twice `x`.
    fn clustered() -> Dataset {
        let schema = Schema::new(vec![
            Attribute::numeric("x"),
            Attribute::numeric("y"),
            Attribute::categorical("colour"),
        ]);
        let rows = (0..24)
            .map(|i| {
                let base = if i < 12 { 1.0 } else { 10.0 };
                let x = base + f64::from(i % 6) * 0.1;
                let wobble = if i % 2 == 0 { 0.05 } else { -0.05 };
                vec![
                    Value::Number(x),
                    Value::Number(2.0 * x + wobble),
                    Value::Category(if i < 12 { "red" } else { "blue" }.to_string()),
                ]
            })
            .collect();
        Dataset::from_rows(schema, rows).unwrap()
    }

    fn punch(ds: &Dataset, holes: &[(usize, usize)]) -> Dataset {
        let mut records = ds.records().to_vec();
        for &(r, a) in holes {
            records[r].values[a] = Value::Missing;
        }
        ds.with_records(records).unwrap()
    }

    fn run(ds: &Dataset) -> (Vec<Record>, ImputationState, SourceCounts) {
        let config = ImputationConfig::builder()
            .min_records(4)
            .parallel(false)
            .build()
            .unwrap();
        let trees = AttributeTrees::build(ds, &config, &CancellationToken::new()).unwrap();
        let mut state = ImputationState::new(ds, &trees, false);
        let search = NeighborhoodSearch::new(EmImputer::from_config(&config)).with_parallel(false);
        let imputer = RecordImputer::new(ds.schema(), &search);

        let mut records = ds.records().to_vec();
        let mut counts = SourceCounts::default();
        for target in state.incomplete_records() {
            imputer.impute(&mut records, &mut state, target, &mut counts);
        }
        (records, state, counts)
    }

    #[test]
    fn test_own_leaf_categorical_takes_leaf_majority() {
        let ds = punch(&clustered(), &[(3, 2), (15, 2)]);
        let (records, state, counts) = run(&ds);

        assert_eq!(records[3].values[2], Value::Category("red".into()));
        assert_eq!(records[15].values[2], Value::Category("blue".into()));
        assert_eq!(state.remaining_missing(), 0);
        assert_eq!(counts.own_leaf, 2);
    }

    #[test]
    fn test_own_leaf_numeric_uses_em() {
        let ds = punch(&clustered(), &[(14, 1)]);
        let (records, _, counts) = run(&ds);

        let y = records[14].value(1).as_number().unwrap();
        assert!(y.is_finite());
        assert!((y - 20.4).abs() < 3.0, "imputed {}", y);
        assert_eq!(counts.total(), 1);
    }

    #[test]
    fn test_whole_dataset_when_no_tree_classifies() {
        // Missing every predictor leaves no tree able to classify record 5.
        let ds = punch(&clustered(), &[(5, 0), (5, 1), (5, 2), (20, 2)]);
        let (records, state, counts) = run(&ds);

        assert!(records[5].values.iter().all(|v| !v.is_missing()));
        assert_eq!(state.remaining_missing(), 0);
        assert_eq!(counts.whole_dataset, 3);
        assert_eq!(counts.own_leaf, 1);
    }

    #[test]
    fn test_imputed_cells_keep_kinds() {
        let ds = punch(&clustered(), &[(1, 0), (7, 2), (13, 1), (22, 0), (22, 2)]);
        let (records, _, _) = run(&ds);
        for record in &records {
            assert!(matches!(record.values[0], Value::Number(_) | Value::Missing));
            assert!(matches!(record.values[1], Value::Number(_) | Value::Missing));
            assert!(matches!(record.values[2], Value::Category(_) | Value::Missing));
        }
    }

    // ========================================================================
    // borrowed leaves on a hand-built state
    // ========================================================================

    fn categorical(rows: &[[&str; 4]]) -> (Schema, Vec<Record>) {
        let schema = Schema::new(
            ["a", "b", "c", "d"]
                .iter()
                .map(|n| Attribute::categorical(*n))
                .collect(),
        );
        let records = rows
            .iter()
            .enumerate()
            .map(|(id, row)| {
                let values = row
                    .iter()
                    .map(|v| match *v {
                        "?" => Value::Missing,
                        v => Value::Category(v.to_string()),
                    })
                    .collect();
                Record::new(id, values)
            })
            .collect();
        (schema, records)
    }

    fn mask(records: &[Record]) -> Vec<Vec<bool>> {
        records
            .iter()
            .map(|r| r.values.iter().map(Value::is_missing).collect())
            .collect()
    }

    #[test]
    fn test_borrowed_attribute_prefers_missing_classified() {
        let (schema, records) = categorical(&[["?", "x", "?", "y"]]);
        let state = ImputationState::from_parts(
            mask(&records),
            vec![vec![None, Some(0), Some(0), Some(0)]],
            vec![vec![]; 4],
            vec![vec![]; 4],
        );
        let search = NeighborhoodSearch::new(EmImputer::default());
        let imputer = RecordImputer::new(&schema, &search);

        // `c` is classified and missing, so `b` is passed over
        assert_eq!(imputer.borrowed_attribute(&state, 0, 0), Some(2));
    }

    #[test]
    fn test_borrowed_attribute_wraps_around() {
        let (schema, records) = categorical(&[["x", "y", "?", "z"]]);
        let search = NeighborhoodSearch::new(EmImputer::default());
        let imputer = RecordImputer::new(&schema, &search);

        let state = ImputationState::from_parts(
            mask(&records),
            vec![vec![Some(0), Some(0), None, None]],
            vec![vec![]; 4],
            vec![vec![]; 4],
        );
        assert_eq!(imputer.borrowed_attribute(&state, 0, 2), Some(0));

        let unclassified = ImputationState::from_parts(
            mask(&records),
            vec![vec![None; 4]],
            vec![vec![]; 4],
            vec![vec![]; 4],
        );
        assert_eq!(imputer.borrowed_attribute(&unclassified, 0, 2), None);
    }

    #[test]
    fn test_borrowed_leaf_fills_both_cells() {
        let (schema, mut records) = categorical(&[
            ["?", "?", "k", "k"],
            ["p", "m", "k", "k"],
            ["p", "n", "k", "k"],
            ["q", "n", "j", "j"],
        ]);
        // `b`'s tree put records 0..=2 into leaf 0 with majority "m"
        let mut state = ImputationState::from_parts(
            mask(&records),
            vec![
                vec![None, Some(0), None, None],
                vec![None, Some(0), None, None],
                vec![None, Some(0), None, None],
                vec![None, Some(1), None, None],
            ],
            vec![vec![], vec![vec![0, 1, 2], vec![3]], vec![], vec![]],
            vec![
                vec![],
                vec![Some("m".to_string()), Some("n".to_string())],
                vec![],
                vec![],
            ],
        );
        let search = NeighborhoodSearch::new(EmImputer::default()).with_parallel(false);
        let imputer = RecordImputer::new(&schema, &search);
        let mut counts = SourceCounts::default();
        imputer.impute(&mut records, &mut state, 0, &mut counts);

        assert_eq!(records[0].values[0], Value::Category("p".into()));
        assert_eq!(records[0].values[1], Value::Category("m".into()));
        assert_eq!(counts.borrowed_leaf, 2);
        assert_eq!(state.remaining_missing(), 0);
    }

    #[test]
    fn test_whole_dataset_fills_row_by_mode() {
        let (schema, mut records) = categorical(&[
            ["?", "u", "?", "w"],
            ["r", "u", "s", "w"],
            ["r", "v", "t", "w"],
            ["q", "v", "s", "x"],
        ]);
        let mut state = ImputationState::from_parts(
            mask(&records),
            vec![vec![None; 4]; 4],
            vec![vec![]; 4],
            vec![vec![]; 4],
        );
        let search = NeighborhoodSearch::new(EmImputer::default());
        let imputer = RecordImputer::new(&schema, &search);
        let mut counts = SourceCounts::default();
        imputer.impute(&mut records, &mut state, 0, &mut counts);

        assert_eq!(records[0].values[0], Value::Category("r".into()));
        assert_eq!(records[0].values[2], Value::Category("s".into()));
        assert_eq!(counts.whole_dataset, 2);
    }
}

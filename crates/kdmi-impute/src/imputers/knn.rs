//! Nearest-neighbour selection with automatic choice of `k`.
//!
//! For a record with a missing numeric value, candidate neighbourhood sizes are
//! scored by hiding one observed numeric value of the record, re-imputing it
//! with EM over the `k` nearest neighbours, and measuring the absolute error.
//! The size with the smallest error wins.

use super::em::EmImputer;
use crate::dataset::{AttributeType, Record, Schema, Value};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Selected neighbours of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighborhood {
    pub k: usize,
    /// Positions in the dataset, nearest first.
    pub members: Vec<usize>,
    /// Reconstruction error of the held-out value at this `k`, if one was
    /// measured.
    pub error: Option<f64>,
}

pub struct NeighborhoodSearch {
    em: EmImputer,
    parallel: bool,
}

impl NeighborhoodSearch {
    pub fn new(em: EmImputer) -> Self {
        Self { em, parallel: true }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn em(&self) -> &EmImputer {
        &self.em
    }

    /// Euclidean distance over attributes observed on both records: squared
    /// difference for numeric attributes, 0/1 mismatch for categorical ones.
    pub fn distance(schema: &Schema, a: &Record, b: &Record) -> f64 {
        a.values
            .iter()
            .zip(&b.values)
            .zip(schema.attributes())
            .map(|((x, y), attribute)| match (attribute.kind, x, y) {
                (AttributeType::Numeric, Value::Number(x), Value::Number(y)) => (x - y).powi(2),
                (AttributeType::Categorical, Value::Category(x), Value::Category(y)) => {
                    if x == y { 0.0 } else { 1.0 }
                }
                _ => 0.0,
            })
            .sum::<f64>()
            .sqrt()
    }

    /// The `k` records of `pool` closest to `target`; equal distances keep
    /// pool order.
    pub fn nearest(
        schema: &Schema,
        records: &[Record],
        target: &Record,
        pool: &[usize],
        k: usize,
    ) -> Vec<usize> {
        let mut scored: Vec<(usize, f64)> = pool
            .iter()
            .map(|&pos| (pos, Self::distance(schema, target, &records[pos])))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.into_iter().take(k).map(|(pos, _)| pos).collect()
    }

    /// Candidate sizes: `⌊√N⌋, 2⌊√N⌋, ...` for `N > 5`, else `2, 3, ...`,
    /// all below `N`.
    pub fn candidate_sizes(n: usize) -> Vec<usize> {
        let (start, step) = if n > 5 {
            let root = (n as f64).sqrt() as usize;
            (root, root)
        } else {
            (2, 1)
        };
        (start..n).step_by(step.max(1)).collect()
    }

    /// Pick the neighbourhood of `records[target]` within `candidates`.
    ///
    /// `candidates` may contain `target` itself; it never becomes its own
    /// neighbour. Returns `None` when no other candidate exists.
    pub fn select(
        &self,
        schema: &Schema,
        records: &[Record],
        target: usize,
        candidates: &[usize],
    ) -> Option<Neighborhood> {
        let pool: Vec<usize> = candidates.iter().copied().filter(|&p| p != target).collect();
        if pool.is_empty() {
            return None;
        }
        let record = &records[target];
        let whole = Neighborhood {
            k: pool.len(),
            members: Self::nearest(schema, records, record, &pool, pool.len()),
            error: None,
        };

        let Some(held_out) = (0..schema.len()).find(|&a| {
            schema.attribute(a).kind == AttributeType::Numeric && !record.value(a).is_missing()
        }) else {
            return Some(whole);
        };
        let Some(truth) = record.value(held_out).as_number() else {
            return Some(whole);
        };

        let mut masked = record.clone();
        masked.values[held_out] = Value::Missing;
        let score = |&k: &usize| -> Option<Neighborhood> {
            let members = Self::nearest(schema, records, record, &pool, k.min(pool.len()));
            let estimate = self.estimate(schema, records, &masked, &members)?;
            let column = numeric_columns(schema).iter().position(|&a| a == held_out)?;
            let imputed = estimate.get(column).copied().flatten()?;
            Some(Neighborhood {
                k: members.len(),
                members,
                error: Some((imputed - truth).abs()),
            })
        };

        let sizes = Self::candidate_sizes(candidates.len());
        let scored: Vec<Option<Neighborhood>> = if self.parallel {
            sizes.par_iter().map(score).collect()
        } else {
            sizes.iter().map(score).collect()
        };

        let mut best: Option<Neighborhood> = None;
        for candidate in scored.into_iter().flatten() {
            let better = match (&best, candidate.error) {
                (None, Some(_)) => true,
                (Some(current), Some(e)) => current.error.is_some_and(|b| e < b),
                _ => false,
            };
            if better {
                best = Some(candidate);
            }
        }
        match best {
            Some(chosen) if chosen.k > 0 => {
                debug!(record = record.id, k = chosen.k, pool = pool.len(), "Selected neighbourhood");
                Some(chosen)
            }
            _ => Some(whole),
        }
    }

    /// Run EM over the numeric attributes of `members` plus `target` and
    /// return the target's numeric values, indexed like the schema's numeric
    /// attributes. `None` if the schema has no numeric attribute.
    pub fn estimate(
        &self,
        schema: &Schema,
        records: &[Record],
        target: &Record,
        members: &[usize],
    ) -> Option<Vec<Option<f64>>> {
        let columns = numeric_columns(schema);
        if columns.is_empty() {
            return None;
        }
        let row = |r: &Record| -> Vec<Option<f64>> {
            columns.iter().map(|&a| r.value(a).as_number()).collect()
        };
        let mut rows: Vec<Vec<Option<f64>>> = members
            .iter()
            .map(|&pos| row(&records[pos]))
            .collect();
        rows.push(row(target));

        let estimate = self.em.impute_rows(&rows);
        let last = rows.len() - 1;
        Some((0..columns.len()).map(|c| estimate.get(last, c)).collect())
    }
}

/// Positions of the numeric attributes of `schema`.
pub fn numeric_columns(schema: &Schema) -> Vec<usize> {
    (0..schema.len())
        .filter(|&a| schema.attribute(a).kind == AttributeType::Numeric)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Attribute, Dataset};
    use pretty_assertions::assert_eq;

    fn dataset(n: usize) -> Dataset {
        let schema = Schema::new(vec![
            Attribute::numeric("a"),
            Attribute::numeric("b"),
            Attribute::categorical("c"),
        ]);
        let rows = (0..n)
            .map(|i| {
                let x = i as f64;
                vec![
                    Value::Number(x),
                    Value::Number(2.0 * x + if i % 2 == 0 { 0.3 } else { -0.2 }),
                    Value::Category(if i < n / 2 { "lo" } else { "hi" }.to_string()),
                ]
            })
            .collect();
        Dataset::from_rows(schema, rows).unwrap()
    }

    // ========================================================================
    // distance / nearest
    // ========================================================================

    #[test]
    fn test_distance_mixes_numeric_and_categorical() {
        let ds = dataset(4);
        let a = Record::new(
            0,
            vec![Value::Number(1.0), Value::Number(2.0), Value::Category("lo".into())],
        );
        let b = Record::new(
            1,
            vec![Value::Number(4.0), Value::Missing, Value::Category("hi".into())],
        );
        // sqrt(3^2 + 1)
        assert_eq!(NeighborhoodSearch::distance(ds.schema(), &a, &b), 10f64.sqrt());
    }

    #[test]
    fn test_nearest_orders_by_distance() {
        let ds = dataset(10);
        let target = ds.record(5).clone();
        let pool: Vec<usize> = (0..10).filter(|&p| p != 5).collect();
        let nearest = NeighborhoodSearch::nearest(ds.schema(), ds.records(), &target, &pool, 3);
        assert_eq!(nearest.len(), 3);
        assert!(nearest.contains(&4) && nearest.contains(&6));
    }

    // ========================================================================
    // candidate sizes
    // ========================================================================

    #[test]
    fn test_candidate_sizes() {
        assert_eq!(NeighborhoodSearch::candidate_sizes(5), vec![2, 3, 4]);
        assert_eq!(NeighborhoodSearch::candidate_sizes(2), Vec::<usize>::new());
        assert_eq!(NeighborhoodSearch::candidate_sizes(20), vec![4, 8, 12, 16]);
        assert_eq!(NeighborhoodSearch::candidate_sizes(6), vec![2, 4]);
    }

    // ========================================================================
    // select
    // ========================================================================

    #[test]
    fn test_select_stays_within_pool() {
        let ds = dataset(20);
        let search = NeighborhoodSearch::new(EmImputer::new(200, 1e-10)).with_parallel(false);
        let candidates: Vec<usize> = (0..20).collect();
        let chosen = search.select(ds.schema(), ds.records(), 7, &candidates).unwrap();
        assert!(chosen.k >= 1 && chosen.k <= 19);
        assert_eq!(chosen.members.len(), chosen.k);
        assert!(!chosen.members.contains(&7));
        assert!(chosen.error.is_some());
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let ds = dataset(16);
        let candidates: Vec<usize> = (0..16).collect();
        let seq = NeighborhoodSearch::new(EmImputer::new(100, 1e-10))
            .with_parallel(false)
            .select(ds.schema(), ds.records(), 3, &candidates);
        let par = NeighborhoodSearch::new(EmImputer::new(100, 1e-10))
            .with_parallel(true)
            .select(ds.schema(), ds.records(), 3, &candidates);
        assert_eq!(seq, par);
    }

    #[test]
    fn test_select_without_other_records_is_none() {
        let ds = dataset(3);
        let search = NeighborhoodSearch::new(EmImputer::default());
        assert_eq!(search.select(ds.schema(), ds.records(), 1, &[1]), None);
    }

    #[test]
    fn test_select_without_observed_numeric_returns_pool() {
        let schema = Schema::new(vec![Attribute::numeric("a"), Attribute::categorical("c")]);
        let ds = Dataset::from_rows(
            schema,
            vec![
                vec![Value::Missing, Value::Category("x".into())],
                vec![Value::Number(1.0), Value::Category("x".into())],
                vec![Value::Number(2.0), Value::Category("y".into())],
            ],
        )
        .unwrap();
        let search = NeighborhoodSearch::new(EmImputer::default());
        let chosen = search.select(ds.schema(), ds.records(), 0, &[0, 1, 2]).unwrap();
        assert_eq!(chosen.k, 2);
        assert_eq!(chosen.error, None);
    }

    #[test]
    fn test_estimate_fills_target() {
        let ds = dataset(8);
        let mut target = ds.record(3).clone();
        target.values[1] = Value::Missing;
        let search = NeighborhoodSearch::new(EmImputer::new(500, 1e-10));
        let values = search
            .estimate(ds.schema(), ds.records(), &target, &[0, 1, 2, 4, 5, 6])
            .unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], Some(3.0));
        let b = values[1].unwrap();
        assert!((b - 6.0).abs() < 1.5, "imputed {}", b);
    }
}

//! Pessimistic-error pruning.
//!
//! A leaf holding `N` records of which `E` are misclassified is charged
//! `Pr * N` errors, where `Pr` is the upper confidence limit of the binomial
//! error rate at confidence factor `CF`:
//!
//! ```text
//! CF = sum_{i=0..=E} C(N, i) Pr^i (1 - Pr)^(N - i)
//! ```
//!
//! `E = 0` has the closed form `Pr = 1 - CF^(1/N)`. Otherwise `Pr` is found by
//! bisection on the binomial CDF, or by the normal approximation for large `N`.

use super::node::{DecisionTree, NodeId, NodeKind};
use super::ztable::z_for_upper_tail;
use crate::config::{ErrorEstimate, ImputationConfig};
use crate::error::{ImputationError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

const MAX_BISECTION_STEPS: usize = 200;

/// Upper binomial confidence limit by bisection.
pub fn exact_error_rate(
    records: usize,
    errors: usize,
    confidence: f64,
    tolerance: f64,
) -> Result<f64> {
    if records == 0 {
        return Ok(0.0);
    }
    if errors == 0 {
        return Ok(1.0 - confidence.powf(1.0 / records as f64));
    }
    // The CDF is 1 at Pr = 0 and falls to 0 at Pr = 1 only when E < N.
    if errors >= records || !(confidence > 0.0 && confidence < 1.0) {
        return Err(ImputationError::BisectionFailed {
            records,
            errors,
            confidence,
        });
    }

    let (mut low, mut high) = (0.0_f64, 1.0_f64);
    for _ in 0..MAX_BISECTION_STEPS {
        if high - low <= tolerance {
            break;
        }
        let mid = 0.5 * (low + high);
        if binomial_cdf(records, errors, mid) > confidence {
            low = mid;
        } else {
            high = mid;
        }
    }
    let rate = 0.5 * (low + high);
    if !rate.is_finite() {
        return Err(ImputationError::BisectionFailed {
            records,
            errors,
            confidence,
        });
    }
    Ok(rate)
}

/// `P(X <= errors)` for `X ~ Binomial(records, p)` with `0 < p < 1`, summed in
/// log space so large `N` does not overflow the coefficients.
fn binomial_cdf(records: usize, errors: usize, p: f64) -> f64 {
    let n = records as f64;
    let ln_p = p.ln();
    let ln_q = (-p).ln_1p();
    let mut ln_choose = 0.0;
    let mut sum = 0.0;
    for i in 0..=errors {
        if i > 0 {
            ln_choose += (n - i as f64 + 1.0).ln() - (i as f64).ln();
        }
        sum += (ln_choose + i as f64 * ln_p + (n - i as f64) * ln_q).exp();
    }
    sum.min(1.0)
}

/// Normal approximation of the upper confidence limit.
pub fn approximate_error_rate(records: usize, errors: usize, confidence: f64) -> f64 {
    if records == 0 {
        return 0.0;
    }
    let n = records as f64;
    if errors == 0 {
        return 1.0 - confidence.powf(1.0 / n);
    }
    let z = z_for_upper_tail(confidence);
    let e = errors as f64 + 0.5;
    let z2 = z * z;
    let rate = (e + z2 / 2.0 + z * (e * (1.0 - e / n) + z2 / 4.0).max(0.0).sqrt()) / (n + z2);
    rate.clamp(0.0, 1.0)
}

/// Outcome of one pruning run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PruneOutcome {
    pub passes: usize,
    pub collapsed: usize,
    pub nodes_before: usize,
    pub nodes_after: usize,
    pub errors_before: f64,
    pub errors_after: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Pruner {
    confidence_factor: f64,
    estimate: ErrorEstimate,
    exact_error_limit: usize,
    tolerance: f64,
}

impl Pruner {
    pub fn new(confidence_factor: f64) -> Self {
        Self {
            confidence_factor,
            estimate: ErrorEstimate::Auto,
            exact_error_limit: 1000,
            tolerance: 1e-9,
        }
    }

    pub fn from_config(config: &ImputationConfig) -> Self {
        Self {
            confidence_factor: config.confidence_factor,
            estimate: config.error_estimate,
            exact_error_limit: config.exact_error_limit,
            tolerance: config.bisection_tolerance,
        }
    }

    pub fn with_estimate(mut self, estimate: ErrorEstimate) -> Self {
        self.estimate = estimate;
        self
    }

    /// Pessimistic error rate for `errors` misclassifications in `records`.
    pub fn error_rate(&self, records: usize, errors: usize) -> Result<f64> {
        let exact = match self.estimate {
            ErrorEstimate::Exact => true,
            ErrorEstimate::NormalApproximation => false,
            ErrorEstimate::Auto => records <= self.exact_error_limit,
        };
        if exact {
            exact_error_rate(records, errors, self.confidence_factor, self.tolerance)
        } else {
            Ok(approximate_error_rate(
                records,
                errors,
                self.confidence_factor,
            ))
        }
    }

    /// Pessimistic error count of a leaf with the given class supports.
    pub fn leaf_errors(&self, supports: &[usize]) -> Result<f64> {
        let records: usize = supports.iter().sum();
        let majority = supports.iter().copied().max().unwrap_or(0);
        let errors = records - majority;
        Ok(self.error_rate(records, errors)? * records as f64)
    }

    /// Sum of pessimistic errors over every reachable leaf.
    pub fn tree_errors(&self, tree: &DecisionTree) -> Result<f64> {
        tree.leaves().into_iter().try_fold(0.0, |total, id| {
            let supports = tree.node(id).class_supports().unwrap_or(&[]);
            Ok(total + self.leaf_errors(supports)?)
        })
    }

    /// Collapse subtrees to a fixpoint.
    ///
    /// Each pass examines every unvisited non-root internal node whose children
    /// are all leaves. The node becomes a single leaf when its merged error is
    /// at most the summed error of its children, and is marked visited
    /// otherwise.
    pub fn prune(&self, tree: &mut DecisionTree) -> Result<PruneOutcome> {
        let mut outcome = PruneOutcome {
            nodes_before: tree.node_count(),
            errors_before: self.tree_errors(tree)?,
            ..PruneOutcome::default()
        };
        for id in tree.preorder() {
            tree.node_mut(id).visited = false;
        }

        loop {
            let candidates = self.candidates(tree);
            if candidates.is_empty() {
                break;
            }
            outcome.passes += 1;
            let mut collapsed_this_pass = 0;
            for id in candidates {
                let children_errors = tree
                    .node(id)
                    .children()
                    .iter()
                    .try_fold(0.0, |total, &child| {
                        let supports = tree.node(child).class_supports().unwrap_or(&[]);
                        Ok::<f64, ImputationError>(total + self.leaf_errors(supports)?)
                    })?;
                let merged = tree.subtree_supports(id);
                let merged_errors = self.leaf_errors(&merged)?;
                if merged_errors <= children_errors {
                    debug!(
                        node = id,
                        merged_errors, children_errors, "Collapsing subtree"
                    );
                    tree.collapse(id, merged);
                    collapsed_this_pass += 1;
                } else {
                    tree.node_mut(id).visited = true;
                }
            }
            outcome.collapsed += collapsed_this_pass;
            if collapsed_this_pass == 0 {
                break;
            }
        }

        tree.compact();
        outcome.nodes_after = tree.node_count();
        outcome.errors_after = self.tree_errors(tree)?;
        Ok(outcome)
    }

    fn candidates(&self, tree: &DecisionTree) -> Vec<NodeId> {
        tree.preorder()
            .into_iter()
            .filter(|&id| id != DecisionTree::ROOT)
            .filter(|&id| {
                let node = tree.node(id);
                !node.visited
                    && matches!(node.kind, NodeKind::Internal { .. })
                    && node.children().iter().all(|&c| tree.node(c).is_leaf())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Attribute, Schema};
    use crate::tree::node::Branch;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_zero_errors_closed_form() {
        assert_relative_eq!(
            exact_error_rate(6, 0, 0.25, 1e-12).unwrap(),
            0.206_299_474_015_900_2,
            epsilon = 1e-12
        );
        assert_eq!(exact_error_rate(0, 0, 0.25, 1e-9).unwrap(), 0.0);
    }

    #[test]
    fn test_exact_rate() {
        let rate = exact_error_rate(14, 5, 0.25, 1e-12).unwrap();
        assert_relative_eq!(rate, 0.483_513_145_887_172, epsilon = 1e-8);
    }

    #[test]
    fn test_exact_and_approximation_agree() {
        for (n, e) in [(100, 10), (1000, 100), (14, 5), (6, 2), (50, 1), (2000, 30)] {
            let exact = exact_error_rate(n, e, 0.25, 1e-12).unwrap();
            let approx = approximate_error_rate(n, e, 0.25);
            assert!(
                (exact - approx).abs() < 5e-3,
                "N={} E={}: exact {} vs approx {}",
                n,
                e,
                exact,
                approx
            );
        }
    }

    #[test]
    fn test_unbracketable_bisection_is_an_error() {
        assert!(matches!(
            exact_error_rate(5, 5, 0.25, 1e-9),
            Err(ImputationError::BisectionFailed { records: 5, errors: 5, .. })
        ));
    }

    #[test]
    fn test_auto_switches_to_approximation() {
        let pruner = Pruner {
            exact_error_limit: 10,
            ..Pruner::new(0.25)
        };
        assert_eq!(
            pruner.error_rate(100, 10).unwrap(),
            approximate_error_rate(100, 10, 0.25)
        );
        assert_eq!(
            pruner.error_rate(10, 2).unwrap(),
            exact_error_rate(10, 2, 0.25, 1e-9).unwrap()
        );
    }

    fn schema() -> Schema {
        Schema::new(vec![
            Attribute::numeric("x"),
            Attribute::numeric("y"),
            Attribute::categorical("class"),
        ])
    }

    /// root -> x <= 5 -> (y <= 1, y > 1) ; x > 5
    fn noisy_tree() -> DecisionTree {
        let mut tree = DecisionTree::new(&schema(), 2, vec!["a".into(), "b".into()], vec![0, 0]);
        tree.split(DecisionTree::ROOT, 0);
        let left = tree.add_leaf(DecisionTree::ROOT, Branch::AtMost(5.0), vec![]);
        tree.add_leaf(DecisionTree::ROOT, Branch::Above(5.0), vec![0, 20]);
        tree.split(left, 1);
        tree.add_leaf(left, Branch::AtMost(1.0), vec![9, 1]);
        tree.add_leaf(left, Branch::Above(1.0), vec![8, 2]);
        tree
    }

    #[test]
    fn test_prune_collapses_uninformative_subtree() {
        let mut tree = noisy_tree();
        let pruner = Pruner::new(0.25);
        let outcome = pruner.prune(&mut tree).unwrap();

        assert_eq!(outcome.collapsed, 1);
        assert_eq!(outcome.nodes_before, 5);
        assert_eq!(outcome.nodes_after, 3);
        assert!(outcome.errors_after <= outcome.errors_before);
        assert_eq!(tree.leaf_count(), 2);
        assert_eq!(tree.node(1).class_supports(), Some(&[17usize, 3][..]));
    }

    #[test]
    fn test_prune_keeps_informative_subtree() {
        let mut tree = noisy_tree();
        let left = tree.root().children()[0];
        let children = tree.node(left).children().to_vec();
        tree.collapse(children[0], vec![10, 0]);
        tree.collapse(children[1], vec![0, 10]);

        let outcome = Pruner::new(0.25).prune(&mut tree).unwrap();
        assert_eq!(outcome.collapsed, 0);
        assert_eq!(tree.node_count(), 5);
    }

    #[test]
    fn test_root_is_never_collapsed() {
        let mut tree = DecisionTree::new(&schema(), 2, vec!["a".into(), "b".into()], vec![0, 0]);
        tree.split(DecisionTree::ROOT, 0);
        tree.add_leaf(DecisionTree::ROOT, Branch::AtMost(5.0), vec![5, 5]);
        tree.add_leaf(DecisionTree::ROOT, Branch::Above(5.0), vec![5, 5]);

        let outcome = Pruner::new(0.25).prune(&mut tree).unwrap();
        assert_eq!(outcome.passes, 0);
        assert_eq!(tree.node_count(), 3);
    }
}

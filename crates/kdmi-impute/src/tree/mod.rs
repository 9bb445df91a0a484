//! Decision-tree induction, pruning and rule translation.
//!
//! - [`SplitSearch`] scores candidate splits of a partition by gain ratio
//!   (strict) or ultimate gain ratio (exploratory).
//! - [`TreeBuilder`] grows a [`DecisionTree`] breadth-first.
//! - [`Pruner`] collapses subtrees whose pessimistic error does not improve on
//!   a single leaf.
//! - [`RuleSet`] turns every leaf into a flat predicate rule that classifies
//!   records without walking the tree.

mod builder;
pub mod entropy;
mod node;
mod pruner;
mod rules;
mod split;
mod ztable;

pub use builder::TreeBuilder;
pub use node::{Branch, DecisionTree, Node, NodeId, NodeKind, majority_index};
pub use pruner::{PruneOutcome, Pruner, approximate_error_rate, exact_error_rate};
pub use rules::{Interval, Predicate, Rule, RuleSet};
pub use split::{Split, SplitKind, SplitSearch};
pub use ztable::z_for_upper_tail;

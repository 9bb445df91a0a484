//! Breadth-first tree induction.

use super::node::{DecisionTree, NodeId};
use super::split::SplitSearch;
use crate::config::ImputationConfig;
use crate::dataset::{Dataset, InMemoryPartitionStore, PartitionId, PartitionStore};
use crate::error::{ImputationError, Result};
use std::sync::Arc;
use tracing::debug;

pub struct TreeBuilder {
    search: SplitSearch,
    store: Arc<dyn PartitionStore>,
}

impl TreeBuilder {
    pub fn new(search: SplitSearch) -> Self {
        Self {
            search,
            store: Arc::new(InMemoryPartitionStore::new()),
        }
    }

    pub fn from_config(config: &ImputationConfig) -> Self {
        Self::new(SplitSearch::new(
            config.tree_algorithm,
            config.min_records,
            config.min_gain_ratio,
        ))
    }

    /// Use a different store for the partitions of the current frontier.
    pub fn with_store(mut self, store: Arc<dyn PartitionStore>) -> Self {
        self.store = store;
        self
    }

    /// Induce a tree for the dataset's class attribute.
    ///
    /// Only complete records take part. A split is accepted only if every
    /// child partition holds at least `min_records` records; otherwise the
    /// node stays a leaf.
    pub fn build(&self, dataset: &Dataset) -> Result<DecisionTree> {
        let training = if dataset.has_missing() {
            dataset.complete_records()
        } else {
            dataset.clone()
        };
        if training.is_empty() {
            return Err(ImputationError::EmptyDataset);
        }

        let class_values: Vec<String> = (0..training.class_domain().len())
            .map(|i| training.class_domain().label(i))
            .collect();
        let domains = (0..training.attribute_count())
            .map(|a| training.domain(a).clone())
            .collect();
        let mut tree = DecisionTree::new(
            training.schema(),
            training.class_index(),
            class_values,
            training.class_counts(),
        )
        .with_domains(domains);

        let mut level: Vec<(PartitionId, NodeId)> =
            vec![(self.store.put(training), DecisionTree::ROOT)];
        let mut depth = 0;
        while !level.is_empty() {
            let mut next = Vec::new();
            for (partition_id, node_id) in level {
                let partition = self.store.take(partition_id).ok_or_else(|| {
                    ImputationError::Internal(format!("partition {} vanished", partition_id))
                })?;
                let Some(split) = self.search.find_best(&partition) else {
                    continue;
                };

                let children: Vec<_> = split
                    .branches(&partition)
                    .into_iter()
                    .map(|branch| {
                        let child =
                            partition.partition(|r| branch.matches(r.value(split.attribute)));
                        (branch, child)
                    })
                    .collect();
                if children
                    .iter()
                    .any(|(_, child)| child.len() < self.search.min_records)
                {
                    continue;
                }

                debug!(
                    depth,
                    split = %split.description(partition.schema()),
                    score = split.score,
                    children = children.len(),
                    "Accepted split"
                );
                tree.split(node_id, split.attribute);
                for (branch, child) in children {
                    let child_id = tree.add_leaf(node_id, branch, child.class_counts());
                    next.push((self.store.put(child), child_id));
                }
            }
            level = next;
            depth += 1;
        }

        debug!(
            class = tree.class_name(),
            nodes = tree.node_count(),
            leaves = tree.leaf_count(),
            "Tree built"
        );
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeAlgorithm;
    use crate::dataset::test_support::weather;
    use crate::tree::node::{Branch, NodeKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builds_outlook_root_on_weather() {
        let builder = TreeBuilder::new(SplitSearch::new(TreeAlgorithm::Strict, 2, 0.0));
        let tree = builder.build(&weather()).unwrap();
        match &tree.root().kind {
            NodeKind::Internal { attribute, children } => {
                assert_eq!(*attribute, 0);
                assert_eq!(children.len(), 3);
            }
            NodeKind::Leaf { .. } => panic!("root should be split"),
        }
        assert_eq!(
            tree.node(tree.root().children()[0]).branch,
            Some(Branch::Category("sunny".into()))
        );
    }

    #[test]
    fn test_leaf_supports_sum_to_record_count() {
        let builder = TreeBuilder::new(SplitSearch::new(TreeAlgorithm::Strict, 2, 0.0));
        let tree = builder.build(&weather()).unwrap();
        let total: usize = tree
            .leaves()
            .iter()
            .map(|&id| tree.node(id).class_supports().unwrap().iter().sum::<usize>())
            .sum();
        assert_eq!(total, 14);
        assert_eq!(tree.subtree_supports(DecisionTree::ROOT), vec![5, 9]);
    }

    #[test]
    fn test_small_children_reject_split() {
        // overcast holds only 4 records
        let builder = TreeBuilder::new(SplitSearch::new(TreeAlgorithm::Strict, 5, 0.0));
        let tree = builder.build(&weather()).unwrap();
        assert!(tree.root().is_leaf());
        assert_eq!(tree.root().class_supports(), Some(&[5usize, 9][..]));
    }

    #[test]
    fn test_training_records_classify_to_their_leaf() {
        let ds = weather();
        let builder = TreeBuilder::new(SplitSearch::new(TreeAlgorithm::Exploratory, 2, 0.0));
        let tree = builder.build(&ds).unwrap();
        for record in ds.records() {
            assert!(tree.classify(record).is_some());
        }
    }

    #[test]
    fn test_empty_dataset_is_an_error() {
        let ds = weather().partition(|_| false);
        let builder = TreeBuilder::new(SplitSearch::new(TreeAlgorithm::Strict, 2, 0.0));
        assert!(matches!(builder.build(&ds), Err(ImputationError::EmptyDataset)));
    }
}

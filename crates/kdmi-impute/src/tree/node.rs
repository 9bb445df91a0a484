//! Arena-backed decision tree.
//!
//! Nodes live in a flat `Vec` and refer to each other by [`NodeId`]: children
//! as id lists, the parent as an `Option<NodeId>`. A node's level is derived by
//! counting parent hops to the root.

use crate::dataset::{Attribute, Domain, Record, Schema, Value};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

pub type NodeId = usize;

/// Predicate on the edge from a parent to one of its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    /// `attribute == value`
    Category(String),
    /// `attribute != value`
    NotCategory(String),
    /// `attribute <= threshold`
    AtMost(f64),
    /// `attribute > threshold`
    Above(f64),
    /// `low <= attribute <= high`
    Within(f64, f64),
    /// `attribute < low || attribute > high`
    Outside(f64, f64),
}

impl Branch {
    /// Whether `value` satisfies this predicate. Missing values never do.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Branch::Category(expected), Value::Category(v)) => v == expected,
            (Branch::NotCategory(excluded), Value::Category(v)) => v != excluded,
            (Branch::AtMost(t), Value::Number(x)) => *x <= *t,
            (Branch::Above(t), Value::Number(x)) => *x > *t,
            (Branch::Within(lo, hi), Value::Number(x)) => *lo <= *x && *x <= *hi,
            (Branch::Outside(lo, hi), Value::Number(x)) => *x < *lo || *x > *hi,
            _ => false,
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Category(v) => write!(f, "= {}", v),
            Branch::NotCategory(v) => write!(f, "!= {}", v),
            Branch::AtMost(t) => write!(f, "<= {}", t),
            Branch::Above(t) => write!(f, "> {}", t),
            Branch::Within(lo, hi) => write!(f, "in [{}, {}]", lo, hi),
            Branch::Outside(lo, hi) => write!(f, "outside [{}, {}]", lo, hi),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Internal {
        attribute: usize,
        children: Vec<NodeId>,
    },
    Leaf {
        /// Record count per class value, indexed like the tree's class values.
        class_supports: Vec<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub parent: Option<NodeId>,
    /// Predicate leading here from the parent; `None` for the root.
    pub branch: Option<Branch>,
    pub kind: NodeKind,
    /// Set by the pruner on nodes it decided to keep.
    #[serde(skip)]
    pub visited: bool,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Internal { children, .. } => children,
            NodeKind::Leaf { .. } => &[],
        }
    }

    pub fn class_supports(&self) -> Option<&[usize]> {
        match &self.kind {
            NodeKind::Leaf { class_supports } => Some(class_supports),
            NodeKind::Internal { .. } => None,
        }
    }
}

/// Index of the first strictly largest count, `None` when all counts are zero.
pub fn majority_index(counts: &[usize]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (i, &c) in counts.iter().enumerate() {
        if c > 0 && best.is_none_or(|(_, b)| c > b) {
            best = Some((i, c));
        }
    }
    best.map(|(i, _)| i)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    attributes: Vec<Attribute>,
    class_index: usize,
    class_values: Vec<String>,
    /// Observed domains of the training data, used to spell out exclusions.
    #[serde(default)]
    domains: Vec<Domain>,
}

impl DecisionTree {
    /// A tree consisting of a single leaf.
    pub fn new(
        schema: &Schema,
        class_index: usize,
        class_values: Vec<String>,
        root_supports: Vec<usize>,
    ) -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                branch: None,
                kind: NodeKind::Leaf {
                    class_supports: root_supports,
                },
                visited: false,
            }],
            attributes: schema.attributes().to_vec(),
            class_index,
            class_values,
            domains: Vec::new(),
        }
    }

    pub(crate) fn with_domains(mut self, domains: Vec<Domain>) -> Self {
        self.domains = domains;
        self
    }

    /// Training domain of `attribute`, if the tree carries domains.
    pub fn domain(&self, attribute: usize) -> Option<&Domain> {
        self.domains.get(attribute)
    }

    pub const ROOT: NodeId = 0;

    pub fn root(&self) -> &Node {
        &self.nodes[Self::ROOT]
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn class_index(&self) -> usize {
        self.class_index
    }

    pub fn class_name(&self) -> &str {
        &self.attributes[self.class_index].name
    }

    pub fn class_values(&self) -> &[String] {
        &self.class_values
    }

    /// Turn leaf `id` into an internal node testing `attribute`.
    pub(crate) fn split(&mut self, id: NodeId, attribute: usize) {
        self.nodes[id].kind = NodeKind::Internal {
            attribute,
            children: Vec::new(),
        };
    }

    /// Append a leaf child to internal node `parent`.
    pub(crate) fn add_leaf(
        &mut self,
        parent: NodeId,
        branch: Branch,
        class_supports: Vec<usize>,
    ) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            parent: Some(parent),
            branch: Some(branch),
            kind: NodeKind::Leaf { class_supports },
            visited: false,
        });
        if let NodeKind::Internal { children, .. } = &mut self.nodes[parent].kind {
            children.push(id);
        }
        id
    }

    /// Replace internal node `id` by a leaf. Its descendants become
    /// unreachable until the next [`DecisionTree::compact`].
    pub(crate) fn collapse(&mut self, id: NodeId, class_supports: Vec<usize>) {
        self.nodes[id].kind = NodeKind::Leaf { class_supports };
    }

    /// Drop unreachable nodes and renumber the rest in breadth-first order.
    pub(crate) fn compact(&mut self) {
        let order = self.breadth_first();
        if order.len() == self.nodes.len() {
            return;
        }
        let mut remap = vec![usize::MAX; self.nodes.len()];
        for (new_id, &old_id) in order.iter().enumerate() {
            remap[old_id] = new_id;
        }
        let nodes = order
            .iter()
            .map(|&old_id| {
                let mut node = self.nodes[old_id].clone();
                node.parent = node.parent.map(|p| remap[p]);
                if let NodeKind::Internal { children, .. } = &mut node.kind {
                    for child in children.iter_mut() {
                        *child = remap[*child];
                    }
                }
                node
            })
            .collect();
        self.nodes = nodes;
    }

    fn breadth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue = VecDeque::from([Self::ROOT]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.nodes[id].children().iter().copied());
        }
        order
    }

    /// Reachable nodes in depth-first pre-order.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![Self::ROOT];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children().iter().rev().copied());
        }
        order
    }

    /// Reachable leaves in depth-first order, the order rules are emitted in.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .filter(|&id| self.nodes[id].is_leaf())
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.preorder().len()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    /// Number of parent hops from `id` to the root.
    pub fn level(&self, id: NodeId) -> usize {
        let mut level = 0;
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            level += 1;
            current = parent;
        }
        level
    }

    pub fn depth(&self) -> usize {
        self.leaves()
            .into_iter()
            .map(|id| self.level(id))
            .max()
            .unwrap_or(0)
    }

    /// Tests on the path from the root to `id`, as `(attribute, branch)`
    /// pairs ordered leaf first.
    pub fn path(&self, id: NodeId) -> Vec<(usize, &Branch)> {
        let mut tests = Vec::new();
        let mut current = id;
        while let (Some(parent), Some(branch)) =
            (self.nodes[current].parent, self.nodes[current].branch.as_ref())
        {
            if let NodeKind::Internal { attribute, .. } = self.nodes[parent].kind {
                tests.push((attribute, branch));
            }
            current = parent;
        }
        tests
    }

    /// Sum of class supports over every leaf below `id`.
    pub fn subtree_supports(&self, id: NodeId) -> Vec<usize> {
        let mut total = vec![0; self.class_values.len()];
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            match &self.nodes[current].kind {
                NodeKind::Leaf { class_supports } => {
                    for (t, s) in total.iter_mut().zip(class_supports) {
                        *t += s;
                    }
                }
                NodeKind::Internal { children, .. } => stack.extend(children.iter().copied()),
            }
        }
        total
    }

    /// Leaf reached by `record`, following the first matching branch at
    /// every internal node.
    pub fn classify(&self, record: &Record) -> Option<NodeId> {
        let mut current = Self::ROOT;
        loop {
            match &self.nodes[current].kind {
                NodeKind::Leaf { .. } => return Some(current),
                NodeKind::Internal {
                    attribute,
                    children,
                } => {
                    let value = record.value(*attribute);
                    current = *children.iter().find(|&&child| {
                        self.nodes[child]
                            .branch
                            .as_ref()
                            .is_some_and(|b| b.matches(value))
                    })?;
                }
            }
        }
    }

    /// Indented text rendering, one line per node and two spaces per level.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for id in self.preorder() {
            let node = &self.nodes[id];
            let level = self.level(id);
            if let (Some(parent), Some(branch)) = (node.parent, node.branch.as_ref()) {
                if let NodeKind::Internal { attribute, .. } = self.nodes[parent].kind {
                    out.push_str(&"  ".repeat(level - 1));
                    out.push_str(&format!("{} {}", self.attributes[attribute].name, branch));
                }
            } else {
                out.push_str("root");
            }
            if let NodeKind::Leaf { class_supports } = &node.kind {
                out.push_str(&format!(" : {}", self.format_supports(class_supports)));
            }
            out.push('\n');
        }
        out
    }

    /// `{value;count,value;count,...}`
    pub fn format_supports(&self, supports: &[usize]) -> String {
        let body: Vec<String> = self
            .class_values
            .iter()
            .zip(supports)
            .map(|(v, c)| format!("{};{}", v, c))
            .collect();
        format!("{{{}}}", body.join(","))
    }
}

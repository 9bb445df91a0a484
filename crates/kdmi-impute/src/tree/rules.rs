//! Leaf-to-rule translation and rule-based classification.
//!
//! Every leaf becomes one [`Rule`]: per attribute, the conjunction of all the
//! tests on the path from the root, merged into a single [`Predicate`].
//!
//! Text format, one rule per line with space-separated tokens:
//!
//! ```text
//! 0 1 1 2
//! sunny L75 - {no;0,yes;2}
//! overcast,rainy R(70,80] - {no;1,yes;6}
//! - M(-inf,2.5);(7,inf) - {no;3,yes;0}
//! ```
//!
//! The header holds one role code per attribute (0 categorical, 1 numeric,
//! 2 class). `-` means untested. Categorical predicates list the allowed
//! values, comma-joined. Numeric predicates are `L<v>` for `<= v`, `G<v>`
//! for `> v`, `R` with one interval in bracket notation, or `M` with several
//! intervals separated by `;`. The class position carries the leaf's class
//! supports.

use super::node::{Branch, DecisionTree, NodeId, majority_index};
use crate::dataset::{AttributeType, CLASS_ROLE_CODE, Domain, Record, Schema, Value};
use crate::error::{ImputationError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An interval of the real line with explicit bound closedness.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub low: f64,
    pub high: f64,
    pub low_closed: bool,
    pub high_closed: bool,
}

impl Interval {
    pub fn new(low: f64, high: f64, low_closed: bool, high_closed: bool) -> Self {
        Self {
            low,
            high,
            low_closed: low_closed && low.is_finite(),
            high_closed: high_closed && high.is_finite(),
        }
    }

    pub fn everything() -> Self {
        Self::new(f64::NEG_INFINITY, f64::INFINITY, false, false)
    }

    /// `(-inf, v]`
    pub fn at_most(v: f64) -> Self {
        Self::new(f64::NEG_INFINITY, v, false, true)
    }

    /// `(v, inf)`
    pub fn above(v: f64) -> Self {
        Self::new(v, f64::INFINITY, false, false)
    }

    pub fn contains(&self, x: f64) -> bool {
        let above_low = if self.low_closed {
            x >= self.low
        } else {
            x > self.low
        };
        let below_high = if self.high_closed {
            x <= self.high
        } else {
            x < self.high
        };
        above_low && below_high
    }

    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        let (low, low_closed) = match self.low.total_cmp(&other.low) {
            std::cmp::Ordering::Greater => (self.low, self.low_closed),
            std::cmp::Ordering::Less => (other.low, other.low_closed),
            std::cmp::Ordering::Equal => (self.low, self.low_closed && other.low_closed),
        };
        let (high, high_closed) = match self.high.total_cmp(&other.high) {
            std::cmp::Ordering::Less => (self.high, self.high_closed),
            std::cmp::Ordering::Greater => (other.high, other.high_closed),
            std::cmp::Ordering::Equal => (self.high, self.high_closed && other.high_closed),
        };
        let empty = low > high || (low == high && !(low_closed && high_closed));
        (!empty).then(|| Interval::new(low, high, low_closed, high_closed))
    }

    fn is_at_most(&self) -> bool {
        self.low == f64::NEG_INFINITY && self.high.is_finite() && self.high_closed
    }

    fn is_above(&self) -> bool {
        self.high == f64::INFINITY && self.low.is_finite() && !self.low_closed
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{},{}{}",
            if self.low_closed { '[' } else { '(' },
            self.low,
            self.high,
            if self.high_closed { ']' } else { ')' }
        )
    }
}

fn branch_intervals(branch: &Branch) -> Vec<Interval> {
    match branch {
        Branch::AtMost(v) => vec![Interval::at_most(*v)],
        Branch::Above(v) => vec![Interval::above(*v)],
        Branch::Within(lo, hi) => vec![Interval::new(*lo, *hi, true, true)],
        Branch::Outside(lo, hi) => vec![
            Interval::new(f64::NEG_INFINITY, *lo, false, false),
            Interval::new(*hi, f64::INFINITY, false, false),
        ],
        Branch::Category(_) | Branch::NotCategory(_) => vec![Interval::everything()],
    }
}

/// Condition a rule places on one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum Predicate {
    Any,
    /// The value must be one of these categories.
    Categories(Vec<String>),
    /// The value must fall in one of these disjoint intervals, sorted.
    Intervals(Vec<Interval>),
}

impl Predicate {
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Predicate::Any, _) => true,
            (Predicate::Categories(allowed), Value::Category(v)) => allowed.contains(v),
            (Predicate::Intervals(intervals), Value::Number(x)) => {
                intervals.iter().any(|i| i.contains(*x))
            }
            _ => false,
        }
    }

    /// Conjunction of this predicate with one more test on the attribute.
    /// `domain` spells out what "every value except v" means.
    fn restrict(self, branch: &Branch, domain: &[String]) -> Predicate {
        match branch {
            Branch::Category(v) => {
                let allowed = match self {
                    Predicate::Categories(allowed) => allowed,
                    _ => domain.to_vec(),
                };
                let keep = allowed.contains(v) || domain.is_empty();
                Predicate::Categories(if keep { vec![v.clone()] } else { Vec::new() })
            }
            Branch::NotCategory(v) => {
                let allowed = match self {
                    Predicate::Categories(allowed) => allowed,
                    _ => domain.to_vec(),
                };
                Predicate::Categories(allowed.into_iter().filter(|a| a != v).collect())
            }
            numeric => {
                let current = match self {
                    Predicate::Intervals(intervals) => intervals,
                    _ => vec![Interval::everything()],
                };
                let mut merged: Vec<Interval> = current
                    .iter()
                    .flat_map(|a| {
                        branch_intervals(numeric)
                            .into_iter()
                            .filter_map(move |b| a.intersect(&b))
                    })
                    .collect();
                merged.sort_by(|a, b| a.low.total_cmp(&b.low));
                Predicate::Intervals(merged)
            }
        }
    }

    fn to_token(&self) -> String {
        match self {
            Predicate::Any => "-".to_string(),
            Predicate::Categories(allowed) if allowed.is_empty() => "{}".to_string(),
            Predicate::Categories(allowed) => allowed.join(","),
            Predicate::Intervals(intervals) => match intervals.as_slice() {
                [single] if single.is_at_most() => format!("L{}", single.high),
                [single] if single.is_above() => format!("G{}", single.low),
                [single] => format!("R{}", single),
                many => {
                    let parts: Vec<String> = many.iter().map(Interval::to_string).collect();
                    format!("M{}", parts.join(";"))
                }
            },
        }
    }

    fn parse_token(token: &str, kind: AttributeType, line: usize) -> Result<Predicate> {
        if token == "-" {
            return Ok(Predicate::Any);
        }
        match kind {
            AttributeType::Categorical if token == "{}" => Ok(Predicate::Categories(Vec::new())),
            AttributeType::Categorical => Ok(Predicate::Categories(
                token.split(',').map(str::to_string).collect(),
            )),
            AttributeType::Numeric => {
                let invalid = |reason: &str| ImputationError::InvalidRule {
                    line,
                    reason: format!("{} in '{}'", reason, token),
                };
                let number = |s: &str| {
                    s.trim()
                        .parse::<f64>()
                        .map_err(|_| invalid("bad number"))
                };
                let (tag, body) = token.split_at(token.char_indices().nth(1).map_or(token.len(), |(i, _)| i));
                match tag {
                    "L" => Ok(Predicate::Intervals(vec![Interval::at_most(number(body)?)])),
                    "G" => Ok(Predicate::Intervals(vec![Interval::above(number(body)?)])),
                    "R" if body.starts_with(['(', '[']) => {
                        Ok(Predicate::Intervals(vec![parse_interval(body, &invalid)?]))
                    }
                    "R" => {
                        let (lo, hi) = body
                            .split_once(',')
                            .ok_or_else(|| invalid("expected 'low,high'"))?;
                        let (lo, hi) = (number(lo)?, number(hi)?);
                        Ok(Predicate::Intervals(vec![Interval::new(
                            lo.min(hi),
                            lo.max(hi),
                            true,
                            true,
                        )]))
                    }
                    "M" if body.is_empty() => Ok(Predicate::Intervals(Vec::new())),
                    "M" => body
                        .split(';')
                        .map(|part| parse_interval(part, &invalid))
                        .collect::<Result<Vec<_>>>()
                        .map(Predicate::Intervals),
                    _ => Err(invalid("unknown numeric predicate")),
                }
            }
        }
    }
}

fn parse_interval(
    text: &str,
    invalid: &dyn Fn(&str) -> ImputationError,
) -> Result<Interval> {
    let low_closed = match text.chars().next() {
        Some('[') => true,
        Some('(') => false,
        _ => return Err(invalid("interval must start with '[' or '('")),
    };
    let high_closed = match text.chars().last() {
        Some(']') => true,
        Some(')') => false,
        _ => return Err(invalid("interval must end with ']' or ')'")),
    };
    let inner = &text[1..text.len() - 1];
    let (lo, hi) = inner
        .split_once(',')
        .ok_or_else(|| invalid("expected 'low,high'"))?;
    let lo = lo.trim().parse::<f64>().map_err(|_| invalid("bad lower bound"))?;
    let hi = hi.trim().parse::<f64>().map_err(|_| invalid("bad upper bound"))?;
    Ok(Interval::new(lo, hi, low_closed, high_closed))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// One predicate per attribute; the class position is always `Any`.
    pub predicates: Vec<Predicate>,
    pub class_supports: Vec<usize>,
}

impl Rule {
    /// A record matches when every tested attribute matches. Missing values on
    /// tested attributes never match.
    pub fn matches(&self, record: &Record) -> bool {
        self.predicates
            .iter()
            .zip(&record.values)
            .all(|(predicate, value)| predicate.matches(value))
    }

    pub fn record_count(&self) -> usize {
        self.class_supports.iter().sum()
    }
}

/// Rules of one tree, in leaf order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    kinds: Vec<AttributeType>,
    class_index: usize,
    class_values: Vec<String>,
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn from_tree(tree: &DecisionTree) -> RuleSet {
        let attribute_count = tree.attributes().len();
        let rules = tree
            .leaves()
            .into_iter()
            .map(|leaf| rule_for_leaf(tree, leaf, attribute_count))
            .collect();
        RuleSet {
            kinds: tree.attributes().iter().map(|a| a.kind).collect(),
            class_index: tree.class_index(),
            class_values: tree.class_values().to_vec(),
            rules,
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn class_index(&self) -> usize {
        self.class_index
    }

    pub fn class_values(&self) -> &[String] {
        &self.class_values
    }

    /// Index of the first rule matched by `record`.
    pub fn classify(&self, record: &Record) -> Option<usize> {
        self.rules.iter().position(|rule| rule.matches(record))
    }

    /// Majority class value of rule `index`; ties keep the first value.
    pub fn majority(&self, index: usize) -> Option<&str> {
        majority_index(&self.rules[index].class_supports)
            .map(|class| self.class_values[class].as_str())
    }

    pub fn to_text(&self) -> String {
        let header: Vec<String> = self
            .kinds
            .iter()
            .enumerate()
            .map(|(i, kind)| {
                if i == self.class_index {
                    CLASS_ROLE_CODE.to_string()
                } else {
                    kind.role_code().to_string()
                }
            })
            .collect();
        let mut out = header.join(" ");
        out.push('\n');
        for rule in &self.rules {
            let tokens: Vec<String> = rule
                .predicates
                .iter()
                .enumerate()
                .map(|(i, predicate)| {
                    if i == self.class_index {
                        self.format_supports(&rule.class_supports)
                    } else {
                        predicate.to_token()
                    }
                })
                .collect();
            out.push_str(&tokens.join(" "));
            out.push('\n');
        }
        out
    }

    fn format_supports(&self, supports: &[usize]) -> String {
        let body: Vec<String> = self
            .class_values
            .iter()
            .zip(supports)
            .map(|(v, c)| format!("{};{}", v, c))
            .collect();
        format!("{{{}}}", body.join(","))
    }

    /// Parse the text format. The schema supplies attribute types for
    /// positions the header marks as the class.
    pub fn parse(text: &str, schema: &Schema) -> Result<RuleSet> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        let (header_line, header) = lines.next().ok_or(ImputationError::InvalidRule {
            line: 1,
            reason: "missing role-code header".to_string(),
        })?;
        let codes: Vec<&str> = header.split_whitespace().collect();
        if codes.len() != schema.len() {
            return Err(ImputationError::AttributeCountMismatch {
                line: header_line,
                expected: schema.len(),
                found: codes.len(),
            });
        }
        let mut class_index = None;
        let mut kinds = Vec::with_capacity(codes.len());
        for (i, code) in codes.iter().enumerate() {
            kinds.push(match *code {
                "0" => AttributeType::Categorical,
                "1" => AttributeType::Numeric,
                "2" => {
                    class_index = Some(i);
                    schema.attribute(i).kind
                }
                other => {
                    return Err(ImputationError::InvalidRule {
                        line: header_line,
                        reason: format!("unknown role code '{}'", other),
                    });
                }
            });
        }
        let class_index = class_index.ok_or(ImputationError::InvalidRule {
            line: header_line,
            reason: "no class attribute in header".to_string(),
        })?;

        let mut class_values: Option<Vec<String>> = None;
        let mut rules = Vec::new();
        for (line_no, line) in lines {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != kinds.len() {
                return Err(ImputationError::AttributeCountMismatch {
                    line: line_no,
                    expected: kinds.len(),
                    found: tokens.len(),
                });
            }
            let mut predicates = Vec::with_capacity(tokens.len());
            let mut class_supports = Vec::new();
            for (i, token) in tokens.iter().enumerate() {
                if i == class_index {
                    let (values, counts) = parse_supports(token, line_no)?;
                    match &class_values {
                        Some(known) if *known != values => {
                            return Err(ImputationError::InvalidRule {
                                line: line_no,
                                reason: "class values differ from earlier rules".to_string(),
                            });
                        }
                        Some(_) => {}
                        None => class_values = Some(values),
                    }
                    class_supports = counts;
                    predicates.push(Predicate::Any);
                } else {
                    predicates.push(Predicate::parse_token(token, kinds[i], line_no)?);
                }
            }
            rules.push(Rule {
                predicates,
                class_supports,
            });
        }

        Ok(RuleSet {
            kinds,
            class_index,
            class_values: class_values.unwrap_or_default(),
            rules,
        })
    }
}

fn rule_for_leaf(tree: &DecisionTree, leaf: NodeId, attribute_count: usize) -> Rule {
    let mut predicates = vec![Predicate::Any; attribute_count];
    for (attribute, branch) in tree.path(leaf) {
        let domain = tree
            .domain(attribute)
            .map(Domain::categories)
            .unwrap_or(&[]);
        let current = std::mem::replace(&mut predicates[attribute], Predicate::Any);
        predicates[attribute] = current.restrict(branch, domain);
    }
    Rule {
        predicates,
        class_supports: tree
            .node(leaf)
            .class_supports()
            .map(<[usize]>::to_vec)
            .unwrap_or_default(),
    }
}

fn parse_supports(token: &str, line: usize) -> Result<(Vec<String>, Vec<usize>)> {
    let invalid = |reason: &str| ImputationError::InvalidRule {
        line,
        reason: format!("{} in class supports '{}'", reason, token),
    };
    let body = token
        .strip_prefix('{')
        .and_then(|t| t.strip_suffix('}'))
        .ok_or_else(|| invalid("expected '{value;count,...}'"))?;
    let mut values = Vec::new();
    let mut counts = Vec::new();
    for entry in body.split(',').filter(|e| !e.is_empty()) {
        let (value, count) = entry
            .rsplit_once(';')
            .ok_or_else(|| invalid("expected 'value;count'"))?;
        values.push(value.to_string());
        counts.push(count.parse::<usize>().map_err(|_| invalid("bad count"))?);
    }
    Ok((values, counts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Attribute;
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        Schema::new(vec![
            Attribute::categorical("city"),
            Attribute::numeric("income"),
            Attribute::categorical("class"),
        ])
    }

    fn cities() -> Vec<String> {
        ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect()
    }

    fn base_tree() -> DecisionTree {
        DecisionTree::new(&schema(), 2, vec!["no".into(), "yes".into()], vec![0, 0]).with_domains(
            vec![
                Domain::Categorical(cities()),
                Domain::Numeric(vec![1.0, 10.0]),
                Domain::Categorical(vec!["no".into(), "yes".into()]),
            ],
        )
    }

    fn record(city: Option<&str>, income: Option<f64>) -> Record {
        Record::new(
            0,
            vec![
                city.map(|c| Value::Category(c.to_string()))
                    .unwrap_or(Value::Missing),
                income.map(Value::Number).unwrap_or(Value::Missing),
                Value::Missing,
            ],
        )
    }

    #[test]
    fn test_repeated_exclusions_enumerate_remaining_values() {
        // city != A -> city != B -> leaf
        let mut tree = base_tree();
        tree.split(DecisionTree::ROOT, 0);
        let not_a = tree.add_leaf(DecisionTree::ROOT, Branch::NotCategory("A".into()), vec![]);
        tree.add_leaf(DecisionTree::ROOT, Branch::Category("A".into()), vec![4, 0]);
        tree.split(not_a, 0);
        tree.add_leaf(not_a, Branch::NotCategory("B".into()), vec![1, 5]);
        tree.add_leaf(not_a, Branch::Category("B".into()), vec![3, 0]);

        let rules = RuleSet::from_tree(&tree);
        assert_eq!(
            rules.rules()[0].predicates[0],
            Predicate::Categories(vec!["C".into(), "D".into()])
        );
        assert_eq!(rules.rules()[1].predicates[0], Predicate::Categories(vec!["B".into()]));
        assert_eq!(rules.to_text().lines().nth(1), Some("C,D - {no;1,yes;5}"));
    }

    #[test]
    fn test_numeric_tests_merge_into_range() {
        // income > 2.5 -> income <= 7
        let mut tree = base_tree();
        tree.split(DecisionTree::ROOT, 1);
        let above = tree.add_leaf(DecisionTree::ROOT, Branch::Above(2.5), vec![]);
        tree.add_leaf(DecisionTree::ROOT, Branch::AtMost(2.5), vec![5, 0]);
        tree.split(above, 1);
        tree.add_leaf(above, Branch::AtMost(7.0), vec![0, 6]);
        tree.add_leaf(above, Branch::Above(7.0), vec![2, 2]);

        let rules = RuleSet::from_tree(&tree);
        let text = rules.to_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "0 1 2");
        assert_eq!(lines[1], "- R(2.5,7] {no;0,yes;6}");
        assert_eq!(lines[2], "- G7 {no;2,yes;2}");
        assert_eq!(lines[3], "- L2.5 {no;5,yes;0}");

        assert_eq!(rules.classify(&record(Some("A"), Some(7.0))), Some(0));
        assert_eq!(rules.classify(&record(Some("A"), Some(2.5))), Some(2));
        assert_eq!(rules.classify(&record(Some("A"), None)), None);
    }

    #[test]
    fn test_outside_window_gives_multiple_intervals() {
        let mut tree = base_tree();
        tree.split(DecisionTree::ROOT, 1);
        tree.add_leaf(DecisionTree::ROOT, Branch::Within(2.5, 7.0), vec![0, 6]);
        tree.add_leaf(DecisionTree::ROOT, Branch::Outside(2.5, 7.0), vec![3, 0]);

        let rules = RuleSet::from_tree(&tree);
        let text = rules.to_text();
        assert_eq!(text.lines().nth(1), Some("- R[2.5,7] {no;0,yes;6}"));
        assert_eq!(text.lines().nth(2), Some("- M(-inf,2.5);(7,inf) {no;3,yes;0}"));
        assert_eq!(rules.classify(&record(None, Some(1.0))), Some(1));
        assert_eq!(rules.classify(&record(None, Some(2.5))), Some(0));
    }

    #[test]
    fn test_parse_round_trip() {
        let text = "0 1 2\nC,D R(2.5,7] {no;1,yes;5}\nA M(-inf,2.5);(7,inf) {no;4,yes;0}\n- - {no;0,yes;3}\n";
        let rules = RuleSet::parse(text, &schema()).unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules.class_index(), 2);
        assert_eq!(rules.class_values(), &["no".to_string(), "yes".to_string()]);
        assert_eq!(rules.to_text(), text);
        assert_eq!(rules.majority(0), Some("yes"));
        assert_eq!(rules.classify(&record(Some("B"), Some(3.0))), Some(2));
    }

    #[test]
    fn test_parse_legacy_range_is_closed() {
        let rules = RuleSet::parse("0 1 2\n- R2.5,7 {no;1,yes;1}\n", &schema()).unwrap();
        assert_eq!(
            rules.rules()[0].predicates[1],
            Predicate::Intervals(vec![Interval::new(2.5, 7.0, true, true)])
        );
        assert_eq!(rules.classify(&record(None, Some(2.5))), Some(0));
    }

    #[test]
    fn test_parse_errors_carry_line() {
        let err = RuleSet::parse("0 1 2\n- X3 {no;1}\n", &schema()).unwrap_err();
        assert!(matches!(err, ImputationError::InvalidRule { line: 2, .. }));

        let err = RuleSet::parse("0 1 2\n- L3\n", &schema()).unwrap_err();
        assert!(matches!(
            err,
            ImputationError::AttributeCountMismatch { line: 2, .. }
        ));
    }

    #[test]
    fn test_interval_intersection() {
        let a = Interval::above(2.0);
        let b = Interval::at_most(2.0);
        assert_eq!(a.intersect(&b), None);
        let c = Interval::new(1.0, 3.0, true, true);
        assert_eq!(
            a.intersect(&c),
            Some(Interval::new(2.0, 3.0, false, true))
        );
    }
}

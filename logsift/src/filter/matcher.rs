use std::cmp::Ordering;

use super::cache::RegexCache;
use crate::metrics::FilterMetrics;
use crate::query::{Condition, FilterNode, Logic, Operator};
use crate::record::Record;
use crate::value::Value;

/// Evaluates filter trees against records.
///
/// A matcher is shared by every worker of a run; its only mutable state is
/// the regex cache.
#[derive(Debug)]
pub struct Matcher {
    ignore_case: bool,
    regexes: RegexCache,
}

impl Matcher {
    pub fn new(ignore_case: bool) -> Self {
        Self::with_metrics(ignore_case, FilterMetrics::new())
    }

    pub fn with_metrics(ignore_case: bool, metrics: FilterMetrics) -> Self {
        Self {
            ignore_case,
            regexes: RegexCache::with_metrics(metrics),
        }
    }

    pub fn ignore_case(&self) -> bool {
        self.ignore_case
    }

    pub fn regex_cache(&self) -> &RegexCache {
        &self.regexes
    }

    /// True when `record` satisfies `node`; no node, or an empty one, matches everything
    pub fn matches(&self, record: &Record, node: Option<&FilterNode>) -> bool {
        match node {
            None => true,
            Some(node) if node.is_empty() => true,
            Some(node) => self.eval_node(record, node),
        }
    }

    fn eval_node(&self, record: &Record, node: &FilterNode) -> bool {
        let conditions = match node.logic {
            Logic::And => node.conditions.iter().all(|c| self.eval_condition(record, c)),
            Logic::Or => node.conditions.iter().any(|c| self.eval_condition(record, c)),
        };

        match node.logic {
            Logic::And => {
                conditions && node.children.iter().all(|child| self.eval_node(record, child))
            }
            Logic::Or => {
                conditions || node.children.iter().any(|child| self.eval_node(record, child))
            }
        }
    }

    fn eval_condition(&self, record: &Record, condition: &Condition) -> bool {
        let Some(actual) = record.get(&condition.field) else {
            // An absent field differs from every value and satisfies nothing else
            return condition.operator == Operator::Ne;
        };

        let fold = self.ignore_case || condition.case_insensitive;
        let expected = &condition.value;

        match condition.operator {
            Operator::Exists => true,
            Operator::Eq => text_eq(&actual.render(), &expected.render(), fold),
            Operator::Ne => !text_eq(&actual.render(), &expected.render(), fold),
            Operator::Gt => compare(actual, expected, fold) == Some(Ordering::Greater),
            Operator::Lt => compare(actual, expected, fold) == Some(Ordering::Less),
            Operator::Gte => matches!(
                compare(actual, expected, fold),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Lte => matches!(
                compare(actual, expected, fold),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Operator::Contains => {
                let haystack = actual.render();
                let needle = expected.render();
                if fold {
                    haystack.to_lowercase().contains(&needle.to_lowercase())
                } else {
                    haystack.contains(&needle)
                }
            }
            Operator::Regex => match self.regexes.get(&expected.render(), fold) {
                Some(regex) => regex.is_match(&actual.render()),
                None => false,
            },
        }
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(false)
    }
}

fn text_eq(a: &str, b: &str, fold: bool) -> bool {
    if fold {
        a.to_lowercase() == b.to_lowercase()
    } else {
        a == b
    }
}

/// Numeric ordering when both sides coerce to numbers, string ordering otherwise.
///
/// NaN on either side is unordered, which fails every relational test.
fn compare(actual: &Value, expected: &Value, fold: bool) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (actual.as_f64(), expected.as_f64()) {
        return a.partial_cmp(&b);
    }

    let (a, b) = (actual.render(), expected.render());
    if fold {
        Some(a.to_lowercase().cmp(&b.to_lowercase()))
    } else {
        Some(a.cmp(&b))
    }
}

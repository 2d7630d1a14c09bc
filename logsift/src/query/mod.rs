//! The filter query language and the tree it compiles to.
//!
//! # Syntax
//!
//! ```text
//! field:value   field=value      equal
//! field!=value                   not equal
//! field>value   field>=value     numeric when both sides are numbers,
//! field<value   field<=value     string comparison otherwise
//! field~=pattern                 regular expression
//! field*=text                    substring
//! field?                         field is present
//!
//! a,b                            a AND b
//! a|b                            a OR b
//! ```
//!
//! Fields are dot paths into the flattened record (`user.profile.role`,
//! `items[0].sku`). Values may be bare or quoted with `"` or `'`; either way
//! the literal is typed as int, float, bool, null or string, in that order.
//!
//! Pipe binds tighter than comma, so `level:error|level:warn,status>=500`
//! reads as `(level:error OR level:warn) AND status>=500`.
//!
//! # Limitation
//!
//! Parentheses are accepted but their content is read as one condition:
//! `(level:error|level:warn)` keeps only `level:error`. Rewrite such groups
//! without parentheses.

pub mod parser;

use std::fmt;

use crate::value::Value;

pub use parser::QueryParser;

/// Comparison applied by a [`Condition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    Regex,
    Contains,
    Exists,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Eq => ":",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Gte => ">=",
            Operator::Lte => "<=",
            Operator::Regex => "~=",
            Operator::Contains => "*=",
            Operator::Exists => "?",
        };
        f.write_str(symbol)
    }
}

/// How the conditions and children of a node combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Logic {
    And,
    Or,
}

/// One `field op value` test
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: Value,
    pub case_insensitive: bool,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            case_insensitive: false,
        }
    }

    /// Existence test for `field`
    pub fn exists(field: impl Into<String>) -> Self {
        Self::new(field, Operator::Exists, Value::Null)
    }

    pub fn ignore_case(mut self) -> Self {
        self.case_insensitive = true;
        self
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Exists => write!(f, "{}?", self.field),
            op => write!(f, "{}{}{}", self.field, op, self.value),
        }
    }
}

/// A compiled filter.
///
/// `conditions` and `children` are combined with the same `logic`. Nodes are
/// built once by [`QueryParser`] and then shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterNode {
    pub conditions: Vec<Condition>,
    pub logic: Logic,
    pub children: Vec<FilterNode>,
}

impl FilterNode {
    pub fn new(logic: Logic) -> Self {
        Self {
            conditions: Vec::new(),
            logic,
            children: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_child(mut self, child: FilterNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn add_condition(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn add_child(&mut self, child: FilterNode) {
        self.children.push(child);
    }

    /// True when the node has nothing to test and therefore matches everything
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.children.is_empty()
    }
}

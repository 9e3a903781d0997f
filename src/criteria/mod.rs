//! Backend-neutral filter AST plus its parser and the two storage dialect translators.
//!
//! A `None` criteria means "match all"; every translator maps it to its empty filter.

pub mod document;
pub mod parser;
pub mod relational;

pub use document::{DocumentFilter, DocumentTranslator};
pub use parser::parse_query;
pub use relational::{SqlOp, SqlTranslator, SqlWhere};

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Deepest criteria tree accepted from callers. Parsing, translation and matching recurse
/// once per level.
pub const MAX_DEPTH: usize = 64;

/// Scalar comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "nin")]
    NotIn,
    #[serde(rename = "like")]
    Like,
}

impl ComparisonOp {
    pub fn token(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::In => "in",
            ComparisonOp::NotIn => "nin",
            ComparisonOp::Like => "like",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub from: Value,
    pub to: Value,
}

/// Filter expression tree. Built once, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CriteriaNode {
    Comparison {
        op: ComparisonOp,
        #[serde(rename = "var")]
        field: String,
        #[serde(rename = "val")]
        value: Value,
    },
    Logical {
        op: LogicalOp,
        #[serde(rename = "args")]
        operands: Vec<CriteriaNode>,
    },
    Between {
        #[serde(rename = "var")]
        field: String,
        between: Range,
    },
}

impl CriteriaNode {
    pub fn compare(op: ComparisonOp, field: impl Into<String>, value: impl Into<Value>) -> Self {
        CriteriaNode::Comparison {
            op,
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(ComparisonOp::Eq, field, value)
    }

    pub fn between(field: impl Into<String>, from: impl Into<Value>, to: impl Into<Value>) -> Self {
        CriteriaNode::Between {
            field: field.into(),
            between: Range {
                from: from.into(),
                to: to.into(),
            },
        }
    }

    pub fn and(operands: Vec<CriteriaNode>) -> Self {
        CriteriaNode::Logical {
            op: LogicalOp::And,
            operands,
        }
    }

    pub fn or(operands: Vec<CriteriaNode>) -> Self {
        CriteriaNode::Logical {
            op: LogicalOp::Or,
            operands,
        }
    }

    /// Conjoins `factors` in order. Returns `None` for an empty list and the sole factor when there is one.
    pub fn conjoin(mut factors: Vec<CriteriaNode>) -> Option<Self> {
        match factors.len() {
            0 => None,
            1 => factors.pop(),
            _ => Some(Self::and(factors)),
        }
    }

    /// Levels in the tree; a leaf is 1. Walks with an explicit stack so arbitrarily deep
    /// trees can be measured.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self, 1)];
        while let Some((node, level)) = stack.pop() {
            deepest = deepest.max(level);
            if let CriteriaNode::Logical { operands, .. } = node {
                stack.extend(operands.iter().map(|o| (o, level + 1)));
            }
        }
        deepest
    }
}

/// Rejects trees deeper than [`MAX_DEPTH`] before anything recurses over them.
pub(crate) fn check_depth(node: &CriteriaNode) -> Result<(), AppError> {
    let depth = node.depth();
    if depth > MAX_DEPTH {
        return Err(AppError::malformed(format!(
            "criteria nested {} levels deep, limit is {}",
            depth, MAX_DEPTH
        )));
    }
    Ok(())
}

impl fmt::Display for CriteriaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CriteriaNode::Comparison { op, field, value } => write!(f, "{} {} {}", field, op.token(), value),
            CriteriaNode::Logical { op, operands } => {
                let sep = match op {
                    LogicalOp::And => " AND ",
                    LogicalOp::Or => " OR ",
                };
                write!(f, "(")?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        f.write_str(sep)?;
                    }
                    write!(f, "{}", operand)?;
                }
                write!(f, ")")
            }
            CriteriaNode::Between { field, between } => {
                write!(f, "{} BETWEEN {} AND {}", field, between.from, between.to)
            }
        }
    }
}

/// Lowers criteria into one storage dialect.
pub trait CriteriaTranslator {
    type Filter;

    fn translate(&self, node: Option<&CriteriaNode>) -> Result<Self::Filter, AppError>;
}

/// Field names reach both dialects; a leading `$` would be read as an operator by the document store.
pub(crate) fn check_field(field: &str) -> Result<(), AppError> {
    if field.is_empty() {
        return Err(AppError::malformed("empty field name"));
    }
    if field.starts_with('$') {
        return Err(AppError::malformed(format!("invalid field name '{}'", field)));
    }
    Ok(())
}

/// Converts a `like` value with `%` wildcards at either end into an anchored regex.
/// The literal part is not escaped.
pub(crate) fn like_to_regex(value: &Value) -> Result<String, AppError> {
    let raw = value
        .as_str()
        .ok_or_else(|| AppError::malformed("like requires a string value"))?;
    let head = raw.starts_with('%');
    let tail = raw.len() > usize::from(head) && raw.ends_with('%');
    let start = usize::from(head);
    let end = raw.len() - usize::from(tail);
    let body = &raw[start..end];
    let pattern = match (head, tail) {
        (true, true) => body.to_string(),
        (true, false) => format!("{}$", body),
        (false, true) => format!("^{}", body),
        (false, false) => format!("^{}$", body),
    };
    regex::Regex::new(&pattern)
        .map_err(|e| AppError::malformed(format!("like pattern '{}': {}", raw, e)))?;
    Ok(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn like_wildcards_become_anchors() {
        assert_eq!(like_to_regex(&json!("%abc%")).unwrap(), "abc");
        assert_eq!(like_to_regex(&json!("abc%")).unwrap(), "^abc");
        assert_eq!(like_to_regex(&json!("%abc")).unwrap(), "abc$");
        assert_eq!(like_to_regex(&json!("abc")).unwrap(), "^abc$");
        assert_eq!(like_to_regex(&json!("%")).unwrap(), "$");
    }

    #[test]
    fn like_rejects_non_strings_and_bad_patterns() {
        assert!(matches!(like_to_regex(&json!(3)), Err(AppError::MalformedCriteria(_))));
        assert!(matches!(like_to_regex(&json!("a(b%")), Err(AppError::MalformedCriteria(_))));
    }

    #[test]
    fn json_form_matches_wire_shape() {
        let node = CriteriaNode::and(vec![
            CriteriaNode::eq("accountsId", "A1"),
            CriteriaNode::between("age", 1, 9),
        ]);
        let v = serde_json::to_value(&node).unwrap();
        assert_eq!(
            v,
            json!({
                "op": "and",
                "args": [
                    { "op": "=", "var": "accountsId", "val": "A1" },
                    { "var": "age", "between": { "from": 1, "to": 9 } }
                ]
            })
        );
        let back: CriteriaNode = serde_json::from_value(v).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn conjoin_collapses_small_lists() {
        assert_eq!(CriteriaNode::conjoin(vec![]), None);
        let one = CriteriaNode::eq("a", 1);
        assert_eq!(CriteriaNode::conjoin(vec![one.clone()]), Some(one));
    }

    #[test]
    fn depth_is_measured_and_bounded() {
        let mut node = CriteriaNode::eq("a", 1);
        assert_eq!(node.depth(), 1);
        for _ in 0..200 {
            node = CriteriaNode::and(vec![CriteriaNode::eq("b", 2), node]);
        }
        assert_eq!(node.depth(), 201);
        assert!(matches!(check_depth(&node), Err(AppError::MalformedCriteria(_))));
        assert!(matches!(
            DocumentTranslator.translate(Some(&node)),
            Err(AppError::MalformedCriteria(_))
        ));
        assert!(matches!(
            SqlTranslator.translate(Some(&node)),
            Err(AppError::MalformedCriteria(_))
        ));
    }
}

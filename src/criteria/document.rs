//! Document-store dialect: Mongo-style nested filter documents.

use super::{check_depth, check_field, like_to_regex, ComparisonOp, CriteriaNode, CriteriaTranslator, LogicalOp};
use crate::error::AppError;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Filter document understood by [`crate::provider::DocumentProvider`]. `{}` matches everything.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DocumentFilter(Value);

impl DocumentFilter {
    pub fn match_all() -> Self {
        DocumentFilter(Value::Object(Map::new()))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DocumentTranslator;

impl DocumentTranslator {
    fn operator_token(op: ComparisonOp) -> &'static str {
        match op {
            ComparisonOp::Eq => "$eq",
            ComparisonOp::Ne => "$ne",
            ComparisonOp::Gt => "$gt",
            ComparisonOp::Gte => "$gte",
            ComparisonOp::Lt => "$lt",
            ComparisonOp::Lte => "$lte",
            ComparisonOp::In => "$in",
            ComparisonOp::NotIn => "$nin",
            ComparisonOp::Like => "$regex",
        }
    }

    fn lower(node: &CriteriaNode) -> Result<Value, AppError> {
        match node {
            CriteriaNode::Logical { op, operands } => {
                if operands.is_empty() {
                    return Err(AppError::malformed("logical operator without operands"));
                }
                let key = match op {
                    LogicalOp::And => "$and",
                    LogicalOp::Or => "$or",
                };
                let children = operands.iter().map(Self::lower).collect::<Result<Vec<_>, _>>()?;
                Ok(json!({ key: children }))
            }
            CriteriaNode::Comparison { op, field, value } => {
                check_field(field)?;
                let predicate = match op {
                    // Bare value: implicit equality, never wrapped in `$eq`.
                    ComparisonOp::Eq => value.clone(),
                    ComparisonOp::Like => json!({ "$regex": like_to_regex(value)? }),
                    ComparisonOp::In | ComparisonOp::NotIn if !value.is_array() => {
                        return Err(AppError::malformed(format!("{} requires a list value", op.token())));
                    }
                    _ => {
                        let token = Self::operator_token(*op);
                        json!({ token: value })
                    }
                };
                let mut m = Map::new();
                m.insert(field.clone(), predicate);
                Ok(Value::Object(m))
            }
            CriteriaNode::Between { field, between } => {
                check_field(field)?;
                let mut m = Map::new();
                m.insert(field.clone(), json!({ "$gte": between.from, "$lte": between.to }));
                Ok(Value::Object(m))
            }
        }
    }
}

impl CriteriaTranslator for DocumentTranslator {
    type Filter = DocumentFilter;

    fn translate(&self, node: Option<&CriteriaNode>) -> Result<DocumentFilter, AppError> {
        match node {
            None => Ok(DocumentFilter::match_all()),
            Some(n) => {
                check_depth(n)?;
                Ok(DocumentFilter(Self::lower(n)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::CriteriaNode as C;

    fn translate(node: &C) -> Value {
        DocumentTranslator.translate(Some(node)).unwrap().as_value().clone()
    }

    #[test]
    fn none_is_empty_document() {
        let f = DocumentTranslator.translate(None).unwrap();
        assert_eq!(f.as_value(), &json!({}));
    }

    #[test]
    fn equality_is_bare_value() {
        assert_eq!(translate(&C::eq("status", 1)), json!({ "status": 1 }));
    }

    #[test]
    fn scalar_operators_map_to_tokens() {
        assert_eq!(translate(&C::compare(ComparisonOp::Ne, "a", "x")), json!({ "a": { "$ne": "x" } }));
        assert_eq!(translate(&C::compare(ComparisonOp::Gte, "a", 2)), json!({ "a": { "$gte": 2 } }));
        assert_eq!(
            translate(&C::compare(ComparisonOp::NotIn, "a", json!([1, 2]))),
            json!({ "a": { "$nin": [1, 2] } })
        );
    }

    #[test]
    fn like_and_between() {
        assert_eq!(
            translate(&C::compare(ComparisonOp::Like, "name", "jo%")),
            json!({ "name": { "$regex": "^jo" } })
        );
        assert_eq!(
            translate(&C::between("age", 10, 20)),
            json!({ "age": { "$gte": 10, "$lte": 20 } })
        );
    }

    #[test]
    fn logical_nodes_nest() {
        let node = C::or(vec![C::eq("a", 1), C::and(vec![C::eq("b", 2), C::eq("c", 3)])]);
        assert_eq!(
            translate(&node),
            json!({ "$or": [ { "a": 1 }, { "$and": [ { "b": 2 }, { "c": 3 } ] } ] })
        );
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        for node in [
            C::and(vec![]),
            C::eq("$where", 1),
            C::eq("", 1),
            C::compare(ComparisonOp::In, "a", 1),
        ] {
            assert!(matches!(
                DocumentTranslator.translate(Some(&node)),
                Err(AppError::MalformedCriteria(_))
            ));
        }
    }
}

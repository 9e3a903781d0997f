//! Relational dialect: a structured WHERE tree rendered as parameterized PostgreSQL.

use super::{check_depth, check_field, like_to_regex, ComparisonOp, CriteriaNode, CriteriaTranslator, LogicalOp};
use crate::error::AppError;
use crate::sql::{quoted, QueryBuf};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SqlOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    /// POSIX regex match (`~`).
    Regex,
    /// JSONB containment on a dotted path into a document column.
    Contains,
    NotContains,
}

impl SqlOp {
    fn token(&self) -> &'static str {
        match self {
            SqlOp::Eq => "=",
            SqlOp::Ne => "<>",
            SqlOp::Gt => ">",
            SqlOp::Gte => ">=",
            SqlOp::Lt => "<",
            SqlOp::Lte => "<=",
            SqlOp::In => "IN",
            SqlOp::NotIn => "NOT IN",
            SqlOp::Regex => "~",
            SqlOp::Contains | SqlOp::NotContains => "@>",
        }
    }
}

/// WHERE clause tree. `All` renders to nothing.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlWhere {
    All,
    Predicate { column: String, op: SqlOp, value: Value },
    And(Vec<SqlWhere>),
    Or(Vec<SqlWhere>),
}

impl SqlWhere {
    /// Appends ` WHERE ...` to the buffer, binding values as parameters. No-op for `All`.
    pub fn write_where(&self, q: &mut QueryBuf) {
        if matches!(self, SqlWhere::All) {
            return;
        }
        q.sql.push_str(" WHERE ");
        self.write_expr(q);
    }

    fn write_expr(&self, q: &mut QueryBuf) {
        match self {
            SqlWhere::All => q.sql.push_str("TRUE"),
            SqlWhere::And(parts) | SqlWhere::Or(parts) => {
                let sep = if matches!(self, SqlWhere::And(_)) { " AND " } else { " OR " };
                q.sql.push('(');
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        q.sql.push_str(sep);
                    }
                    part.write_expr(q);
                }
                q.sql.push(')');
            }
            SqlWhere::Predicate { column, op, value } => Self::write_predicate(q, column, *op, value),
        }
    }

    fn write_predicate(q: &mut QueryBuf, column: &str, op: SqlOp, value: &Value) {
        if let SqlOp::Contains | SqlOp::NotContains = op {
            let (root, path) = column.split_once('.').unwrap_or((column, ""));
            let n = q.push_param(Value::String(value.to_string()));
            let test = format!(
                "COALESCE({} #> '{{{}}}' @> CAST(${} AS JSONB), FALSE)",
                quoted(root),
                path.replace('.', ","),
                n
            );
            if op == SqlOp::Contains {
                q.sql.push_str(&test);
            } else {
                q.sql.push_str(&format!("NOT {}", test));
            }
            return;
        }
        let col = quoted(column);
        match (op, value) {
            (SqlOp::Eq, Value::Null) => q.sql.push_str(&format!("{} IS NULL", col)),
            (SqlOp::Ne, Value::Null) => q.sql.push_str(&format!("{} IS NOT NULL", col)),
            (SqlOp::In | SqlOp::NotIn, Value::Array(items)) => {
                let has_null = items.iter().any(Value::is_null);
                let listed: Vec<String> = items
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(|v| format!("${}", q.push_column_param(column, v.clone())))
                    .collect();
                let member = (!listed.is_empty()).then(|| format!("{} {} ({})", col, op.token(), listed.join(", ")));
                // NULL never satisfies IN / NOT IN, so missing fields are spelled out.
                let text = match (op, member, has_null) {
                    (SqlOp::In, None, false) => "FALSE".to_string(),
                    (SqlOp::In, None, true) => format!("{} IS NULL", col),
                    (SqlOp::In, Some(m), false) => m,
                    (SqlOp::In, Some(m), true) => format!("({} OR {} IS NULL)", m, col),
                    (_, None, false) => "TRUE".to_string(),
                    (_, None, true) => format!("{} IS NOT NULL", col),
                    (_, Some(m), false) => format!("({} IS NULL OR {})", col, m),
                    (_, Some(m), true) => format!("({} IS NOT NULL AND {})", col, m),
                };
                q.sql.push_str(&text);
            }
            (SqlOp::Ne, _) => {
                let n = q.push_column_param(column, value.clone());
                q.sql.push_str(&format!("{} IS DISTINCT FROM ${}", col, n));
            }
            (SqlOp::Regex, _) => {
                let n = q.push_param(value.clone());
                q.sql.push_str(&format!("CAST({} AS TEXT) ~ ${}", col, n));
            }
            _ => {
                let n = q.push_column_param(column, value.clone());
                q.sql.push_str(&format!("{} {} ${}", col, op.token(), n));
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SqlTranslator;

impl SqlTranslator {
    fn lower(node: &CriteriaNode) -> Result<SqlWhere, AppError> {
        match node {
            CriteriaNode::Logical { op, operands } => {
                if operands.is_empty() {
                    return Err(AppError::malformed("logical operator without operands"));
                }
                let parts = operands.iter().map(Self::lower).collect::<Result<Vec<_>, _>>()?;
                Ok(match op {
                    LogicalOp::And => SqlWhere::And(parts),
                    LogicalOp::Or => SqlWhere::Or(parts),
                })
            }
            CriteriaNode::Comparison { op, field, value } if field.contains('.') => {
                check_field(field)?;
                Self::lower_nested(*op, field, value)
            }
            CriteriaNode::Comparison { op, field, value } => {
                check_field(field)?;
                let (op, value) = match op {
                    ComparisonOp::Eq => (SqlOp::Eq, value.clone()),
                    ComparisonOp::Ne => (SqlOp::Ne, value.clone()),
                    ComparisonOp::Gt => (SqlOp::Gt, value.clone()),
                    ComparisonOp::Gte => (SqlOp::Gte, value.clone()),
                    ComparisonOp::Lt => (SqlOp::Lt, value.clone()),
                    ComparisonOp::Lte => (SqlOp::Lte, value.clone()),
                    ComparisonOp::In | ComparisonOp::NotIn => {
                        if !value.is_array() {
                            return Err(AppError::malformed(format!("{} requires a list value", op.token())));
                        }
                        let sql_op = if *op == ComparisonOp::In { SqlOp::In } else { SqlOp::NotIn };
                        (sql_op, value.clone())
                    }
                    ComparisonOp::Like => (SqlOp::Regex, Value::String(like_to_regex(value)?)),
                };
                Ok(SqlWhere::Predicate {
                    column: field.clone(),
                    op,
                    value,
                })
            }
            CriteriaNode::Between { field, between } => {
                check_field(field)?;
                Ok(SqlWhere::And(vec![
                    SqlWhere::Predicate {
                        column: field.clone(),
                        op: SqlOp::Gte,
                        value: between.from.clone(),
                    },
                    SqlWhere::Predicate {
                        column: field.clone(),
                        op: SqlOp::Lte,
                        value: between.to.clone(),
                    },
                ]))
            }
        }
    }
}

impl SqlTranslator {
    /// `a.b.c` addresses a path inside the JSONB column `a`. Only equality and inequality
    /// are supported there; both use containment, so arrays match any of their elements.
    fn lower_nested(op: ComparisonOp, field: &str, value: &Value) -> Result<SqlWhere, AppError> {
        let simple = |seg: &str| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !field.split('.').all(simple) {
            return Err(AppError::malformed(format!("invalid nested field '{}'", field)));
        }
        let op = match (op, value) {
            (_, Value::Null) => return Err(AppError::malformed(format!("null comparison on nested field '{}'", field))),
            (ComparisonOp::Eq, _) => SqlOp::Contains,
            (ComparisonOp::Ne, _) => SqlOp::NotContains,
            (other, _) => {
                return Err(AppError::malformed(format!(
                    "operator {} is not supported on nested field '{}'",
                    other.token(),
                    field
                )))
            }
        };
        Ok(SqlWhere::Predicate {
            column: field.to_string(),
            op,
            value: value.clone(),
        })
    }
}

impl CriteriaTranslator for SqlTranslator {
    type Filter = SqlWhere;

    fn translate(&self, node: Option<&CriteriaNode>) -> Result<SqlWhere, AppError> {
        match node {
            None => Ok(SqlWhere::All),
            Some(n) => {
                check_depth(n)?;
                Self::lower(n)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::CriteriaNode as C;
    use serde_json::json;

    fn render(node: Option<&C>) -> QueryBuf {
        let w = SqlTranslator.translate(node).unwrap();
        let mut q = QueryBuf::new();
        w.write_where(&mut q);
        q
    }

    #[test]
    fn match_all_renders_nothing() {
        let q = render(None);
        assert_eq!(q.sql, "");
        assert!(q.params.is_empty());
    }

    #[test]
    fn comparisons_bind_parameters_in_order() {
        let node = C::and(vec![C::eq("accountsId", "A1"), C::compare(ComparisonOp::Gt, "status", 1)]);
        let q = render(Some(&node));
        assert_eq!(q.sql, r#" WHERE ("accountsId" = $1 AND "status" > $2)"#);
        assert_eq!(q.params, vec![json!("A1"), json!(1)]);
    }

    #[test]
    fn like_becomes_regex_match() {
        let q = render(Some(&C::compare(ComparisonOp::Like, "name", "%abc")));
        assert_eq!(q.sql, r#" WHERE CAST("name" AS TEXT) ~ $1"#);
        assert_eq!(q.params, vec![json!("abc$")]);
    }

    #[test]
    fn between_is_conjunction() {
        assert_eq!(
            SqlTranslator.translate(Some(&C::between("age", 1, 5))).unwrap(),
            SqlWhere::And(vec![
                SqlWhere::Predicate { column: "age".into(), op: SqlOp::Gte, value: json!(1) },
                SqlWhere::Predicate { column: "age".into(), op: SqlOp::Lte, value: json!(5) },
            ])
        );
    }

    #[test]
    fn in_lists_and_nulls() {
        let q = render(Some(&C::compare(ComparisonOp::NotIn, "kind", json!(["a", "b"]))));
        assert_eq!(q.sql, r#" WHERE ("kind" IS NULL OR "kind" NOT IN ($1, $2))"#);
        assert_eq!(render(Some(&C::compare(ComparisonOp::In, "kind", json!([])))).sql, " WHERE FALSE");
        assert_eq!(render(Some(&C::compare(ComparisonOp::NotIn, "kind", json!([])))).sql, " WHERE TRUE");
        assert_eq!(render(Some(&C::eq("gone", Value::Null))).sql, r#" WHERE "gone" IS NULL"#);
    }

    #[test]
    fn missing_fields_satisfy_negations() {
        let q = render(Some(&C::compare(ComparisonOp::Ne, "status", 1)));
        assert_eq!(q.sql, r#" WHERE "status" IS DISTINCT FROM $1"#);
        assert_eq!(q.params, vec![json!(1)]);
        assert_eq!(
            render(Some(&C::compare(ComparisonOp::Ne, "status", Value::Null))).sql,
            r#" WHERE "status" IS NOT NULL"#
        );

        let q = render(Some(&C::compare(ComparisonOp::In, "kind", json!(["a", null]))));
        assert_eq!(q.sql, r#" WHERE ("kind" IN ($1) OR "kind" IS NULL)"#);
        assert_eq!(q.params, vec![json!("a")]);
        let q = render(Some(&C::compare(ComparisonOp::NotIn, "kind", json!([null, "a"]))));
        assert_eq!(q.sql, r#" WHERE ("kind" IS NOT NULL AND "kind" NOT IN ($1))"#);
        assert_eq!(
            render(Some(&C::compare(ComparisonOp::In, "kind", json!([null])))).sql,
            r#" WHERE "kind" IS NULL"#
        );
    }

    #[test]
    fn nested_fields_use_jsonb_containment() {
        let q = render(Some(&C::eq("profile.emails", "x@y.net")));
        assert_eq!(
            q.sql,
            r#" WHERE COALESCE("profile" #> '{emails}' @> CAST($1 AS JSONB), FALSE)"#
        );
        assert_eq!(q.params, vec![json!("\"x@y.net\"")]);
        assert!(SqlTranslator
            .translate(Some(&C::compare(ComparisonOp::Gt, "profile.age", 3)))
            .is_err());
        assert!(SqlTranslator.translate(Some(&C::eq("profile.x-y", 3))).is_err());
    }

    #[test]
    fn empty_logical_is_malformed() {
        assert!(matches!(
            SqlTranslator.translate(Some(&C::or(vec![]))),
            Err(AppError::MalformedCriteria(_))
        ));
    }
}

//! Builds parameterized INSERT, SELECT, COUNT, UPDATE, DELETE for one table.

use crate::criteria::SqlWhere;
use crate::provider::{SortKey, Window};
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Schema-qualified table a relational resource lives in.
#[derive(Clone, Debug)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn qualified(&self) -> String {
        format!("{}.{}", quoted(&self.schema), quoted(&self.table))
    }
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
    /// Column each parameter is compared with or written to; `None` for free-standing values.
    pub targets: Vec<Option<String>>,
}

impl QueryBuf {
    pub fn new() -> Self {
        QueryBuf::default()
    }

    /// Returns the 1-based placeholder number.
    pub fn push_param(&mut self, v: Value) -> u32 {
        self.params.push(v);
        self.targets.push(None);
        self.params.len() as u32
    }

    /// Like [`push_param`](Self::push_param), remembering the column the value belongs to.
    pub fn push_column_param(&mut self, column: &str, v: Value) -> u32 {
        self.params.push(v);
        self.targets.push(Some(column.to_string()));
        self.params.len() as u32
    }
}

fn order_clause(sort: &[SortKey], pk: &str) -> String {
    if sort.is_empty() {
        return format!(" ORDER BY {}", quoted(pk));
    }
    let keys: Vec<String> = sort
        .iter()
        .map(|k| format!("{} {}", quoted(&k.field), if k.descending { "DESC" } else { "ASC" }))
        .collect();
    format!(" ORDER BY {}", keys.join(", "))
}

/// SELECT * with WHERE, ORDER BY (sort keys, else pk), LIMIT and OFFSET.
pub fn select(table: &TableRef, filter: &SqlWhere, sort: &[SortKey], pk: &str, window: Window) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!("SELECT * FROM {}", table.qualified());
    filter.write_where(&mut q);
    q.sql.push_str(&order_clause(sort, pk));
    q.sql.push_str(&format!(" LIMIT {} OFFSET {}", window.limit, window.offset));
    q
}

pub fn count(table: &TableRef, filter: &SqlWhere) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!("SELECT COUNT(*) FROM {}", table.qualified());
    filter.write_where(&mut q);
    q
}

/// INSERT every field of the record, returning the stored row.
pub fn insert(table: &TableRef, record: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::with_capacity(record.len());
    let mut placeholders = Vec::with_capacity(record.len());
    for (name, val) in record {
        let n = q.push_column_param(name, val.clone());
        cols.push(quoted(name));
        placeholders.push(format!("${}", n));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
        table.qualified(),
        cols.join(", "),
        placeholders.join(", ")
    );
    q
}

/// UPDATE the fields of `partial` on matching rows. SET params are bound before WHERE params.
/// Returns `None` when there is nothing to set.
pub fn update(table: &TableRef, filter: &SqlWhere, partial: &Map<String, Value>) -> Option<QueryBuf> {
    if partial.is_empty() {
        return None;
    }
    let mut q = QueryBuf::new();
    let mut sets = Vec::with_capacity(partial.len());
    for (k, v) in partial {
        let n = q.push_column_param(k, v.clone());
        sets.push(format!("{} = ${}", quoted(k), n));
    }
    q.sql = format!("UPDATE {} SET {}", table.qualified(), sets.join(", "));
    filter.write_where(&mut q);
    Some(q)
}

pub fn delete(table: &TableRef, filter: &SqlWhere) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!("DELETE FROM {}", table.qualified());
    filter.write_where(&mut q);
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::SqlOp;
    use serde_json::json;

    fn accounts() -> TableRef {
        TableRef {
            schema: "public".into(),
            table: "accounts".into(),
        }
    }

    fn status_filter() -> SqlWhere {
        SqlWhere::Predicate {
            column: "status".into(),
            op: SqlOp::Eq,
            value: json!("enabled"),
        }
    }

    #[test]
    fn select_applies_window_and_sort() {
        let sort = vec![SortKey { field: "createdAt".into(), descending: true }];
        let q = select(&accounts(), &status_filter(), &sort, "uuid", Window { limit: 10, offset: 20 });
        assert_eq!(
            q.sql,
            r#"SELECT * FROM "public"."accounts" WHERE "status" = $1 ORDER BY "createdAt" DESC LIMIT 10 OFFSET 20"#
        );
        let q = select(&accounts(), &SqlWhere::All, &[], "uuid", Window { limit: 50, offset: 0 });
        assert_eq!(q.sql, r#"SELECT * FROM "public"."accounts" ORDER BY "uuid" LIMIT 50 OFFSET 0"#);
    }

    #[test]
    fn update_numbers_set_params_before_where() {
        let mut partial = Map::new();
        partial.insert("displayName".into(), json!("Root"));
        let q = update(&accounts(), &status_filter(), &partial).unwrap();
        assert_eq!(
            q.sql,
            r#"UPDATE "public"."accounts" SET "displayName" = $1 WHERE "status" = $2"#
        );
        assert_eq!(q.params, vec![json!("Root"), json!("enabled")]);
        assert_eq!(q.targets, vec![Some("displayName".to_string()), Some("status".to_string())]);
        assert!(update(&accounts(), &status_filter(), &Map::new()).is_none());
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quoted(r#"we"ird"#), r#""we""ird""#);
        let q = delete(&accounts(), &SqlWhere::All);
        assert_eq!(q.sql, r#"DELETE FROM "public"."accounts""#);
    }
}

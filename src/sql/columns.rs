//! Column types of a relational table, read from `information_schema`, so each parameter binds
//! as the type of the column it meets.

use super::TableRef;
use crate::error::AppError;
use sqlx::PgPool;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    Bool,
    Json,
    Uuid,
    Timestamp,
    Other,
}

impl ColumnKind {
    /// Maps an `information_schema.columns.data_type` value.
    pub fn from_data_type(data_type: &str) -> Self {
        let t = data_type.trim().to_ascii_lowercase();
        match t.as_str() {
            "text" | "character varying" | "character" | "citext" => ColumnKind::Text,
            "smallint" | "integer" | "bigint" => ColumnKind::Integer,
            "real" | "double precision" | "numeric" => ColumnKind::Float,
            "boolean" => ColumnKind::Bool,
            "json" | "jsonb" => ColumnKind::Json,
            "uuid" => ColumnKind::Uuid,
            _ if t.starts_with("timestamp") => ColumnKind::Timestamp,
            _ => ColumnKind::Other,
        }
    }

    /// Declared type of a NULL bound to this column.
    pub fn null_type(&self) -> &'static str {
        match self {
            ColumnKind::Integer => "INT8",
            ColumnKind::Float => "FLOAT8",
            ColumnKind::Bool => "BOOL",
            ColumnKind::Json => "JSONB",
            ColumnKind::Uuid => "UUID",
            ColumnKind::Timestamp => "TIMESTAMPTZ",
            ColumnKind::Text | ColumnKind::Other => "TEXT",
        }
    }
}

/// Column name to kind for one table. Empty when the table is not there yet.
#[derive(Clone, Debug, Default)]
pub struct ColumnTypes(HashMap<String, ColumnKind>);

impl ColumnTypes {
    pub fn kind(&self, column: &str) -> Option<ColumnKind> {
        self.0.get(column).copied()
    }

    pub async fn load(pool: &PgPool, table: &TableRef) -> Result<Self, AppError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT column_name, data_type FROM information_schema.columns WHERE table_schema = $1 AND table_name = $2",
        )
        .bind(&table.schema)
        .bind(&table.table)
        .fetch_all(pool)
        .await?;
        tracing::debug!(table = %table.qualified(), columns = rows.len(), "column types loaded");
        Ok(rows.into_iter().collect())
    }
}

impl FromIterator<(String, String)> for ColumnTypes {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        ColumnTypes(
            iter.into_iter()
                .map(|(name, data_type)| (name, ColumnKind::from_data_type(&data_type)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_types_map_to_kinds() {
        assert_eq!(ColumnKind::from_data_type("text"), ColumnKind::Text);
        assert_eq!(ColumnKind::from_data_type("character varying"), ColumnKind::Text);
        assert_eq!(ColumnKind::from_data_type("bigint"), ColumnKind::Integer);
        assert_eq!(ColumnKind::from_data_type("double precision"), ColumnKind::Float);
        assert_eq!(ColumnKind::from_data_type("jsonb"), ColumnKind::Json);
        assert_eq!(ColumnKind::from_data_type("timestamp with time zone"), ColumnKind::Timestamp);
        assert_eq!(ColumnKind::from_data_type("USER-DEFINED"), ColumnKind::Other);
    }

    #[test]
    fn lookup_by_column() {
        let types: ColumnTypes = vec![("status".to_string(), "text".to_string())].into_iter().collect();
        assert_eq!(types.kind("status"), Some(ColumnKind::Text));
        assert_eq!(types.kind("missing"), None);
    }
}

//! Convert serde_json::Value to types that sqlx can bind.

use super::ColumnKind;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

/// A value that can be bound to a PostgreSQL query. Declares its own parameter type so
/// integers, floats and booleans reach the server as such instead of as text.
#[derive(Clone, Debug, PartialEq)]
pub enum PgBindValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Json(Value),
    Uuid(uuid::Uuid),
    Timestamp(DateTime<Utc>),
    /// NULL declared with the column's type.
    TypedNull(&'static str),
}

impl PgBindValue {
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => PgBindValue::Null,
            Value::Bool(b) => PgBindValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => PgBindValue::I64(i),
                None => PgBindValue::F64(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => PgBindValue::String(s.clone()),
            Value::Array(_) | Value::Object(_) => PgBindValue::Json(v.clone()),
        }
    }

    /// Converts `v` to the type of the column it meets. Values that do not convert bind as
    /// their JSON kind, and the server reports the mismatch.
    pub fn for_column(v: &Value, kind: Option<ColumnKind>) -> Self {
        let Some(kind) = kind else {
            return Self::from_json(v);
        };
        match (kind, v) {
            (_, Value::Null) => PgBindValue::TypedNull(kind.null_type()),
            (ColumnKind::Json, _) => PgBindValue::Json(v.clone()),
            (ColumnKind::Text, Value::Number(n)) => PgBindValue::String(n.to_string()),
            (ColumnKind::Text, Value::Bool(b)) => PgBindValue::String(b.to_string()),
            (ColumnKind::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(n) => PgBindValue::I64(n),
                Err(_) => Self::from_json(v),
            },
            (ColumnKind::Float, Value::Number(n)) => PgBindValue::F64(n.as_f64().unwrap_or_default()),
            (ColumnKind::Float, Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(n) => PgBindValue::F64(n),
                Err(_) => Self::from_json(v),
            },
            (ColumnKind::Bool, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => PgBindValue::Bool(true),
                "false" => PgBindValue::Bool(false),
                _ => Self::from_json(v),
            },
            (ColumnKind::Uuid, Value::String(s)) => match uuid::Uuid::parse_str(s) {
                Ok(u) => PgBindValue::Uuid(u),
                Err(_) => Self::from_json(v),
            },
            (ColumnKind::Timestamp, Value::String(s)) => match DateTime::parse_from_rfc3339(s) {
                Ok(t) => PgBindValue::Timestamp(t.with_timezone(&Utc)),
                Err(_) => Self::from_json(v),
            },
            _ => Self::from_json(v),
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            PgBindValue::Null => IsNull::Yes,
            PgBindValue::Bool(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf)?,
            PgBindValue::I64(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::F64(n) => <f64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            PgBindValue::String(s) => <&str as Encode<Postgres>>::encode_by_ref(&s.as_str(), buf)?,
            PgBindValue::Json(v) => <Value as Encode<Postgres>>::encode_by_ref(v, buf)?,
            PgBindValue::Uuid(u) => <uuid::Uuid as Encode<Postgres>>::encode_by_ref(u, buf)?,
            PgBindValue::Timestamp(t) => <DateTime<Utc> as Encode<Postgres>>::encode_by_ref(t, buf)?,
            PgBindValue::TypedNull(_) => IsNull::Yes,
        })
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(match self {
            PgBindValue::Bool(_) => PgTypeInfo::with_name("BOOL"),
            PgBindValue::I64(_) => PgTypeInfo::with_name("INT8"),
            PgBindValue::F64(_) => PgTypeInfo::with_name("FLOAT8"),
            PgBindValue::Json(_) => PgTypeInfo::with_name("JSONB"),
            PgBindValue::Uuid(_) => PgTypeInfo::with_name("UUID"),
            PgBindValue::Timestamp(_) => PgTypeInfo::with_name("TIMESTAMPTZ"),
            PgBindValue::TypedNull(name) => PgTypeInfo::with_name(*name),
            PgBindValue::Null | PgBindValue::String(_) => PgTypeInfo::with_name("TEXT"),
        })
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_values_pick_native_types() {
        assert_eq!(PgBindValue::from_json(&json!(7)), PgBindValue::I64(7));
        assert_eq!(PgBindValue::from_json(&json!(1.5)), PgBindValue::F64(1.5));
        assert_eq!(PgBindValue::from_json(&json!("x")), PgBindValue::String("x".into()));
        assert_eq!(PgBindValue::from_json(&json!(null)), PgBindValue::Null);
        assert_eq!(PgBindValue::from_json(&json!(["a"])), PgBindValue::Json(json!(["a"])));
    }

    #[test]
    fn values_follow_their_column() {
        let text = Some(ColumnKind::Text);
        assert_eq!(PgBindValue::for_column(&json!(1), text), PgBindValue::String("1".into()));
        assert_eq!(PgBindValue::for_column(&json!(true), text), PgBindValue::String("true".into()));
        assert_eq!(PgBindValue::for_column(&json!("7"), Some(ColumnKind::Integer)), PgBindValue::I64(7));
        assert_eq!(PgBindValue::for_column(&json!("x"), Some(ColumnKind::Integer)), PgBindValue::String("x".into()));
        assert_eq!(PgBindValue::for_column(&json!(2), Some(ColumnKind::Float)), PgBindValue::F64(2.0));
        assert_eq!(PgBindValue::for_column(&json!("FALSE"), Some(ColumnKind::Bool)), PgBindValue::Bool(false));
        assert_eq!(PgBindValue::for_column(&json!("x"), Some(ColumnKind::Json)), PgBindValue::Json(json!("x")));
        assert_eq!(PgBindValue::for_column(&json!(null), Some(ColumnKind::Integer)), PgBindValue::TypedNull("INT8"));
        let id = "6f1c2a8e-3b0d-4e7a-9c55-1d2e3f4a5b6c";
        assert_eq!(
            PgBindValue::for_column(&json!(id), Some(ColumnKind::Uuid)),
            PgBindValue::Uuid(uuid::Uuid::parse_str(id).unwrap())
        );
        assert!(matches!(
            PgBindValue::for_column(&json!("2026-01-02T03:04:05Z"), Some(ColumnKind::Timestamp)),
            PgBindValue::Timestamp(_)
        ));
        assert_eq!(PgBindValue::for_column(&json!(1), None), PgBindValue::I64(1));
    }
}

//! PostgreSQL backend. Criteria become a [`SqlWhere`] rendered into parameterized SQL; each
//! parameter binds as the type of the column it meets.

use super::{assign_pk, resolve_window, strip_pk, PersistenceProvider, ProviderConfig, QueryOptions, Record, Window};
use crate::criteria::{CriteriaNode, CriteriaTranslator, SqlTranslator, SqlWhere};
use crate::error::AppError;
use crate::sql::{self, ColumnTypes, PgBindValue, QueryBuf, TableRef};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::PgPool;

pub struct PgProvider {
    pool: PgPool,
    table: TableRef,
    config: ProviderConfig,
    columns: ColumnTypes,
}

impl PgProvider {
    pub fn new(pool: PgPool, table: TableRef, config: ProviderConfig) -> Self {
        PgProvider {
            pool,
            table,
            config,
            columns: ColumnTypes::default(),
        }
    }

    /// Reads the table's column types so parameters bind as those types.
    pub async fn connect(pool: PgPool, table: TableRef, config: ProviderConfig) -> Result<Self, AppError> {
        let columns = ColumnTypes::load(&pool, &table).await?;
        Ok(PgProvider {
            pool,
            table,
            config,
            columns,
        })
    }

    fn filter(&self, criteria: Option<&CriteriaNode>) -> Result<SqlWhere, AppError> {
        SqlTranslator.translate(criteria)
    }

    fn bind_values(&self, q: &QueryBuf) -> Vec<PgBindValue> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        q.params
            .iter()
            .zip(&q.targets)
            .map(|(p, target)| PgBindValue::for_column(p, target.as_deref().and_then(|c| self.columns.kind(c))))
            .collect()
    }

    fn bind<'q>(&self, q: &'q QueryBuf) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
        let mut query = sqlx::query(&q.sql);
        for v in self.bind_values(q) {
            query = query.bind(v);
        }
        query
    }

    async fn fetch_many(&self, q: &QueryBuf) -> Result<Vec<Record>, AppError> {
        let rows = self.bind(q).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, AppError> {
        let done = self.bind(q).execute(&self.pool).await?;
        Ok(done.rows_affected())
    }
}

#[async_trait]
impl PersistenceProvider for PgProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn add(&self, mut record: Record) -> Result<Record, AppError> {
        assign_pk(&self.config, &mut record)?;
        let q = sql::insert(&self.table, &record);
        let row = self.bind(&q).fetch_one(&self.pool).await?;
        Ok(row_to_record(&row))
    }

    async fn find(&self, criteria: Option<&CriteriaNode>) -> Result<Option<Record>, AppError> {
        let filter = self.filter(criteria)?;
        let q = sql::select(&self.table, &filter, &[], &self.config.primary_key, Window { limit: 1, offset: 0 });
        let row = self.bind(&q).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(row_to_record))
    }

    async fn query(&self, criteria: Option<&CriteriaNode>, options: &QueryOptions) -> Result<Vec<Record>, AppError> {
        let filter = self.filter(criteria)?;
        let q = sql::select(
            &self.table,
            &filter,
            &options.sort,
            &self.config.primary_key,
            resolve_window(options),
        );
        self.fetch_many(&q).await
    }

    async fn count(&self, criteria: Option<&CriteriaNode>) -> Result<u64, AppError> {
        let filter = self.filter(criteria)?;
        let q = sql::count(&self.table, &filter);
        let mut query = sqlx::query_as::<_, (i64,)>(&q.sql);
        for v in self.bind_values(&q) {
            query = query.bind(v);
        }
        let (n,) = query.fetch_one(&self.pool).await?;
        Ok(n.max(0) as u64)
    }

    async fn update(&self, criteria: Option<&CriteriaNode>, partial: Record) -> Result<u64, AppError> {
        let filter = self.filter(criteria)?;
        let partial = strip_pk(&self.config, partial);
        match sql::update(&self.table, &filter, &partial) {
            Some(q) => self.execute(&q).await,
            None => Ok(0),
        }
    }

    async fn remove(&self, criteria: Option<&CriteriaNode>) -> Result<u64, AppError> {
        let filter = self.filter(criteria)?;
        self.execute(&sql::delete(&self.table, &filter)).await
    }
}

fn row_to_record(row: &PgRow) -> Record {
    use sqlx::{Column, Row};
    let mut map = Record::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

/// Decodes a cell by trying the column types resources are stored with.
fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}

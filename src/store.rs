//! PostgreSQL bootstrap: create the database if missing, open the pool, apply schema DDL.

use crate::config::Settings;
use crate::error::{AppError, ConfigError};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;

/// Connect to the server's `postgres` database and create the target database when absent.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = PgConnectOptions::from_str(&admin_url)
        .map_err(|e| ConfigError::Validation(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn = opts.connect().await?;
    let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", crate::sql::quoted(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let scheme_end = url.find("://").map(|i| i + 3).unwrap_or(0);
    let path_start = url[scheme_end..]
        .find('/')
        .map(|i| scheme_end + i + 1)
        .ok_or_else(|| ConfigError::Validation("DATABASE_URL: no database path".into()))?;
    let path_and_query = &url[path_start..];
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let admin_url = format!("{}postgres", &url[..path_start]);
    Ok((admin_url, db_name.to_string()))
}

pub async fn connect_pool(settings: &Settings) -> Result<PgPool, AppError> {
    let url = settings
        .database_url
        .as_deref()
        .ok_or_else(|| ConfigError::Validation("DATABASE_URL is not set".into()))?;
    ensure_database_exists(url).await?;
    let pool = PgPoolOptions::new()
        .max_connections(settings.db_max_connections)
        .acquire_timeout(settings.db_acquire_timeout)
        .connect(url)
        .await?;
    tracing::info!(max_connections = settings.db_max_connections, "database pool ready");
    Ok(pool)
}

/// Runs a multi-statement DDL script (idempotent `CREATE ... IF NOT EXISTS` expected).
pub async fn apply_schema(pool: &PgPool, ddl: &str) -> Result<(), AppError> {
    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_url_targets_postgres_database() {
        let (admin, db) = parse_db_name_from_url("postgres://u:p@host:5432/accounts?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@host:5432/postgres");
        assert_eq!(db, "accounts");
        assert!(parse_db_name_from_url("postgres://host").is_err());
    }
}

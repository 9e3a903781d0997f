//! Persistence contract every storage backend satisfies, plus the helpers they share.

pub mod document;
pub mod journal;
pub mod postgres;

pub use document::DocumentProvider;
pub use journal::DocumentDb;
pub use postgres::PgProvider;

use crate::criteria::CriteriaNode;
use crate::error::AppError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

/// A stored record: a JSON object carrying the resource's primary key field.
pub type Record = Map<String, Value>;

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 1000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    /// Parses `field,-other` (leading `-` means descending). Blank entries are skipped.
    pub fn parse_list(raw: &str) -> Vec<SortKey> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('-') {
                Some(field) => SortKey {
                    field: field.to_string(),
                    descending: true,
                },
                None => SortKey {
                    field: s.to_string(),
                    descending: false,
                },
            })
            .filter(|k| !k.field.is_empty())
            .collect()
    }
}

/// Options for `query`. `fetch` names related resources to embed and is consumed by the manager.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOptions {
    pub sort: Vec<SortKey>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub page: Option<u32>,
    pub fetch: Vec<String>,
}

/// Effective limit/offset after defaults are applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub limit: u32,
    pub offset: u32,
}

/// Limit defaults to [`DEFAULT_LIMIT`] when unset or 0 and is capped at [`MAX_LIMIT`].
/// A positive page without an explicit offset yields `page * limit`.
pub fn resolve_window(opts: &QueryOptions) -> Window {
    let limit = match opts.limit {
        None | Some(0) => DEFAULT_LIMIT,
        Some(n) => n.min(MAX_LIMIT),
    };
    let offset = match (opts.offset, opts.page) {
        (None | Some(0), Some(page)) if page > 0 => page.saturating_mul(limit),
        (offset, _) => offset.unwrap_or(0),
    };
    Window { limit, offset }
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub primary_key: String,
    /// Assign a random UUID v4 when a new record has no primary key.
    pub auto_set_pk: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            primary_key: "uuid".into(),
            auto_set_pk: true,
        }
    }
}

/// Fills in the primary key of a new record when configured to. Fails when it stays missing.
pub fn assign_pk(config: &ProviderConfig, record: &mut Record) -> Result<(), AppError> {
    let missing = matches!(record.get(&config.primary_key), None | Some(Value::Null));
    if missing {
        if !config.auto_set_pk {
            return Err(AppError::BadRequest(format!(
                "record requires primary key '{}'",
                config.primary_key
            )));
        }
        record.insert(
            config.primary_key.clone(),
            Value::String(uuid::Uuid::new_v4().to_string()),
        );
    }
    Ok(())
}

/// Removes the primary key from an update payload; keys never change.
pub fn strip_pk(config: &ProviderConfig, mut partial: Record) -> Record {
    partial.remove(&config.primary_key);
    partial
}

/// Async CRUD over one collection or table. Criteria are translated once, before any I/O;
/// a translation failure is `MalformedCriteria` with no side effects. `None` criteria match all.
#[async_trait]
pub trait PersistenceProvider: Send + Sync {
    fn config(&self) -> &ProviderConfig;

    async fn add(&self, record: Record) -> Result<Record, AppError>;

    /// First match in the provider's natural order.
    async fn find(&self, criteria: Option<&CriteriaNode>) -> Result<Option<Record>, AppError>;

    async fn query(&self, criteria: Option<&CriteriaNode>, options: &QueryOptions) -> Result<Vec<Record>, AppError>;

    async fn count(&self, criteria: Option<&CriteriaNode>) -> Result<u64, AppError>;

    /// Sets the fields of `partial` on every match. Returns the number of records matched.
    async fn update(&self, criteria: Option<&CriteriaNode>, partial: Record) -> Result<u64, AppError>;

    async fn remove(&self, criteria: Option<&CriteriaNode>) -> Result<u64, AppError>;

    async fn find_by_pk(&self, pk: &Value) -> Result<Option<Record>, AppError> {
        let node = CriteriaNode::eq(self.config().primary_key.clone(), pk.clone());
        self.find(Some(&node)).await
    }

    async fn remove_by_pk(&self, pk: &Value) -> Result<u64, AppError> {
        let node = CriteriaNode::eq(self.config().primary_key.clone(), pk.clone());
        self.remove(Some(&node)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn window_defaults_and_caps() {
        assert_eq!(resolve_window(&QueryOptions::default()), Window { limit: 50, offset: 0 });
        let opts = QueryOptions { limit: Some(0), ..Default::default() };
        assert_eq!(resolve_window(&opts).limit, 50);
        let opts = QueryOptions { limit: Some(5000), ..Default::default() };
        assert_eq!(resolve_window(&opts).limit, MAX_LIMIT);
    }

    #[test]
    fn page_sets_offset_only_without_explicit_offset() {
        let opts = QueryOptions { limit: Some(10), page: Some(2), ..Default::default() };
        assert_eq!(resolve_window(&opts), Window { limit: 10, offset: 20 });
        let opts = QueryOptions { limit: Some(10), page: Some(2), offset: Some(3), ..Default::default() };
        assert_eq!(resolve_window(&opts).offset, 3);
        let opts = QueryOptions { page: Some(1), ..Default::default() };
        assert_eq!(resolve_window(&opts).offset, 50);
    }

    #[test]
    fn sort_list_parsing() {
        assert_eq!(
            SortKey::parse_list("name, -createdAt,,-"),
            vec![
                SortKey { field: "name".into(), descending: false },
                SortKey { field: "createdAt".into(), descending: true },
            ]
        );
    }

    #[test]
    fn pk_assignment() {
        let cfg = ProviderConfig::default();
        let mut rec = Record::new();
        assign_pk(&cfg, &mut rec).unwrap();
        let pk = rec["uuid"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(pk).is_ok());

        let mut rec = json!({ "uuid": "fixed" }).as_object().unwrap().clone();
        assign_pk(&cfg, &mut rec).unwrap();
        assert_eq!(rec["uuid"], "fixed");

        let manual = ProviderConfig { primary_key: "id".into(), auto_set_pk: false };
        assert!(matches!(assign_pk(&manual, &mut Record::new()), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn strip_pk_drops_only_the_key() {
        let partial = json!({ "uuid": "x", "status": 1 }).as_object().unwrap().clone();
        let out = strip_pk(&ProviderConfig::default(), partial);
        assert_eq!(Value::Object(out), json!({ "status": 1 }));
    }
}

//! Resource managers: a provider plus the hierarchy-aware behavior around it
//! (timestamps, cascading delete, embedding related records).

pub mod registry;

pub use registry::{DocumentFactory, ManagerRegistry, PgFactory, ProviderFactory};

use crate::config::ResourceDef;
use crate::criteria::{ComparisonOp, CriteriaNode};
use crate::error::AppError;
use crate::provider::{PersistenceProvider, QueryOptions, Record, MAX_LIMIT};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Link to the parent resource. Holds the parent's provider, not its manager, so the
/// parent -> child manager graph stays acyclic.
pub struct ParentLink {
    pub name: String,
    /// Field on our records holding the parent key.
    pub field: String,
    pub provider: Arc<dyn PersistenceProvider>,
}

pub struct ChildLink {
    pub name: String,
    /// Field on the child's records holding our key.
    pub field: String,
    pub cascade: bool,
    pub manager: Arc<ResourceManager>,
}

pub struct ResourceManager {
    def: Arc<ResourceDef>,
    provider: Arc<dyn PersistenceProvider>,
    parent: Option<ParentLink>,
    children: Vec<ChildLink>,
}

fn now() -> Value {
    Value::String(chrono::Utc::now().to_rfc3339())
}

impl ResourceManager {
    pub fn new(def: Arc<ResourceDef>, provider: Arc<dyn PersistenceProvider>) -> Self {
        ResourceManager {
            def,
            provider,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: ParentLink) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_child(mut self, child: ChildLink) -> Self {
        self.children.push(child);
        self
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn def(&self) -> &Arc<ResourceDef> {
        &self.def
    }

    pub fn provider(&self) -> &Arc<dyn PersistenceProvider> {
        &self.provider
    }

    pub fn primary_key(&self) -> &str {
        &self.provider.config().primary_key
    }

    /// Field holding the parent's key, when this resource has a parent.
    pub fn parent_field(&self) -> Option<&str> {
        self.parent.as_ref().map(|p| p.field.as_str())
    }

    pub async fn add(&self, mut record: Record) -> Result<Record, AppError> {
        if let Some(ts) = &self.def.timestamps {
            let at = now();
            record.insert(ts.created.clone(), at.clone());
            record.insert(ts.modified.clone(), at);
        }
        let created = self.provider.add(record).await?;
        tracing::debug!(resource = %self.def.name, pk = ?created.get(self.primary_key()), "record added");
        Ok(created)
    }

    pub async fn find(&self, criteria: Option<&CriteriaNode>) -> Result<Option<Record>, AppError> {
        self.provider.find(criteria).await
    }

    pub async fn find_by_pk(&self, pk: &Value) -> Result<Option<Record>, AppError> {
        self.provider.find_by_pk(pk).await
    }

    /// Query, then embed `options.fetch` relations into every result.
    pub async fn query(&self, criteria: Option<&CriteriaNode>, options: &QueryOptions) -> Result<Vec<Record>, AppError> {
        let mut records = self.provider.query(criteria, options).await?;
        if !options.fetch.is_empty() {
            for record in &mut records {
                self.embed(record, &options.fetch).await?;
            }
        }
        Ok(records)
    }

    pub async fn count(&self, criteria: Option<&CriteriaNode>) -> Result<u64, AppError> {
        self.provider.count(criteria).await
    }

    pub async fn update(&self, criteria: Option<&CriteriaNode>, mut partial: Record) -> Result<u64, AppError> {
        if let Some(ts) = &self.def.timestamps {
            partial.remove(&ts.created);
            partial.insert(ts.modified.clone(), now());
        }
        self.provider.update(criteria, partial).await
    }

    /// Restamps the modified time of matching records. No-op without timestamps.
    pub async fn touch(&self, criteria: Option<&CriteriaNode>) -> Result<u64, AppError> {
        match &self.def.timestamps {
            Some(ts) => {
                let mut partial = Record::new();
                partial.insert(ts.modified.clone(), now());
                self.provider.update(criteria, partial).await
            }
            None => self.provider.count(criteria).await,
        }
    }

    /// Removes matching records, first removing records of cascading child resources
    /// (recursively) that reference them.
    ///
    /// Each resource is removed in its own provider call, deepest first, and the cascade is not
    /// atomic. When a call fails the error is returned and nothing above it has been removed:
    /// the matched records and their keys survive, so repeating the call finishes the job.
    pub fn remove<'a>(&'a self, criteria: Option<&'a CriteriaNode>) -> BoxFuture<'a, Result<u64, AppError>> {
        Box::pin(async move {
            let cascading: Vec<&ChildLink> = self.children.iter().filter(|c| c.cascade).collect();
            if !cascading.is_empty() {
                let keys = self.matching_keys(criteria).await?;
                if !keys.is_empty() {
                    for child in cascading {
                        let node = CriteriaNode::compare(ComparisonOp::In, child.field.clone(), Value::Array(keys.clone()));
                        let n = child.manager.remove(Some(&node)).await?;
                        tracing::debug!(resource = %self.def.name, child = %child.name, removed = n, "cascade delete");
                    }
                }
            }
            self.provider.remove(criteria).await
        })
    }

    pub async fn remove_by_pk(&self, pk: &Value) -> Result<u64, AppError> {
        let node = CriteriaNode::eq(self.primary_key().to_string(), pk.clone());
        self.remove(Some(&node)).await
    }

    async fn matching_keys(&self, criteria: Option<&CriteriaNode>) -> Result<Vec<Value>, AppError> {
        let pk = self.primary_key();
        let mut keys = Vec::new();
        let mut offset = 0;
        loop {
            let opts = QueryOptions {
                limit: Some(MAX_LIMIT),
                offset: Some(offset),
                ..Default::default()
            };
            let page = self.provider.query(criteria, &opts).await?;
            let len = page.len() as u32;
            keys.extend(page.into_iter().filter_map(|mut r| r.remove(pk)));
            if len < MAX_LIMIT {
                return Ok(keys);
            }
            offset += MAX_LIMIT;
        }
    }

    /// Embeds related records: the parent record under the parent's name, child record lists
    /// under each child's name.
    pub async fn embed(&self, record: &mut Record, fetch: &[String]) -> Result<(), AppError> {
        for name in fetch {
            if let Some(parent) = self.parent.as_ref().filter(|p| &p.name == name) {
                let related = match record.get(&parent.field) {
                    Some(key) if !key.is_null() => parent.provider.find_by_pk(key).await?,
                    _ => None,
                };
                record.insert(name.clone(), related.map(Value::Object).unwrap_or(Value::Null));
            } else if let Some(child) = self.children.iter().find(|c| &c.name == name) {
                let key = record.get(self.primary_key()).cloned().unwrap_or(Value::Null);
                let node = CriteriaNode::eq(child.field.clone(), key);
                let rows = child.manager.provider.query(Some(&node), &QueryOptions::default()).await?;
                record.insert(name.clone(), Value::Array(rows.into_iter().map(Value::Object).collect()));
            } else {
                return Err(AppError::BadRequest(format!(
                    "'{}' is not related to '{}'",
                    name, self.def.name
                )));
            }
        }
        Ok(())
    }
}

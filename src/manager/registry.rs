//! Composition root: builds each resource's provider and manager once, on first use.

use super::{BoxFuture, ChildLink, ParentLink, ResourceManager};
use crate::config::{id_param, ResourceDef, ResourceTree};
use crate::error::{AppError, ConfigError};
use crate::provider::{DocumentDb, DocumentProvider, PersistenceProvider, PgProvider};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Creates the storage backend for one resource.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn create(&self, def: &ResourceDef) -> Result<Arc<dyn PersistenceProvider>, AppError>;
}

/// One document collection per resource in a shared redb file. `in_memory` keeps nothing on disk.
#[derive(Clone, Default)]
pub struct DocumentFactory {
    db: Option<DocumentDb>,
}

impl DocumentFactory {
    pub fn in_memory() -> Self {
        DocumentFactory { db: None }
    }

    pub fn persistent(db: DocumentDb) -> Self {
        DocumentFactory { db: Some(db) }
    }
}

#[async_trait]
impl ProviderFactory for DocumentFactory {
    async fn create(&self, def: &ResourceDef) -> Result<Arc<dyn PersistenceProvider>, AppError> {
        let provider = match &self.db {
            Some(db) => DocumentProvider::persistent(def.name.clone(), def.provider.clone(), db)?,
            None => DocumentProvider::new(def.name.clone(), def.provider.clone()),
        };
        Ok(Arc::new(provider))
    }
}

/// One table per resource, sharing a pool.
#[derive(Clone)]
pub struct PgFactory {
    pool: PgPool,
}

impl PgFactory {
    pub fn new(pool: PgPool) -> Self {
        PgFactory { pool }
    }
}

#[async_trait]
impl ProviderFactory for PgFactory {
    async fn create(&self, def: &ResourceDef) -> Result<Arc<dyn PersistenceProvider>, AppError> {
        let provider = PgProvider::connect(self.pool.clone(), def.table.clone(), def.provider.clone()).await?;
        Ok(Arc::new(provider))
    }
}

pub struct ManagerRegistry {
    tree: Arc<ResourceTree>,
    factory: Arc<dyn ProviderFactory>,
    providers: HashMap<String, OnceCell<Arc<dyn PersistenceProvider>>>,
    managers: HashMap<String, OnceCell<Arc<ResourceManager>>>,
}

impl ManagerRegistry {
    pub fn new(tree: Arc<ResourceTree>, factory: Arc<dyn ProviderFactory>) -> Self {
        let providers = tree.iter().map(|d| (d.name.clone(), OnceCell::new())).collect();
        let managers = tree.iter().map(|d| (d.name.clone(), OnceCell::new())).collect();
        ManagerRegistry {
            tree,
            factory,
            providers,
            managers,
        }
    }

    pub fn tree(&self) -> &Arc<ResourceTree> {
        &self.tree
    }

    fn def(&self, name: &str) -> Result<&Arc<ResourceDef>, AppError> {
        self.tree.get(name).ok_or_else(|| unknown(name))
    }

    /// Provider for `name`. Concurrent first callers share one construction.
    pub async fn provider(&self, name: &str) -> Result<Arc<dyn PersistenceProvider>, AppError> {
        let def = self.def(name)?;
        let cell = self.providers.get(name).ok_or_else(|| unknown(name))?;
        let provider = cell
            .get_or_try_init(|| async {
                tracing::info!(resource = %name, "creating provider");
                self.factory.create(def).await
            })
            .await?;
        Ok(Arc::clone(provider))
    }

    /// Manager for `name`, wired to its parent's provider and its children's managers.
    pub fn manager<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Arc<ResourceManager>, AppError>> {
        Box::pin(async move {
            let def = self.def(name)?;
            let cell = self.managers.get(name).ok_or_else(|| unknown(name))?;
            let manager = cell
                .get_or_try_init(|| async {
                    let mut manager = ResourceManager::new(Arc::clone(def), self.provider(name).await?);
                    if let (Some(parent), Some(field)) = (&def.parent, def.parent_field()) {
                        manager = manager.with_parent(ParentLink {
                            name: parent.clone(),
                            field,
                            provider: self.provider(parent).await?,
                        });
                    }
                    for child in &def.children {
                        let child_def = self.def(child)?;
                        manager = manager.with_child(ChildLink {
                            name: child.clone(),
                            field: child_def.parent_field().unwrap_or_else(|| id_param(name)),
                            cascade: child_def.cascade_delete,
                            manager: self.manager(child).await?,
                        });
                    }
                    Ok::<_, AppError>(Arc::new(manager))
                })
                .await?;
            Ok(Arc::clone(manager))
        })
    }
}

fn unknown(name: &str) -> AppError {
    AppError::Config(ConfigError::MissingReference {
        kind: "resource",
        id: name.to_string(),
    })
}

//! Account server: serves the resources described by `RESOURCE_CONFIG` over the configured
//! storage backend and bootstraps the root account.
//!
//! Run from repo root: `cargo run -p account-server`

use resource_sdk::{
    apply_schema, common_routes, connect_pool, load_resource_config, resolve, resource_routes, AccountDirectory,
    DocumentDb, DocumentFactory, HeaderRolesExtractor, ManagerRegistry, PgFactory, ProviderFactory, Settings, StorageBackend,
};
use std::sync::Arc;
use tokio::net::TcpListener;

const SCHEMA: &str = include_str!("../sql/schema.sql");

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("resource_sdk=info,account_server=info")),
        )
        .init();

    let mut config = load_resource_config(&settings.resource_config)?;
    if let Some(base) = &settings.api_base_path {
        config.base_path = base.clone();
    }
    let tree = Arc::new(resolve(&config)?);

    let factory: Arc<dyn ProviderFactory> = match settings.storage_backend {
        StorageBackend::Document => {
            if let Some(dir) = settings.document_path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            let db = DocumentDb::open(&settings.document_path)?;
            tracing::info!(path = %settings.document_path.display(), "document store opened");
            Arc::new(DocumentFactory::persistent(db))
        }
        StorageBackend::Postgres => {
            let pool = connect_pool(&settings).await?;
            apply_schema(&pool, SCHEMA).await?;
            Arc::new(PgFactory::new(pool))
        }
    };
    tracing::info!(backend = ?settings.storage_backend, resources = tree.len(), "storage ready");

    let registry = Arc::new(ManagerRegistry::new(tree, factory));
    if AccountDirectory::from_registry(&registry).await?.ensure_root_account().await? {
        tracing::info!("root account bootstrapped");
    }

    let app = common_routes().merge(resource_routes(registry, Arc::new(HeaderRolesExtractor)));
    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("account server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

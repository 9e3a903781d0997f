//! Resource SDK: hierarchical REST resources over pluggable storage, with a backend-neutral
//! criteria engine and declarative per-role authorization.

pub mod accounts;
pub mod auth;
pub mod config;
pub mod criteria;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod manager;
pub mod provider;
pub mod response;
pub mod router;
pub mod routes;
pub mod sql;
pub mod state;
pub mod store;

pub use accounts::AccountDirectory;
pub use auth::{check_authorization, HeaderRolesExtractor, Identity, IdentityExtractor};
pub use config::{load_resource_config, resolve, ResourceDef, ResourceTree, Settings, StorageBackend};
pub use criteria::{parse_query, CriteriaNode, CriteriaTranslator};
pub use error::{AppError, ConfigError};
pub use manager::{DocumentFactory, ManagerRegistry, PgFactory, ProviderFactory, ResourceManager};
pub use provider::{DocumentDb, PersistenceProvider, QueryOptions, Record};
pub use routes::{common_routes, resource_routes};
pub use store::{apply_schema, connect_pool, ensure_database_exists};

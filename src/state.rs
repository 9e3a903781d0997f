//! Per-resource router state.

use crate::auth::IdentityExtractor;
use crate::config::ResourceDef;
use crate::manager::ManagerRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct ResourceContext {
    pub def: Arc<ResourceDef>,
    pub registry: Arc<ManagerRegistry>,
    pub identity: Arc<dyn IdentityExtractor>,
}

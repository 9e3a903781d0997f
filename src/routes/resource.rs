//! Resource CRUD routes built from the resolved resource tree.
//! Each resource gets its own router (collection + item path) with its own state; they are merged.

use crate::auth::IdentityExtractor;
use crate::handlers::resource::{create, delete as delete_handler, list, retrieve, update};
use crate::manager::ManagerRegistry;
use crate::router::axum_path;
use crate::state::ResourceContext;
use axum::{
    body::Body,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

/// Request body cap for resource payloads.
pub const BODY_LIMIT_BYTES: usize = 1024 * 1024;

pub fn resource_routes(registry: Arc<ManagerRegistry>, identity: Arc<dyn IdentityExtractor>) -> Router {
    let mut router = Router::new();
    for def in registry.tree().iter() {
        let collection = axum_path(&def.context_path);
        let item = axum_path(&def.item_path());
        tracing::info!(resource = %def.name, context_path = %def.context_path, "registering resource routes");
        let ctx = ResourceContext {
            def: Arc::clone(def),
            registry: Arc::clone(&registry),
            identity: Arc::clone(&identity),
        };
        router = router.merge(
            Router::new()
                .route(&collection, get(list).post(create))
                .route(
                    &item,
                    get(retrieve).put(update).patch(update).delete(delete_handler),
                )
                .with_state(ctx),
        );
    }
    router.layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(log_request))
            .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES)),
    )
}

/// Logs one line per completed resource request.
async fn log_request(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let resp = next.run(req).await;
    tracing::info!(
        method = %method,
        path = %path,
        status = resp.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request completed"
    );
    resp
}

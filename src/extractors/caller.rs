//! Extract the caller's identity using the resource's configured extractor.

use crate::auth::Identity;
use crate::state::ResourceContext;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

/// The caller, or `None` when the request carries no identity.
#[derive(Clone, Debug)]
pub struct Caller(pub Option<Identity>);

#[async_trait]
impl FromRequestParts<ResourceContext> for Caller {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &ResourceContext) -> Result<Self, Self::Rejection> {
        Ok(Caller(state.identity.extract(&parts.headers)))
    }
}

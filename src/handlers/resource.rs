//! Resource CRUD handlers. Every handler compiles path criteria, `q` and pagination first,
//! then checks authorization, and only then touches storage.

use crate::auth::{check_authorization, Identity};
use crate::error::AppError;
use crate::extractors::{Caller, JsonBody, PathParams, QueryParams};
use crate::provider::{resolve_window, Record};
use crate::response::{Affected, ListEnvelope};
use crate::router::{merge_query, path_criteria, query_options, wants_meta};
use crate::state::ResourceContext;
use axum::{
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::collections::HashMap;

type Params = HashMap<String, String>;

fn authorize(ctx: &ResourceContext, caller: Option<&Identity>, method: &Method) -> Result<(), AppError> {
    if check_authorization(&ctx.def.auth, caller, method) {
        return Ok(());
    }
    tracing::info!(
        resource = %ctx.def.name,
        method = %method,
        subject = ?caller.and_then(|c| c.subject.as_deref()),
        "authorization denied"
    );
    Err(AppError::Forbidden)
}

fn body_to_record(value: Value) -> Result<Record, AppError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

fn path_params(path: Option<PathParams<Params>>) -> Params {
    path.map(|PathParams(p)| p).unwrap_or_default()
}

pub async fn list(
    State(ctx): State<ResourceContext>,
    Caller(caller): Caller,
    path: Option<PathParams<Params>>,
    QueryParams(query): QueryParams<Params>,
) -> Result<Response, AppError> {
    let params = path_params(path);
    let criteria = merge_query(path_criteria(&ctx.def, &params), query.get("q").map(String::as_str))?;
    let options = query_options(&query)?;
    authorize(&ctx, caller.as_ref(), &Method::GET)?;

    let manager = ctx.registry.manager(&ctx.def.name).await?;
    let documents = manager.query(criteria.as_ref(), &options).await?;
    tracing::debug!(resource = %ctx.def.name, criteria = ?criteria.as_ref().map(ToString::to_string), hits = documents.len(), "list");
    if !wants_meta(&query) {
        return Ok(Json(documents).into_response());
    }
    let total_hits = manager.count(criteria.as_ref()).await?;
    let window = resolve_window(&options);
    Ok(Json(ListEnvelope {
        criteria,
        page: options.page,
        offset: window.offset,
        limit: window.limit,
        total_hits,
        documents,
    })
    .into_response())
}

pub async fn retrieve(
    State(ctx): State<ResourceContext>,
    Caller(caller): Caller,
    PathParams(params): PathParams<Params>,
    QueryParams(query): QueryParams<Params>,
) -> Result<Response, AppError> {
    let criteria = path_criteria(&ctx.def, &params);
    let options = query_options(&query)?;
    authorize(&ctx, caller.as_ref(), &Method::GET)?;

    let manager = ctx.registry.manager(&ctx.def.name).await?;
    let id = params.get(&ctx.def.item_param()).cloned().unwrap_or_default();
    let mut record = manager
        .find(criteria.as_ref())
        .await?
        .ok_or_else(|| AppError::NotFound(id))?;
    if !options.fetch.is_empty() {
        manager.embed(&mut record, &options.fetch).await?;
    }
    Ok(Json(record).into_response())
}

/// Creates a record; ancestor keys from the path are written into the payload.
pub async fn create(
    State(ctx): State<ResourceContext>,
    Caller(caller): Caller,
    path: Option<PathParams<Params>>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Response, AppError> {
    let params = path_params(path);
    let mut record = body_to_record(body)?;
    for name in &ctx.def.ancestor_params {
        if let Some(v) = params.get(name) {
            record.insert(ctx.def.param_field(name), Value::String(v.clone()));
        }
    }
    authorize(&ctx, caller.as_ref(), &Method::POST)?;

    let manager = ctx.registry.manager(&ctx.def.name).await?;
    let created = manager.add(record).await?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

/// PUT and PATCH: sets the given fields on the addressed record.
pub async fn update(
    State(ctx): State<ResourceContext>,
    method: Method,
    Caller(caller): Caller,
    PathParams(params): PathParams<Params>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Response, AppError> {
    let criteria = path_criteria(&ctx.def, &params);
    let partial = body_to_record(body)?;
    authorize(&ctx, caller.as_ref(), &method)?;

    let manager = ctx.registry.manager(&ctx.def.name).await?;
    let count = manager.update(criteria.as_ref(), partial).await?;
    Ok(Json(Affected { count }).into_response())
}

pub async fn delete(
    State(ctx): State<ResourceContext>,
    Caller(caller): Caller,
    PathParams(params): PathParams<Params>,
) -> Result<Response, AppError> {
    let criteria = path_criteria(&ctx.def, &params);
    authorize(&ctx, caller.as_ref(), &Method::DELETE)?;

    let manager = ctx.registry.manager(&ctx.def.name).await?;
    let count = manager.remove(criteria.as_ref()).await?;
    tracing::info!(resource = %ctx.def.name, criteria = ?criteria.as_ref().map(ToString::to_string), count, "removed");
    Ok(Json(Affected { count }).into_response())
}

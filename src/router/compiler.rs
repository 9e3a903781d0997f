//! Compiles a request's path parameters, `q` expression and pagination parameters into
//! criteria and query options.

use crate::config::ResourceDef;
use crate::criteria::{parse_query, CriteriaNode};
use crate::error::AppError;
use crate::provider::{QueryOptions, SortKey};
use serde_json::Value;
use std::collections::HashMap;

/// Path parameters in context-path order (ancestors root first, then the item key when present),
/// each as an `=` comparison on its mapped field. Several parameters are AND-ed.
pub fn path_criteria(def: &ResourceDef, params: &HashMap<String, String>) -> Option<CriteriaNode> {
    let factors = def
        .ancestor_params
        .iter()
        .cloned()
        .chain(std::iter::once(def.item_param()))
        .filter_map(|name| {
            params
                .get(&name)
                .map(|v| CriteriaNode::eq(def.param_field(&name), Value::String(v.clone())))
        })
        .collect();
    CriteriaNode::conjoin(factors)
}

/// Parses a non-blank `q` and AND-s it after the path criteria, so path constraints always
/// restrict it.
pub fn merge_query(path: Option<CriteriaNode>, q: Option<&str>) -> Result<Option<CriteriaNode>, AppError> {
    let parsed = match q.map(str::trim).filter(|s| !s.is_empty()) {
        Some(expr) => Some(parse_query(expr)?),
        None => None,
    };
    Ok(match (path, parsed) {
        (None, q) => q,
        (p, None) => p,
        (Some(CriteriaNode::Logical { op: crate::criteria::LogicalOp::And, mut operands }), Some(q)) => {
            operands.push(q);
            Some(CriteriaNode::and(operands))
        }
        (Some(p), Some(q)) => Some(CriteriaNode::and(vec![p, q])),
    })
}

fn number(params: &HashMap<String, String>, key: &str) -> Result<Option<u32>, AppError> {
    match params.get(key).map(|s| s.trim()) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<u32>()
            .map(Some)
            .map_err(|_| AppError::malformed(format!("{} must be a non-negative integer, got '{}'", key, raw))),
    }
}

fn list(params: &HashMap<String, String>, key: &str) -> Vec<String> {
    params
        .get(key)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// `_limit`, `_offset`, `_page`, `_sort`, `_fetch`.
pub fn query_options(params: &HashMap<String, String>) -> Result<QueryOptions, AppError> {
    Ok(QueryOptions {
        sort: params.get("_sort").map(|s| SortKey::parse_list(s)).unwrap_or_default(),
        limit: number(params, "_limit")?,
        offset: number(params, "_offset")?,
        page: number(params, "_page")?,
        fetch: list(params, "_fetch"),
    })
}

pub fn wants_meta(params: &HashMap<String, String>) -> bool {
    params
        .get("_meta")
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "" | "true" | "1"))
        .unwrap_or(false)
}

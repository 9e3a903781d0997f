//! Response bodies for resource routes.

use crate::criteria::CriteriaNode;
use crate::provider::Record;
use serde::Serialize;

/// `_meta=true` list response.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ListEnvelope {
    pub criteria: Option<CriteriaNode>,
    pub page: Option<u32>,
    pub offset: u32,
    pub limit: u32,
    pub total_hits: u64,
    pub documents: Vec<Record>,
}

/// Update and delete responses.
#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct Affected {
    pub count: u64,
}

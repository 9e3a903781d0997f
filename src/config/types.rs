//! Raw resource configuration as read from JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_primary_key() -> String {
    "uuid".into()
}

fn default_true() -> bool {
    true
}

fn default_schema() -> String {
    "public".into()
}

/// Top-level resource file: `{ "base_path": "/", "resources": [...] }`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResourceFileConfig {
    #[serde(default)]
    pub base_path: String,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// Overrides the file-level base path for this resource's segment.
    #[serde(default)]
    pub base_path: Option<String>,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default = "default_true")]
    pub auto_set_pk: bool,
    /// Path parameter name -> record field name. Unmapped parameters are used as-is,
    /// except the item parameter `id`, which maps to the primary key.
    #[serde(default)]
    pub criteria_keys: HashMap<String, String>,
    /// Relational table name; defaults to the resource name.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub timestamps: Option<TimestampConfig>,
    /// Remove this resource's records when their parent record is removed.
    #[serde(default)]
    pub cascade_delete: bool,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimestampConfig {
    #[serde(default = "TimestampConfig::default_created")]
    pub created: String,
    #[serde(default = "TimestampConfig::default_modified")]
    pub modified: String,
}

impl TimestampConfig {
    fn default_created() -> String {
        "createdAt".into()
    }

    fn default_modified() -> String {
        "modifiedAt".into()
    }
}

impl Default for TimestampConfig {
    fn default() -> Self {
        TimestampConfig {
            created: Self::default_created(),
            modified: Self::default_modified(),
        }
    }
}

/// `strategies` maps an HTTP method to the strategy guarding it; methods without one are open.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub strategies: HashMap<String, String>,
    #[serde(default)]
    pub rules: HashMap<String, RuleConfig>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleConfig {
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub create: bool,
    #[serde(default)]
    pub update: bool,
    #[serde(default)]
    pub delete: bool,
}

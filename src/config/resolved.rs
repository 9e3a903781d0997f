//! Resolved resource tree: config validated and flattened for runtime use.

use crate::auth::AuthPolicy;
use crate::config::{validate, ResourceConfig, ResourceFileConfig, TimestampConfig};
use crate::error::ConfigError;
use crate::provider::ProviderConfig;
use crate::sql::TableRef;
use std::collections::HashMap;
use std::sync::Arc;

/// Path parameter naming a resource's record in its descendants' paths (`accounts` -> `accountsId`).
pub fn id_param(resource: &str) -> String {
    format!("{}Id", resource)
}

#[derive(Clone, Debug)]
pub struct ResourceDef {
    pub name: String,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub provider: ProviderConfig,
    pub criteria_keys: HashMap<String, String>,
    pub table: TableRef,
    pub timestamps: Option<TimestampConfig>,
    pub cascade_delete: bool,
    pub auth: AuthPolicy,
    /// `/accounts/{accountsId}/auths`
    pub context_path: String,
    /// Ancestor path parameters, root first.
    pub ancestor_params: Vec<String>,
}

impl ResourceDef {
    /// Item parameter. Named like the parameter children use for this resource, since the
    /// router requires one name per path position.
    pub fn item_param(&self) -> String {
        id_param(&self.name)
    }

    pub fn item_path(&self) -> String {
        format!("{}/{{{}}}", self.context_path, self.item_param())
    }

    /// Record field a path parameter constrains. The item parameter maps to the primary key
    /// unless `criteria_keys` maps it (or `id`) elsewhere.
    pub fn param_field(&self, param: &str) -> String {
        match self.criteria_keys.get(param) {
            Some(field) => field.clone(),
            None if param == self.item_param() => self
                .criteria_keys
                .get("id")
                .cloned()
                .unwrap_or_else(|| self.provider.primary_key.clone()),
            None => param.to_string(),
        }
    }

    /// Field on this resource's records holding the parent's key.
    pub fn parent_field(&self) -> Option<String> {
        self.parent.as_deref().map(|p| self.param_field(&id_param(p)))
    }
}

#[derive(Clone, Debug)]
pub struct ResourceTree {
    resources: Vec<Arc<ResourceDef>>,
    by_name: HashMap<String, usize>,
}

impl ResourceTree {
    pub fn get(&self, name: &str) -> Option<&Arc<ResourceDef>> {
        self.by_name.get(name).map(|&i| &self.resources[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResourceDef>> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

fn path_segments(base: &str) -> impl Iterator<Item = &str> {
    base.split('/').filter(|s| !s.is_empty())
}

/// Walks parent links leaf to root, prepending each ancestor's `base/name/{nameId}`.
fn context_path(resource: &ResourceConfig, by_name: &HashMap<&str, &ResourceConfig>, file_base: &str) -> (String, Vec<String>) {
    let mut segments: Vec<String> = Vec::new();
    let mut params: Vec<String> = Vec::new();
    let mut cur = Some(resource);
    let mut leaf = true;
    while let Some(r) = cur {
        let base = match (&r.base_path, &r.parent) {
            (Some(b), _) => b.as_str(),
            (None, None) => file_base,
            (None, Some(_)) => "",
        };
        let mut own: Vec<String> = path_segments(base).map(str::to_string).collect();
        own.push(r.name.clone());
        if !leaf {
            own.push(format!("{{{}}}", id_param(&r.name)));
            params.insert(0, id_param(&r.name));
        }
        own.append(&mut segments);
        segments = own;
        leaf = false;
        cur = r.parent.as_deref().and_then(|p| by_name.get(p).copied());
    }
    (format!("/{}", segments.join("/")), params)
}

/// Validate and build the resource tree.
pub fn resolve(config: &ResourceFileConfig) -> Result<ResourceTree, ConfigError> {
    validate(config)?;
    let by_name: HashMap<&str, &ResourceConfig> = config.resources.iter().map(|r| (r.name.as_str(), r)).collect();

    let mut resources = Vec::with_capacity(config.resources.len());
    let mut index = HashMap::new();
    for (i, r) in config.resources.iter().enumerate() {
        let (context_path, ancestor_params) = context_path(r, &by_name, &config.base_path);
        let children = config
            .resources
            .iter()
            .filter(|c| c.parent.as_deref() == Some(r.name.as_str()))
            .map(|c| c.name.clone())
            .collect();
        resources.push(Arc::new(ResourceDef {
            name: r.name.clone(),
            parent: r.parent.clone(),
            children,
            provider: ProviderConfig {
                primary_key: r.primary_key.clone(),
                auto_set_pk: r.auto_set_pk,
            },
            criteria_keys: r.criteria_keys.clone(),
            table: TableRef {
                schema: r.schema.clone(),
                table: r.table.clone().unwrap_or_else(|| r.name.clone()),
            },
            timestamps: r.timestamps.clone(),
            cascade_delete: r.cascade_delete,
            auth: AuthPolicy::from_config(&r.auth),
            context_path,
            ancestor_params,
        }));
        index.insert(r.name.clone(), i);
    }
    Ok(ResourceTree {
        resources,
        by_name: index,
    })
}

//! Config validation: names, parent references, hierarchy shape, auth strategies.

use crate::config::ResourceFileConfig;
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

/// Methods an auth strategy may be attached to.
pub const GUARDED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

pub fn validate(config: &ResourceFileConfig) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for r in &config.resources {
        if r.name.trim().is_empty() {
            return Err(ConfigError::Validation("resource name must not be empty".into()));
        }
        if r.name.contains('/') || r.name.contains('{') || r.name.contains(':') {
            return Err(ConfigError::Validation(format!("resource name '{}' is not a path segment", r.name)));
        }
        if !names.insert(r.name.as_str()) {
            return Err(ConfigError::DuplicateResource(r.name.clone()));
        }
        if r.primary_key.is_empty() {
            return Err(ConfigError::Validation(format!("resource '{}' has an empty primary key", r.name)));
        }
        for method in r.auth.strategies.keys() {
            if !GUARDED_METHODS.contains(&method.to_ascii_uppercase().as_str()) {
                return Err(ConfigError::Validation(format!(
                    "resource '{}': unknown method '{}' in auth strategies",
                    r.name, method
                )));
            }
        }
    }

    let parents: HashMap<&str, Option<&str>> = config
        .resources
        .iter()
        .map(|r| (r.name.as_str(), r.parent.as_deref()))
        .collect();
    for r in &config.resources {
        if let Some(p) = r.parent.as_deref() {
            if !parents.contains_key(p) {
                return Err(ConfigError::MissingReference {
                    kind: "parent resource",
                    id: p.to_string(),
                });
            }
        }
        let mut seen = HashSet::new();
        let mut cur = Some(r.name.as_str());
        while let Some(name) = cur {
            if !seen.insert(name) {
                return Err(ConfigError::Cycle(r.name.clone()));
            }
            cur = parents.get(name).copied().flatten();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_resource_config;

    fn check(json: &str) -> Result<(), ConfigError> {
        validate(&parse_resource_config(json).unwrap())
    }

    #[test]
    fn accepts_a_tree() {
        check(r#"{ "resources": [ { "name": "accounts" }, { "name": "auths", "parent": "accounts" } ] }"#).unwrap();
    }

    #[test]
    fn rejects_bad_hierarchies() {
        assert!(matches!(
            check(r#"{ "resources": [ { "name": "a" }, { "name": "a" } ] }"#),
            Err(ConfigError::DuplicateResource(_))
        ));
        assert!(matches!(
            check(r#"{ "resources": [ { "name": "a", "parent": "ghost" } ] }"#),
            Err(ConfigError::MissingReference { .. })
        ));
        assert!(matches!(
            check(r#"{ "resources": [ { "name": "a", "parent": "b" }, { "name": "b", "parent": "a" } ] }"#),
            Err(ConfigError::Cycle(_))
        ));
        assert!(matches!(
            check(r#"{ "resources": [ { "name": " " } ] }"#),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn rejects_unknown_strategy_methods() {
        let json = r#"{ "resources": [ { "name": "a", "auth": { "strategies": { "FETCH": "jwt" } } } ] }"#;
        assert!(matches!(check(json), Err(ConfigError::Validation(_))));
        let json = r#"{ "resources": [ { "name": "a", "auth": { "strategies": { "get": "jwt" } } } ] }"#;
        check(json).unwrap();
    }
}

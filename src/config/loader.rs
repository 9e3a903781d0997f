//! Load resource configuration from a JSON file or string.

use crate::config::ResourceFileConfig;
use crate::error::ConfigError;
use std::path::Path;

pub fn parse_resource_config(json: &str) -> Result<ResourceFileConfig, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))
}

pub fn load_resource_config(path: impl AsRef<Path>) -> Result<ResourceFileConfig, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let config = parse_resource_config(&raw)?;
    tracing::info!(path = %path.display(), resources = config.resources.len(), "loaded resource config");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in() {
        let cfg = parse_resource_config(r#"{ "resources": [ { "name": "accounts" } ] }"#).unwrap();
        let r = &cfg.resources[0];
        assert_eq!(r.primary_key, "uuid");
        assert!(r.auto_set_pk);
        assert_eq!(r.schema, "public");
        assert!(r.auth.strategies.is_empty());
        assert_eq!(cfg.base_path, "");
    }

    #[test]
    fn bad_json_is_a_load_error() {
        assert!(matches!(parse_resource_config("{"), Err(ConfigError::Load(_))));
        assert!(matches!(
            load_resource_config("/nonexistent/resources.json"),
            Err(ConfigError::Load(_))
        ));
    }
}

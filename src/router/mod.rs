//! Hierarchical resource routing: context paths and per-request criteria compilation.

pub mod compiler;

pub use compiler::{merge_query, path_criteria, query_options, wants_meta};

/// Rewrites `{param}` segments into axum's `:param` form.
pub fn axum_path(context_path: &str) -> String {
    context_path
        .split('/')
        .map(|seg| match seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => format!(":{}", name),
            None => seg.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn braces_become_colons() {
        assert_eq!(axum_path("/accounts/{accountsId}/auths/{authsId}"), "/accounts/:accountsId/auths/:authsId");
        assert_eq!(axum_path("/accounts"), "/accounts");
    }
}

//! Declarative per-method, per-role authorization.
//!
//! A resource lists which HTTP methods are guarded (by strategy name) and which actions each
//! role may perform. Identity comes from an [`IdentityExtractor`]; this crate only ships a
//! header-based one, token decoding is left to the embedding application.

use crate::config::{AuthConfig, RuleConfig};
use axum::http::{HeaderMap, Method};
use std::collections::HashMap;

pub const SUBJECT_HEADER: &str = "X-Subject";
pub const ROLES_HEADER: &str = "X-Roles";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn for_method(method: &Method) -> Option<Action> {
        match *method {
            Method::GET => Some(Action::Read),
            Method::POST => Some(Action::Create),
            Method::PUT | Method::PATCH => Some(Action::Update),
            Method::DELETE => Some(Action::Delete),
            _ => None,
        }
    }
}

/// Actions one role may perform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RuleSet(RuleConfig);

impl RuleSet {
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Read => self.0.read,
            Action::Create => self.0.create,
            Action::Update => self.0.update,
            Action::Delete => self.0.delete,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AuthPolicy {
    /// Upper-cased method -> strategy name.
    strategies: HashMap<String, String>,
    rules: HashMap<String, RuleSet>,
}

impl AuthPolicy {
    pub fn from_config(config: &AuthConfig) -> Self {
        AuthPolicy {
            strategies: config
                .strategies
                .iter()
                .map(|(m, s)| (m.to_ascii_uppercase(), s.clone()))
                .collect(),
            rules: config.rules.iter().map(|(role, r)| (role.clone(), RuleSet(*r))).collect(),
        }
    }

    pub fn strategy_for(&self, method: &Method) -> Option<&str> {
        self.strategies.get(method.as_str()).map(String::as_str)
    }

    pub fn rule(&self, role: &str) -> Option<&RuleSet> {
        self.rules.get(role)
    }
}

/// The caller as seen by the gate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identity {
    pub subject: Option<String>,
    pub roles: Vec<String>,
}

/// Unguarded methods are always allowed. A guarded method needs an identity with at least
/// one role whose rules permit the method's action.
pub fn check_authorization(policy: &AuthPolicy, identity: Option<&Identity>, method: &Method) -> bool {
    if policy.strategy_for(method).is_none() {
        return true;
    }
    let (Some(identity), Some(action)) = (identity, Action::for_method(method)) else {
        return false;
    };
    identity
        .roles
        .iter()
        .filter_map(|role| policy.rule(role))
        .any(|rules| rules.allows(action))
}

/// Derives the caller's identity from request headers.
pub trait IdentityExtractor: Send + Sync + 'static {
    fn extract(&self, headers: &HeaderMap) -> Option<Identity>;
}

/// Reads `X-Subject` and a comma-separated `X-Roles`. Absent or empty headers yield no identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeaderRolesExtractor;

impl IdentityExtractor for HeaderRolesExtractor {
    fn extract(&self, headers: &HeaderMap) -> Option<Identity> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };
        let subject = header(SUBJECT_HEADER).map(str::to_string);
        let roles: Vec<String> = header(ROLES_HEADER)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if subject.is_none() && roles.is_empty() {
            return None;
        }
        Some(Identity { subject, roles })
    }
}

/// Never yields an identity. Every guarded method is denied.
#[derive(Clone, Copy, Debug, Default)]
pub struct Anonymous;

impl IdentityExtractor for Anonymous {
    fn extract(&self, _headers: &HeaderMap) -> Option<Identity> {
        None
    }
}

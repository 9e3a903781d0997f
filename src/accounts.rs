//! Account directory: lookups and sign-up flows for the `accounts` and `auths` resources,
//! built on their managers only, so it works with either storage backend.

use crate::criteria::CriteriaNode;
use crate::error::AppError;
use crate::manager::{ManagerRegistry, ResourceManager};
use crate::provider::Record;
use serde_json::{json, Value};
use std::sync::Arc;

pub const ACCOUNTS: &str = "accounts";
pub const AUTHS: &str = "auths";

/// Field path of an account's email list.
const EMAILS_FIELD: &str = "profile.emails";

#[derive(Debug, Clone, PartialEq)]
pub struct AccountAndAuth {
    pub account: Record,
    pub auth: Record,
}

pub struct AccountDirectory {
    accounts: Arc<ResourceManager>,
    auths: Arc<ResourceManager>,
}

impl AccountDirectory {
    pub async fn from_registry(registry: &ManagerRegistry) -> Result<Self, AppError> {
        Ok(AccountDirectory {
            accounts: registry.manager(ACCOUNTS).await?,
            auths: registry.manager(AUTHS).await?,
        })
    }

    fn account_field(&self) -> &str {
        self.auths.parent_field().unwrap_or("account")
    }

    /// Account whose `profile.emails` contains `email`.
    pub async fn find_account_by_email(&self, email: &str) -> Result<Option<Record>, AppError> {
        self.accounts.find(Some(&CriteriaNode::eq(EMAILS_FIELD, email))).await
    }

    /// Auth record for `(auth_source, auth_id)` with its account embedded under `accounts`.
    pub async fn find_auth_from_credentials(&self, auth_source: &str, auth_id: &str) -> Result<Option<Record>, AppError> {
        let criteria = CriteriaNode::and(vec![
            CriteriaNode::eq("authSource", auth_source),
            CriteriaNode::eq("authId", auth_id),
        ]);
        let Some(mut auth) = self.auths.find(Some(&criteria)).await? else {
            return Ok(None);
        };
        self.auths.embed(&mut auth, &[ACCOUNTS.to_string()]).await?;
        Ok(Some(auth))
    }

    /// Reuses the account matching the first profile email, or creates it, then creates the
    /// auth linked to it.
    pub async fn create_account_and_auth(&self, account: Record, mut auth: Record) -> Result<AccountAndAuth, AppError> {
        let email = account
            .get("profile")
            .and_then(|p| p.get("emails"))
            .and_then(Value::as_array)
            .and_then(|emails| emails.first())
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AppError::BadRequest("account.profile.emails is required".into()))?;

        let account = match self.find_account_by_email(&email).await? {
            Some(existing) => existing,
            None => {
                tracing::info!(email = %email, "no matching account, creating one");
                self.accounts.add(account).await?
            }
        };
        let key = account
            .get(self.accounts.primary_key())
            .cloned()
            .ok_or_else(|| AppError::Internal("stored account has no primary key".into()))?;
        auth.insert(self.account_field().to_string(), key);
        let auth = self.auths.add(auth).await?;
        Ok(AccountAndAuth { account, auth })
    }

    /// Creates the root account and its local auth when no root account exists.
    /// Returns whether anything was created.
    pub async fn ensure_root_account(&self) -> Result<bool, AppError> {
        if self.accounts.find(Some(&CriteriaNode::eq("kind", "root"))).await?.is_some() {
            return Ok(false);
        }
        let (account, auth) = root_records();
        let created = self.create_account_and_auth(account, auth).await?;
        tracing::warn!(
            pk = ?created.account.get(self.accounts.primary_key()),
            "root account created with default credentials; change them"
        );
        Ok(true)
    }
}

fn root_records() -> (Record, Record) {
    let account = json!({
        "kind": "root",
        "roles": ["root"],
        "status": "enabled",
        "displayName": "Root",
        "profile": { "emails": ["changeme@root.net"] }
    });
    let auth = json!({ "authSource": "local", "authId": "root", "password": "root" });
    (
        account.as_object().cloned().unwrap_or_default(),
        auth.as_object().cloned().unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_resource_config, resolve};
    use crate::manager::DocumentFactory;

    async fn directory() -> AccountDirectory {
        let cfg = parse_resource_config(
            r#"{ "resources": [
                { "name": "accounts" },
                { "name": "auths", "parent": "accounts", "criteria_keys": { "accountsId": "account" } }
            ] }"#,
        )
        .unwrap();
        let registry = ManagerRegistry::new(Arc::new(resolve(&cfg).unwrap()), Arc::new(DocumentFactory::in_memory()));
        AccountDirectory::from_registry(&registry).await.unwrap()
    }

    fn rec(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn root_bootstrap_runs_once() {
        let dir = directory().await;
        assert!(dir.ensure_root_account().await.unwrap());
        assert!(!dir.ensure_root_account().await.unwrap());

        let auth = dir.find_auth_from_credentials("local", "root").await.unwrap().unwrap();
        assert_eq!(auth["accounts"]["kind"], "root");
        assert_eq!(auth["account"], auth["accounts"]["uuid"]);
        assert!(dir.find_auth_from_credentials("google", "root").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sign_up_reuses_account_by_email() {
        let dir = directory().await;
        let account = rec(json!({ "profile": { "emails": ["ann@x.net"] } }));
        let first = dir
            .create_account_and_auth(account.clone(), rec(json!({ "authSource": "local", "authId": "ann" })))
            .await
            .unwrap();
        let second = dir
            .create_account_and_auth(account, rec(json!({ "authSource": "google", "authId": "g-1" })))
            .await
            .unwrap();
        assert_eq!(first.account["uuid"], second.account["uuid"]);
        assert_ne!(first.auth["uuid"], second.auth["uuid"]);
        assert_eq!(dir.auths.count(None).await.unwrap(), 2);
        assert_eq!(dir.accounts.count(None).await.unwrap(), 1);

        let found = dir.find_account_by_email("ann@x.net").await.unwrap().unwrap();
        assert_eq!(found["uuid"], first.account["uuid"]);
    }

    #[tokio::test]
    async fn sign_up_requires_an_email() {
        let dir = directory().await;
        let err = dir
            .create_account_and_auth(rec(json!({ "profile": {} })), Record::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}

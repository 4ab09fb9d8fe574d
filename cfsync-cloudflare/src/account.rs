//! Account resolution for account-scoped kinds.

use cfsync_core::{RemoteError, RemoteResult};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::client::{ApiError, CloudflareClient};

#[derive(Debug, Deserialize)]
struct Account {
    id: String,
    #[serde(default)]
    name: String,
}

/// Resolves the account id: per-resource override, then the configured
/// id, then the first account visible to the token (discovered once).
pub struct AccountResolver {
    client: CloudflareClient,
    configured: Option<String>,
    discovered: RwLock<Option<String>>,
}

impl AccountResolver {
    pub fn new(client: CloudflareClient, configured: Option<String>) -> Self {
        Self {
            client,
            configured: configured.filter(|id| !id.is_empty()),
            discovered: RwLock::new(None),
        }
    }

    pub async fn resolve(&self, explicit: Option<&str>) -> RemoteResult<String> {
        if let Some(id) = explicit.filter(|id| !id.is_empty()) {
            return Ok(id.to_string());
        }
        if let Some(id) = &self.configured {
            return Ok(id.clone());
        }
        {
            let cached = self.discovered.read().await;
            if let Some(id) = cached.as_ref() {
                return Ok(id.clone());
            }
        }

        let mut cached = self.discovered.write().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let accounts: Vec<Account> = self
            .client
            .get("/accounts?per_page=1")
            .await
            .map_err(discovery_error)?;
        let account = accounts
            .into_iter()
            .next()
            .filter(|a| !a.id.is_empty())
            .ok_or_else(|| RemoteError::permanent("no account is visible to the API token"))?;

        info!(account_id = %account.id, account = %account.name, "Discovered account");
        *cached = Some(account.id.clone());
        Ok(account.id)
    }
}

/// Network trouble stays retryable; anything the API rejects is permanent.
fn discovery_error(err: ApiError) -> RemoteError {
    let err = RemoteError::from(err).context("account discovery");
    if err.is_transient() {
        err
    } else {
        RemoteError::permanent(err.message())
    }
}

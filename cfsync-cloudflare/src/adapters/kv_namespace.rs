//! Workers KV namespace adapter. Bound by the service-assigned namespace id;
//! the title is a mutable attribute.

use std::sync::Arc;

use async_trait::async_trait;
use cfsync_core::{Created, ExternalAdapter, RemoteError, RemoteResult};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::api_err;
use crate::account::AccountResolver;
use crate::client::{CloudflareClient, ignore_not_found};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KvNamespaceParams {
    pub title: String,
    #[serde(default)]
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KvNamespaceObservation {
    pub id: String,
    pub title: String,
    pub account_id: String,
    pub supports_url_encoding: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ApiNamespace {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    supports_url_encoding: Option<bool>,
}

impl ApiNamespace {
    fn into_observation(self, account_id: &str) -> KvNamespaceObservation {
        KvNamespaceObservation {
            id: self.id,
            title: self.title,
            account_id: account_id.to_string(),
            supports_url_encoding: self.supports_url_encoding,
        }
    }
}

pub struct KvNamespaceAdapter {
    client: CloudflareClient,
    accounts: Arc<AccountResolver>,
}

impl KvNamespaceAdapter {
    pub fn new(client: CloudflareClient, accounts: Arc<AccountResolver>) -> Self {
        Self { client, accounts }
    }

    async fn base(&self, params: &KvNamespaceParams) -> RemoteResult<(String, String)> {
        let account = self.accounts.resolve(params.account_id.as_deref()).await?;
        let base = format!("/accounts/{}/storage/kv/namespaces", account);
        Ok((account, base))
    }
}

#[async_trait]
impl ExternalAdapter for KvNamespaceAdapter {
    type Params = KvNamespaceParams;
    type Observation = KvNamespaceObservation;

    async fn create(&self, params: &KvNamespaceParams) -> RemoteResult<Created<KvNamespaceObservation>> {
        let (account, base) = self.base(params).await?;
        let ns: ApiNamespace = self
            .client
            .post(&base, &json!({ "title": params.title }))
            .await
            .map_err(api_err("cannot create kv namespace"))?;

        Ok(Created {
            external_name: ns.id.clone(),
            observation: ns.into_observation(&account),
        })
    }

    async fn fetch(&self, id: &str, params: &KvNamespaceParams) -> RemoteResult<KvNamespaceObservation> {
        let (account, base) = self.base(params).await?;
        let namespaces: Vec<ApiNamespace> = self
            .client
            .list(&base)
            .await
            .map_err(api_err("cannot list kv namespaces"))?;

        namespaces
            .into_iter()
            .find(|ns| ns.id == id)
            .map(|ns| ns.into_observation(&account))
            .ok_or_else(|| RemoteError::not_found(format!("kv namespace {}", id)))
    }

    async fn update(&self, id: &str, params: &KvNamespaceParams) -> RemoteResult<KvNamespaceObservation> {
        let (account, base) = self.base(params).await?;
        self.client
            .put_unit(&format!("{}/{}", base, id), &json!({ "title": params.title }))
            .await
            .map_err(api_err("cannot rename kv namespace"))?;

        // Rename returns no body.
        Ok(KvNamespaceObservation {
            id: id.to_string(),
            title: params.title.clone(),
            account_id: account,
            supports_url_encoding: None,
        })
    }

    async fn delete(&self, id: &str, params: &KvNamespaceParams) -> RemoteResult<()> {
        let (_, base) = self.base(params).await?;
        ignore_not_found(self.client.delete(&format!("{}/{}", base, id)).await)
            .map_err(api_err("cannot delete kv namespace"))
    }

    fn is_up_to_date(&self, params: &KvNamespaceParams, obs: &KvNamespaceObservation) -> bool {
        params.title == obs.title
            && params
                .account_id
                .as_deref()
                .is_none_or(|a| a == obs.account_id)
    }
}

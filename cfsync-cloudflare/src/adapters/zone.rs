//! Zone adapter. The zone id is service-assigned.

use std::sync::Arc;

use async_trait::async_trait;
use cfsync_core::{Created, ExternalAdapter, RemoteError, RemoteResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{api_err, opt_matches};
use crate::account::AccountResolver;
use crate::client::{CloudflareClient, ignore_not_found};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneParams {
    pub name: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub jump_start: bool,
    #[serde(default)]
    pub paused: Option<bool>,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default, rename = "type")]
    pub zone_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneObservation {
    pub id: String,
    pub name: String,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    pub status: String,
    pub paused: bool,
    #[serde(rename = "type")]
    pub zone_type: Option<String>,
    pub plan_id: Option<String>,
    pub plan: Option<String>,
    pub name_servers: Vec<String>,
    pub created_on: Option<DateTime<Utc>>,
    pub modified_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Named {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiZone {
    id: String,
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    paused: bool,
    #[serde(default, rename = "type")]
    zone_type: Option<String>,
    plan: Option<Named>,
    account: Option<Named>,
    #[serde(default)]
    name_servers: Vec<String>,
    created_on: Option<DateTime<Utc>>,
    modified_on: Option<DateTime<Utc>>,
}

impl From<ApiZone> for ZoneObservation {
    fn from(z: ApiZone) -> Self {
        let (plan_id, plan) = z.plan.map(|p| (p.id, p.name)).unzip();
        let (account_id, account_name) = z.account.map(|a| (a.id, a.name)).unzip();
        Self {
            id: z.id,
            name: z.name,
            account_id,
            account_name,
            status: z.status,
            paused: z.paused,
            zone_type: z.zone_type,
            plan_id,
            plan,
            name_servers: z.name_servers,
            created_on: z.created_on,
            modified_on: z.modified_on,
        }
    }
}

pub struct ZoneAdapter {
    client: CloudflareClient,
    accounts: Arc<AccountResolver>,
}

impl ZoneAdapter {
    pub fn new(client: CloudflareClient, accounts: Arc<AccountResolver>) -> Self {
        Self { client, accounts }
    }
}

#[async_trait]
impl ExternalAdapter for ZoneAdapter {
    type Params = ZoneParams;
    type Observation = ZoneObservation;

    async fn create(&self, params: &ZoneParams) -> RemoteResult<Created<ZoneObservation>> {
        let account_id = self.accounts.resolve(params.account_id.as_deref()).await?;

        let mut body = json!({
            "name": params.name,
            "account": { "id": account_id },
            "jump_start": params.jump_start,
        });
        if let Some(t) = &params.zone_type {
            body["type"] = json!(t);
        }

        let zone: ApiZone = self
            .client
            .post("/zones", &body)
            .await
            .map_err(api_err("cannot create zone"))?;
        Ok(Created {
            external_name: zone.id.clone(),
            observation: zone.into(),
        })
    }

    async fn fetch(&self, id: &str, _params: &ZoneParams) -> RemoteResult<ZoneObservation> {
        let zone: ApiZone = self
            .client
            .get(&format!("/zones/{}", id))
            .await
            .map_err(api_err("cannot get zone"))?;
        Ok(zone.into())
    }

    async fn update(&self, id: &str, params: &ZoneParams) -> RemoteResult<ZoneObservation> {
        let current = self.fetch(id, params).await?;
        if current.name != params.name {
            return Err(RemoteError::permanent(format!(
                "zone name cannot change from {} to {}",
                current.name, params.name
            )));
        }

        let mut body = Map::new();
        if let Some(paused) = params.paused {
            body.insert("paused".into(), json!(paused));
        }
        if let Some(plan_id) = &params.plan_id {
            body.insert("plan".into(), json!({ "id": plan_id }));
        }
        if let Some(t) = &params.zone_type {
            body.insert("type".into(), json!(t));
        }

        let zone: ApiZone = self
            .client
            .patch(&format!("/zones/{}", id), &Value::Object(body))
            .await
            .map_err(api_err("cannot update zone"))?;
        Ok(zone.into())
    }

    async fn delete(&self, id: &str, _params: &ZoneParams) -> RemoteResult<()> {
        ignore_not_found(self.client.delete(&format!("/zones/{}", id)).await)
            .map_err(api_err("cannot delete zone"))
    }

    fn is_up_to_date(&self, params: &ZoneParams, obs: &ZoneObservation) -> bool {
        params.name == obs.name
            && opt_matches(params.paused.as_ref(), Some(&obs.paused))
            && opt_matches(params.plan_id.as_ref(), obs.plan_id.as_ref())
            && opt_matches(params.zone_type.as_ref(), obs.zone_type.as_ref())
    }
}

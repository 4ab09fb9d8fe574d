//! DNS record adapter.
//!
//! Records are zone-scoped, so the binding is `zoneId/recordId`. A bare
//! record id is accepted and resolved against the declared zone. SRV and
//! TLSA records are sent as structured `data` instead of `content`.

use async_trait::async_trait;
use cfsync_core::{Created, ExternalAdapter, RemoteError, RemoteResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{api_err, opt_matches};
use crate::client::{CloudflareClient, ignore_not_found};

fn default_type() -> String {
    "A".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordParams {
    /// Zone id.
    pub zone: String,
    #[serde(default = "default_type", rename = "type")]
    pub record_type: String,
    pub name: String,
    /// Record content; the target for SRV records.
    pub content: String,
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub proxied: Option<bool>,
    #[serde(default)]
    pub priority: Option<u16>,
    #[serde(default)]
    pub weight: Option<u16>,
    #[serde(default)]
    pub port: Option<u16>,
}

impl RecordParams {
    fn is_srv(&self) -> bool {
        self.record_type.eq_ignore_ascii_case("SRV")
            && self.priority.is_some()
            && self.weight.is_some()
            && self.port.is_some()
    }

    fn is_tlsa(&self) -> bool {
        self.record_type.eq_ignore_ascii_case("TLSA")
    }

    fn srv_data(&self) -> Option<SrvData> {
        if !self.is_srv() {
            return None;
        }
        Some(SrvData {
            priority: self.priority?,
            weight: self.weight?,
            port: self.port?,
            target: self.content.clone(),
        })
    }

    /// Request body for create and full-replace update.
    fn body(&self) -> RemoteResult<Value> {
        let mut body = json!({
            "type": self.record_type,
            "name": self.name,
        });
        if let Some(ttl) = self.ttl {
            body["ttl"] = json!(ttl);
        }
        if let Some(proxied) = self.proxied {
            body["proxied"] = json!(proxied);
        }

        if let Some(srv) = self.srv_data() {
            body["data"] = json!(srv);
        } else if self.is_tlsa() {
            body["data"] = json!(parse_tlsa(&self.content)?);
        } else {
            body["content"] = json!(self.content);
            if let Some(priority) = self.priority {
                body["priority"] = json!(priority);
            }
        }
        Ok(body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SrvData {
    priority: u16,
    weight: u16,
    port: u16,
    target: String,
}

/// Structured TLSA record data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsaData {
    pub usage: u8,
    pub selector: u8,
    pub matching_type: u8,
    pub certificate: String,
}

/// Parse `"usage selector matching_type certificate"`.
pub fn parse_tlsa(content: &str) -> RemoteResult<TlsaData> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    let [usage, selector, matching_type, certificate] = parts.as_slice() else {
        return Err(RemoteError::permanent(format!(
            "TLSA content must have 4 space-separated fields (usage selector matching_type certificate), got {}",
            parts.len()
        )));
    };

    let field = |name: &str, raw: &str, max: u8| -> RemoteResult<u8> {
        raw.parse::<u8>()
            .ok()
            .filter(|v| *v <= max)
            .ok_or_else(|| RemoteError::permanent(format!("TLSA {} must be 0-{}, got: {}", name, max, raw)))
    };

    Ok(TlsaData {
        usage: field("usage", *usage, 3)?,
        selector: field("selector", *selector, 1)?,
        matching_type: field("matching_type", *matching_type, 2)?,
        certificate: certificate.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordObservation {
    pub id: String,
    pub zone_id: String,
    pub zone_name: Option<String>,
    pub fqdn: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    pub ttl: Option<u32>,
    pub proxied: Option<bool>,
    pub proxiable: bool,
    pub priority: Option<u16>,
    pub data: Option<Value>,
    pub created_on: Option<DateTime<Utc>>,
    pub modified_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiRecord {
    id: String,
    #[serde(default)]
    zone_id: Option<String>,
    #[serde(default)]
    zone_name: Option<String>,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    ttl: Option<u32>,
    #[serde(default)]
    proxied: Option<bool>,
    #[serde(default)]
    proxiable: bool,
    #[serde(default)]
    priority: Option<u16>,
    #[serde(default)]
    data: Option<Value>,
    created_on: Option<DateTime<Utc>>,
    modified_on: Option<DateTime<Utc>>,
}

impl ApiRecord {
    fn into_observation(self, zone: &str) -> RecordObservation {
        RecordObservation {
            id: self.id,
            zone_id: self.zone_id.unwrap_or_else(|| zone.to_string()),
            zone_name: self.zone_name,
            fqdn: self.name,
            record_type: self.record_type,
            content: self.content,
            ttl: self.ttl,
            proxied: self.proxied,
            proxiable: self.proxiable,
            priority: self.priority,
            data: self.data,
            created_on: self.created_on,
            modified_on: self.modified_on,
        }
    }
}

/// Split a binding into zone id and record id.
fn split_binding<'a>(binding: &'a str, params: &'a RecordParams) -> RemoteResult<(&'a str, &'a str)> {
    let (zone, id) = binding.split_once('/').unwrap_or((params.zone.as_str(), binding));
    if zone.is_empty() || id.is_empty() {
        return Err(RemoteError::permanent(format!(
            "malformed record binding {:?}, expected zoneId/recordId",
            binding
        )));
    }
    Ok((zone, id))
}

/// Declared name matches the observed FQDN, either literally or relative
/// to the zone (`@` is the apex).
fn name_matches(declared: &str, obs: &RecordObservation) -> bool {
    let declared = declared.trim_end_matches('.');
    let fqdn = obs.fqdn.trim_end_matches('.');
    if declared.eq_ignore_ascii_case(fqdn) {
        return true;
    }
    match obs.zone_name.as_deref() {
        Some(zone) if declared == "@" => zone.eq_ignore_ascii_case(fqdn),
        Some(zone) => format!("{}.{}", declared, zone).eq_ignore_ascii_case(fqdn),
        None => false,
    }
}

fn data_as<T: for<'de> Deserialize<'de>>(obs: &RecordObservation) -> Option<T> {
    obs.data
        .as_ref()
        .and_then(|d| serde_json::from_value(d.clone()).ok())
}

pub struct RecordAdapter {
    client: CloudflareClient,
}

impl RecordAdapter {
    pub fn new(client: CloudflareClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExternalAdapter for RecordAdapter {
    type Params = RecordParams;
    type Observation = RecordObservation;

    async fn create(&self, params: &RecordParams) -> RemoteResult<Created<RecordObservation>> {
        if params.zone.is_empty() {
            return Err(RemoteError::permanent("record has no zone"));
        }
        let body = params.body()?;
        let record: ApiRecord = self
            .client
            .post(&format!("/zones/{}/dns_records", params.zone), &body)
            .await
            .map_err(api_err("cannot create record"))?;

        Ok(Created {
            external_name: format!("{}/{}", params.zone, record.id),
            observation: record.into_observation(&params.zone),
        })
    }

    async fn fetch(&self, binding: &str, params: &RecordParams) -> RemoteResult<RecordObservation> {
        let (zone, id) = split_binding(binding, params)?;
        let record: ApiRecord = self
            .client
            .get(&format!("/zones/{}/dns_records/{}", zone, id))
            .await
            .map_err(api_err("cannot get record"))?;
        Ok(record.into_observation(zone))
    }

    async fn update(&self, binding: &str, params: &RecordParams) -> RemoteResult<RecordObservation> {
        let (zone, id) = split_binding(binding, params)?;
        let body = params.body()?;
        let record: ApiRecord = self
            .client
            .put(&format!("/zones/{}/dns_records/{}", zone, id), &body)
            .await
            .map_err(api_err("cannot update record"))?;
        Ok(record.into_observation(zone))
    }

    async fn delete(&self, binding: &str, params: &RecordParams) -> RemoteResult<()> {
        let (zone, id) = split_binding(binding, params)?;
        ignore_not_found(
            self.client
                .delete(&format!("/zones/{}/dns_records/{}", zone, id))
                .await,
        )
        .map_err(api_err("cannot delete record"))
    }

    fn is_up_to_date(&self, params: &RecordParams, obs: &RecordObservation) -> bool {
        if !params.record_type.eq_ignore_ascii_case(&obs.record_type) || !name_matches(&params.name, obs) {
            return false;
        }

        let content_matches = if let Some(srv) = params.srv_data() {
            data_as::<SrvData>(obs).is_some_and(|o| {
                o.priority == srv.priority
                    && o.weight == srv.weight
                    && o.port == srv.port
                    && o.target.trim_end_matches('.') == srv.target.trim_end_matches('.')
            })
        } else if params.is_tlsa() {
            match (parse_tlsa(&params.content), data_as::<TlsaData>(obs)) {
                (Ok(d), Some(o)) => {
                    d.usage == o.usage
                        && d.selector == o.selector
                        && d.matching_type == o.matching_type
                        && d.certificate.eq_ignore_ascii_case(&o.certificate)
                }
                _ => false,
            }
        } else {
            params.content == obs.content && opt_matches(params.priority.as_ref(), obs.priority.as_ref())
        };

        content_matches
            && opt_matches(params.ttl.as_ref(), obs.ttl.as_ref())
            && opt_matches(params.proxied.as_ref(), obs.proxied.as_ref())
    }
}

//! Worker route adapter.
//!
//! The route pattern is the identity: it is unique per zone, so the binding
//! is the pattern itself and the service id is looked up on every call.

use async_trait::async_trait;
use cfsync_core::{Created, ExternalAdapter, RemoteError, RemoteResult};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::api_err;
use crate::client::{CloudflareClient, ignore_not_found};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteParams {
    pub pattern: String,
    /// Worker script; `None` disables workers on matching requests.
    #[serde(default)]
    pub script: Option<String>,
    /// Zone id.
    #[serde(default)]
    pub zone: Option<String>,
}

impl RouteParams {
    fn zone(&self) -> RemoteResult<&str> {
        self.zone
            .as_deref()
            .filter(|z| !z.is_empty())
            .ok_or_else(|| RemoteError::permanent("route has no zone"))
    }

    fn body(&self) -> serde_json::Value {
        json!({ "pattern": self.pattern, "script": self.script })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteObservation {
    pub id: String,
    pub zone_id: String,
    pub pattern: String,
    pub script: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiRoute {
    id: String,
    #[serde(default)]
    pattern: String,
    #[serde(default)]
    script: Option<String>,
}

impl ApiRoute {
    fn into_observation(self, zone: &str) -> RouteObservation {
        RouteObservation {
            id: self.id,
            zone_id: zone.to_string(),
            pattern: self.pattern,
            script: self.script.filter(|s| !s.is_empty()),
        }
    }
}

pub struct RouteAdapter {
    client: CloudflareClient,
}

impl RouteAdapter {
    pub fn new(client: CloudflareClient) -> Self {
        Self { client }
    }

    /// Find the route with `pattern` in `zone`.
    async fn find(&self, zone: &str, pattern: &str) -> RemoteResult<Option<ApiRoute>> {
        let routes: Vec<ApiRoute> = self
            .client
            .list(&format!("/zones/{}/workers/routes", zone))
            .await
            .map_err(api_err("cannot list routes"))?;
        Ok(routes.into_iter().find(|r| r.pattern == pattern))
    }
}

#[async_trait]
impl ExternalAdapter for RouteAdapter {
    type Params = RouteParams;
    type Observation = RouteObservation;

    async fn create(&self, params: &RouteParams) -> RemoteResult<Created<RouteObservation>> {
        let zone = params.zone()?;
        let mut route: ApiRoute = self
            .client
            .post(&format!("/zones/{}/workers/routes", zone), &params.body())
            .await
            .map_err(api_err("cannot create route"))?;

        // The create response may carry only the id.
        route.pattern = params.pattern.clone();
        route.script = params.script.clone();
        Ok(Created {
            external_name: params.pattern.clone(),
            observation: route.into_observation(zone),
        })
    }

    async fn fetch(&self, pattern: &str, params: &RouteParams) -> RemoteResult<RouteObservation> {
        let zone = params.zone()?;
        match self.find(zone, pattern).await? {
            Some(route) => Ok(route.into_observation(zone)),
            None => Err(RemoteError::not_found(format!("route {}", pattern))),
        }
    }

    async fn update(&self, pattern: &str, params: &RouteParams) -> RemoteResult<RouteObservation> {
        if params.pattern != pattern {
            return Err(RemoteError::permanent(format!(
                "route pattern cannot change from {} to {}",
                pattern, params.pattern
            )));
        }
        let zone = params.zone()?;
        let existing = self
            .find(zone, pattern)
            .await?
            .ok_or_else(|| RemoteError::not_found(format!("route {}", pattern)))?;

        let route: ApiRoute = self
            .client
            .put(
                &format!("/zones/{}/workers/routes/{}", zone, existing.id),
                &params.body(),
            )
            .await
            .map_err(api_err("cannot update route"))?;
        Ok(route.into_observation(zone))
    }

    async fn delete(&self, pattern: &str, params: &RouteParams) -> RemoteResult<()> {
        let zone = params.zone()?;
        let Some(existing) = self.find(zone, pattern).await? else {
            return Ok(());
        };
        ignore_not_found(
            self.client
                .delete(&format!("/zones/{}/workers/routes/{}", zone, existing.id))
                .await,
        )
        .map_err(api_err("cannot delete route"))
    }

    fn is_up_to_date(&self, params: &RouteParams, obs: &RouteObservation) -> bool {
        params.pattern == obs.pattern && params.script == obs.script
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn params(script: Option<&str>) -> RouteParams {
        RouteParams {
            pattern: "example.com/api/*".to_string(),
            script: script.map(str::to_string),
            zone: Some("z1".to_string()),
        }
    }

    fn adapter(server: &MockServer) -> RouteAdapter {
        RouteAdapter::new(CloudflareClient::new("secret", &server.uri()).unwrap())
    }

    async fn mount_routes(server: &MockServer, routes: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/zones/z1/workers/routes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "errors": [], "result": routes
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_create_binds_pattern() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/zones/z1/workers/routes"))
            .and(body_partial_json(json!({ "pattern": "example.com/api/*", "script": "api" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "errors": [], "result": { "id": "rt1" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let created = adapter(&server).create(&params(Some("api"))).await.unwrap();
        assert_eq!(created.external_name, "example.com/api/*");
        assert_eq!(created.observation.id, "rt1");
        assert_eq!(created.observation.script.as_deref(), Some("api"));
    }

    #[tokio::test]
    async fn test_fetch_matches_by_pattern() {
        let server = MockServer::start().await;
        mount_routes(
            &server,
            json!([
                { "id": "rt0", "pattern": "example.com/*", "script": "site" },
                { "id": "rt1", "pattern": "example.com/api/*", "script": "api" }
            ]),
        )
        .await;

        let a = adapter(&server);
        let obs = a.fetch("example.com/api/*", &params(Some("api"))).await.unwrap();
        assert_eq!(obs.id, "rt1");
        assert!(a.is_up_to_date(&params(Some("api")), &obs));
        assert!(!a.is_up_to_date(&params(None), &obs));

        let err = a.fetch("example.com/other/*", &params(None)).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_fetch_scans_every_page() {
        let server = MockServer::start().await;
        for (page, route) in [
            ("1", json!({ "id": "rt0", "pattern": "example.com/*", "script": "site" })),
            ("2", json!({ "id": "rt1", "pattern": "example.com/api/*", "script": "api" })),
        ] {
            Mock::given(method("GET"))
                .and(path("/zones/z1/workers/routes"))
                .and(query_param("page", page))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "success": true, "errors": [], "result": [route],
                    "result_info": { "page": page.parse::<u32>().unwrap(), "total_pages": 2 }
                })))
                .expect(1)
                .mount(&server)
                .await;
        }

        let obs = adapter(&server)
            .fetch("example.com/api/*", &params(Some("api")))
            .await
            .unwrap();
        assert_eq!(obs.id, "rt1");
    }

    #[tokio::test]
    async fn test_update_resolves_id_first() {
        let server = MockServer::start().await;
        mount_routes(
            &server,
            json!([{ "id": "rt1", "pattern": "example.com/api/*", "script": "old" }]),
        )
        .await;
        Mock::given(method("PUT"))
            .and(path("/zones/z1/workers/routes/rt1"))
            .and(body_partial_json(json!({ "script": "new" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true, "errors": [],
                "result": { "id": "rt1", "pattern": "example.com/api/*", "script": "new" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let obs = adapter(&server)
            .update("example.com/api/*", &params(Some("new")))
            .await
            .unwrap();
        assert_eq!(obs.script.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_pattern_change_is_permanent() {
        let server = MockServer::start().await;
        let err = adapter(&server)
            .update("example.com/old/*", &params(None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), cfsync_core::ErrorKind::Permanent);
    }

    #[tokio::test]
    async fn test_delete_absent_route_succeeds() {
        let server = MockServer::start().await;
        mount_routes(&server, json!([])).await;

        adapter(&server)
            .delete("example.com/api/*", &params(None))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_zone_is_permanent() {
        let server = MockServer::start().await;
        let mut p = params(None);
        p.zone = None;
        let err = adapter(&server).create(&p).await.unwrap_err();
        assert_eq!(err.kind(), cfsync_core::ErrorKind::Permanent);
    }
}

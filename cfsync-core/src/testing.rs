//! In-memory adapter with call counters and injectable failures.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::adapter::{Created, ExternalAdapter};
use crate::error::{RemoteError, RemoteResult};

#[derive(Debug, Clone, Deserialize)]
pub struct FakeParams {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FakeObservation {
    pub id: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub create: u32,
    pub fetch: u32,
    pub update: u32,
    pub delete: u32,
}

impl Calls {
    pub fn total(&self) -> u32 {
        self.create + self.fetch + self.update + self.delete
    }
}

#[derive(Default)]
struct FakeState {
    objects: HashMap<String, Option<String>>,
    next_id: Option<String>,
    counter: u32,
    calls: Calls,
    create_err: Option<RemoteError>,
    fetch_err: Option<RemoteError>,
    update_err: Option<RemoteError>,
    delete_err: Option<RemoteError>,
    delay: Option<Duration>,
}

/// Fake remote service shared between clones.
#[derive(Clone, Default)]
pub struct FakeAdapter {
    state: Arc<Mutex<FakeState>>,
}

impl FakeAdapter {
    fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn insert(&self, id: &str, value: &str) {
        self.with(|s| s.objects.insert(id.to_string(), Some(value.to_string())));
    }

    /// Insert an object whose value the remote does not report.
    pub fn insert_opaque(&self, id: &str) {
        self.with(|s| s.objects.insert(id.to_string(), None));
    }

    pub fn remove(&self, id: &str) {
        self.with(|s| s.objects.remove(id));
    }

    pub fn value_of(&self, id: &str) -> Option<String> {
        self.with(|s| s.objects.get(id).cloned().flatten())
    }

    pub fn exists(&self, id: &str) -> bool {
        self.with(|s| s.objects.contains_key(id))
    }

    pub fn set_next_id(&self, id: &str) {
        self.with(|s| s.next_id = Some(id.to_string()));
    }

    pub fn set_delay(&self, delay: Duration) {
        self.with(|s| s.delay = Some(delay));
    }

    pub fn fail_next_create(&self, err: RemoteError) {
        self.with(|s| s.create_err = Some(err));
    }

    pub fn fail_next_fetch(&self, err: RemoteError) {
        self.with(|s| s.fetch_err = Some(err));
    }

    pub fn fail_next_update(&self, err: RemoteError) {
        self.with(|s| s.update_err = Some(err));
    }

    pub fn fail_next_delete(&self, err: RemoteError) {
        self.with(|s| s.delete_err = Some(err));
    }

    pub fn calls(&self) -> Calls {
        self.with(|s| s.calls)
    }

    async fn pause(&self) {
        if let Some(delay) = self.with(|s| s.delay) {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ExternalAdapter for FakeAdapter {
    type Params = FakeParams;
    type Observation = FakeObservation;

    async fn create(&self, params: &FakeParams) -> RemoteResult<Created<FakeObservation>> {
        self.pause().await;
        self.with(|s| {
            s.calls.create += 1;
            if let Some(err) = s.create_err.take() {
                return Err(err);
            }
            s.counter += 1;
            let id = s
                .next_id
                .take()
                .unwrap_or_else(|| format!("fake-{}", s.counter));
            if !id.is_empty() {
                s.objects.insert(id.clone(), Some(params.value.clone()));
            }
            Ok(Created {
                external_name: id.clone(),
                observation: FakeObservation {
                    id,
                    value: Some(params.value.clone()),
                },
            })
        })
    }

    async fn fetch(&self, external_name: &str, _params: &FakeParams) -> RemoteResult<FakeObservation> {
        self.pause().await;
        self.with(|s| {
            s.calls.fetch += 1;
            if let Some(err) = s.fetch_err.take() {
                return Err(err);
            }
            match s.objects.get(external_name) {
                Some(value) => Ok(FakeObservation {
                    id: external_name.to_string(),
                    value: value.clone(),
                }),
                None => Err(RemoteError::not_found(external_name)),
            }
        })
    }

    async fn update(&self, external_name: &str, params: &FakeParams) -> RemoteResult<FakeObservation> {
        self.pause().await;
        self.with(|s| {
            s.calls.update += 1;
            if let Some(err) = s.update_err.take() {
                return Err(err);
            }
            match s.objects.get_mut(external_name) {
                Some(value) => {
                    *value = Some(params.value.clone());
                    Ok(FakeObservation {
                        id: external_name.to_string(),
                        value: value.clone(),
                    })
                }
                None => Err(RemoteError::not_found(external_name)),
            }
        })
    }

    async fn delete(&self, external_name: &str, _params: &FakeParams) -> RemoteResult<()> {
        self.pause().await;
        self.with(|s| {
            s.calls.delete += 1;
            if let Some(err) = s.delete_err.take() {
                return Err(err);
            }
            s.objects.remove(external_name);
            Ok(())
        })
    }

    fn is_up_to_date(&self, params: &FakeParams, observation: &FakeObservation) -> bool {
        observation.value.as_deref() == Some(params.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(v: &str) -> FakeParams {
        FakeParams {
            value: v.to_string(),
        }
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let adapter = FakeAdapter::default();
        adapter.insert("abc123", "v1");

        assert!(adapter.delete("abc123", &params("v1")).await.is_ok());
        assert!(adapter.delete("abc123", &params("v1")).await.is_ok());
        assert!(!adapter.exists("abc123"));
        assert_eq!(adapter.calls().delete, 2);
    }

    #[test]
    fn test_unverifiable_field_is_drift() {
        let adapter = FakeAdapter::default();
        let obs = FakeObservation {
            id: "abc123".to_string(),
            value: None,
        };
        assert!(!adapter.is_up_to_date(&params("v1"), &obs));
    }
}

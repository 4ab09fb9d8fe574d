//! In-memory resource store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use super::error::{Result, StoreError};
use super::event::Event;
use super::traits::ResourceStore;
use crate::identity::{EXTERNAL_NAME_ANNOTATION, external_name, set_external_name};
use crate::resource::{DeclaredResource, ResourceKey};

/// Capacity of the change-notification channel.
const EVENT_CAPACITY: usize = 256;

/// Declared resources held in memory, with broadcast change notification.
pub struct MemoryStore {
    resources: RwLock<BTreeMap<ResourceKey, DeclaredResource>>,
    events: broadcast::Sender<Event>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_resources(Vec::new())
    }

    /// Seed the store without emitting events.
    pub fn with_resources(resources: Vec<DeclaredResource>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let map = resources.into_iter().map(|r| (r.key(), r)).collect();
        Self {
            resources: RwLock::new(map),
            events,
        }
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn list(&self) -> Result<Vec<DeclaredResource>> {
        Ok(self.resources.read().await.values().cloned().collect())
    }

    async fn list_kind(&self, kind: &str) -> Result<Vec<DeclaredResource>> {
        Ok(self
            .resources
            .read()
            .await
            .values()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect())
    }

    async fn get(&self, key: &ResourceKey) -> Result<Option<DeclaredResource>> {
        Ok(self.resources.read().await.get(key).cloned())
    }

    async fn apply(&self, resource: DeclaredResource) -> Result<DeclaredResource> {
        let key = resource.key();
        let mut resources = self.resources.write().await;

        let Some(existing) = resources.get_mut(&key) else {
            debug!(resource = %key, "Declared resource created");
            resources.insert(key.clone(), resource.clone());
            drop(resources);
            self.emit(Event::Applied(key));
            return Ok(resource);
        };

        if existing.deletion_requested() {
            return Err(StoreError::Conflict(format!("{} is being deleted", key)));
        }

        // The binding is controller-owned; keep the stored one.
        let binding = external_name(existing).to_string();
        let mut annotations = resource.metadata.annotations;
        annotations.remove(EXTERNAL_NAME_ANNOTATION);

        let spec_changed = existing.spec != resource.spec;
        let annotations_changed = {
            let mut current = existing.metadata.annotations.clone();
            current.remove(EXTERNAL_NAME_ANNOTATION);
            current != annotations
        };

        if spec_changed {
            existing.spec = resource.spec;
            existing.metadata.generation += 1;
        }
        existing.metadata.annotations = annotations;
        set_external_name(existing, &binding);

        let updated = existing.clone();
        drop(resources);

        if spec_changed || annotations_changed {
            debug!(resource = %key, generation = updated.metadata.generation, "Declared resource updated");
            self.emit(Event::Applied(key));
        }
        Ok(updated)
    }

    async fn request_deletion(&self, key: &ResourceKey) -> Result<DeclaredResource> {
        let mut resources = self.resources.write().await;
        let existing = resources
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        let changed = !existing.metadata.deletion_requested;
        existing.metadata.deletion_requested = true;
        let updated = existing.clone();
        drop(resources);

        if changed {
            self.emit(Event::DeletionRequested(key.clone()));
        }
        Ok(updated)
    }

    async fn save(&self, resource: &DeclaredResource) -> Result<DeclaredResource> {
        let key = resource.key();
        let mut resources = self.resources.write().await;
        let existing = resources
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        set_external_name(existing, external_name(resource));
        existing.status = resource.status.clone();
        let updated = existing.clone();
        drop(resources);

        self.emit(Event::StatusSaved(key));
        Ok(updated)
    }

    async fn remove(&self, key: &ResourceKey) -> Result<()> {
        let mut resources = self.resources.write().await;
        match resources.get(key) {
            None => return Err(StoreError::NotFound(key.to_string())),
            Some(r) if !r.deletion_requested() => {
                return Err(StoreError::Conflict(format!(
                    "{} has no deletion intent",
                    key
                )));
            }
            Some(_) => {}
        }
        resources.remove(key);
        drop(resources);

        self.emit(Event::Removed(key.clone()));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}

//! ResourceStore trait definition.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::error::Result;
use super::event::Event;
use crate::resource::{DeclaredResource, ResourceKey};

/// Persistence and change notification for declared resources.
///
/// Writes are split by owner: users `apply` spec and `request_deletion`,
/// the controller `save`s status and identity binding and `remove`s
/// finalized resources.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// List all declared resources, ordered by key.
    async fn list(&self) -> Result<Vec<DeclaredResource>>;

    /// List declared resources of one kind.
    async fn list_kind(&self, kind: &str) -> Result<Vec<DeclaredResource>>;

    /// Get a declared resource by key.
    async fn get(&self, key: &ResourceKey) -> Result<Option<DeclaredResource>>;

    /// Create or update a declared resource's spec.
    ///
    /// Status and identity binding of an existing resource are preserved.
    /// The generation is bumped when the spec changes.
    async fn apply(&self, resource: DeclaredResource) -> Result<DeclaredResource>;

    /// Set the deletion intent.
    async fn request_deletion(&self, key: &ResourceKey) -> Result<DeclaredResource>;

    /// Persist the controller-owned fields: identity binding and status.
    async fn save(&self, resource: &DeclaredResource) -> Result<DeclaredResource>;

    /// Remove a resource whose deletion intent is set.
    async fn remove(&self, key: &ResourceKey) -> Result<()>;

    /// Subscribe to change events.
    fn subscribe(&self) -> broadcast::Receiver<Event>;
}

//! Change notifications emitted by the resource store.

use crate::resource::ResourceKey;

/// Events emitted when stored declared resources change.
///
/// These events are dispatched via broadcast channels to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A declared resource was created or its spec changed.
    Applied(ResourceKey),
    /// Deletion intent was set on a declared resource.
    DeletionRequested(ResourceKey),
    /// The controller wrote status or identity binding.
    StatusSaved(ResourceKey),
    /// A declared resource was removed from the store.
    Removed(ResourceKey),
}

impl Event {
    pub fn key(&self) -> &ResourceKey {
        match self {
            Event::Applied(k)
            | Event::DeletionRequested(k)
            | Event::StatusSaved(k)
            | Event::Removed(k) => k,
        }
    }

    /// Whether the event should trigger an immediate reconciliation.
    pub fn wants_reconcile(&self) -> bool {
        matches!(self, Event::Applied(_) | Event::DeletionRequested(_))
    }
}

//! Resource store abstraction.
//!
//! The store persists declared resources and notifies subscribers on change.
//! The dispatcher only depends on the [`ResourceStore`] trait.
//!
//! # Usage
//!
//! ```ignore
//! use cfsync_core::store::{MemoryStore, ResourceStore};
//!
//! let store = Arc::new(MemoryStore::new());
//! let mut events = store.subscribe();
//! store.apply(DeclaredResource::new("Zone", "example", params)).await?;
//! ```

mod error;
mod event;
mod memory;
mod traits;

pub use error::{Result, StoreError};
pub use event::Event;
pub use memory::MemoryStore;
pub use traits::ResourceStore;

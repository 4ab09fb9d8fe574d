pub mod adapter;
pub mod condition;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod identity;
pub mod recorder;
pub mod registry;
pub mod resource;
pub mod status;
pub mod store;

#[cfg(test)]
mod testing;

pub use adapter::{Created, ExternalAdapter};
pub use condition::{Condition, ConditionStatus, ConditionType, Reason};
pub use dispatcher::{DispatchError, Dispatcher, ReconcileReport};
pub use engine::{ConvergenceEngine, Decision, Observed, Outcome, Reconcile, Step, decide};
pub use error::{ErrorKind, RemoteError, RemoteResult};
pub use recorder::{AuditLevel, Recorder, TracingRecorder};
pub use registry::{AdapterRegistry, KindOptions, RegistryError};
pub use resource::{DeclaredResource, ResourceKey, ResourceMeta, ResourceSpec, ResourceStatus};
pub use store::{Event, MemoryStore, ResourceStore, StoreError};

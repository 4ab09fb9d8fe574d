//! Convergence engine - the observe, decide, act cycle for one declared resource.
//!
//! Each invocation is a single attempt with at most one mutating call
//! (create, update or delete). Nothing is retried in-process: a failed
//! invocation is recorded and the next scheduled pass tries again.
//!
//! ```text
//! Observing ──► NotExisting ────┐
//!          ├──► ExistingStale ──┼──► Acting ──► Done
//!          └──► ExistingCurrent ┘
//! ```

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapter::ExternalAdapter;
use crate::error::{RemoteError, RemoteResult};
use crate::identity::external_name;
use crate::resource::DeclaredResource;

/// Default deadline for a single adapter call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of the observe step.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed<O> {
    NotExisting,
    /// Exists but drifted from the declared parameters.
    Stale(O),
    /// Exists and matches the declared parameters.
    Current(O),
}

impl<O> Observed<O> {
    pub fn exists(&self) -> bool {
        !matches!(self, Observed::NotExisting)
    }

    pub fn into_inner(self) -> Option<O> {
        match self {
            Observed::NotExisting => None,
            Observed::Stale(o) | Observed::Current(o) => Some(o),
        }
    }
}

/// Corrective action chosen by [`decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Create,
    Update,
    Delete,
    /// Deletion requested and nothing exists remotely.
    Finalize,
    /// Exists and matches.
    NoOp,
}

/// Pick the corrective action.
///
/// Deletion intent always wins over a pending spec change.
pub fn decide<O>(deletion_requested: bool, observed: &Observed<O>) -> Decision {
    match (deletion_requested, observed) {
        (true, Observed::NotExisting) => Decision::Finalize,
        (true, _) => Decision::Delete,
        (false, Observed::NotExisting) => Decision::Create,
        (false, Observed::Stale(_)) => Decision::Update,
        (false, Observed::Current(_)) => Decision::NoOp,
    }
}

/// Step of the cycle an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Decoding the declared parameters.
    Decode,
    Observe,
    Create,
    Update,
    Delete,
}

/// Terminal outcome of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Remote object created and bound.
    Created {
        external_name: String,
        observation: Value,
    },
    /// Remote object exists and matches.
    UpToDate { observation: Value },
    /// Remote object existed with drift and was replaced.
    Updated { observation: Value },
    /// Remote object deleted; the declared resource may be removed.
    Deleted,
    /// Deletion requested but no remote object exists.
    NothingToDelete,
    /// The invocation stopped with an error at `step`.
    Failed { step: Step, error: RemoteError },
}

impl Outcome {
    /// Whether the declared resource can now be removed from the store.
    pub fn is_finalized(&self) -> bool {
        matches!(self, Outcome::Deleted | Outcome::NothingToDelete)
    }

    pub fn error(&self) -> Option<&RemoteError> {
        match self {
            Outcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Short label for logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Created { .. } => "created",
            Outcome::UpToDate { .. } => "up-to-date",
            Outcome::Updated { .. } => "updated",
            Outcome::Deleted => "deleted",
            Outcome::NothingToDelete => "nothing-to-delete",
            Outcome::Failed { .. } => "failed",
        }
    }
}

/// Type-erased reconciler, one per resource kind.
#[async_trait]
pub trait Reconcile: Send + Sync {
    /// Run one observe/decide/act invocation.
    async fn reconcile(&self, resource: &DeclaredResource, cancel: &CancellationToken) -> Outcome;
}

/// Convergence engine bound to one adapter.
pub struct ConvergenceEngine<A> {
    adapter: A,
    call_timeout: Duration,
}

impl<A: ExternalAdapter> ConvergenceEngine<A> {
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Set the deadline applied to each adapter call.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Run an adapter call under the invocation's cancellation and deadline.
    async fn call<T>(
        &self,
        cancel: &CancellationToken,
        fut: impl Future<Output = RemoteResult<T>>,
    ) -> RemoteResult<T> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RemoteError::transient("invocation cancelled")),
            res = tokio::time::timeout(self.call_timeout, fut) => match res {
                Ok(r) => r,
                Err(_) => Err(RemoteError::transient(format!(
                    "deadline of {}s exceeded",
                    self.call_timeout.as_secs()
                ))),
            },
        }
    }

    async fn observe(
        &self,
        ext: &str,
        params: &A::Params,
        cancel: &CancellationToken,
    ) -> RemoteResult<Observed<A::Observation>> {
        // Unbound means never created; skip the round trip.
        if ext.is_empty() {
            return Ok(Observed::NotExisting);
        }

        match self.call(cancel, self.adapter.fetch(ext, params)).await {
            Ok(obs) if self.adapter.is_up_to_date(params, &obs) => Ok(Observed::Current(obs)),
            Ok(obs) => Ok(Observed::Stale(obs)),
            Err(e) if e.is_not_found() => {
                debug!(external_name = %ext, "Remote object not found");
                Ok(Observed::NotExisting)
            }
            Err(e) => Err(e),
        }
    }

    /// Run one invocation against `resource`.
    pub async fn run(&self, resource: &DeclaredResource, cancel: &CancellationToken) -> Outcome {
        let key = resource.key();
        let ext = external_name(resource).to_string();
        let deleting = resource.deletion_requested();

        if deleting && ext.is_empty() {
            debug!(resource = %key, "Deletion requested for unbound resource");
            return Outcome::NothingToDelete;
        }

        let params: A::Params = match serde_json::from_value(resource.spec.for_provider.clone()) {
            Ok(p) => p,
            Err(e) => {
                return Outcome::Failed {
                    step: Step::Decode,
                    error: RemoteError::permanent(format!("invalid parameters: {}", e)),
                };
            }
        };

        let observed = match self.observe(&ext, &params, cancel).await {
            Ok(o) => o,
            Err(error) => {
                return Outcome::Failed {
                    step: Step::Observe,
                    error,
                };
            }
        };

        let decision = decide(deleting, &observed);
        debug!(resource = %key, ?decision, "Decided");

        match decision {
            Decision::Finalize => Outcome::NothingToDelete,
            Decision::NoOp => Outcome::UpToDate {
                observation: observed.into_inner().map_or(Value::Null, |o| encode(&o)),
            },
            Decision::Create => {
                info!(resource = %key, "Creating remote object");
                match self.call(cancel, self.adapter.create(&params)).await {
                    Ok(created) if created.external_name.is_empty() => Outcome::Failed {
                        step: Step::Create,
                        error: RemoteError::permanent("adapter returned an empty identifier"),
                    },
                    Ok(created) => Outcome::Created {
                        external_name: created.external_name,
                        observation: encode(&created.observation),
                    },
                    Err(error) => Outcome::Failed {
                        step: Step::Create,
                        error,
                    },
                }
            }
            Decision::Update => {
                info!(resource = %key, external_name = %ext, "Updating remote object");
                match self.call(cancel, self.adapter.update(&ext, &params)).await {
                    Ok(obs) => Outcome::Updated {
                        observation: encode(&obs),
                    },
                    Err(error) => Outcome::Failed {
                        step: Step::Update,
                        error,
                    },
                }
            }
            Decision::Delete => {
                info!(resource = %key, external_name = %ext, "Deleting remote object");
                match self.call(cancel, self.adapter.delete(&ext, &params)).await {
                    Ok(()) => Outcome::Deleted,
                    Err(error) => Outcome::Failed {
                        step: Step::Delete,
                        error,
                    },
                }
            }
        }
    }
}

#[async_trait]
impl<A: ExternalAdapter> Reconcile for ConvergenceEngine<A> {
    async fn reconcile(&self, resource: &DeclaredResource, cancel: &CancellationToken) -> Outcome {
        self.run(resource, cancel).await
    }
}

fn encode<O: Serialize>(obs: &O) -> Value {
    serde_json::to_value(obs).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to encode observation");
        Value::Null
    })
}

//! Dispatcher - schedules convergence invocations over the resource store.
//!
//! Invocations for one declared resource are serialized; invocations of one
//! kind are bounded by that kind's `max_concurrent`. Each kind is polled on
//! its own interval, and store change events trigger an immediate pass.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::Outcome;
use crate::error::RemoteError;
use crate::identity::is_bound;
use crate::recorder::{AuditLevel, Recorder};
use crate::registry::{AdapterRegistry, RegistryError};
use crate::resource::{DeclaredResource, ResourceKey};
use crate::status::{apply_outcome, apply_unsupported};
use crate::store::{Event, ResourceStore, StoreError};

/// Dispatch errors. Remote failures are not errors here; they end up in
/// the resource's status.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("declared resource not found: {0}")]
    NotFound(ResourceKey),

    #[error("cancelled while waiting for a worker slot")]
    Cancelled,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result of one dispatched invocation.
#[derive(Debug, Clone)]
pub struct ReconcileReport {
    pub key: ResourceKey,
    /// `None` when the kind has no usable adapter.
    pub outcome: Option<Outcome>,
    /// The persisted resource, `None` once it was removed.
    pub resource: Option<DeclaredResource>,
}

impl ReconcileReport {
    pub fn removed(&self) -> bool {
        self.resource.is_none()
    }

    pub fn label(&self) -> &'static str {
        self.outcome.as_ref().map_or("unsupported", Outcome::label)
    }

    /// The remote error when the invocation ended in `Outcome::Failed`.
    pub fn failure(&self) -> Option<&RemoteError> {
        self.outcome.as_ref().and_then(Outcome::error)
    }
}

/// Schedules invocations of registered reconcilers.
pub struct Dispatcher {
    store: Arc<dyn ResourceStore>,
    registry: Arc<AdapterRegistry>,
    recorder: Arc<dyn Recorder>,
    key_locks: Mutex<HashMap<ResourceKey, Arc<Mutex<()>>>>,
    kind_permits: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        registry: Arc<AdapterRegistry>,
        recorder: Arc<dyn Recorder>,
    ) -> Self {
        Self {
            store,
            registry,
            recorder,
            key_locks: Mutex::new(HashMap::new()),
            kind_permits: Mutex::new(HashMap::new()),
        }
    }

    /// Run one invocation for `key` without an external cancellation signal.
    pub async fn reconcile(&self, key: &ResourceKey) -> Result<ReconcileReport, DispatchError> {
        self.reconcile_with(key, &CancellationToken::new()).await
    }

    /// Run one invocation for `key`, cancelled when `cancel` fires.
    pub async fn reconcile_with(
        &self,
        key: &ResourceKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, DispatchError> {
        let serial = self.key_lock(key).await.lock_owned().await;
        let result = self.reconcile_locked(key, cancel).await;
        drop(serial);

        if matches!(&result, Ok(report) if report.removed()) {
            self.forget_key_lock(key).await;
        }
        result
    }

    async fn reconcile_locked(
        &self,
        key: &ResourceKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, DispatchError> {
        // Load after taking the lock so the previous invocation's save is visible.
        let resource = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| DispatchError::NotFound(key.clone()))?;

        let entry = match self.registry.resolve(&key.kind) {
            Ok(entry) => entry,
            Err(e) => return self.mark_unsupported(resource, &e).await,
        };

        let semaphore = self.kind_permits(&key.kind, entry.options.max_concurrent).await;
        let permit = tokio::select! {
            _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
            p = semaphore.acquire_owned() => p.map_err(|_| DispatchError::Cancelled)?,
        };

        debug!(resource = %key, generation = resource.metadata.generation, "Reconciling");
        let outcome = entry.reconciler.reconcile(&resource, cancel).await;
        drop(permit);

        self.recorder.outcome(key, &outcome).await;

        if outcome.is_finalized() {
            self.store.remove(key).await?;
            info!(resource = %key, "Declared resource finalized and removed");
            return Ok(ReconcileReport {
                key: key.clone(),
                outcome: Some(outcome),
                resource: None,
            });
        }

        let projected = apply_outcome(resource, &outcome, Utc::now());
        let saved = match self.store.save(&projected).await {
            Ok(saved) => saved,
            Err(e) => {
                if let Outcome::Created { external_name, .. } = &outcome {
                    // The remote object exists but the binding is lost.
                    error!(
                        resource = %key,
                        external_name = %external_name,
                        "Failed to persist identity binding of created object: {}",
                        e
                    );
                }
                return Err(e.into());
            }
        };

        Ok(ReconcileReport {
            key: key.clone(),
            outcome: Some(outcome),
            resource: Some(saved),
        })
    }

    /// Run one invocation for every declared resource.
    pub async fn sweep(
        self: &Arc<Self>,
        cancel: &CancellationToken,
    ) -> Vec<Result<ReconcileReport, DispatchError>> {
        let resources = match self.store.list().await {
            Ok(r) => r,
            Err(e) => return vec![Err(e.into())],
        };
        self.reconcile_all(resources.iter().map(DeclaredResource::key), cancel)
            .await
    }

    /// Drive poll loops and change-notification handling until `shutdown`
    /// is cancelled. In-flight invocations observe the same token.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut loops = JoinSet::new();

        for (kind, entry) in self.registry.supported() {
            info!(
                kind = %kind,
                poll_interval_secs = entry.options.poll_interval.as_secs(),
                max_concurrent = entry.options.max_concurrent,
                "Starting poll loop"
            );
            loops.spawn(self.clone().poll_kind(
                kind.to_string(),
                entry.options.poll_interval,
                shutdown.clone(),
            ));
        }
        loops.spawn(self.clone().watch_events(shutdown.clone()));

        // Kinds without a poll loop are projected once at startup.
        let orphans: Vec<ResourceKey> = match self.store.list().await {
            Ok(resources) => resources
                .iter()
                .filter(|r| self.registry.resolve(&r.kind).is_err())
                .map(DeclaredResource::key)
                .collect(),
            Err(e) => {
                warn!("Failed to list declared resources: {}", e);
                Vec::new()
            }
        };
        for result in self.reconcile_all(orphans, &shutdown).await {
            log_result(result);
        }

        while loops.join_next().await.is_some() {}
        info!("Dispatcher stopped");
    }

    async fn poll_kind(self: Arc<Self>, kind: String, every: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let resources = match self.store.list_kind(&kind).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(kind = %kind, "Failed to list declared resources: {}", e);
                    continue;
                }
            };
            debug!(kind = %kind, count = resources.len(), "Poll pass");

            for result in self
                .reconcile_all(resources.iter().map(DeclaredResource::key), &shutdown)
                .await
            {
                log_result(result);
            }
        }
    }

    async fn watch_events(self: Arc<Self>, shutdown: CancellationToken) {
        let mut events = self.store.subscribe();
        let mut inflight = JoinSet::new();

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                ev = events.recv() => ev,
            };

            match event {
                Ok(ev) if ev.wants_reconcile() => {
                    let this = self.clone();
                    let cancel = shutdown.clone();
                    let key = ev.key().clone();
                    inflight.spawn(async move {
                        log_result(this.reconcile_with(&key, &cancel).await);
                    });
                }
                Ok(Event::Removed(key)) => self.forget_key_lock(&key).await,
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Change notifications lagged, resyncing all resources");
                    let this = self.clone();
                    let cancel = shutdown.clone();
                    inflight.spawn(async move {
                        for result in this.sweep(&cancel).await {
                            log_result(result);
                        }
                    });
                }
                Err(RecvError::Closed) => break,
            }

            while inflight.try_join_next().is_some() {}
        }

        while inflight.join_next().await.is_some() {}
    }

    async fn reconcile_all(
        self: &Arc<Self>,
        keys: impl IntoIterator<Item = ResourceKey>,
        cancel: &CancellationToken,
    ) -> Vec<Result<ReconcileReport, DispatchError>> {
        let mut batch = JoinSet::new();
        for key in keys {
            let this = self.clone();
            let cancel = cancel.clone();
            batch.spawn(async move { this.reconcile_with(&key, &cancel).await });
        }

        let mut results = Vec::new();
        while let Some(joined) = batch.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!("Invocation task failed: {}", e),
            }
        }
        results
    }

    async fn mark_unsupported(
        &self,
        resource: DeclaredResource,
        err: &RegistryError,
    ) -> Result<ReconcileReport, DispatchError> {
        let key = resource.key();

        // Never bound, so nothing remote to clean up.
        if resource.deletion_requested() && !is_bound(&resource) {
            self.store.remove(&key).await?;
            return Ok(ReconcileReport {
                key,
                outcome: None,
                resource: None,
            });
        }

        let message = err.to_string();
        self.recorder
            .record(AuditLevel::Warn, &key, message.clone())
            .await;

        let projected = apply_unsupported(resource, &message, Utc::now());
        let saved = self.store.save(&projected).await?;
        Ok(ReconcileReport {
            key,
            outcome: None,
            resource: Some(saved),
        })
    }

    async fn key_lock(&self, key: &ResourceKey) -> Arc<Mutex<()>> {
        self.key_locks
            .lock()
            .await
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Drop the lock entry for `key` unless an invocation still holds or
    /// waits on it. Waiters must keep sharing the mutex with later callers.
    async fn forget_key_lock(&self, key: &ResourceKey) {
        let mut locks = self.key_locks.lock().await;
        if locks.get(key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(key);
        }
    }

    async fn kind_permits(&self, kind: &str, max_concurrent: usize) -> Arc<Semaphore> {
        self.kind_permits
            .lock()
            .await
            .entry(kind.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(max_concurrent.max(1))))
            .clone()
    }
}

fn log_result(result: Result<ReconcileReport, DispatchError>) {
    match result {
        Ok(report) => debug!(resource = %report.key, outcome = report.label(), "Invocation finished"),
        // Removed between listing and locking.
        Err(DispatchError::NotFound(key)) => debug!(resource = %key, "Declared resource gone"),
        Err(DispatchError::Cancelled) => debug!("Invocation cancelled"),
        Err(e) => error!("Invocation failed: {}", e),
    }
}

//! Adapter registry - maps a resource kind to its reconciler.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::adapter::ExternalAdapter;
use crate::engine::{ConvergenceEngine, DEFAULT_CALL_TIMEOUT, Reconcile};

/// Default poll interval for a kind.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Default number of concurrent invocations per kind.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Scheduling options for one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindOptions {
    pub poll_interval: Duration,
    pub max_concurrent: usize,
    pub call_timeout: Duration,
}

impl Default for KindOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Registry lookup errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Nothing was ever registered for this kind.
    #[error("unknown kind: {0}")]
    UnknownKind(String),

    /// The kind is known but has no implementation.
    #[error("kind {kind} is not supported: {reason}")]
    Unsupported { kind: String, reason: String },
}

/// A registered, usable kind.
#[derive(Clone)]
pub struct KindEntry {
    pub reconciler: Arc<dyn Reconcile>,
    pub options: KindOptions,
}

#[derive(Clone)]
enum Slot {
    Supported(KindEntry),
    Unsupported(String),
}

/// Registry of reconcilers keyed by kind.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    kinds: BTreeMap<String, Slot>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter for `kind`, replacing any previous entry.
    pub fn register<A: ExternalAdapter>(
        &mut self,
        kind: impl Into<String>,
        adapter: A,
        options: KindOptions,
    ) -> &mut Self {
        let engine = ConvergenceEngine::new(adapter).with_call_timeout(options.call_timeout);
        self.register_reconciler(kind, Arc::new(engine), options)
    }

    /// Register an already type-erased reconciler.
    pub fn register_reconciler(
        &mut self,
        kind: impl Into<String>,
        reconciler: Arc<dyn Reconcile>,
        options: KindOptions,
    ) -> &mut Self {
        self.kinds.insert(
            kind.into(),
            Slot::Supported(KindEntry {
                reconciler,
                options,
            }),
        );
        self
    }

    /// Mark `kind` as known but not implemented.
    pub fn register_unsupported(
        &mut self,
        kind: impl Into<String>,
        reason: impl Into<String>,
    ) -> &mut Self {
        self.kinds.insert(kind.into(), Slot::Unsupported(reason.into()));
        self
    }

    /// Resolve the reconciler for `kind`.
    pub fn resolve(&self, kind: &str) -> Result<&KindEntry, RegistryError> {
        match self.kinds.get(kind) {
            Some(Slot::Supported(entry)) => Ok(entry),
            Some(Slot::Unsupported(reason)) => Err(RegistryError::Unsupported {
                kind: kind.to_string(),
                reason: reason.clone(),
            }),
            None => Err(RegistryError::UnknownKind(kind.to_string())),
        }
    }

    /// Kinds with a usable reconciler, with their options.
    pub fn supported(&self) -> impl Iterator<Item = (&str, &KindEntry)> {
        self.kinds.iter().filter_map(|(k, slot)| match slot {
            Slot::Supported(entry) => Some((k.as_str(), entry)),
            Slot::Unsupported(_) => None,
        })
    }

    /// Kinds registered as unsupported.
    pub fn unsupported(&self) -> impl Iterator<Item = &str> {
        self.kinds.iter().filter_map(|(k, slot)| match slot {
            Slot::Unsupported(_) => Some(k.as_str()),
            Slot::Supported(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeAdapter;

    #[test]
    fn test_resolve_supported() {
        let mut registry = AdapterRegistry::new();
        registry.register("Fake", FakeAdapter::default(), KindOptions::default());

        let entry = registry.resolve("Fake").unwrap();
        assert_eq!(entry.options.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert_eq!(entry.options.poll_interval, Duration::from_secs(600));
    }

    #[test]
    fn test_unsupported_is_distinct_from_unknown() {
        let mut registry = AdapterRegistry::new();
        registry.register_unsupported("Script", "worker scripts are not implemented");

        assert_eq!(
            registry.resolve("Script").err(),
            Some(RegistryError::Unsupported {
                kind: "Script".to_string(),
                reason: "worker scripts are not implemented".to_string(),
            })
        );
        assert_eq!(
            registry.resolve("Nope").err(),
            Some(RegistryError::UnknownKind("Nope".to_string()))
        );
    }

    #[test]
    fn test_listing() {
        let mut registry = AdapterRegistry::new();
        registry
            .register("Fake", FakeAdapter::default(), KindOptions::default())
            .register_unsupported("Script", "not implemented");

        let supported: Vec<_> = registry.supported().map(|(k, _)| k).collect();
        let unsupported: Vec<_> = registry.unsupported().collect();
        assert_eq!(supported, vec!["Fake"]);
        assert_eq!(unsupported, vec!["Script"]);
    }
}

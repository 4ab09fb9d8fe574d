//! Manifest loader - feeds the resource store from a declarations file.
//!
//! The manifest is a JSON array:
//!
//! ```text
//! [
//!   { "kind": "Zone",   "name": "example", "forProvider": { "name": "example.com" } },
//!   { "kind": "Record", "name": "www",     "forProvider": { "zone": "...", "name": "www", "content": "192.0.2.1" } }
//! ]
//! ```
//!
//! Each sync applies every declaration and turns resources that vanished
//! from the file into deletion intents. A file that cannot be read or
//! parsed changes nothing.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use cfsync_core::{DeclaredResource, ResourceKey, ResourceStore, StoreError};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One entry of the manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Declaration {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub for_provider: Value,
    /// Extra annotations. Setting the external-name annotation on a new
    /// declaration adopts an existing remote object.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl Declaration {
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.kind, &self.name)
    }

    fn into_resource(self) -> DeclaredResource {
        let mut res = DeclaredResource::new(self.kind, self.name, self.for_provider);
        res.metadata.annotations = self.annotations;
        res
    }
}

/// Read and validate a manifest file.
pub async fn load(path: &Path) -> Result<Vec<Declaration>> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let decls: Vec<Declaration> = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse manifest {}", path.display()))?;

    let mut seen = BTreeSet::new();
    for decl in &decls {
        if decl.kind.is_empty() || decl.name.is_empty() {
            bail!("manifest entry with empty kind or name");
        }
        if !seen.insert(decl.key()) {
            bail!("duplicate declaration {}", decl.key());
        }
    }
    Ok(decls)
}

/// What one sync changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub applied: usize,
    pub deletions: usize,
}

pub struct ManifestSync {
    store: Arc<dyn ResourceStore>,
    path: PathBuf,
}

impl ManifestSync {
    pub fn new(store: Arc<dyn ResourceStore>, path: PathBuf) -> Self {
        Self { store, path }
    }

    /// Apply the manifest once.
    pub async fn sync(&self) -> Result<SyncSummary> {
        let decls = load(&self.path).await?;
        let declared: BTreeSet<ResourceKey> = decls.iter().map(Declaration::key).collect();
        let mut summary = SyncSummary::default();

        for decl in decls {
            let key = decl.key();
            match self.store.apply(decl.into_resource()).await {
                Ok(_) => summary.applied += 1,
                Err(StoreError::Conflict(msg)) => {
                    // Re-declared while still deleting; picked up again once removed.
                    warn!(resource = %key, "Declaration not applied: {}", msg);
                }
                Err(e) => return Err(e).with_context(|| format!("failed to apply {}", key)),
            }
        }

        for res in self.store.list().await? {
            if res.deletion_requested() || declared.contains(&res.key()) {
                continue;
            }
            info!(resource = %res.key(), "Declaration removed from manifest, requesting deletion");
            self.store.request_deletion(&res.key()).await?;
            summary.deletions += 1;
        }

        debug!(applied = summary.applied, deletions = summary.deletions, "Manifest synced");
        Ok(summary)
    }

    /// Re-sync on an interval until `shutdown` fires.
    pub async fn run(self, every: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick is immediate and main already synced.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.sync().await {
                error!("Manifest sync failed: {:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfsync_core::MemoryStore;
    use cfsync_core::identity::external_name;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &TempDir, value: Value) -> PathBuf {
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
        path
    }

    #[tokio::test]
    async fn test_sync_applies_and_requests_deletion() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let path = write(
            &dir,
            json!([
                { "kind": "Zone", "name": "example", "forProvider": { "name": "example.com" } },
                { "kind": "Record", "name": "www", "forProvider": { "zone": "z1", "name": "www", "content": "192.0.2.1" } }
            ]),
        );
        let sync = ManifestSync::new(store.clone(), path.clone());

        let summary = sync.sync().await.unwrap();
        assert_eq!(summary, SyncSummary { applied: 2, deletions: 0 });
        assert_eq!(store.list().await.unwrap().len(), 2);

        write(
            &dir,
            json!([{ "kind": "Zone", "name": "example", "forProvider": { "name": "example.com" } }]),
        );
        let summary = sync.sync().await.unwrap();
        assert_eq!(summary.deletions, 1);

        let www = store.get(&ResourceKey::new("Record", "www")).await.unwrap().unwrap();
        assert!(www.deletion_requested());

        // Deletion intent is only requested once.
        assert_eq!(sync.sync().await.unwrap().deletions, 0);
    }

    #[tokio::test]
    async fn test_spec_change_bumps_generation() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let path = write(
            &dir,
            json!([{ "kind": "Zone", "name": "example", "forProvider": { "name": "example.com" } }]),
        );
        let sync = ManifestSync::new(store.clone(), path);
        sync.sync().await.unwrap();

        write(
            &dir,
            json!([{ "kind": "Zone", "name": "example", "forProvider": { "name": "example.com", "paused": true } }]),
        );
        sync.sync().await.unwrap();

        let zone = store.get(&ResourceKey::new("Zone", "example")).await.unwrap().unwrap();
        assert_eq!(zone.metadata.generation, 2);
    }

    #[tokio::test]
    async fn test_adoption_annotation() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let path = write(
            &dir,
            json!([{
                "kind": "Zone", "name": "example",
                "forProvider": { "name": "example.com" },
                "annotations": { "cfsync.io/external-name": "z-existing" }
            }]),
        );
        ManifestSync::new(store.clone(), path).sync().await.unwrap();

        let zone = store.get(&ResourceKey::new("Zone", "example")).await.unwrap().unwrap();
        assert_eq!(external_name(&zone), "z-existing");
    }

    #[tokio::test]
    async fn test_broken_manifest_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let path = write(
            &dir,
            json!([{ "kind": "Zone", "name": "example", "forProvider": { "name": "example.com" } }]),
        );
        let sync = ManifestSync::new(store.clone(), path.clone());
        sync.sync().await.unwrap();

        std::fs::write(&path, b"[{ not json").unwrap();
        assert!(sync.sync().await.is_err());
        let zone = store.get(&ResourceKey::new("Zone", "example")).await.unwrap().unwrap();
        assert!(!zone.deletion_requested());
    }

    #[tokio::test]
    async fn test_duplicate_declarations_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            json!([
                { "kind": "Zone", "name": "example", "forProvider": {} },
                { "kind": "Zone", "name": "example", "forProvider": {} }
            ]),
        );
        let err = load(&path).await.unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }
}

//! State file - persists declared resources with their status and bindings.
//!
//! Losing a binding means losing track of a remote object, so the file is
//! rewritten after every store change and restored at startup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use cfsync_core::{DeclaredResource, ResourceStore};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const STATE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    resources: Vec<DeclaredResource>,
}

/// Load resources from `path`. A missing file is an empty state.
pub async fn load(path: &Path) -> Result<Vec<DeclaredResource>> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No state file, starting empty");
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read state file {}", path.display()));
        }
    };

    let state: StateFile = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse state file {}", path.display()))?;
    if state.version != STATE_VERSION {
        bail!(
            "state file {} has version {}, expected {}",
            path.display(),
            state.version,
            STATE_VERSION
        );
    }
    info!(path = %path.display(), resources = state.resources.len(), "Restored state");
    Ok(state.resources)
}

/// Write resources to `path` atomically (temp file + rename).
pub async fn save(path: &Path, resources: Vec<DeclaredResource>) -> Result<()> {
    let state = StateFile {
        version: STATE_VERSION,
        resources,
    };
    let data = serde_json::to_vec_pretty(&state).context("failed to encode state")?;

    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, &data)
        .await
        .with_context(|| format!("failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn snapshot(store: &dyn ResourceStore, path: &Path) {
    let resources = match store.list().await {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to list resources for state file: {}", e);
            return;
        }
    };
    let count = resources.len();
    match save(path, resources).await {
        Ok(()) => debug!(path = %path.display(), resources = count, "State saved"),
        Err(e) => error!("Failed to save state: {:#}", e),
    }
}

/// Rewrite the state file on every store change until `shutdown`, then
/// write a final snapshot.
pub async fn persist(store: Arc<dyn ResourceStore>, path: PathBuf, shutdown: CancellationToken) {
    let mut events = store.subscribe();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            ev = events.recv() => match ev {
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => warn!(missed, "State persister lagged"),
                Err(RecvError::Closed) => break,
            },
        }
        // Coalesce a burst of events into one write.
        while events.try_recv().is_ok() {}
        snapshot(store.as_ref(), &path).await;
    }

    snapshot(store.as_ref(), &path).await;
}

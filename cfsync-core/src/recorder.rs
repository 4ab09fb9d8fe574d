//! Audit trail of reconciliation outcomes.
//!
//! Every outcome that changes remote state or fails is written to the
//! `audit` tracing target, so operators can filter it separately from the
//! regular service log.

use async_trait::async_trait;

use crate::engine::Outcome;
use crate::resource::ResourceKey;

/// Audit severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl AuditLevel {
    /// Severity for an outcome. Quiet no-ops stay at debug.
    pub fn for_outcome(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::UpToDate { .. } | Outcome::NothingToDelete => AuditLevel::Debug,
            Outcome::Created { .. } | Outcome::Updated { .. } | Outcome::Deleted => {
                AuditLevel::Info
            }
            Outcome::Failed { error, .. } if error.is_transient() => AuditLevel::Warn,
            Outcome::Failed { .. } => AuditLevel::Error,
        }
    }
}

/// Sink for reconciliation audit events.
#[async_trait]
pub trait Recorder: Send + Sync {
    async fn record(&self, level: AuditLevel, key: &ResourceKey, message: String);

    /// Record the outcome of one invocation.
    async fn outcome(&self, key: &ResourceKey, outcome: &Outcome) {
        let message = match outcome {
            Outcome::Created { external_name, .. } => {
                format!("Created remote object {}", external_name)
            }
            Outcome::UpToDate { .. } => "Remote object up to date".to_string(),
            Outcome::Updated { .. } => "Updated remote object".to_string(),
            Outcome::Deleted => "Deleted remote object".to_string(),
            Outcome::NothingToDelete => "Nothing to delete".to_string(),
            Outcome::Failed { step, error } => format!("{:?} failed: {}", step, error),
        };
        self.record(AuditLevel::for_outcome(outcome), key, message)
            .await;
    }
}

/// Recorder writing to the `audit` tracing target.
pub struct TracingRecorder {
    component: String,
}

impl TracingRecorder {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
        }
    }
}

#[async_trait]
impl Recorder for TracingRecorder {
    async fn record(&self, level: AuditLevel, key: &ResourceKey, message: String) {
        let resource = key.to_string();
        match level {
            AuditLevel::Debug => {
                tracing::debug!(target: "audit", component = %self.component, %resource, "{}", message)
            }
            AuditLevel::Info => {
                tracing::info!(target: "audit", component = %self.component, %resource, "{}", message)
            }
            AuditLevel::Warn => {
                tracing::warn!(target: "audit", component = %self.component, %resource, "{}", message)
            }
            AuditLevel::Error => {
                tracing::error!(target: "audit", component = %self.component, %resource, "{}", message)
            }
        }
    }
}

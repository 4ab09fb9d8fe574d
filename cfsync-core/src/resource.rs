//! Declared resource model.
//!
//! A declared resource is the user-authored desired state for exactly one
//! remote object. Parameters and observations are kind-specific and kept as
//! JSON here; adapters decode them into their own types.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::{Condition, ConditionType, find_condition};

/// Store key of a declared resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Metadata of a declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    pub name: String,
    pub uid: String,
    /// Incremented every time the spec changes.
    #[serde(default)]
    pub generation: u64,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Deletion intent. Once set the remote object is deleted before the
    /// declared resource is removed from the store.
    #[serde(default)]
    pub deletion_requested: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// Kind-specific parameters.
    #[serde(default)]
    pub for_provider: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    /// Last observation of the remote object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_provider: Option<Value>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub observed_generation: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconcile_time: Option<DateTime<Utc>>,
}

/// Desired state for one remote object of a given kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredResource {
    pub kind: String,
    pub metadata: ResourceMeta,
    pub spec: ResourceSpec,
    #[serde(default)]
    pub status: ResourceStatus,
}

impl DeclaredResource {
    /// Create a new declared resource with empty status and no binding.
    pub fn new(kind: impl Into<String>, name: impl Into<String>, for_provider: Value) -> Self {
        Self {
            kind: kind.into(),
            metadata: ResourceMeta {
                name: name.into(),
                uid: uuid::Uuid::new_v4().to_string(),
                generation: 1,
                annotations: BTreeMap::new(),
                deletion_requested: false,
                created_at: Utc::now(),
            },
            spec: ResourceSpec { for_provider },
            status: ResourceStatus::default(),
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.kind.clone(), self.metadata.name.clone())
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn deletion_requested(&self) -> bool {
        self.metadata.deletion_requested
    }

    pub fn condition(&self, type_: ConditionType) -> Option<&Condition> {
        find_condition(&self.status.conditions, type_)
    }

    /// Ready=True and Synced=True.
    pub fn is_converged(&self) -> bool {
        let ready = self.condition(ConditionType::Ready).is_some_and(|c| c.is_true());
        let synced = self
            .condition(ConditionType::Synced)
            .is_some_and(|c| c.is_true());
        ready && synced
    }
}

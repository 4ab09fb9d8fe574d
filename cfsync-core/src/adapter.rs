//! Remote resource adapter interface.
//!
//! One implementation exists per resource kind. The engine is written once
//! against this trait and never against a concrete kind.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::RemoteResult;

/// Result of a successful create.
#[derive(Debug, Clone, PartialEq)]
pub struct Created<O> {
    /// Identifier to bind to the declared resource.
    pub external_name: String,
    pub observation: O,
}

/// Kind-specific translation between declared parameters and the remote API.
#[async_trait]
pub trait ExternalAdapter: Send + Sync + 'static {
    /// Declared parameters (the resource's `forProvider` block).
    type Params: DeserializeOwned + Send + Sync;
    /// Decoded remote object, projected into `status.atProvider`.
    type Observation: Serialize + Send + Sync;

    /// Create the remote object. Only called when no binding exists.
    async fn create(&self, params: &Self::Params) -> RemoteResult<Created<Self::Observation>>;

    /// Fetch the remote object. Fails with `NotFound` when it is absent.
    async fn fetch(
        &self,
        external_name: &str,
        params: &Self::Params,
    ) -> RemoteResult<Self::Observation>;

    /// Replace all mutable fields of the remote object.
    async fn update(
        &self,
        external_name: &str,
        params: &Self::Params,
    ) -> RemoteResult<Self::Observation>;

    /// Delete the remote object. Succeeds when it is already absent.
    async fn delete(&self, external_name: &str, params: &Self::Params) -> RemoteResult<()>;

    /// Whether the remote object matches the declared parameters.
    ///
    /// Must return `false` for any field that cannot be compared.
    fn is_up_to_date(&self, params: &Self::Params, observation: &Self::Observation) -> bool;
}

//! Per-kind adapters.
//!
//! Each adapter translates one kind's declared parameters into v4 API calls
//! and decodes responses into an observation. Errors carry the failing
//! operation as context, e.g. `transient: cannot create zone: HTTP 503: ...`.

mod dns;
mod kv_namespace;
mod route;
mod zone;

pub use dns::{RecordAdapter, RecordObservation, RecordParams, TlsaData, parse_tlsa};
pub use kv_namespace::{KvNamespaceAdapter, KvNamespaceObservation, KvNamespaceParams};
pub use route::{RouteAdapter, RouteObservation, RouteParams};
pub use zone::{ZoneAdapter, ZoneObservation, ZoneParams};

use cfsync_core::RemoteError;

use crate::client::ApiError;

/// Convert an API error, prefixing what was being attempted.
fn api_err(ctx: &'static str) -> impl Fn(ApiError) -> RemoteError {
    move |err| RemoteError::from(err).context(ctx)
}

/// Declared optional value matches the observed one. A declared value with
/// no observed counterpart is drift; an undeclared value is not compared.
fn opt_matches<T: PartialEq>(declared: Option<&T>, observed: Option<&T>) -> bool {
    match declared {
        None => true,
        Some(d) => observed == Some(d),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opt_matches() {
        assert!(opt_matches::<u32>(None, None));
        assert!(opt_matches(None, Some(&1)));
        assert!(opt_matches(Some(&1), Some(&1)));
        assert!(!opt_matches(Some(&1), Some(&2)));
        assert!(!opt_matches(Some(&1), None));
    }
}

//! Cloudflare adapters for the cfsync convergence engine.
//!
//! ```text
//! AdapterRegistry
//!   ├── Zone         ──► ZoneAdapter        ──┐
//!   ├── Record       ──► RecordAdapter      ──┤
//!   ├── Route        ──► RouteAdapter       ──┼──► CloudflareClient ──► api.cloudflare.com
//!   ├── KVNamespace  ──► KvNamespaceAdapter ──┘
//!   └── LoadBalancer, Ruleset, ...  (unsupported)
//! ```

pub mod account;
pub mod adapters;
pub mod client;

use std::sync::Arc;

use cfsync_core::{AdapterRegistry, KindOptions};

pub use account::AccountResolver;
pub use adapters::{KvNamespaceAdapter, RecordAdapter, RouteAdapter, ZoneAdapter};
pub use client::{ApiError, CloudflareClient, DEFAULT_BASE_URL};

pub const KIND_ZONE: &str = "Zone";
pub const KIND_RECORD: &str = "Record";
pub const KIND_ROUTE: &str = "Route";
pub const KIND_KV_NAMESPACE: &str = "KVNamespace";

/// Kinds that are recognised but have no adapter.
pub const UNSUPPORTED_KINDS: &[&str] = &[
    "LoadBalancer",
    "LoadBalancerPool",
    "LoadBalancerMonitor",
    "CacheRule",
    "Ruleset",
    "RateLimit",
    "Script",
    "Domain",
    "Subdomain",
    "CronTrigger",
];

/// Register every Cloudflare kind with the same scheduling options.
pub fn register_all(
    registry: &mut AdapterRegistry,
    client: CloudflareClient,
    accounts: Arc<AccountResolver>,
    options: KindOptions,
) {
    registry
        .register(
            KIND_ZONE,
            ZoneAdapter::new(client.clone(), accounts.clone()),
            options,
        )
        .register(KIND_RECORD, RecordAdapter::new(client.clone()), options)
        .register(KIND_ROUTE, RouteAdapter::new(client.clone()), options)
        .register(
            KIND_KV_NAMESPACE,
            KvNamespaceAdapter::new(client, accounts),
            options,
        );

    for kind in UNSUPPORTED_KINDS {
        registry.register_unsupported(*kind, "no adapter is implemented for this kind");
    }
}

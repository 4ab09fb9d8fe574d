//! cfsync-node: drives Cloudflare resources toward a declared manifest.
//!
//! This daemon:
//! - Loads declarations from a manifest file and re-reads it periodically
//! - Restores identity bindings and status from a state file
//! - Reconciles each declared resource on a per-kind poll interval and on change
//! - Persists bindings and status after every change

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use cfsync_cloudflare::{AccountResolver, CloudflareClient, DEFAULT_BASE_URL, register_all};
use cfsync_core::{
    AdapterRegistry, DispatchError, Dispatcher, KindOptions, MemoryStore, ReconcileReport,
    ResourceStore, TracingRecorder,
};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod manifest;
mod state_file;
mod status;

use manifest::ManifestSync;

/// cfsync node
#[derive(Parser, Debug)]
#[command(name = "cfsync-node", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the reconciliation daemon
    Run(RunArgs),
    /// Reconcile every declared resource once and exit
    Once(RunArgs),
    /// Show declared resources from the state file
    Status {
        /// State file with bindings and status
        #[arg(long, default_value = "cfsync-state.json")]
        state_file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Cloudflare API token
    #[arg(long, env = "CLOUDFLARE_API_TOKEN", hide_env_values = true)]
    api_token: String,

    /// Account id for account-scoped kinds (discovered if not set)
    #[arg(long, env = "CLOUDFLARE_ACCOUNT_ID")]
    account_id: Option<String>,

    /// Cloudflare API base URL
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    api_base_url: String,

    /// Declarations file
    #[arg(long, default_value = "cfsync.json")]
    manifest: PathBuf,

    /// State file with bindings and status
    #[arg(long, default_value = "cfsync-state.json")]
    state_file: PathBuf,

    /// Manifest reload interval in seconds
    #[arg(long, default_value = "15")]
    sync_interval: u64,

    /// Per-kind poll interval in seconds
    #[arg(long, default_value = "600")]
    poll_interval: u64,

    /// Concurrent invocations per kind
    #[arg(long, default_value = "5")]
    max_concurrent: usize,

    /// Deadline for a single API call in seconds
    #[arg(long, default_value = "30")]
    call_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "cfsync_node=info,cfsync_core=info,cfsync_cloudflare=info,reqwest=warn,hyper=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => run(args, false).await,
        Command::Once(args) => run(args, true).await,
        Command::Status { state_file } => status::print(&state_file).await,
    }
}

async fn run(args: RunArgs, once: bool) -> Result<()> {
    if args.max_concurrent == 0 {
        bail!("--max-concurrent must be at least 1");
    }

    info!("Starting cfsync-node");
    info!("API base URL: {}", args.api_base_url);
    info!("Manifest: {}", args.manifest.display());

    let client = CloudflareClient::new(&args.api_token, &args.api_base_url)
        .context("failed to build Cloudflare client")?;
    let accounts = Arc::new(AccountResolver::new(client.clone(), args.account_id.clone()));

    let options = KindOptions {
        poll_interval: Duration::from_secs(args.poll_interval),
        max_concurrent: args.max_concurrent,
        call_timeout: Duration::from_secs(args.call_timeout),
    };
    let mut registry = AdapterRegistry::new();
    register_all(&mut registry, client, accounts, options);

    let restored = state_file::load(&args.state_file).await?;
    let store: Arc<dyn ResourceStore> = Arc::new(MemoryStore::with_resources(restored));

    let recorder = Arc::new(TracingRecorder::new("cfsync-node"));
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), Arc::new(registry), recorder));

    let manifest = ManifestSync::new(store.clone(), args.manifest.clone());
    let summary = manifest.sync().await?;
    info!(
        applied = summary.applied,
        deletions = summary.deletions,
        "Manifest loaded"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    if once {
        let failed = report_sweep(dispatcher.sweep(&shutdown).await);
        state_file::save(&args.state_file, store.list().await?).await?;
        if failed > 0 {
            bail!("{} invocation(s) failed", failed);
        }
        return Ok(());
    }

    let persister = tokio::spawn(state_file::persist(
        store.clone(),
        args.state_file.clone(),
        shutdown.clone(),
    ));
    let reloader = tokio::spawn(manifest.run(
        Duration::from_secs(args.sync_interval),
        shutdown.clone(),
    ));

    dispatcher.run(shutdown.clone()).await;

    if let Err(e) = reloader.await {
        warn!("Manifest reloader ended abnormally: {}", e);
    }
    if let Err(e) = persister.await {
        warn!("State persister ended abnormally: {}", e);
    }

    info!("cfsync-node stopped");
    Ok(())
}

/// Log the results of a sweep and count the invocations that failed,
/// including those whose remote call failed.
fn report_sweep(results: Vec<Result<ReconcileReport, DispatchError>>) -> usize {
    let mut failed = 0;
    for result in results {
        match result {
            Ok(report) => match report.failure() {
                Some(e) if e.is_transient() => {
                    failed += 1;
                    warn!(resource = %report.key, "Reconcile failed: {}", e);
                }
                Some(e) => {
                    failed += 1;
                    error!(resource = %report.key, "Reconcile failed: {}", e);
                }
                None => info!(resource = %report.key, outcome = report.label(), "Reconciled"),
            },
            Err(e) => {
                failed += 1;
                error!("Invocation failed: {}", e);
            }
        }
    }
    failed
}

/// Cancel `shutdown` on ctrl-c or SIGTERM.
async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown requested");
    shutdown.cancel();
}

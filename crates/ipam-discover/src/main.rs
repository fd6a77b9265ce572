//! CLI entry point for the ipam-discover daemon.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use ipam_core::{InventoryStore, MemoryStore, RangeId};
use ipam_graph::{GraphClient, GraphConfig, GraphStore};

use ipam_discover::config::{DiscoverConfig, SettingsSource, StoreBackend};
use ipam_discover::health::HealthMonitor;
use ipam_discover::probe::ProbeEngine;
use ipam_discover::reconcile::{InventoryReconciler, RangeOutcome};
use ipam_discover::resolver::NameResolver;
use ipam_discover::scanner::NmapScanner;
use ipam_discover::scheduler::Scheduler;
use ipam_discover::settings::{FileSettings, GraphSettings, SettingsProvider};

#[derive(Parser)]
#[command(name = "ipam-discover")]
#[command(about = "Network discovery for the IPAM inventory")]
struct Cli {
    /// Run discovery cycles forever.
    #[arg(long, conflicts_with_all = ["once", "purge_days"])]
    daemon: bool,

    /// Run a single discovery cycle and exit.
    #[arg(long, conflicts_with = "purge_days")]
    once: bool,

    /// With --once, scan only this address range (UUID).
    #[arg(long, requires = "once")]
    range: Option<String>,

    /// Delete discovered hosts not seen for this many days, then exit.
    #[arg(long)]
    purge_days: Option<u32>,

    /// Config file prefix (default: ipam).
    #[arg(short, long, default_value = "ipam")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let discover_config = load_discover_config(&cli.config)?;

    let needs_graph = discover_config.store == StoreBackend::Graph
        || discover_config.settings_source == SettingsSource::Graph;
    let graph = if needs_graph {
        let graph_config = load_graph_config(&cli.config);
        let client = GraphClient::connect(&graph_config).await?;
        client.ensure_schema().await?;
        Some(GraphStore::new(client))
    } else {
        None
    };

    let store: Arc<dyn InventoryStore> = match (discover_config.store, &graph) {
        (StoreBackend::Graph, Some(g)) => Arc::new(g.clone()),
        _ => {
            tracing::warn!("Using in-memory inventory; nothing persists past this process");
            Arc::new(MemoryStore::new())
        }
    };

    if let Some(days) = cli.purge_days {
        let cutoff = Utc::now() - TimeDelta::days(i64::from(days));
        let purged = store.purge_discovered(cutoff).await?;
        tracing::info!(days, purged, "Purged stale discovered hosts");
        return Ok(());
    }

    let settings: Arc<dyn SettingsProvider> = match (discover_config.settings_source, &graph) {
        (SettingsSource::Graph, Some(g)) => Arc::new(GraphSettings::new(g.clone())),
        _ => Arc::new(FileSettings::new(&cli.config)),
    };

    let scanner = NmapScanner::new(
        &discover_config.nmap_path,
        Duration::from_secs(discover_config.probe_deadline_secs),
    );
    let version = scanner.verify_installation().await?;
    tracing::info!(nmap_version = %version.lines().next().unwrap_or("").trim(), "Nmap verified");

    let scanner = Arc::new(scanner);
    let scheduler = Arc::new(Scheduler::new(
        settings,
        store.clone(),
        ProbeEngine::new(scanner.clone()),
        InventoryReconciler::new(store.clone(), NameResolver::new(scanner.clone())),
        HealthMonitor::new(store, scanner),
    ));

    if cli.once {
        match cli.range.as_deref() {
            Some(raw) => {
                let id = RangeId(Uuid::parse_str(raw)?);
                match scheduler.scan_range(&id).await? {
                    RangeOutcome::Completed { created, updated, .. } => {
                        tracing::info!(range = %id, created, updated, "Range scan complete");
                    }
                    RangeOutcome::Failed { error } => {
                        anyhow::bail!("Range {id} scan failed: {error}");
                    }
                }
            }
            None => {
                let report = scheduler.run_once().await;
                for failure in &report.failures {
                    tracing::warn!(cycle_id = %report.cycle_id, failure = ?failure, "Cycle failure");
                }
            }
        }
    } else if cli.daemon {
        let runner = scheduler.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        tokio::select! {
            res = handle => {
                if let Err(e) = res {
                    anyhow::bail!("Scheduler task ended unexpectedly: {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
            }
        }
    } else {
        anyhow::bail!("Specify --once (single cycle), --daemon (continuous) or --purge-days");
    }

    Ok(())
}

fn load_discover_config(file_prefix: &str) -> anyhow::Result<DiscoverConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("IPAM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<DiscoverConfig>("discover") {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => Ok(DiscoverConfig::default()),
        Err(e) => Err(e.into()),
    }
}

fn load_graph_config(file_prefix: &str) -> GraphConfig {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("IPAM")
                .separator("__")
                .try_parsing(true),
        )
        .build();

    let defaults = GraphConfig::default();
    match cfg {
        Ok(c) => GraphConfig {
            uri: c.get_string("neo4j.uri").unwrap_or(defaults.uri.clone()),
            user: c.get_string("neo4j.user").unwrap_or(defaults.user.clone()),
            password: c
                .get_string("neo4j.password")
                .unwrap_or(defaults.password.clone()),
            ..defaults
        },
        Err(_) => defaults,
    }
}

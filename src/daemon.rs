use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{error, info};
use uuid::Uuid;

use stratus_core::config;
use stratus_core::node::{HypervisorKind, Node};
use stratus_node::deploy::Instances;
use stratus_node::hypervisor::HelperHypervisor;
use stratus_node::routes::IpRouteOps;
use stratus_node::state::Snapshot;
use stratus_node::sync;
use stratus_store::database::Database;
use stratus_store::events::Broadcast;
use stratus_store::objectstore::ObjectStoreProvider;
use stratus_store::routes_cache::RouteCache;
use stratus_store::{nodes, storages};

const SYNC_INTERVAL: Duration = Duration::from_secs(90);

/// Node agent main loop: periodic reconcile ticks (snapshot assembly and
/// the reconciler walk run on a blocking thread), a slower image-sync
/// pass when an object-store client is wired in, and ctrl-c shutdown.
pub async fn run(
    interval_secs: u64,
    object_store: Option<Arc<dyn ObjectStoreProvider>>,
) -> Result<()> {
    let cfg = config::load()?;
    if cfg.node_id.is_empty() {
        bail!("daemon: Node ID not set. Run 'stratus reset-id' first.");
    }
    let node_id = Uuid::parse_str(&cfg.node_id).context("daemon: Invalid node ID")?;

    let db = Database::open(&cfg.mongo_uri);
    nodes::ensure(
        &db,
        &Node {
            id: node_id,
            name: cfg.node_id.clone(),
            zone: None,
            hypervisor: cfg.hypervisor,
            admin_domain: String::new(),
            cpu_units_res: 0,
            memory_units_res: 0.0,
        },
    )?;

    let events = Arc::new(Broadcast::new(64));
    let hypervisor = Arc::new(HelperHypervisor::default());
    let reconciler = Arc::new(Instances::new(
        db.clone(),
        node_id,
        cfg.hypervisor == HypervisorKind::Kvm,
        hypervisor.clone(),
        Arc::new(IpRouteOps),
        RouteCache::new(),
        events,
    ));

    info!(node_id = %node_id, interval = interval_secs, "daemon: Node agent starting");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut tick = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    let mut sync_tick = tokio::time::interval(SYNC_INTERVAL);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                let db = db.clone();
                let reconciler = Arc::clone(&reconciler);
                let provider = Arc::clone(&hypervisor);

                let result = tokio::task::spawn_blocking(move || -> Result<()> {
                    let snapshot = Snapshot::assemble(&db, node_id, provider.as_ref())?;
                    reconciler.deploy(&snapshot)
                })
                .await;

                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(error = %e, "daemon: Reconcile failed"),
                    Err(e) => error!(error = %e, "daemon: Reconcile task panicked"),
                }
            }
            _ = sync_tick.tick(), if object_store.is_some() => {
                if let Some(provider) = &object_store {
                    let db = db.clone();
                    let provider = Arc::clone(provider);

                    let result = tokio::task::spawn_blocking(move || {
                        sync_storages(&db, provider.as_ref())
                    })
                    .await;
                    if let Err(e) = result {
                        error!(error = %e, "daemon: Image sync task panicked");
                    }
                }
            }
            _ = &mut shutdown => {
                info!("daemon: Shutdown signal received, stopping");
                break;
            }
        }
    }

    Ok(())
}

/// One image-sync pass over every storage record. A failed storage does
/// not stop the others.
fn sync_storages(db: &Database, provider: &dyn ObjectStoreProvider) {
    let stores = match storages::get_all(db) {
        Ok(stores) => stores,
        Err(e) => {
            error!(error = %e, "daemon: Failed to list storages");
            return;
        }
    };

    for store in stores {
        if let Err(e) = sync::sync(db, provider, &store) {
            error!(
                storage_id = %store.id,
                error = %e,
                "daemon: Image sync failed"
            );
        }
    }
}

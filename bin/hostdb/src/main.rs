//! Renter host database runner.

mod cli;
mod config;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Result, WrapErr};
use renter_hostdb::{FileHostStore, HostDb, HostDbEntry, HostEvent, TcpProber};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::cli::HostDbCli;
use crate::config::FileConfig;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = HostDbCli::parse();
    logging::init_logging(&cli.logs)?;

    let file_config = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let mut hostdb_config = file_config.hostdb.clone();
    hostdb_config.allow_local_addresses |= cli.allow_local;

    let store = cli
        .store
        .clone()
        .or_else(|| file_config.store.clone())
        .map(FileHostStore::new_with_create_dir)
        .transpose()
        .wrap_err("failed to open host store")?;

    let (hostdb, scanner) = HostDb::builder(hostdb_config, TcpProber).build();

    if let Some(store) = &store {
        let loaded = hostdb
            .load_from_store(store)
            .wrap_err("failed to load hosts from store")?;
        info!(loaded, path = %store.path().display(), "loaded host registry");
    }

    let mut seeds = file_config.seed_hosts()?;
    seeds.extend(cli.hosts.iter().cloned());
    for seed in seeds {
        hostdb.insert_host(HostDbEntry::from(seed));
    }
    info!(
        hosts = hostdb.host_count(),
        pending = hostdb.pending_scans(),
        "host database ready"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scanner_handle = tokio::spawn(scanner.run(shutdown_rx.clone()));
    let reporter_handle = tokio::spawn(report_status(
        Arc::clone(&hostdb),
        Duration::from_secs(cli.status_interval.max(1)),
        shutdown_rx,
    ));

    info!("Scanning hosts... (press Ctrl+C to stop)");
    tokio::signal::ctrl_c()
        .await
        .wrap_err("failed to listen for shutdown signal")?;
    info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);
    if let Err(e) = scanner_handle.await {
        warn!(error = %e, "scanner task ended abnormally");
    }
    if let Err(e) = reporter_handle.await {
        warn!(error = %e, "status task ended abnormally");
    }

    if let Some(store) = &store {
        let saved = hostdb
            .save_to_store(store)
            .wrap_err("failed to save hosts to store")?;
        info!(saved, path = %store.path().display(), "saved host registry");
    }

    info!("Host database shutdown complete");
    Ok(())
}

/// Periodically log registry size and the current average contract price,
/// and trace membership changes as they happen.
async fn report_status(
    hostdb: Arc<HostDb>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut events = hostdb.subscribe();
    let mut ticker = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                info!(
                    hosts = hostdb.host_count(),
                    active = hostdb.active_count(),
                    pending = hostdb.pending_scans(),
                    avg_contract_price = %hostdb.average_contract_price(),
                    "host database status"
                );
            }
            event = events.recv() => match event {
                Ok(HostEvent::Activated { address }) => info!(%address, "host activated"),
                Ok(HostEvent::Deactivated { address }) => info!(%address, "host deactivated"),
                Ok(event) => debug!(?event, "host event"),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "status reporter lagged behind host events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

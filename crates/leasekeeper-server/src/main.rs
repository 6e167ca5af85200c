//! Main entry point for the Leasekeeper server.
//!
//! Opens the lease store, wires the HTTP collaborators into the lease manager,
//! then runs the event loop, the tick source and the API until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use leasekeeper_lease::{
    FixedMomentSize, HeartbeatClient, LeaseManager, LoggingNotificationSink, NoopHeartbeatClient,
    NotificationSink, Provisioner,
};
use leasekeeper_server::{
    adapter::{HttpHeartbeatClient, HttpNotificationSink, HttpProvisioner, LocalTickSource},
    metrics,
    model::{AppState, Configuration},
    startup,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new()?;

    let _logging_guard = startup::init_logging(&configuration.logging_config())
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let prometheus = metrics::init_metrics()?;

    let store = startup::open_store(&configuration).await?;

    let timeout = Duration::from_millis(configuration.provisioner_timeout_ms());
    let provisioner: Arc<dyn Provisioner> = match configuration.provisioner_url() {
        Some(url) => Arc::new(HttpProvisioner::new(&url, timeout)?),
        None => anyhow::bail!("provisioner.url must be configured"),
    };
    let notifier: Arc<dyn NotificationSink> = match configuration.notify_url() {
        Some(url) => Arc::new(HttpNotificationSink::new(&url, timeout)?),
        None => {
            warn!("notify.url not configured, acquire notices are only logged");
            Arc::new(LoggingNotificationSink)
        }
    };
    let heartbeat: Arc<dyn HeartbeatClient> = match configuration.heartbeat_url() {
        Some(url) => Arc::new(HttpHeartbeatClient::new(&url, timeout)?),
        None => Arc::new(NoopHeartbeatClient),
    };
    let moments = FixedMomentSize::new(configuration.ticks_per_moment())?;

    let manager = Arc::new(LeaseManager::new(
        configuration.lease_config()?,
        store,
        provisioner,
        notifier,
        heartbeat,
        Arc::new(moments),
    )?);
    manager.init().await?;

    let (events, event_rx) = mpsc::channel(configuration.event_channel_capacity());
    let run_handle = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.run(event_rx).await })
    };

    let shutdown = startup::wait_for_shutdown_signal();

    let tick_handle = if configuration.tick_local() {
        let source = LocalTickSource::new(
            Duration::from_millis(configuration.tick_interval_ms()),
            manager.last_tick(),
        );
        Some(source.spawn(events.clone(), shutdown.subscribe()))
    } else {
        info!("Local tick source disabled, waiting for POST /v1/ticks");
        None
    };

    let app_state = Arc::new(
        AppState::new(configuration.clone(), manager.clone(), events).with_prometheus(prometheus),
    );

    let address = configuration.server_address();
    let port = configuration.server_port();
    info!("Starting Leasekeeper server on {}:{}", address, port);
    let server = startup::main_server(app_state, address, port)?;
    let server_handle = server.handle();

    let mut shutdown_rx = shutdown.subscribe();
    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("HTTP server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("HTTP server shutting down gracefully");
        }
    }

    server_handle.stop(true).await;
    shutdown.shutdown();
    if let Some(handle) = tick_handle {
        if let Err(e) = handle.await {
            warn!("Tick source ended abnormally: {}", e);
        }
    }

    manager.shutdown().await;
    match run_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Lease manager error: {}", e),
        Err(e) => error!("Lease manager task failed: {}", e),
    }

    info!("Leasekeeper server shutdown complete");
    Ok(())
}

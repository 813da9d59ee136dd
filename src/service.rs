use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum_server::Handle;
use blob_store::ObjectContentStore;
use metrics::api_io_stats;
use state_store::FileVaultState;
use tokio::{self, signal, sync::watch};
use tracing::{error, info};

use crate::{
    config::ServerConfig,
    gc::Gc,
    routes::{create_routes, RouteState},
};

#[derive(Clone)]
pub struct Service {
    pub config: ServerConfig,
    pub shutdown_tx: watch::Sender<()>,
    pub shutdown_rx: watch::Receiver<()>,
    pub content_store: Arc<ObjectContentStore>,
    pub filevault_state: Arc<FileVaultState>,
}

impl Service {
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let content_store = Arc::new(
            ObjectContentStore::new(config.content_store.clone())
                .context("error initializing content store")?,
        );
        let filevault_state = FileVaultState::new(
            PathBuf::from(&config.state_store_path),
            config.upload_lease_secs,
        )
        .await
        .context("error initializing state store")?;

        Ok(Self {
            config,
            shutdown_tx,
            shutdown_rx,
            content_store,
            filevault_state,
        })
    }

    pub fn route_state(&self) -> RouteState {
        RouteState {
            filevault_state: self.filevault_state.clone(),
            content_store: self.content_store.clone(),
            metrics: Arc::new(api_io_stats::Metrics::new()),
            max_chunk_bytes: self.config.max_chunk_bytes,
            max_blob_bytes: self.config.max_blob_bytes,
        }
    }

    pub fn start_gc(&self) {
        let mut gc = Gc::new(
            self.filevault_state.clone(),
            Duration::from_secs(self.config.gc_interval_secs),
            self.shutdown_rx.clone(),
        );
        tokio::spawn(async move {
            gc.start().await;
        });
    }

    pub async fn start(&self) -> Result<()> {
        self.start_gc();

        let handle = Handle::new();
        let handle_sh = handle.clone();
        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            shutdown_signal(handle_sh, shutdown_tx).await;
            info!("graceful shutdown signal received, shutting down server gracefully");
        });

        let addr: SocketAddr = self.config.listen_addr.parse()?;
        info!("server api listening on {}", self.config.listen_addr);
        let routes = create_routes(self.route_state());
        axum_server::bind(addr)
            .handle(handle)
            .serve(routes.into_make_service())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal(handle: Handle, shutdown_tx: watch::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {:?}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {:?}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
        },
        _ = terminate => {
        },
    }
    handle.shutdown();
    if shutdown_tx.send(()).is_err() {
        error!("no background task is listening for shutdown");
    }
    info!("signal received, shutting down server gracefully");
}

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use blob_store::BlobStorageConfig;
use data_model::Principal;
use filevault_client::{
    config::{ClientConfig, ContentStoreConfig},
    remote_store::HttpPrimaryBackend,
    FileVault,
};
use tempfile::TempDir;
use tracing::subscriber;
use tracing_subscriber::{layer::SubscriberExt, Layer};

use crate::{config::ServerConfig, routes::create_routes, service::Service};

/// A server bound to an ephemeral local port, backed by a temp dir.
pub struct TestService {
    pub service: Service,
    pub base_url: String,
    _temp_dir: TempDir,
}

impl TestService {
    pub async fn new() -> Result<Self> {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(configure: impl FnOnce(&mut ServerConfig)) -> Result<Self> {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = subscriber::set_global_default(
            tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().with_filter(env_filter)),
        );

        let temp_dir = tempfile::tempdir()?;
        let mut cfg = ServerConfig {
            state_store_path: temp_dir
                .path()
                .join("state_store")
                .to_string_lossy()
                .into_owned(),
            listen_addr: "127.0.0.1:0".to_string(),
            content_store: BlobStorageConfig::new(&temp_dir.path().join("blobs").to_string_lossy()),
            ..Default::default()
        };
        configure(&mut cfg);
        let service = Service::new(cfg).await?;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);
        let routes = create_routes(service.route_state());
        let mut shutdown_rx = service.shutdown_rx.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, routes)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.changed().await;
                })
                .await;
        });

        Ok(Self {
            service,
            base_url,
            _temp_dir: temp_dir,
        })
    }

    pub fn client_config(&self, principal: Option<&str>) -> ClientConfig {
        ClientConfig {
            backend_url: self.base_url.clone(),
            content_store: ContentStoreConfig {
                publisher_url: self.base_url.clone(),
                aggregator_url: self.base_url.clone(),
                epochs: Some(1),
            },
            principal: principal.map(Principal::from),
            request_timeout_secs: 30,
            ..Default::default()
        }
    }

    /// Client facade talking to this server for both backends.
    pub fn vault(&self, principal: Option<&str>) -> Result<FileVault> {
        Ok(FileVault::from_config(&self.client_config(principal))?)
    }

    pub fn backend(&self, principal: Option<&str>) -> Result<Arc<HttpPrimaryBackend>> {
        Ok(Arc::new(HttpPrimaryBackend::new(
            &self.base_url,
            principal.map(Principal::from),
            Duration::from_secs(30),
        )?))
    }
}

impl Drop for TestService {
    fn drop(&mut self) {
        let _ = self.service.shutdown_tx.send(());
    }
}

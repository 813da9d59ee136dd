use std::{env, fmt::Debug, net::SocketAddr, path::Path};

use anyhow::{anyhow, Result};
use blob_store::BlobStorageConfig;
use data_model::MAX_UPLOAD_SIZE;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    // Export spans over OTLP.
    pub enable_tracing: bool,
    // Export metrics over OTLP.
    pub enable_metrics: bool,
    // OTLP collector endpoint. The exporter default applies when unset.
    pub endpoint: Option<String>,
    #[serde(default = "default_metrics_interval_secs")]
    pub metrics_interval_secs: u64,
}

fn default_metrics_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub state_store_path: String,
    pub listen_addr: String,
    /// Backing store of the development content store served under
    /// `/v1/blobs`.
    pub content_store: BlobStorageConfig,
    /// How long a partial upload may sit idle before it is reaped.
    pub upload_lease_secs: u64,
    pub gc_interval_secs: u64,
    pub max_chunk_bytes: usize,
    pub max_blob_bytes: usize,
    pub structured_logging: bool,
    pub telemetry: TelemetryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let state_store_path = env::current_dir()
            .unwrap_or_default()
            .join("filevault_storage/state");
        ServerConfig {
            state_store_path: state_store_path.to_string_lossy().into_owned(),
            listen_addr: "0.0.0.0:8910".to_string(),
            content_store: Default::default(),
            upload_lease_secs: 3600,
            gc_interval_secs: 60,
            max_chunk_bytes: 4 * 1024 * 1024,
            max_blob_bytes: MAX_UPLOAD_SIZE,
            structured_logging: false,
            telemetry: TelemetryConfig {
                metrics_interval_secs: default_metrics_interval_secs(),
                ..Default::default()
            },
        }
    }
}

impl ServerConfig {
    /// Defaults, overlaid by the YAML file, overlaid by `FILEVAULT_`
    /// environment variables.
    pub fn from_path(path: &Path) -> Result<ServerConfig> {
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("can't read config {}: {}", path.display(), e))?;
        let config: ServerConfig = Figment::new()
            .merge(Serialized::defaults(ServerConfig::default()))
            .merge(Yaml::string(&config_str))
            .merge(Env::prefixed("FILEVAULT_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(anyhow!("invalid listen address: {}", self.listen_addr));
        }
        if self.state_store_path.is_empty() {
            return Err(anyhow!("state_store_path must be set"));
        }
        if self.upload_lease_secs == 0 {
            return Err(anyhow!("upload_lease_secs must be greater than zero"));
        }
        if self.gc_interval_secs == 0 {
            return Err(anyhow!("gc_interval_secs must be greater than zero"));
        }
        if self.max_chunk_bytes == 0 || self.max_blob_bytes == 0 {
            return Err(anyhow!("body limits must be greater than zero"));
        }
        Ok(())
    }
}

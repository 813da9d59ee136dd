use std::{path::Path, time::Duration};

use data_model::{Principal, StorageProvider, DEFAULT_CHUNK_SIZE, MAX_UPLOAD_SIZE};
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::FileVaultError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentStoreConfig {
    pub publisher_url: String,
    pub aggregator_url: String,
    /// Storage epochs requested from a Walrus publisher.
    pub epochs: Option<u32>,
}

impl Default for ContentStoreConfig {
    fn default() -> Self {
        ContentStoreConfig {
            publisher_url: "https://publisher.walrus-testnet.walrus.space".to_string(),
            aggregator_url: "https://aggregator.walrus-testnet.walrus.space".to_string(),
            epochs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    pub backend_url: String,
    pub content_store: ContentStoreConfig,
    pub chunk_size: usize,
    pub max_upload_size: usize,
    pub default_provider: StorageProvider,
    pub principal: Option<Principal>,
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            backend_url: "http://localhost:8910".to_string(),
            content_store: ContentStoreConfig::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_size: MAX_UPLOAD_SIZE,
            default_provider: StorageProvider::PrimaryChunked,
            principal: None,
            request_timeout_secs: 60,
        }
    }
}

impl ClientConfig {
    /// Defaults, overlaid by the optional YAML file, overlaid by
    /// `FILEVAULT_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<ClientConfig, FileVaultError> {
        let mut figment = Figment::from(Serialized::defaults(ClientConfig::default()));
        if let Some(path) = path {
            let config_str = std::fs::read_to_string(path).map_err(|e| {
                FileVaultError::InvalidConfig(format!("can't read {}: {}", path.display(), e))
            })?;
            figment = figment.merge(Yaml::string(&config_str));
        }
        let config: ClientConfig = figment
            .merge(Env::prefixed("FILEVAULT_").split("__"))
            .extract()
            .map_err(|e| FileVaultError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), FileVaultError> {
        if self.chunk_size == 0 {
            return Err(FileVaultError::InvalidConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if self.max_upload_size > MAX_UPLOAD_SIZE {
            return Err(FileVaultError::InvalidConfig(format!(
                "max_upload_size can't exceed {} bytes",
                MAX_UPLOAD_SIZE
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(FileVaultError::InvalidConfig(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_yaml_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "backend_url: http://filevault.internal:9000\n\
             chunk_size: 1024\n\
             default_provider: secondary-blob\n\
             principal: alice\n\
             content_store:\n  publisher_url: http://publisher\n  aggregator_url: http://aggregator\n  epochs: 5"
        )
        .unwrap();

        let config = ClientConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.backend_url, "http://filevault.internal:9000");
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.default_provider, StorageProvider::SecondaryBlob);
        assert_eq!(config.principal, Some(Principal::from("alice")));
        assert_eq!(config.content_store.epochs, Some(5));
        assert_eq!(config.max_upload_size, MAX_UPLOAD_SIZE);
    }

    #[test]
    fn test_zero_chunk_size_is_invalid() {
        let config = ClientConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FileVaultError::InvalidConfig(_))
        ));
    }
}

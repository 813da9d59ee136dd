use std::{env, fmt::Debug, sync::Arc};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use data_model::BlobId;
use metrics::{blob_storage, Timer};
use object_store::{
    aws::{AmazonS3Builder, AmazonS3ConfigKey},
    parse_url,
    parse_url_opts,
    path::Path,
    ObjectStore,
    ObjectStoreScheme,
    PutMode,
    PutPayload,
};
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

pub mod http;

pub use http::{HttpContentStore, PutBlobResponse};

/// Content-addressed blob storage.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Stores `content` and returns its blob id. Storing the same bytes twice
    /// yields the same id.
    async fn put(&self, content: Bytes) -> Result<BlobId>;

    /// Returns `None` when no blob exists under `blob_id`.
    async fn get(&self, blob_id: &BlobId) -> Result<Option<Bytes>>;

    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, blob_id: &BlobId) -> Result<bool>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobStorageConfig {
    pub path: String,
}

impl BlobStorageConfig {
    pub fn new(path: &str) -> Self {
        BlobStorageConfig {
            path: format!("file://{}", path),
        }
    }
}

impl Default for BlobStorageConfig {
    fn default() -> Self {
        let cwd = env::current_dir().unwrap_or_default();
        let blob_store_path = format!(
            "file://{}",
            cwd.join("filevault_storage/blobs").to_string_lossy()
        );
        info!("using blob store path: {}", blob_store_path);
        BlobStorageConfig {
            path: blob_store_path,
        }
    }
}

/// Blob id of `content`: the lowercase hex SHA-256 digest.
pub fn content_address(content: &[u8]) -> BlobId {
    let mut hasher = Sha256::new();
    hasher.update(content);
    BlobId::new(format!("{:x}", hasher.finalize()))
}

fn is_content_address(blob_id: &BlobId) -> bool {
    let id = blob_id.get();
    id.len() == 64 && id.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// [`ContentStore`] over any `object_store` backend, keyed by content address.
#[derive(Clone)]
pub struct ObjectContentStore {
    object_store: Arc<dyn ObjectStore>,
    path: Path,
    metrics: Arc<blob_storage::Metrics>,
}

impl ObjectContentStore {
    pub fn new(config: BlobStorageConfig) -> Result<Self> {
        let (object_store, path) = Self::build_object_store(&config.path)?;
        Ok(Self {
            object_store: Arc::new(object_store),
            path,
            metrics: Arc::new(blob_storage::Metrics::new()),
        })
    }

    pub fn build_object_store(url_str: &str) -> Result<(Box<dyn ObjectStore>, Path)> {
        let url = &url_str.parse::<Url>()?;
        let (scheme, _) = ObjectStoreScheme::parse(url)?;
        match scheme {
            ObjectStoreScheme::AmazonS3 => {
                // inject AWS environment variables to prioritize keys over instance metadata
                // credentials.
                let opts: Vec<(AmazonS3ConfigKey, String)> = std::env::vars_os()
                    .filter_map(|(os_key, os_value)| {
                        if let (Some(key), Some(value)) = (os_key.to_str(), os_value.to_str()) {
                            if key.starts_with("AWS_") {
                                if let Ok(config_key) = key.to_ascii_lowercase().parse() {
                                    return Some((config_key, String::from(value)));
                                }
                            }
                        }
                        None
                    })
                    .collect();

                let mut s3_builder = AmazonS3Builder::new().with_url(url_str);
                for (key, value) in opts.iter() {
                    s3_builder = s3_builder.with_config(*key, value.clone());
                }
                let s3 = s3_builder
                    .build()
                    .map_err(|e| anyhow!("failed to create s3 object store: {}", e))?;
                let (_, path) = parse_url_opts(url, opts)?;
                Ok((Box::new(s3), path))
            }
            _ => Ok(parse_url(url)?),
        }
    }

    fn blob_path(&self, blob_id: &BlobId) -> Path {
        self.path.child(blob_id.get())
    }
}

#[async_trait]
impl ContentStore for ObjectContentStore {
    async fn put(&self, content: Bytes) -> Result<BlobId> {
        let labels = [KeyValue::new("op", "put")];
        let _timer = Timer::start_with_labels(&self.metrics.operations, &labels);
        let blob_id = content_address(&content);
        let size = content.len();
        match self
            .object_store
            .put_opts(
                &self.blob_path(&blob_id),
                PutPayload::from(content),
                PutMode::Create.into(),
            )
            .await
        {
            Ok(_) => debug!(%blob_id, size, "stored blob"),
            Err(object_store::Error::AlreadyExists { .. }) => {
                debug!(%blob_id, "blob already stored")
            }
            Err(e) => return Err(anyhow!("failed to store blob {}: {}", blob_id, e)),
        }
        Ok(blob_id)
    }

    async fn get(&self, blob_id: &BlobId) -> Result<Option<Bytes>> {
        if !is_content_address(blob_id) {
            return Ok(None);
        }
        let labels = [KeyValue::new("op", "get")];
        let _timer = Timer::start_with_labels(&self.metrics.operations, &labels);
        match self.object_store.get(&self.blob_path(blob_id)).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(anyhow!("can't get blob {}: {}", blob_id, e)),
        }
    }

    async fn delete(&self, blob_id: &BlobId) -> Result<bool> {
        if !is_content_address(blob_id) {
            return Ok(false);
        }
        let labels = [KeyValue::new("op", "delete")];
        let _timer = Timer::start_with_labels(&self.metrics.operations, &labels);
        let path = self.blob_path(blob_id);
        match self.object_store.head(&path).await {
            Ok(_) => {}
            Err(object_store::Error::NotFound { .. }) => return Ok(false),
            Err(e) => return Err(anyhow!("can't stat blob {}: {}", blob_id, e)),
        }
        self.object_store.delete(&path).await?;
        debug!(%blob_id, "deleted blob");
        Ok(true)
    }
}

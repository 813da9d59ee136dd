use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use data_model::BlobId;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use super::ContentStore;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlobObject {
    pub blob_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewlyCreated {
    pub blob_object: BlobObject,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AlreadyCertified {
    pub blob_id: String,
}

/// Publisher answer to a blob PUT. Walrus publishers use the first two
/// shapes, the development store answers with the plain one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PutBlobResponse {
    #[serde(rename_all = "camelCase")]
    NewlyCreated { newly_created: NewlyCreated },
    #[serde(rename_all = "camelCase")]
    AlreadyCertified { already_certified: AlreadyCertified },
    Plain { blob_id: String },
}

impl PutBlobResponse {
    pub fn plain(blob_id: &BlobId) -> Self {
        PutBlobResponse::Plain {
            blob_id: blob_id.get().to_string(),
        }
    }

    pub fn blob_id(self) -> BlobId {
        match self {
            PutBlobResponse::NewlyCreated { newly_created } => {
                BlobId::new(newly_created.blob_object.blob_id)
            }
            PutBlobResponse::AlreadyCertified { already_certified } => {
                BlobId::new(already_certified.blob_id)
            }
            PutBlobResponse::Plain { blob_id } => BlobId::new(blob_id),
        }
    }
}

/// [`ContentStore`] reached over HTTP: writes go to a publisher, reads to an
/// aggregator.
pub struct HttpContentStore {
    client: Client,
    publisher_url: Url,
    aggregator_url: Url,
    epochs: Option<u32>,
}

/// Appends `/v1/blobs[/<blob_id>]` to `base`. The blob id is pushed as a
/// single escaped segment.
fn blob_url(base: &Url, blob_id: Option<&BlobId>) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| anyhow!("{} cannot be used as a base url", base))?;
        segments.pop_if_empty().extend(["v1", "blobs"]);
        if let Some(blob_id) = blob_id {
            segments.push(&blob_id.to_string());
        }
    }
    Ok(url)
}

impl HttpContentStore {
    pub fn new(
        publisher_url: &str,
        aggregator_url: &str,
        epochs: Option<u32>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("failed to build http client: {}", e))?;
        let publisher_url = Url::parse(publisher_url)
            .map_err(|e| anyhow!("invalid publisher url {}: {}", publisher_url, e))?;
        let aggregator_url = Url::parse(aggregator_url)
            .map_err(|e| anyhow!("invalid aggregator url {}: {}", aggregator_url, e))?;
        Ok(Self {
            client,
            publisher_url,
            aggregator_url,
            epochs,
        })
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn put(&self, content: Bytes) -> Result<BlobId> {
        let mut request = self
            .client
            .put(blob_url(&self.publisher_url, None)?)
            .body(content);
        if let Some(epochs) = self.epochs {
            request = request.query(&[("epochs", epochs)]);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "publisher rejected blob upload with status {}",
                response.status()
            ));
        }
        let blob_id = response.json::<PutBlobResponse>().await?.blob_id();
        debug!(%blob_id, "published blob");
        Ok(blob_id)
    }

    async fn get(&self, blob_id: &BlobId) -> Result<Option<Bytes>> {
        let response = self
            .client
            .get(blob_url(&self.aggregator_url, Some(blob_id))?)
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.bytes().await?)),
            status => Err(anyhow!("aggregator returned status {} for {}", status, blob_id)),
        }
    }

    async fn delete(&self, blob_id: &BlobId) -> Result<bool> {
        let response = self
            .client
            .delete(blob_url(&self.publisher_url, Some(blob_id))?)
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(anyhow!("publisher returned status {} deleting {}", status, blob_id)),
        }
    }
}

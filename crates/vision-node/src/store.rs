//! Image store HTTP client.
//!
//! The store is an external service with three write endpoints and plain
//! GETs for stored images:
//!
//! | call                 | endpoint                                  | body            |
//! |----------------------|-------------------------------------------|-----------------|
//! | [`upload_image`]     | `POST {store}/api/image/{imageId}`        | raw JPEG        |
//! | [`add_image`]        | `POST {store}/api/imagedata/addimage`     | legacy JSON     |
//! | [`add_content`]      | `POST {store}/api/imagedata/addcontent`   | legacy JSON     |
//! | [`fetch`]            | `GET <image url>`                         |                 |
//!
//! [`upload_image`]: ImageStore::upload_image
//! [`add_image`]: ImageStore::add_image
//! [`add_content`]: ImageStore::add_content
//! [`fetch`]: ImageFetcher::fetch

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crate::models::{image_url, ContentRecord, ImageRecord};
use crate::wire;

/// Errors from image store calls.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Write side of the image store.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Base URL of the store; image URLs are derived from it.
    fn base_url(&self) -> &str;

    /// Store the encoded frame under `image_id`.
    async fn upload_image(&self, image_id: &str, jpeg: Vec<u8>) -> Result<()>;

    /// Store the metadata of a published frame.
    async fn add_image(&self, record: &ImageRecord) -> Result<()>;

    /// Store one region or detection result of a published frame.
    async fn add_content(&self, record: &ContentRecord) -> Result<()>;
}

/// Read side: fetch a stored image by URL.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Returns the image bytes, or [`StoreError::Status`] on a non-success reply.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// [`ImageStore`] backed by the store's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpImageStore {
    http: reqwest::Client,
    base_url: String,
}

impl HttpImageStore {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post_record(&self, path: &str, body: String) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        check_status(&url, response.status())?;
        log::debug!("{} -> {}", url, response.status());
        Ok(())
    }
}

#[async_trait]
impl ImageStore for HttpImageStore {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn upload_image(&self, image_id: &str, jpeg: Vec<u8>) -> Result<()> {
        let url = image_url(&self.base_url, image_id);
        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "image/jpeg")
            .body(jpeg)
            .send()
            .await?;
        check_status(&url, response.status())
    }

    async fn add_image(&self, record: &ImageRecord) -> Result<()> {
        self.post_record("/api/imagedata/addimage", wire::encode_record(record)?)
            .await
    }

    async fn add_content(&self, record: &ContentRecord) -> Result<()> {
        self.post_record("/api/imagedata/addcontent", wire::encode_record(record)?)
            .await
    }
}

/// [`ImageFetcher`] over plain HTTP GETs.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    http: reqwest::Client,
}

impl HttpImageFetcher {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().await?;
        check_status(url, response.status())?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn check_status(url: &str, status: reqwest::StatusCode) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(StoreError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

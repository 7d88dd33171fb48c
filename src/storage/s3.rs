use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use crate::storage::asset_store::{storage_key, AssetStore, ImageUpload, StoredAsset, UploadError};
use crate::storage::sigv4::{self, CanonicalRequest, Credentials};

/// Connection details for an S3-compatible bucket.
#[derive(Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Canned ACL sent as `x-amz-acl`, e.g. `public-read`.
    pub acl: String,
    /// Path-style endpoint override (MinIO, localstack). AWS virtual-host
    /// style is used when absent.
    pub endpoint: Option<String>,
    /// Base for URLs handed back to clients, e.g. a CDN in front of the bucket.
    pub public_url: Option<String>,
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("acl", &self.acl)
            .field("endpoint", &self.endpoint)
            .field("public_url", &self.public_url)
            .finish()
    }
}

/// Uploads objects with a signed `PutObject` request.
#[derive(Debug, Clone)]
pub struct S3AssetStore {
    settings: S3Settings,
    http_client: Client,
}

impl S3AssetStore {
    pub fn new(settings: S3Settings) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("creating HTTP client")?;

        debug!(bucket = %settings.bucket, region = %settings.region, "S3 asset store initialized");
        Ok(Self {
            settings,
            http_client,
        })
    }

    fn object_url(&self, key: &str) -> String {
        match &self.settings.endpoint {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.settings.bucket,
                key
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.settings.bucket, self.settings.region, key
            ),
        }
    }

    fn public_url(&self, key: &str) -> String {
        match &self.settings.public_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => self.object_url(key),
        }
    }
}

fn host_header(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

#[async_trait]
impl AssetStore for S3AssetStore {
    async fn store(&self, upload: &ImageUpload) -> Result<StoredAsset, UploadError> {
        let key = storage_key(&upload.file_name);
        let object_url = self.object_url(&key);
        let url =
            Url::parse(&object_url).map_err(|_| UploadError::InvalidEndpoint(object_url.clone()))?;
        let host = host_header(&url).ok_or_else(|| UploadError::InvalidEndpoint(object_url.clone()))?;

        let content_type = upload
            .content_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let payload_hash = sigv4::sha256_hex(&upload.bytes);
        let now = Utc::now();
        let amz_date = sigv4::amz_date(now);

        let canonical = CanonicalRequest {
            method: "PUT",
            uri: url.path(),
            query: "",
            headers: vec![
                ("content-type".to_string(), content_type.clone()),
                ("host".to_string(), host),
                ("x-amz-acl".to_string(), self.settings.acl.clone()),
                ("x-amz-content-sha256".to_string(), payload_hash.clone()),
                ("x-amz-date".to_string(), amz_date.clone()),
            ],
            payload_hash: &payload_hash,
        };
        let creds = Credentials {
            access_key_id: &self.settings.access_key_id,
            secret_access_key: &self.settings.secret_access_key,
            region: &self.settings.region,
            service: "s3",
        };
        let authorization = sigv4::authorization(&creds, &canonical, now);

        debug!(key = %key, size = upload.bytes.len(), "uploading object to S3");

        let response = self
            .http_client
            .put(url)
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_TYPE, content_type)
            .header("x-amz-acl", &self.settings.acl)
            .header("x-amz-content-sha256", payload_hash)
            .header("x-amz-date", amz_date)
            .body(upload.bytes.clone())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::Rejected { status, body });
        }

        info!(bucket = %self.settings.bucket, key = %key, "object stored");
        Ok(StoredAsset {
            url: self.public_url(&key),
            key,
        })
    }
}

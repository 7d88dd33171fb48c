use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

/// A single uploaded file, handed explicitly to the pipeline.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Where an upload ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredAsset {
    pub key: String,
    pub url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("object storage request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("object storage rejected upload with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid object storage endpoint {0}")]
    InvalidEndpoint(String),
    #[error("writing asset failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable binary storage. `store` must not return before the bytes are
/// retrievable at the returned URL.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn store(&self, upload: &ImageUpload) -> Result<StoredAsset, UploadError>;
}

/// Collision-resistant object key: `<unix-nanos>-<random>-<sanitized name>`.
pub fn storage_key(original_name: &str) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let nonce = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", nanos, &nonce[..8], sanitize_file_name(original_name))
}

fn sanitize_file_name(name: &str) -> String {
    // strip any client-side directory components
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Writes uploads into a local directory that the API serves under `/uploads`.
#[derive(Debug, Clone)]
pub struct LocalAssetStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }
}

/// Write a file that must not exist yet; an existing object is never replaced.
async fn write_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn store(&self, upload: &ImageUpload) -> Result<StoredAsset, UploadError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let key = storage_key(&upload.file_name);
        let path = self.root.join(&key);

        write_new(&path, &upload.bytes).await?;

        debug!(path = %path.display(), size = upload.bytes.len(), "asset written");
        let url = format!(
            "{}/uploads/{}",
            self.public_base_url.trim_end_matches('/'),
            key
        );
        Ok(StoredAsset { key, url })
    }
}

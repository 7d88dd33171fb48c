use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::PathBuf;

use crate::storage::S3Settings;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Where uploaded images go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetBackend {
    S3(S3Settings),
    Local {
        dir: PathBuf,
        public_base_url: String,
    },
}

/// Process configuration, read once at startup and shared read-only.
#[derive(Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    /// JSON snapshot for the record store; in-memory when absent.
    pub data_file: Option<PathBuf>,
    pub assets: AssetBackend,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("jwt_secret", &"<redacted>")
            .field("port", &self.port)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("data_file", &self.data_file)
            .field("assets", &self.assets)
            .finish()
    }
}

impl Config {
    /// Read configuration from process environment variables.
    ///
    /// - `JWT_SECRET` (required)
    /// - `PORT`, `MAX_UPLOAD_BYTES`, `PLANTS_DATA_FILE`
    /// - `ASSET_BACKEND`: `s3` or `local`; defaults to `s3` when `S3_BUCKET` is set
    /// - s3: `AWS_REGION`, `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `S3_BUCKET`,
    ///   `S3_ACL`, `S3_ENDPOINT`, `S3_PUBLIC_URL`
    /// - local: `UPLOAD_DIR`, `PUBLIC_BASE_URL`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // blank values count as unset
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| var(key).with_context(|| format!("{key} must be set"));

        let jwt_secret = required("JWT_SECRET")?;
        let port = match var("PORT") {
            Some(raw) => raw.parse().with_context(|| format!("invalid PORT {raw:?}"))?,
            None => DEFAULT_PORT,
        };
        let max_upload_bytes = match var("MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid MAX_UPLOAD_BYTES {raw:?}"))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };
        let data_file = var("PLANTS_DATA_FILE").map(PathBuf::from);

        let backend = var("ASSET_BACKEND").unwrap_or_else(|| {
            if var("S3_BUCKET").is_some() {
                "s3".to_string()
            } else {
                "local".to_string()
            }
        });
        let assets = match backend.to_ascii_lowercase().as_str() {
            "s3" => AssetBackend::S3(S3Settings {
                region: required("AWS_REGION")?,
                bucket: required("S3_BUCKET")?,
                access_key_id: required("AWS_ACCESS_KEY_ID")?,
                secret_access_key: required("AWS_SECRET_ACCESS_KEY")?,
                acl: var("S3_ACL").unwrap_or_else(|| "public-read".to_string()),
                endpoint: var("S3_ENDPOINT"),
                public_url: var("S3_PUBLIC_URL"),
            }),
            "local" => AssetBackend::Local {
                dir: PathBuf::from(var("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string())),
                public_base_url: var("PUBLIC_BASE_URL")
                    .unwrap_or_else(|| format!("http://localhost:{port}")),
            },
            other => bail!("unknown ASSET_BACKEND {other:?} (expected s3 or local)"),
        };

        Ok(Self {
            jwt_secret,
            port,
            max_upload_bytes,
            data_file,
            assets,
        })
    }

    /// Change the listening port. A local public URL that was derived from the
    /// old port follows along.
    pub fn set_port(&mut self, port: u16) {
        if let AssetBackend::Local {
            public_base_url, ..
        } = &mut self.assets
        {
            if *public_base_url == format!("http://localhost:{}", self.port) {
                *public_base_url = format!("http://localhost:{port}");
            }
        }
        self.port = port;
    }
}

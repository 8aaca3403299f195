//! Snapshot retrieval.
//!
//! A snapshot is a single object, either on S3 (or an S3-compatible service)
//! or on the local filesystem. Its format is picked from the file extension.

mod json;
mod parquet;

pub use self::json::decode_json;
pub use self::parquet::decode_parquet;

use crate::config::SourceConfig;
use bytes::Bytes;
use docsync_engine::Snapshot;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, RetryConfig};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Snapshot source errors.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Invalid snapshot location {0:?}")]
    InvalidLocation(String),

    #[error("Unsupported snapshot format {0:?}, expected .parquet, .json, .jsonl or .ndjson")]
    UnsupportedFormat(String),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Invalid object path: {0}")]
    Path(#[from] object_store::path::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] ::parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("Invalid JSON on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Expected a JSON object for row {0}")]
    NotAnObject(usize),
}

/// Where a snapshot object lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotLocation {
    S3 { bucket: String, key: String },
    Local(PathBuf),
}

impl SnapshotLocation {
    /// Parse `s3://bucket/key`, `file:///path` or a plain filesystem path.
    pub fn parse(url: &str) -> Result<Self, SourceError> {
        let url = url.trim();
        if let Some(rest) = url.strip_prefix("s3://") {
            return match rest.split_once('/') {
                Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok(Self::S3 {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }),
                _ => Err(SourceError::InvalidLocation(url.to_string())),
            };
        }
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(Self::Local(PathBuf::from(path)));
        }
        if url.is_empty() || url.contains("://") {
            return Err(SourceError::InvalidLocation(url.to_string()));
        }
        Ok(Self::Local(PathBuf::from(url)))
    }

    /// Object key or file path, used to pick the format.
    pub fn name(&self) -> &str {
        match self {
            Self::S3 { key, .. } => key,
            Self::Local(path) => path.to_str().unwrap_or_default(),
        }
    }
}

/// Supported snapshot encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Parquet,
    /// Newline-delimited JSON objects, or one JSON array of objects
    Json,
}

impl SnapshotFormat {
    pub fn from_name(name: &str) -> Result<Self, SourceError> {
        let extension = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("parquet") => Ok(Self::Parquet),
            Some("json" | "jsonl" | "ndjson") => Ok(Self::Json),
            _ => Err(SourceError::UnsupportedFormat(name.to_string())),
        }
    }
}

/// Download and decode the configured snapshot.
pub async fn fetch_snapshot(config: &SourceConfig) -> Result<Snapshot, SourceError> {
    let location = SnapshotLocation::parse(&config.url)?;
    let format = SnapshotFormat::from_name(location.name())?;

    let started = Instant::now();
    let bytes = fetch_bytes(&location, config).await?;
    tracing::info!(
        url = %config.url,
        bytes = bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "snapshot downloaded"
    );

    let snapshot = decode(format, bytes)?;
    tracing::info!(
        rows = snapshot.len(),
        columns = snapshot.columns().len(),
        "snapshot decoded"
    );
    Ok(snapshot)
}

/// Decode raw snapshot bytes.
pub fn decode(format: SnapshotFormat, bytes: Bytes) -> Result<Snapshot, SourceError> {
    match format {
        SnapshotFormat::Parquet => decode_parquet(bytes),
        SnapshotFormat::Json => decode_json(&bytes),
    }
}

async fn fetch_bytes(location: &SnapshotLocation, config: &SourceConfig) -> Result<Bytes, SourceError> {
    match location {
        SnapshotLocation::S3 { bucket, key } => {
            let store = s3_store(bucket, config)?;
            Ok(store.get(&ObjectPath::from(key.as_str())).await?.bytes().await?)
        }
        SnapshotLocation::Local(path) => {
            let store = LocalFileSystem::new();
            let path = ObjectPath::from_filesystem_path(path)?;
            Ok(store.get(&path).await?.bytes().await?)
        }
    }
}

fn s3_store(bucket: &str, config: &SourceConfig) -> Result<impl ObjectStore, SourceError> {
    // Credentials come from the standard AWS_* environment variables.
    let mut builder = AmazonS3Builder::from_env()
        .with_bucket_name(bucket)
        .with_retry(RetryConfig {
            max_retries: 3,
            retry_timeout: Duration::from_secs(60),
            ..Default::default()
        });

    if let Some(region) = &config.region {
        builder = builder.with_region(region);
    }

    if let Some(endpoint) = &config.endpoint {
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(endpoint.starts_with("http://"));
    }

    Ok(builder.build()?)
}

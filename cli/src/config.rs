//! Configuration management for the sync command.

use docsync_engine::DEFAULT_BATCH_SIZE;
use std::env;

/// Collection written to when `DOCSYNC_COLLECTION` is not set.
pub const DEFAULT_COLLECTION: &str = "all_companies_full";

/// Database and sync configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Logical collection the documents belong to
    pub collection: String,
    /// Maximum documents per bulk write
    pub batch_size: usize,
    /// Connection pool size
    pub max_connections: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = var("DATABASE_URL").ok_or(ConfigError::MissingDatabaseUrl)?;

        let collection = var("DOCSYNC_COLLECTION")
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());

        let batch_size = match var("DOCSYNC_BATCH_SIZE") {
            Some(raw) => parse_batch_size(&raw)?,
            None => DEFAULT_BATCH_SIZE,
        };

        let max_connections = var("DOCSYNC_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidMaxConnections)?;

        Ok(Self {
            database_url,
            collection,
            batch_size,
            max_connections,
        })
    }
}

/// Where the snapshot is fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// `s3://bucket/key`, `file://` URL or local path
    pub url: String,
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services
    pub endpoint: Option<String>,
}

impl SourceConfig {
    /// Load the snapshot location from the environment, unless `url` is given.
    pub fn from_env(url: Option<String>) -> Result<Self, ConfigError> {
        Self::from_lookup(url, |key| env::var(key).ok())
    }

    fn from_lookup(
        url: Option<String>,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let url = url
            .or_else(|| var("SNAPSHOT_URL"))
            .filter(|u| !u.trim().is_empty())
            .ok_or(ConfigError::MissingSnapshotUrl)?;

        Ok(Self {
            url,
            region: var("SNAPSHOT_REGION"),
            endpoint: var("SNAPSHOT_ENDPOINT"),
        })
    }
}

/// Parse a positive batch size.
pub fn parse_batch_size(raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(size) if size > 0 => Ok(size),
        _ => Err(ConfigError::InvalidBatchSize(raw.to_string())),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("SNAPSHOT_URL environment variable or --snapshot is required")]
    MissingSnapshotUrl,

    #[error("Invalid batch size {0:?}, expected a positive integer")]
    InvalidBatchSize(String),

    #[error("Invalid DOCSYNC_MAX_CONNECTIONS value")]
    InvalidMaxConnections,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/db")]))
            .unwrap();

        assert_eq!(config.database_url, "postgres://localhost/db");
        assert_eq!(config.collection, DEFAULT_COLLECTION);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.max_connections, 10);
    }

    #[test]
    fn database_url_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingDatabaseUrl));
    }

    #[test]
    fn overrides_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("DOCSYNC_COLLECTION", "complaints"),
            ("DOCSYNC_BATCH_SIZE", "250"),
            ("DOCSYNC_MAX_CONNECTIONS", "4"),
        ]))
        .unwrap();

        assert_eq!(config.collection, "complaints");
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.max_connections, 4);
    }

    #[test]
    fn batch_size_must_be_positive() {
        assert!(matches!(
            parse_batch_size("0"),
            Err(ConfigError::InvalidBatchSize(_))
        ));
        assert!(matches!(
            parse_batch_size("-3"),
            Err(ConfigError::InvalidBatchSize(_))
        ));
        assert_eq!(parse_batch_size(" 42 ").unwrap(), 42);

        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("DOCSYNC_BATCH_SIZE", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBatchSize(_)));
    }

    #[test]
    fn snapshot_flag_wins_over_environment() {
        let env = lookup(&[
            ("SNAPSHOT_URL", "s3://bucket/env.parquet"),
            ("SNAPSHOT_REGION", "sa-east-1"),
        ]);

        let from_flag =
            SourceConfig::from_lookup(Some("/tmp/flag.jsonl".into()), &env).unwrap();
        assert_eq!(from_flag.url, "/tmp/flag.jsonl");
        assert_eq!(from_flag.region.as_deref(), Some("sa-east-1"));

        let from_env = SourceConfig::from_lookup(None, &env).unwrap();
        assert_eq!(from_env.url, "s3://bucket/env.parquet");

        assert!(matches!(
            SourceConfig::from_lookup(None, lookup(&[])),
            Err(ConfigError::MissingSnapshotUrl)
        ));
    }
}

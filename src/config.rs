use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};

use crate::registry::{DEFAULT_PARTITION, DEFAULT_SCAN_PAGE_SIZE, RetryPolicy};
use crate::storage::DurabilityMode;
use crate::storage::persistence::DEFAULT_CHECKPOINT_THRESHOLD;

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub bind_addr: SocketAddr,
    /// `None` keeps every row in memory only.
    pub data_dir: Option<PathBuf>,
    pub partition_key: String,
    pub durability: DurabilityMode,
    pub checkpoint_threshold: usize,
    pub scan_page_size: usize,
    pub retry: RetryPolicy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 18090)),
            data_dir: None,
            partition_key: DEFAULT_PARTITION.to_string(),
            durability: DurabilityMode::default(),
            checkpoint_threshold: DEFAULT_CHECKPOINT_THRESHOLD,
            scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

impl RegistryConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup; unset keys keep
    /// their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_addr = match lookup("TRACKDB_BIND_ADDR") {
            Some(raw) => raw
                .parse::<SocketAddr>()
                .context("TRACKDB_BIND_ADDR must be a valid host:port")?,
            None => defaults.bind_addr,
        };

        let data_dir = lookup("TRACKDB_DATA_DIR")
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from);

        let partition_key = match lookup("TRACKDB_PARTITION") {
            Some(raw) => checked_partition(raw).context("TRACKDB_PARTITION is invalid")?,
            None => defaults.partition_key,
        };

        let durability = match lookup("TRACKDB_DURABILITY") {
            Some(raw) => raw
                .parse::<DurabilityMode>()
                .map_err(|e| anyhow!(e))
                .context("TRACKDB_DURABILITY is invalid")?,
            None => defaults.durability,
        };

        let checkpoint_threshold = parse_or(
            &lookup,
            "TRACKDB_CHECKPOINT_THRESHOLD",
            defaults.checkpoint_threshold,
        )?;
        let scan_page_size = parse_or(&lookup, "TRACKDB_SCAN_PAGE_SIZE", defaults.scan_page_size)?;

        let retry = RetryPolicy {
            max_attempts: parse_or(
                &lookup,
                "TRACKDB_RETRY_MAX_ATTEMPTS",
                defaults.retry.max_attempts,
            )?,
            base_backoff_ms: parse_or(
                &lookup,
                "TRACKDB_RETRY_BASE_BACKOFF_MS",
                defaults.retry.base_backoff_ms,
            )?,
            max_backoff_ms: parse_or(
                &lookup,
                "TRACKDB_RETRY_MAX_BACKOFF_MS",
                defaults.retry.max_backoff_ms,
            )?,
        };

        Ok(Self {
            bind_addr,
            data_dir,
            partition_key,
            durability,
            checkpoint_threshold,
            scan_page_size,
            retry,
        })
    }

    /// Replaces the partition key, applying the same blank check as
    /// `TRACKDB_PARTITION`.
    pub fn set_partition_key(&mut self, partition_key: impl Into<String>) -> Result<()> {
        self.partition_key = checked_partition(partition_key.into())?;
        Ok(())
    }
}

fn checked_partition(partition_key: String) -> Result<String> {
    if partition_key.trim().is_empty() {
        return Err(anyhow!("partition key must not be blank"));
    }
    Ok(partition_key)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} must be a non-negative integer", key)),
        None => Ok(default),
    }
}

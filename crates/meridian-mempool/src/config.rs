//! Mempool configuration.

use serde::Deserialize;

/// Configuration for the transaction mempool.
///
/// All capacity limits are enforced at admission time; exceeding them
/// triggers priority-based eviction rather than hard failure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    /// Maximum number of resident transactions.
    pub size: usize,
    /// Maximum aggregate payload size of all resident transactions, in bytes.
    pub max_txs_bytes: i64,
    /// Maximum payload size of a single transaction, in bytes.
    pub max_tx_bytes: usize,
    /// Capacity of the seen-transaction cache. Zero disables the cache.
    pub cache_size: usize,
    /// Keep transactions that failed validation in the seen-cache, so
    /// resubmissions are dropped without consulting the validator again.
    pub keep_invalid_txs_in_cache: bool,
    /// Revalidate resident transactions after every committed block.
    pub recheck: bool,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            size: 5_000,
            max_txs_bytes: 1024 * 1024 * 1024,
            max_tx_bytes: 1024 * 1024,
            cache_size: 10_000,
            keep_invalid_txs_in_cache: false,
            recheck: true,
        }
    }
}

impl MempoolConfig {
    /// Creates a small config for testing.
    pub fn for_testing() -> Self {
        Self {
            size: 100,
            max_txs_bytes: 1024 * 1024,
            max_tx_bytes: 64 * 1024,
            cache_size: 100,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = MempoolConfig::default();
        assert_eq!(config.size, 5_000);
        assert_eq!(config.max_tx_bytes, 1024 * 1024);
        assert_eq!(config.cache_size, 10_000);
        assert!(!config.keep_invalid_txs_in_cache);
        assert!(config.recheck);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: MempoolConfig = serde_json::from_str("{\"size\": 7}").unwrap();
        assert_eq!(config.size, 7);
        assert_eq!(config.cache_size, 10_000);
    }
}

// Database module
// Key-value backing stores for the embedding cache

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

pub use memory::MemoryStore;
pub use sqlite::{CacheSummary, Database};

/// Byte-oriented key-value store consulted by the embedding cache.
///
/// Individual writes to one key must be atomic; no cross-key atomicity is
/// assumed.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;
}

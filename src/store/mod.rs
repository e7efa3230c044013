//! Access to the shared key-value store.
//!
//! Every component talks to the store through [`LivenessStore`], so the same
//! emitter and reconciler run against Redis in production and against
//! [`MemoryStore`] in tests.
//!
//! # Contract
//!
//! Implementations must make each single-key operation atomic and every
//! operation safe to race with itself:
//! - deleting an absent key succeeds
//! - removing an absent set member succeeds
//! - adding an existing set member succeeds
//!
//! Nothing in this crate relies on atomicity across keys.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait LivenessStore: Send + Sync {
    /// Add `member` to the set at `set_key`, creating the set if needed
    async fn add_to_set(&self, set_key: &str, member: &str) -> Result<()>;

    async fn remove_from_set(&self, set_key: &str, member: &str) -> Result<()>;

    /// All members of the set at `set_key`, empty if the set does not exist
    async fn set_members(&self, set_key: &str) -> Result<Vec<String>>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Keys matching a Redis `KEYS` pattern: `*`, `?`, `[...]`, `[^...]`
    /// and backslash escapes. Braces match themselves.
    async fn list_keys(&self, pattern: &str) -> Result<Vec<String>>;
}

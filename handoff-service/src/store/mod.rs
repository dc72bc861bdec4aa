//! Ephemeral record storage.
//!
//! Every record written here carries a TTL and disappears on its own. Reading
//! an expired key is indistinguishable from reading a missing one.
//!
//! ## Key patterns
//!
//! ```text
//! handoff:req:{id}      → HandoffRequest JSON (request TTL)
//! handoff:tok:{token}   → ImpersonationToken JSON (token TTL)
//! ```

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

const REQUEST_PREFIX: &str = "handoff:req:";
const TOKEN_PREFIX: &str = "handoff:tok:";

pub fn request_key(id: &str) -> String {
    format!("{}{}", REQUEST_PREFIX, id)
}

pub fn token_key(token: &str) -> String {
    format!("{}{}", TOKEN_PREFIX, token)
}

/// TTL-keyed string storage shared by all handler invocations.
///
/// Single-key operations must be safe under concurrent access; nothing spans
/// more than one key.
#[async_trait]
pub trait EphemeralStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value. `ttl_seconds` is clamped to at least 1.
    async fn put(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), anyhow::Error>;
    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error>;
    async fn delete(&self, key: &str) -> Result<(), anyhow::Error>;
    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

pub async fn put_json<T: Serialize + Sync>(
    store: &dyn EphemeralStore,
    key: &str,
    value: &T,
    ttl_seconds: u64,
) -> Result<(), anyhow::Error> {
    let encoded = serde_json::to_string(value)?;
    store.put(key, &encoded, ttl_seconds).await
}

/// Read and decode a record. A value that no longer decodes is treated as absent.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn EphemeralStore,
    key: &str,
) -> Result<Option<T>, anyhow::Error> {
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!(key_prefix = %key_prefix(key), error = %e, "Discarding undecodable record");
            Ok(None)
        }
    }
}

/// Namespace part of a key, safe to log.
fn key_prefix(key: &str) -> &str {
    key.rfind(':').map(|i| &key[..=i]).unwrap_or("")
}

//! Memoization of operation results.

use crate::RunnerError;
use meshrf_terrain::{CacheStore, MemoryStore};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, warn};

/// Default lifetime of a cached result.
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Cached results keyed by operation and request parameters.
///
/// Store failures are logged and treated as misses; the cache never turns a
/// successful operation into an error.
pub struct ResultCache {
    store: Box<dyn CacheStore>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(store: Box<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Process-local cache with the default TTL.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()), DEFAULT_RESULT_TTL)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// `{operation}:{sha256 of the canonical JSON of params}`.
    ///
    /// Parameters go through [`serde_json::Value`] first so object keys are
    /// sorted and equal requests produce equal keys.
    pub fn key<P: Serialize + ?Sized>(operation: &str, params: &P) -> Result<String, RunnerError> {
        let canonical = serde_json::to_string(&serde_json::to_value(params)?)?;
        let digest = Sha256::digest(canonical.as_bytes());
        Ok(format!("{}:{}", operation, hex::encode(digest)))
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let bytes = match self.store.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "result cache read failed");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "discarding undecodable cached result");
                None
            }
        }
    }

    pub fn put(&self, key: &str, result: &Value) {
        let bytes = match serde_json::to_vec(result) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "result not cacheable");
                return;
            }
        };
        match self.store.set(key, &bytes, self.ttl) {
            Ok(()) => debug!(key, bytes = bytes.len(), "cached result"),
            Err(e) => warn!(key, error = %e, "result cache write failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Params {
        lon: f64,
        lat: f64,
    }

    #[test]
    fn test_key_is_stable_and_order_independent() {
        let a = ResultCache::key("elevation", &Params { lon: 2.0, lat: 1.0 }).unwrap();
        let b = ResultCache::key("elevation", &json!({"lat": 1.0, "lon": 2.0})).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("elevation:"));
        assert_eq!(a.len(), "elevation:".len() + 64);

        let other = ResultCache::key("link", &json!({"lat": 1.0, "lon": 2.0})).unwrap();
        assert_ne!(a, other);
        let moved = ResultCache::key("elevation", &json!({"lat": 1.0, "lon": 2.5})).unwrap();
        assert_ne!(a, moved);
    }

    #[test]
    fn test_put_then_get() {
        let cache = ResultCache::in_memory();
        assert!(cache.get("op:abc").is_none());
        cache.put("op:abc", &json!({"x": 1}));
        assert_eq!(cache.get("op:abc"), Some(json!({"x": 1})));
    }

    #[test]
    fn test_expired_results_are_misses() {
        let cache = ResultCache::new(Box::new(MemoryStore::new()), Duration::ZERO);
        cache.put("op:abc", &json!(1));
        assert!(cache.get("op:abc").is_none());
    }
}

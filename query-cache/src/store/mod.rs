//! Backing stores and the adapter that makes them failure tolerant.
//!
//! A [`CacheStore`] is one backing technology (Redis, process memory, ...)
//! and reports every failure. The [`StoreAdapter`] wraps one and absorbs
//! those failures: a store that is down, or that was never reached, reads
//! as a miss and rejects writes, and nothing is returned to the caller as
//! an error.

mod info;
mod memory;
#[cfg(feature = "redis-store")]
mod redis_store;

pub use info::{StoreInfo, SETTING_AUTH, SETTING_DB, SETTING_PORT, SETTING_SERVER};
pub use memory::MemoryStore;
#[cfg(feature = "redis-store")]
pub use redis_store::RedisStore;

use std::time::Duration;

use crate::errors::CacheResult;

/// The capabilities the cache needs from a backing store: single key
/// GET/SET/DEL/EXISTS on opaque values, a whole-store flush, and hash
/// structures used to persist the table index and the key registry.
///
/// Every operation is a single round trip and is atomic for the key it
/// touches. Nothing spans several keys atomically.
pub trait CacheStore {
    /// Returns the value stored under `key`.
    fn get(&mut self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, expiring after `ttl` when given.
    fn set(&mut self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()>;

    /// Deletes `keys` and returns how many existed.
    fn del(&mut self, keys: &[String]) -> CacheResult<usize>;

    /// Returns true if `key` holds a value.
    fn exists(&mut self, key: &str) -> CacheResult<bool>;

    /// Removes every key of the store, including keys written by other
    /// clients and other applications.
    fn flush_db(&mut self) -> CacheResult<()>;

    /// Sets `field` of the hash `map`.
    fn hset(&mut self, map: &str, field: &str, value: &[u8]) -> CacheResult<()>;

    /// Returns `field` of the hash `map`.
    fn hget(&mut self, map: &str, field: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Removes `fields` from the hash `map` and returns how many existed.
    fn hdel(&mut self, map: &str, fields: &[String]) -> CacheResult<usize>;

    /// Returns the number of fields of the hash `map`.
    fn hlen(&mut self, map: &str) -> CacheResult<usize>;

    /// Lists the fields of the hash `map`.
    fn hkeys(&mut self, map: &str) -> CacheResult<Vec<String>>;

    /// Returns every field and value of the hash `map`, in no particular
    /// order.
    fn hgetall(&mut self, map: &str) -> CacheResult<Vec<(String, Vec<u8>)>>;

    /// Returns false once the store is known to be unusable.
    fn is_open(&self) -> bool;
}

/// Failure tolerant front of a [`CacheStore`].
///
/// An adapter without a store is in disconnected mode.
pub struct StoreAdapter<S> {
    store: Option<S>,
}

impl<S: CacheStore> StoreAdapter<S> {
    /// Wraps a connected store.
    pub fn new(store: S) -> Self {
        StoreAdapter { store: Some(store) }
    }

    /// Creates an adapter in disconnected mode.
    pub fn disconnected() -> Self {
        StoreAdapter { store: None }
    }

    /// Returns true if a store is attached and still usable.
    pub fn is_connected(&self) -> bool {
        self.store.as_ref().is_some_and(|store| store.is_open())
    }

    /// Returns the wrapped store, if any.
    pub fn store_mut(&mut self) -> Option<&mut S> {
        self.store.as_mut()
    }

    fn call<T>(
        &mut self,
        op: &'static str,
        default: T,
        f: impl FnOnce(&mut S) -> CacheResult<T>,
    ) -> T {
        let Some(store) = self.store.as_mut() else {
            return default;
        };
        match f(store) {
            Ok(value) => value,
            Err(err) => {
                log::warn!("cache store {op} failed: {err}");
                default
            }
        }
    }

    /// Reads `key`; any failure is a miss.
    pub fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        self.call("GET", None, |store| store.get(key))
    }

    /// Writes `key`; returns false if the store did not take it.
    pub fn set(&mut self, key: &str, value: &[u8], ttl: Option<Duration>) -> bool {
        self.call("SET", false, |store| store.set(key, value, ttl).map(|_| true))
    }

    /// Deletes `keys`; returns false if the store could not be asked.
    pub fn del(&mut self, keys: &[String]) -> bool {
        if keys.is_empty() {
            return self.is_connected();
        }
        self.call("DEL", false, |store| store.del(keys).map(|_| true))
    }

    /// Returns true only if the store confirms `key` exists.
    pub fn exists(&mut self, key: &str) -> bool {
        self.call("EXISTS", false, |store| store.exists(key))
    }

    /// Flushes the whole store; returns false on failure.
    pub fn flush(&mut self) -> bool {
        self.call("FLUSHDB", false, |store| store.flush_db().map(|_| true))
    }

    /// Sets a hash field; returns false on failure.
    pub fn hset(&mut self, map: &str, field: &str, value: &[u8]) -> bool {
        self.call("HSET", false, |store| {
            store.hset(map, field, value).map(|_| true)
        })
    }

    /// Reads a hash field; any failure is a miss.
    pub fn hget(&mut self, map: &str, field: &str) -> Option<Vec<u8>> {
        self.call("HGET", None, |store| store.hget(map, field))
    }

    /// Removes hash fields; returns false on failure.
    pub fn hdel(&mut self, map: &str, fields: &[String]) -> bool {
        if fields.is_empty() {
            return self.is_connected();
        }
        self.call("HDEL", false, |store| store.hdel(map, fields).map(|_| true))
    }

    /// Counts hash fields; `None` if the store could not answer.
    pub fn hlen(&mut self, map: &str) -> Option<usize> {
        self.call("HLEN", None, |store| store.hlen(map).map(Some))
    }

    /// Lists hash fields; any failure reads as an empty hash.
    pub fn hkeys(&mut self, map: &str) -> Vec<String> {
        self.call("HKEYS", Vec::new(), |store| store.hkeys(map))
    }

    /// Reads a whole hash; any failure reads as an empty hash.
    pub fn hgetall(&mut self, map: &str) -> Vec<(String, Vec<u8>)> {
        self.call("HGETALL", Vec::new(), |store| store.hgetall(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_adapter_degrades() {
        let mut adapter = StoreAdapter::<MemoryStore>::disconnected();
        assert!(!adapter.is_connected());
        assert!(!adapter.set("k", b"v", None));
        assert_eq!(adapter.get("k"), None);
        assert!(!adapter.exists("k"));
        assert!(!adapter.del(&["k".to_string()]));
        assert!(!adapter.flush());
        assert!(!adapter.hset("m", "f", b"1"));
        assert_eq!(adapter.hget("m", "f"), None);
        assert_eq!(adapter.hlen("m"), None);
        assert!(adapter.hkeys("m").is_empty());
        assert!(adapter.hgetall("m").is_empty());
        assert!(adapter.store_mut().is_none());
    }

    #[test]
    fn test_connected_adapter_passes_through() {
        let mut adapter = StoreAdapter::new(MemoryStore::new());
        assert!(adapter.is_connected());
        assert!(adapter.set("k", b"v", None));
        assert_eq!(adapter.get("k"), Some(b"v".to_vec()));
        assert!(adapter.exists("k"));
        assert!(adapter.del(&["k".to_string()]));
        assert_eq!(adapter.get("k"), None);
        assert!(adapter.del(&[]));
        assert!(adapter.hdel("m", &[]));
        assert_eq!(adapter.hlen("m"), Some(0));
        assert!(adapter.hset("m", "f", b"1"));
        assert_eq!(adapter.hlen("m"), Some(1));
    }

    #[test]
    fn test_closed_store_degrades() {
        let store = MemoryStore::new();
        let mut adapter = StoreAdapter::new(store.clone());
        assert!(adapter.set("k", b"v", None));
        store.set_available(false);
        assert!(!adapter.is_connected());
        assert_eq!(adapter.get("k"), None);
        assert!(!adapter.set("k2", b"v", None));
        store.set_available(true);
        assert_eq!(adapter.get("k"), Some(b"v".to_vec()));
    }
}

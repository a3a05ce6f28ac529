use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::CacheStore;
use crate::errors::{CacheResult, ErrorKind};

#[derive(Default)]
struct Inner {
    values: HashMap<String, (Vec<u8>, Option<Instant>)>,
    hashes: HashMap<String, HashMap<String, Vec<u8>>>,
}

impl Inner {
    fn live_value(&mut self, key: &str) -> Option<&Vec<u8>> {
        let expired = matches!(
            self.values.get(key),
            Some((_, Some(expire_time))) if Instant::now() >= *expire_time
        );
        if expired {
            self.values.remove(key);
        }
        self.values.get(key).map(|(value, _)| value)
    }
}

/// A store living in process memory.
///
/// Clones share the same data, so several caches built on clones of one
/// `MemoryStore` behave like clients of one shared server. Expired values
/// are dropped lazily when read.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    available: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        MemoryStore {
            inner: Arc::default(),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Makes the store (and every clone of it) fail all operations until
    /// made available again. Data is kept.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    /// Returns the number of plain keys, including expired ones not yet
    /// dropped.
    pub fn len(&self) -> usize {
        self.lock().values.len()
    }

    /// Returns true if no plain key is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn checked(&self) -> CacheResult<MutexGuard<'_, Inner>> {
        if !self.available.load(Ordering::Relaxed) {
            fail!((ErrorKind::IoError, "Memory store is unavailable"));
        }
        Ok(self.lock())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl CacheStore for MemoryStore {
    fn get(&mut self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.checked()?.live_value(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        let expire_time = ttl.map(|ttl| Instant::now() + ttl);
        self.checked()?
            .values
            .insert(key.to_string(), (value.to_vec(), expire_time));
        Ok(())
    }

    fn del(&mut self, keys: &[String]) -> CacheResult<usize> {
        let mut inner = self.checked()?;
        let mut removed = 0;
        for key in keys {
            let had_value = inner.live_value(key).is_some();
            inner.values.remove(key);
            let had_hash = inner.hashes.remove(key).is_some();
            if had_value || had_hash {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn exists(&mut self, key: &str) -> CacheResult<bool> {
        let mut inner = self.checked()?;
        Ok(inner.live_value(key).is_some() || inner.hashes.contains_key(key))
    }

    fn flush_db(&mut self) -> CacheResult<()> {
        let mut inner = self.checked()?;
        inner.values.clear();
        inner.hashes.clear();
        Ok(())
    }

    fn hset(&mut self, map: &str, field: &str, value: &[u8]) -> CacheResult<()> {
        self.checked()?
            .hashes
            .entry(map.to_string())
            .or_default()
            .insert(field.to_string(), value.to_vec());
        Ok(())
    }

    fn hget(&mut self, map: &str, field: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self
            .checked()?
            .hashes
            .get(map)
            .and_then(|hash| hash.get(field))
            .cloned())
    }

    fn hdel(&mut self, map: &str, fields: &[String]) -> CacheResult<usize> {
        let mut inner = self.checked()?;
        let Some(hash) = inner.hashes.get_mut(map) else {
            return Ok(0);
        };
        let removed = fields
            .iter()
            .filter(|field| hash.remove(field.as_str()).is_some())
            .count();
        if hash.is_empty() {
            inner.hashes.remove(map);
        }
        Ok(removed)
    }

    fn hlen(&mut self, map: &str) -> CacheResult<usize> {
        Ok(self.checked()?.hashes.get(map).map_or(0, HashMap::len))
    }

    fn hkeys(&mut self, map: &str) -> CacheResult<Vec<String>> {
        Ok(self
            .checked()?
            .hashes
            .get(map)
            .map(|hash| hash.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn hgetall(&mut self, map: &str) -> CacheResult<Vec<(String, Vec<u8>)>> {
        Ok(self
            .checked()?
            .hashes
            .get(map)
            .map(|hash| {
                hash.iter()
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn is_open(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }
}

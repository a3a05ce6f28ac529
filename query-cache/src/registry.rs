use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::store::{CacheStore, StoreAdapter};

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since| since.as_secs())
        .unwrap_or_default()
}

fn parse_expiry(raw: &[u8]) -> Option<u64> {
    std::str::from_utf8(raw).ok()?.parse().ok()
}

/// Every key the cache has written, with its expiry as unix seconds
/// (`0` for none).
///
/// Mirrored in memory and persisted in the store hash `<namespace>:keys`
/// so all clients of the store share it. Reads go through the registry:
/// a key it does not know is a miss even if the store holds a value.
pub(crate) struct KeyRegistry {
    map: String,
    keys: HashMap<String, u64>,
}

impl KeyRegistry {
    pub(crate) fn new(namespace: &str) -> Self {
        KeyRegistry {
            map: format!("{namespace}:keys"),
            keys: HashMap::new(),
        }
    }

    /// Replaces the mirror with the persisted registry.
    pub(crate) fn load<S: CacheStore>(&mut self, store: &mut StoreAdapter<S>) {
        self.keys = store
            .hgetall(&self.map)
            .into_iter()
            .filter_map(|(key, raw)| parse_expiry(&raw).map(|expiry| (key, expiry)))
            .collect();
        log::debug!("loaded {} known cache keys", self.keys.len());
    }

    /// Returns the recorded expiry of `key`, asking the store when another
    /// client registered it after the mirror was loaded.
    fn expiry_of<S: CacheStore>(&mut self, store: &mut StoreAdapter<S>, key: &str) -> Option<u64> {
        if let Some(expiry) = self.keys.get(key) {
            return Some(*expiry);
        }
        let expiry = parse_expiry(&store.hget(&self.map, key)?)?;
        self.keys.insert(key.to_string(), expiry);
        Some(expiry)
    }

    /// Returns true if `key` is registered and not past its expiry.
    pub(crate) fn is_live<S: CacheStore>(&mut self, store: &mut StoreAdapter<S>, key: &str) -> bool {
        match self.expiry_of(store, key) {
            Some(0) => true,
            Some(expiry) => expiry > unix_now(),
            None => false,
        }
    }

    /// Returns true if `key` is registered, live or not.
    pub(crate) fn contains<S: CacheStore>(&mut self, store: &mut StoreAdapter<S>, key: &str) -> bool {
        self.expiry_of(store, key).is_some()
    }

    pub(crate) fn insert<S: CacheStore>(
        &mut self,
        store: &mut StoreAdapter<S>,
        key: &str,
        expiry: u64,
    ) {
        self.keys.insert(key.to_string(), expiry);
        store.hset(&self.map, key, expiry.to_string().as_bytes());
    }

    pub(crate) fn remove<S: CacheStore>(&mut self, store: &mut StoreAdapter<S>, keys: &[String]) {
        for key in keys {
            self.keys.remove(key);
        }
        store.hdel(&self.map, keys);
    }

    /// Returns the locally known keys.
    pub(crate) fn keys(&self) -> impl Iterator<Item = &String> {
        self.keys.keys()
    }

    /// Forgets everything locally; used once the store itself was flushed.
    pub(crate) fn clear(&mut self) {
        self.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_insert_and_expiry() {
        let mut store = StoreAdapter::new(MemoryStore::new());
        let mut registry = KeyRegistry::new("qc");
        registry.insert(&mut store, "forever", 0);
        registry.insert(&mut store, "expired", unix_now() - 1);
        registry.insert(&mut store, "later", unix_now() + 60);

        assert!(registry.is_live(&mut store, "forever"));
        assert!(!registry.is_live(&mut store, "expired"));
        assert!(registry.contains(&mut store, "expired"));
        assert!(registry.is_live(&mut store, "later"));
        assert!(!registry.is_live(&mut store, "unknown"));
    }

    #[test]
    fn test_shared_through_store() {
        let shared = MemoryStore::new();
        let mut store_a = StoreAdapter::new(shared.clone());
        let mut store_b = StoreAdapter::new(shared);
        let mut a = KeyRegistry::new("qc");
        let mut b = KeyRegistry::new("qc");
        b.load(&mut store_b);

        a.insert(&mut store_a, "k", 0);
        // b loaded before the insert and learns the key on demand
        assert!(b.is_live(&mut store_b, "k"));

        a.remove(&mut store_a, &["k".to_string()]);
        let mut c = KeyRegistry::new("qc");
        c.load(&mut store_a);
        assert_eq!(c.keys().count(), 0);
    }
}

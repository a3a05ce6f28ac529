//! The query cache facade.
//!
//! A query executor asks [`QueryCache::get_query`] before running a
//! statement and hands the result to [`QueryCache::set_query`] on a miss.
//! Write statements go through [`QueryCache::delete_query`], which purges
//! every cached result that referenced one of the tables they touch.
//!
//! The store only offers atomic single key operations, so storing a result
//! and registering it under its tables are separate steps. An invalidation
//! of one of those tables landing between the two steps misses the new
//! entry, which then stays readable until its table is invalidated again or
//! it is evicted.
//!
//! Other clients may change the index at any time, so membership checks,
//! the eviction ceiling and invalidation read the stored index rather than
//! this client's mirror of it.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::blacklist::Blacklist;
use crate::config::CacheConfig;
use crate::errors::CacheResult;
use crate::extract::{TableExtractor, Tables};
use crate::index::TableIndex;
use crate::key::{query_key, row_count_key, KeyPattern};
use crate::registry::{unix_now, KeyRegistry};
use crate::statistics::CacheStatistics;
use crate::store::{CacheStore, StoreAdapter};
#[cfg(feature = "redis-store")]
use crate::store::{RedisStore, StoreInfo};

fn expiry_after(ttl: Option<Duration>) -> u64 {
    match ttl {
        // round up so an entry never outlives its recorded expiry
        Some(ttl) => unix_now() + ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0),
        None => 0,
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> CacheResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(raw: &[u8]) -> CacheResult<T> {
    Ok(serde_json::from_slice(raw)?)
}

/// A `null` or `false` query result is stored as an empty list.
fn query_result<T: Serialize + ?Sized>(result: &T) -> CacheResult<Value> {
    Ok(match serde_json::to_value(result)? {
        Value::Null | Value::Bool(false) => Value::Array(Vec::new()),
        value => value,
    })
}

/// A cache of query results in front of a relational database.
///
/// Built on any [`CacheStore`]. Store failures never reach the caller:
/// reads miss, writes report `false`.
///
/// ```rust,no_run
/// use query_cache::{CacheConfig, QueryCache, StoreInfo};
///
/// let info = StoreInfo::from_url("redis://127.0.0.1/").unwrap();
/// let mut cache = QueryCache::open(&info, CacheConfig::default());
/// let query = "SELECT * FROM app_product WHERE id_product = 5";
/// if cache.get_query::<Vec<String>>(query).is_none() {
///     cache.set_query(query, &vec!["a product"]);
/// }
/// cache.delete_query("UPDATE app_product SET price = 3 WHERE id_product = 5");
/// ```
pub struct QueryCache<S> {
    store: StoreAdapter<S>,
    config: CacheConfig,
    extractor: TableExtractor,
    blacklist: Blacklist,
    registry: KeyRegistry,
    index: TableIndex,
    statistics: CacheStatistics,
}

impl<S: CacheStore> QueryCache<S> {
    fn with_adapter(store: StoreAdapter<S>, config: CacheConfig) -> Self {
        let mut cache = QueryCache {
            extractor: TableExtractor::new(config.table_prefix()),
            blacklist: Blacklist::new(config.table_prefix(), &config.blacklist),
            registry: KeyRegistry::new(config.namespace()),
            index: TableIndex::new(
                config.namespace(),
                config.eviction_ceiling.get(),
                config.eviction_trim.get(),
            ),
            store,
            config,
            statistics: CacheStatistics::default(),
        };
        cache.registry.load(&mut cache.store);
        cache
    }

    /// Creates a cache over a connected store.
    pub fn new(store: S, config: CacheConfig) -> Self {
        QueryCache::with_adapter(StoreAdapter::new(store), config)
    }

    /// Creates a cache in disconnected mode: every read misses and every
    /// write or delete reports `false`.
    pub fn disconnected(config: CacheConfig) -> Self {
        QueryCache::with_adapter(StoreAdapter::disconnected(), config)
    }

    /// Swaps the backing store, dropping every in-memory mirror so they are
    /// rebuilt from the new store.
    pub fn attach(&mut self, store: S) {
        self.store = StoreAdapter::new(store);
        self.index.reset();
        self.registry.load(&mut self.store);
    }

    /// Returns true if the backing store is reachable.
    pub fn is_connected(&self) -> bool {
        self.store.is_connected()
    }

    /// Returns the configuration the cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the key under which the result of `query` is cached.
    pub fn key_of(&self, query: &str) -> String {
        query_key(self.config.namespace(), query)
    }

    /// Returns the tables `query` would be indexed under.
    pub fn tables_of(&self, query: &str) -> Option<Tables> {
        self.extractor.extract(query)
    }

    /// Returns true if results of `query` are never cached.
    pub fn is_blacklisted(&self, query: &str) -> bool {
        self.blacklist.is_blacklisted(query)
    }

    /// Returns the counters gathered so far.
    pub fn statistics(&self) -> CacheStatistics {
        self.statistics
    }

    /// Returns the backing store, unless disconnected.
    pub fn store_mut(&mut self) -> Option<&mut S> {
        self.store.store_mut()
    }

    /// Returns the raw bytes cached under `key`.
    pub fn get_raw(&mut self, key: &str) -> Option<Vec<u8>> {
        let value = if self.registry.is_live(&mut self.store, key) {
            self.store.get(key)
        } else {
            None
        };
        match value {
            Some(_) => {
                self.statistics.hit += 1;
                log::trace!("cache hit for {key}");
            }
            None => {
                self.statistics.miss += 1;
                log::trace!("cache miss for {key}");
            }
        }
        value
    }

    /// Returns the value cached under `key`.
    ///
    /// Keys this cache never wrote, keys past their expiry and values that
    /// do not decode as `T` are all misses.
    pub fn get<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        let raw = self.get_raw(key)?;
        match decode(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("cached value under {key} does not decode: {err}");
                None
            }
        }
    }

    /// Returns true if `key` was written by a cache client and has not
    /// expired.
    pub fn exists(&mut self, key: &str) -> bool {
        self.registry.is_live(&mut self.store, key)
    }

    /// Stores raw bytes under `key`, expiring after `ttl` when given.
    pub fn set_raw(&mut self, key: &str, value: &[u8], ttl: Option<Duration>) -> bool {
        if !self.store.set(key, value, ttl) {
            return false;
        }
        self.registry.insert(&mut self.store, key, expiry_after(ttl));
        true
    }

    /// Stores `value` under `key`, expiring after `ttl` when given.
    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        match encode(value) {
            Ok(raw) => self.set_raw(key, &raw, ttl),
            Err(err) => {
                log::warn!("value for {key} does not serialize: {err}");
                false
            }
        }
    }

    /// Caches the result of `query` and indexes it under every table the
    /// query references.
    ///
    /// Blacklisted queries are skipped and report success. A `null` or
    /// `false` result is stored as an empty list. A query referencing no
    /// recognizable table is stored without indexing and is then only
    /// removed by expiry, [`QueryCache::delete`] or [`QueryCache::flush`].
    pub fn set_query<T: Serialize + ?Sized>(&mut self, query: &str, result: &T) -> bool {
        if self.blacklist.is_blacklisted(query) {
            self.statistics.blacklisted += 1;
            log::trace!("not caching blacklisted query");
            return true;
        }
        let value = match query_result(result) {
            Ok(value) => value,
            Err(err) => {
                log::warn!("query result does not serialize: {err}");
                return false;
            }
        };
        let key = self.key_of(query);
        if !self.set(&key, &value, self.config.default_ttl) {
            return false;
        }
        self.statistics.stored += 1;

        let Some(tables) = self.extractor.extract(query) else {
            return true;
        };
        self.index.load(&mut self.store);
        self.index.record_tables(&mut self.store, &key, tables.as_slice());
        for table in &tables {
            if self.index.is_registered(&mut self.store, table, &key) {
                continue;
            }
            let evicted = self.index.adjust_size(&mut self.store, table);
            if !evicted.is_empty() {
                self.statistics.evicted += self.purge(&evicted, Some(table.as_str()));
            }
            self.index.register(&mut self.store, table, &key);
        }
        true
    }

    /// Returns the cached result of `query`.
    pub fn get_query<T: DeserializeOwned>(&mut self, query: &str) -> Option<T> {
        let key = self.key_of(query);
        self.get(&key)
    }

    /// Caches the row count of `query` next to its result. The count is
    /// purged together with the result.
    pub fn set_query_row_count(&mut self, query: &str, rows: u64) -> bool {
        if self.blacklist.is_blacklisted(query) {
            return true;
        }
        let key = row_count_key(&self.key_of(query));
        self.set(&key, &rows, self.config.default_ttl)
    }

    /// Returns the cached row count of `query`.
    pub fn query_row_count(&mut self, query: &str) -> Option<u64> {
        let key = row_count_key(&self.key_of(query));
        self.get(&key)
    }

    /// Purges every cached result that referenced a table `query` touches.
    ///
    /// Meant to be called with the text of write statements. Returns
    /// `false` only when the store is unreachable.
    pub fn delete_query(&mut self, query: &str) -> bool {
        if !self.store.is_connected() {
            return false;
        }
        let Some(tables) = self.extractor.extract(query) else {
            return true;
        };
        self.index.load(&mut self.store);
        for table in &tables {
            let keys = self.index.keys_of_table(&mut self.store, table);
            if keys.is_empty() {
                continue;
            }
            let purged = self.purge(&keys, Some(table.as_str()));
            self.statistics.invalidate += purged;
            log::debug!("invalidated {purged} cached queries of table {table}");
        }
        true
    }

    /// Deletes the keys selected by `pattern` and returns them.
    ///
    /// `pattern` is an exact key, `*` for every key, or a glob where `*`
    /// matches any run of characters. Only keys written by cache clients are
    /// considered.
    pub fn delete(&mut self, pattern: &str) -> Vec<String> {
        let keys: Vec<String> = match KeyPattern::parse(pattern) {
            KeyPattern::Exact(key) => {
                if self.registry.contains(&mut self.store, &key) {
                    vec![key]
                } else {
                    Vec::new()
                }
            }
            pattern => self
                .registry
                .keys()
                .filter(|key| pattern.matches(key))
                .cloned()
                .collect(),
        };
        if keys.is_empty() || !self.store.del(&keys) {
            return Vec::new();
        }
        self.index.load(&mut self.store);
        self.index.forget(&mut self.store, &keys, None);
        self.registry.remove(&mut self.store, &keys);
        keys
    }

    /// Empties the whole backing store, entries of other applications
    /// sharing it included.
    pub fn flush(&mut self) -> bool {
        if !self.store.flush() {
            return false;
        }
        self.registry.clear();
        self.index.clear();
        true
    }

    /// Returns the keys indexed under `table`, oldest first.
    pub fn indexed_keys(&mut self, table: &str) -> Vec<String> {
        self.index.load(&mut self.store);
        self.index.keys_for(table)
    }

    /// Returns the tables holding at least one indexed key.
    pub fn indexed_tables(&mut self) -> Vec<String> {
        self.index.load(&mut self.store);
        self.index.tables()
    }

    /// Deletes `keys` with their row count companions, then drops them from
    /// the index under every table and from the registry. Returns how many
    /// were purged.
    ///
    /// When the store does not confirm the deletion nothing is forgotten,
    /// so the entries stay reachable for the next invalidation or eviction.
    fn purge(&mut self, keys: &[String], table: Option<&str>) -> usize {
        let doomed: Vec<String> = keys
            .iter()
            .flat_map(|key| [key.clone(), row_count_key(key)])
            .collect();
        if !self.store.del(&doomed) {
            log::warn!(
                "could not delete {} cached queries, keeping them indexed",
                keys.len()
            );
            return 0;
        }
        self.index.forget(&mut self.store, keys, table);
        self.registry.remove(&mut self.store, &doomed);
        keys.len()
    }
}

#[cfg(feature = "redis-store")]
impl QueryCache<RedisStore> {
    /// Connects to the Redis server described by `info`.
    ///
    /// An unreachable server or rejected credentials leave the cache in
    /// disconnected mode.
    pub fn open(info: &StoreInfo, config: CacheConfig) -> Self {
        match RedisStore::connect(info) {
            Ok(store) => QueryCache::new(store, config),
            Err(err) => {
                log::warn!(
                    "cache store at {}:{} unavailable, running disconnected: {err}",
                    info.host,
                    info.port
                );
                QueryCache::disconnected(config)
            }
        }
    }

    /// Replaces the connection, typically after the connection settings
    /// changed. On failure the cache is left disconnected.
    pub fn reconnect(&mut self, info: &StoreInfo) -> bool {
        match RedisStore::connect(info) {
            Ok(store) => {
                self.attach(store);
                true
            }
            Err(err) => {
                log::warn!(
                    "cache store at {}:{} unavailable, running disconnected: {err}",
                    info.host,
                    info.port
                );
                self.store = StoreAdapter::disconnected();
                self.index.reset();
                self.registry.clear();
                false
            }
        }
    }
}

#![allow(dead_code)]

use std::num::NonZeroUsize;

use query_cache::{CacheConfig, MemoryStore, QueryCache, RedisStore};
use query_cache_test::FakeRedis;

pub type FakeCache = QueryCache<RedisStore<FakeRedis>>;

pub fn init_logger() {
    let _ = env_logger::try_init();
}

/// A fake server plus helpers to build caches talking to it. Every cache
/// built from one context shares the server, like several application
/// processes sharing one store.
pub struct TestContext {
    pub server: FakeRedis,
    pub config: CacheConfig,
}

impl TestContext {
    pub fn new() -> TestContext {
        TestContext::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> TestContext {
        init_logger();
        TestContext {
            server: FakeRedis::new(),
            config,
        }
    }

    pub fn with_eviction(ceiling: usize, trim: usize) -> TestContext {
        TestContext::with_config(
            CacheConfig::new()
                .set_eviction_ceiling(NonZeroUsize::new(ceiling).unwrap())
                .set_eviction_trim(NonZeroUsize::new(trim).unwrap()),
        )
    }

    pub fn cache(&self) -> FakeCache {
        QueryCache::new(RedisStore::new(self.server.clone()), self.config.clone())
    }
}

pub fn memory_cache() -> QueryCache<MemoryStore> {
    init_logger();
    QueryCache::new(MemoryStore::new(), CacheConfig::default())
}

pub fn select(table: &str, id: usize) -> String {
    format!("SELECT * FROM `{table}` WHERE id = {id}")
}

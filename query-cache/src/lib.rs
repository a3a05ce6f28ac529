//! query-cache caches the results of SQL queries in a key/value store and
//! invalidates exactly the cached results a write statement affects.
//!
//! # Basic Operation
//!
//! A query executor asks the cache before running a statement and stores
//! the result on a miss. Every write statement is passed to the cache too:
//!
//! ```rust,no_run
//! use query_cache::{CacheConfig, QueryCache, StoreInfo};
//!
//! let info = StoreInfo::from_env().unwrap_or_default();
//! let mut cache = QueryCache::open(&info, CacheConfig::default());
//!
//! let select = "SELECT id_product, name FROM app_product WHERE active = 1";
//! let rows: Vec<(u32, String)> = match cache.get_query(select) {
//!     Some(rows) => rows,
//!     None => {
//!         let rows = vec![(1, "chair".to_string())]; // run the query here
//!         cache.set_query(select, &rows);
//!         rows
//!     }
//! };
//!
//! // purges every cached result that read `app_product`
//! cache.delete_query("UPDATE app_product SET active = 0 WHERE id_product = 1");
//! # drop(rows);
//! ```
//!
//! ## Tables and invalidation
//!
//! The tables of a statement are found by scanning its text for `FROM`,
//! `JOIN`, `UPDATE` and `INTO` followed by a name carrying the configured
//! table prefix (`app_` by default), see [`TableExtractor`]. Each cached
//! result is indexed under its tables; invalidating a table deletes every
//! result indexed under it. A table index holding too many results drops the
//! oldest ones first.
//!
//! Statements touching a blacklisted table (carts, customers, connection
//! logs and the like) are never cached, see [`Blacklist`].
//!
//! ## Failure handling
//!
//! The cache never returns store errors. A store that cannot be reached,
//! rejects the credentials or fails mid-operation turns reads into misses
//! and writes into `false`, and the failure is logged through the `log`
//! crate.
//!
//! ## Backing stores
//!
//! Anything implementing [`CacheStore`] can back the cache. [`RedisStore`]
//! (feature `redis-store`, enabled by default) talks to a Redis server;
//! [`MemoryStore`] keeps everything in process memory.

#![deny(non_camel_case_types)]
#![warn(missing_docs)]

// public api
pub use crate::blacklist::Blacklist;
pub use crate::cache::QueryCache;
pub use crate::config::{CacheConfig, DEFAULT_BLACKLIST};
pub use crate::errors::{CacheError, CacheResult, ErrorKind};
pub use crate::extract::{TableExtractor, Tables};
pub use crate::key::{query_key, row_count_key, KeyPattern, ROW_COUNT_SUFFIX};
pub use crate::statistics::CacheStatistics;
#[cfg(feature = "redis-store")]
pub use crate::store::RedisStore;
pub use crate::store::{
    CacheStore, MemoryStore, StoreAdapter, StoreInfo, SETTING_AUTH, SETTING_DB, SETTING_PORT,
    SETTING_SERVER,
};

#[macro_use]
mod macros;

mod blacklist;
mod cache;
mod config;
mod errors;
mod extract;
mod index;
mod key;
mod registry;
mod statistics;
mod store;

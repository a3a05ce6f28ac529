use std::num::NonZeroUsize;
use std::time::Duration;

/// Tables whose rows change on nearly every request. Queries touching them
/// are never cached.
pub const DEFAULT_BLACKLIST: [&str; 12] = [
    "cart",
    "cart_cart_rule",
    "cart_product",
    "connections",
    "connections_source",
    "connections_page",
    "customer",
    "customer_group",
    "customized_data",
    "guest",
    "pagenotfound",
    "page_viewed",
];

/// Configuration for the query cache.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub(crate) table_prefix: String,
    pub(crate) namespace: String,
    pub(crate) eviction_ceiling: NonZeroUsize,
    pub(crate) eviction_trim: NonZeroUsize,
    pub(crate) blacklist: Vec<String>,
    pub(crate) default_ttl: Option<Duration>,
}

impl CacheConfig {
    /// Creates new CacheConfig with default values (`app_` table prefix,
    /// `qc` namespace, 5000/1000 eviction, the default blacklist and no TTL)
    pub fn new() -> Self {
        Self {
            table_prefix: "app_".to_string(),
            namespace: "qc".to_string(),
            eviction_ceiling: NonZeroUsize::new(5000).unwrap(),
            eviction_trim: NonZeroUsize::new(1000).unwrap(),
            blacklist: DEFAULT_BLACKLIST.iter().map(|t| t.to_string()).collect(),
            default_ttl: None,
        }
    }

    /// Sets the prefix every application table name starts with. Only
    /// tables carrying it are indexed or blacklisted.
    pub fn set_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    /// Sets the namespace prepended to every key the cache writes, so
    /// several applications can share one store.
    pub fn set_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets how many keys a single table may index before a trim pass runs.
    pub fn set_eviction_ceiling(mut self, ceiling: NonZeroUsize) -> Self {
        self.eviction_ceiling = ceiling;
        self
    }

    /// Sets how many of the oldest keys a trim pass removes.
    pub fn set_eviction_trim(mut self, trim: NonZeroUsize) -> Self {
        self.eviction_trim = trim;
        self
    }

    /// Replaces the blacklisted table names (without prefix).
    pub fn set_blacklist<I, T>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.blacklist = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the time to live used by [`crate::QueryCache::set_query`].
    /// Plain [`crate::QueryCache::set`] calls pass their own TTL.
    pub fn set_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Returns the table name prefix.
    pub fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    /// Returns the key namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig::new()
    }
}

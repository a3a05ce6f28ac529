//! The table index: for every table, the cache keys of the queries that
//! referenced it, oldest first.
//!
//! The index is mirrored in memory and persisted in the store:
//!
//! * `<namespace>:tables` is a hash whose fields are the indexed tables.
//! * `<namespace>:table:<table>` is a hash whose fields are cache keys and
//!   whose values are insertion sequence numbers.
//! * `<namespace>:key_tables` is a hash from cache key to the comma
//!   separated tables its query referenced.
//!
//! Membership is written one field at a time, so clients sharing a store
//! never overwrite each other's registrations. The stored hashes are the
//! authority: membership checks, the eviction ceiling and invalidation all
//! read them, and the mirror is only a cache of what this client last saw.
//! Sequence numbers are microsecond timestamps (bumped to stay strictly
//! increasing locally), which keeps eviction roughly first-in first-out
//! across clients too.

use std::collections::{BTreeSet, HashMap};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::store::{CacheStore, StoreAdapter};

#[derive(Default)]
struct TableKeys {
    order: BTreeSet<(u64, String)>,
    seq_of: HashMap<String, u64>,
}

impl TableKeys {
    fn insert(&mut self, key: &str, seq: u64) -> bool {
        if self.seq_of.contains_key(key) {
            return false;
        }
        self.seq_of.insert(key.to_string(), seq);
        self.order.insert((seq, key.to_string()));
        true
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.seq_of.remove(key) {
            Some(seq) => self.order.remove(&(seq, key.to_string())),
            None => false,
        }
    }

    fn oldest(&self, count: usize) -> Vec<String> {
        self.order
            .iter()
            .take(count)
            .map(|(_, key)| key.clone())
            .collect()
    }

    fn keys(&self) -> Vec<String> {
        self.oldest(self.order.len())
    }

    fn last_seq(&self) -> Option<u64> {
        self.order.last().map(|(seq, _)| *seq)
    }

    fn len(&self) -> usize {
        self.seq_of.len()
    }
}

fn parse_seq(raw: &[u8]) -> u64 {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_default()
}

/// Per-table secondary index from table name to cache keys.
pub(crate) struct TableIndex {
    namespace: String,
    ceiling: usize,
    trim: usize,
    tables: Option<HashMap<String, TableKeys>>,
    // the tables of a key never change: the key is a digest of the query
    key_tables: HashMap<String, Vec<String>>,
}

impl TableIndex {
    pub(crate) fn new(namespace: &str, ceiling: usize, trim: usize) -> Self {
        TableIndex {
            namespace: namespace.to_string(),
            ceiling,
            trim,
            tables: None,
            key_tables: HashMap::new(),
        }
    }

    fn directory_map(&self) -> String {
        format!("{}:tables", self.namespace)
    }

    fn table_map(&self, table: &str) -> String {
        format!("{}:table:{table}", self.namespace)
    }

    fn key_tables_map(&self) -> String {
        format!("{}:key_tables", self.namespace)
    }

    fn read_table<S: CacheStore>(&self, store: &mut StoreAdapter<S>, table: &str) -> TableKeys {
        let mut keys = TableKeys::default();
        for (key, raw) in store.hgetall(&self.table_map(table)) {
            keys.insert(&key, parse_seq(&raw));
        }
        keys
    }

    /// Loads the persisted index on first use.
    pub(crate) fn load<S: CacheStore>(&mut self, store: &mut StoreAdapter<S>) {
        if self.tables.is_some() || !store.is_connected() {
            return;
        }
        let mut tables = HashMap::new();
        for table in store.hkeys(&self.directory_map()) {
            let keys = self.read_table(store, &table);
            tables.insert(table, keys);
        }
        log::debug!("loaded table index for {} tables", tables.len());
        self.tables = Some(tables);
    }

    fn tables_mut(&mut self) -> &mut HashMap<String, TableKeys> {
        self.tables.get_or_insert_with(HashMap::new)
    }

    /// Returns true if the store lists `key` under `table`, and brings the
    /// mirror in line with the answer.
    pub(crate) fn is_registered<S: CacheStore>(
        &mut self,
        store: &mut StoreAdapter<S>,
        table: &str,
        key: &str,
    ) -> bool {
        let persisted = store
            .hget(&self.table_map(table), key)
            .map(|raw| parse_seq(&raw));
        let tables = self.tables_mut();
        match persisted {
            Some(seq) => {
                tables.entry(table.to_string()).or_default().insert(key, seq);
                true
            }
            None => {
                if let Some(keys) = tables.get_mut(table) {
                    keys.remove(key);
                }
                false
            }
        }
    }

    /// Returns the keys indexed under `table`, oldest first.
    pub(crate) fn keys_for(&self, table: &str) -> Vec<String> {
        self.tables
            .as_ref()
            .and_then(|tables| tables.get(table))
            .map(TableKeys::keys)
            .unwrap_or_default()
    }

    /// Returns the indexed table names.
    pub(crate) fn tables(&self) -> Vec<String> {
        self.tables
            .as_ref()
            .map(|tables| {
                tables
                    .iter()
                    .filter(|(_, keys)| keys.len() > 0)
                    .map(|(table, _)| table.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Picks the keys to evict before one more key joins `table`.
    ///
    /// The ceiling applies to the stored index, registrations of every
    /// client included. Once it is reached the mirror of `table` is
    /// refreshed and its oldest `trim` keys are returned. They keep their
    /// membership until [`TableIndex::forget`] is called, so the caller can
    /// delete the entries first.
    pub(crate) fn adjust_size<S: CacheStore>(
        &mut self,
        store: &mut StoreAdapter<S>,
        table: &str,
    ) -> Vec<String> {
        let (ceiling, trim) = (self.ceiling, self.trim);
        let local = self
            .tables
            .as_ref()
            .and_then(|tables| tables.get(table))
            .map_or(0, TableKeys::len);
        let len = store.hlen(&self.table_map(table)).unwrap_or(local);
        if len < ceiling {
            return Vec::new();
        }
        let persisted = self.read_table(store, table);
        let keys = self.tables_mut().entry(table.to_string()).or_default();
        if persisted.len() > 0 {
            *keys = persisted;
        }
        let evicted = keys.oldest(trim);
        log::debug!(
            "table {table} holds {len} cached queries, evicting the oldest {}",
            evicted.len()
        );
        evicted
    }

    /// Adds `key` under `table`. Returns false if the mirror already had it.
    ///
    /// The stored membership is written either way: another client may
    /// have dropped it since the mirror was loaded.
    pub(crate) fn register<S: CacheStore>(
        &mut self,
        store: &mut StoreAdapter<S>,
        table: &str,
        key: &str,
    ) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since| since.as_micros() as u64)
            .unwrap_or_default();
        let directory = self.directory_map();
        let map = self.table_map(table);
        let keys = self.tables_mut().entry(table.to_string()).or_default();
        let (seq, added) = match keys.seq_of.get(key) {
            Some(seq) => (*seq, false),
            None => {
                let seq = keys.last_seq().map_or(now, |last| now.max(last + 1));
                keys.insert(key, seq);
                (seq, true)
            }
        };
        store.hset(&directory, table, b"1");
        store.hset(&map, key, seq.to_string().as_bytes());
        added
    }

    /// Records which tables the query behind `key` referenced, so the key
    /// can later be dropped from all of them.
    pub(crate) fn record_tables<S: CacheStore>(
        &mut self,
        store: &mut StoreAdapter<S>,
        key: &str,
        tables: &[String],
    ) {
        store.hset(&self.key_tables_map(), key, tables.join(",").as_bytes());
        self.key_tables.insert(key.to_string(), tables.to_vec());
    }

    fn tables_of<S: CacheStore>(&mut self, store: &mut StoreAdapter<S>, key: &str) -> Vec<String> {
        if let Some(tables) = self.key_tables.get(key) {
            return tables.clone();
        }
        let Some(raw) = store.hget(&self.key_tables_map(), key) else {
            return Vec::new();
        };
        let tables: Vec<String> = String::from_utf8_lossy(&raw)
            .split(',')
            .filter(|table| !table.is_empty())
            .map(str::to_string)
            .collect();
        self.key_tables.insert(key.to_string(), tables.clone());
        tables
    }

    /// Returns every key indexed under `table`, including keys other
    /// clients registered since the mirror was loaded.
    pub(crate) fn keys_of_table<S: CacheStore>(
        &mut self,
        store: &mut StoreAdapter<S>,
        table: &str,
    ) -> Vec<String> {
        let persisted = self.read_table(store, table);
        let keys = self.tables_mut().entry(table.to_string()).or_default();
        for (seq, key) in persisted.order {
            keys.insert(&key, seq);
        }
        keys.keys()
    }

    /// Drops `keys` from every table listing them, `origin` included even
    /// when the key's tables were never recorded.
    pub(crate) fn forget<S: CacheStore>(
        &mut self,
        store: &mut StoreAdapter<S>,
        keys: &[String],
        origin: Option<&str>,
    ) {
        let mut by_table: HashMap<String, Vec<String>> = HashMap::new();
        for key in keys {
            let mut tables = self.tables_of(store, key);
            if let Some(origin) = origin.filter(|origin| !tables.iter().any(|t| t == origin)) {
                tables.push(origin.to_string());
            }
            for table in tables {
                by_table.entry(table).or_default().push(key.clone());
            }
        }

        let directory = self.directory_map();
        for (table, members) in by_table {
            if let Some(mirror) = self.tables.as_mut() {
                if let Some(local) = mirror.get_mut(&table) {
                    for key in &members {
                        local.remove(key);
                    }
                    if local.len() == 0 {
                        mirror.remove(&table);
                    }
                }
            }
            let map = self.table_map(&table);
            store.hdel(&map, &members);
            if store.hlen(&map) == Some(0) {
                store.hdel(&directory, &[table]);
            }
        }

        store.hdel(&self.key_tables_map(), keys);
        for key in keys {
            self.key_tables.remove(key);
        }
    }

    /// Forgets everything locally; used once the store itself was flushed.
    pub(crate) fn clear(&mut self) {
        self.tables = Some(HashMap::new());
        self.key_tables.clear();
    }

    /// Forgets the mirror so the next use reloads it from the store.
    pub(crate) fn reset(&mut self) {
        self.tables = None;
        self.key_tables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn index(ceiling: usize, trim: usize) -> (TableIndex, StoreAdapter<MemoryStore>) {
        let mut store = StoreAdapter::new(MemoryStore::new());
        let mut index = TableIndex::new("qc", ceiling, trim);
        index.load(&mut store);
        (index, store)
    }

    fn shared_pair() -> (
        (TableIndex, StoreAdapter<MemoryStore>),
        (TableIndex, StoreAdapter<MemoryStore>),
    ) {
        let shared = MemoryStore::new();
        let mut store_a = StoreAdapter::new(shared.clone());
        let mut store_b = StoreAdapter::new(shared);
        let mut a = TableIndex::new("qc", 4, 2);
        let mut b = TableIndex::new("qc", 4, 2);
        a.load(&mut store_a);
        b.load(&mut store_b);
        ((a, store_a), (b, store_b))
    }

    #[test]
    fn test_register_keeps_insertion_order() {
        let (mut index, mut store) = index(10, 2);
        for key in ["c", "a", "b"] {
            assert!(index.register(&mut store, "app_t", key));
        }
        assert!(!index.register(&mut store, "app_t", "a"));
        assert_eq!(index.keys_for("app_t"), vec!["c", "a", "b"]);
        assert!(index.is_registered(&mut store, "app_t", "a"));
        assert!(!index.is_registered(&mut store, "app_u", "a"));
    }

    #[test]
    fn test_adjust_size_picks_oldest() {
        let (mut index, mut store) = index(4, 2);
        for key in ["k1", "k2", "k3", "k4"] {
            assert!(index.adjust_size(&mut store, "app_t").is_empty());
            index.register(&mut store, "app_t", key);
        }

        let evicted = index.adjust_size(&mut store, "app_t");
        assert_eq!(evicted, vec!["k1", "k2"]);
        // candidates stay indexed until forgotten
        assert_eq!(store.hlen("qc:table:app_t"), Some(4));
        index.forget(&mut store, &evicted, Some("app_t"));
        index.register(&mut store, "app_t", "k5");
        assert_eq!(index.keys_for("app_t"), vec!["k3", "k4", "k5"]);
        assert_eq!(store.hlen("qc:table:app_t"), Some(3));
    }

    #[test]
    fn test_adjust_size_on_unknown_table_is_noop() {
        let (mut index, mut store) = index(1, 1);
        assert!(index.adjust_size(&mut store, "app_none").is_empty());
    }

    #[test]
    fn test_ceiling_counts_every_client() {
        let ((mut a, mut store_a), (mut b, mut store_b)) = shared_pair();
        a.register(&mut store_a, "app_t", "from_a_1");
        a.register(&mut store_a, "app_t", "from_a_2");
        std::thread::sleep(std::time::Duration::from_millis(2));
        b.register(&mut store_b, "app_t", "from_b_1");
        b.register(&mut store_b, "app_t", "from_b_2");

        // b only registered two keys itself, the table holds four
        assert_eq!(b.adjust_size(&mut store_b, "app_t"), vec!["from_a_1", "from_a_2"]);
    }

    #[test]
    fn test_stale_mirror_is_corrected() {
        let ((mut a, mut store_a), (mut b, mut store_b)) = shared_pair();
        a.register(&mut store_a, "app_t", "k");
        let keys = b.keys_of_table(&mut store_b, "app_t");
        b.forget(&mut store_b, &keys, Some("app_t"));

        assert_eq!(a.keys_for("app_t"), vec!["k"]);
        assert!(!a.is_registered(&mut store_a, "app_t", "k"));
        assert!(a.keys_for("app_t").is_empty());
        a.register(&mut store_a, "app_t", "k");
        assert_eq!(b.keys_of_table(&mut store_b, "app_t"), vec!["k"]);
    }

    #[test]
    fn test_persisted_and_reloaded() {
        let shared = MemoryStore::new();
        let mut store = StoreAdapter::new(shared.clone());
        let mut writer = TableIndex::new("qc", 10, 2);
        writer.load(&mut store);
        writer.register(&mut store, "app_a", "k1");
        writer.register(&mut store, "app_a", "k2");
        writer.register(&mut store, "app_b", "k3");

        let mut reader_store = StoreAdapter::new(shared);
        let mut reader = TableIndex::new("qc", 10, 2);
        reader.load(&mut reader_store);
        let mut tables = reader.tables();
        tables.sort();
        assert_eq!(tables, vec!["app_a", "app_b"]);
        assert_eq!(reader.keys_for("app_a"), vec!["k1", "k2"]);
    }

    #[test]
    fn test_keys_of_table_includes_foreign_keys() {
        let ((mut a, mut store_a), (mut b, mut store_b)) = shared_pair();
        a.register(&mut store_a, "app_t", "from_a");
        b.register(&mut store_b, "app_t", "from_b");

        let mut keys = a.keys_of_table(&mut store_a, "app_t");
        keys.sort();
        assert_eq!(keys, vec!["from_a", "from_b"]);

        a.forget(&mut store_a, &keys, Some("app_t"));
        assert!(a.keys_for("app_t").is_empty());
        let mut reloaded = TableIndex::new("qc", 10, 2);
        reloaded.load(&mut store_a);
        assert!(reloaded.tables().is_empty());
    }

    #[test]
    fn test_forget_reaches_every_table() {
        let ((mut a, mut store_a), (mut b, mut store_b)) = shared_pair();
        let tables = vec!["app_a".to_string(), "app_b".to_string()];
        a.record_tables(&mut store_a, "joined", &tables);
        for table in &tables {
            a.register(&mut store_a, table, "joined");
        }
        a.register(&mut store_a, "app_b", "other");

        // b never saw the key registered, the stored record is enough
        b.forget(&mut store_b, &["joined".to_string()], Some("app_a"));
        assert_eq!(store_b.hlen("qc:table:app_a"), Some(0));
        assert_eq!(b.keys_of_table(&mut store_b, "app_b"), vec!["other"]);
        assert_eq!(store_b.hget("qc:key_tables", "joined"), None);
        assert_eq!(store_b.hkeys("qc:tables"), vec!["app_b"]);
    }
}

//! Testing support
//!
//! This crate provides `FakeRedis`, an in-process stand-in for a Redis
//! server that implements `ConnectionLike` and keeps real state, so a
//! `RedisStore` can be exercised without a server. It also provides
//! `FailingStore`, a `CacheStore` whose every operation fails.
//!
//! # Example
//!
//! ```rust
//! use query_cache::{CacheConfig, QueryCache, RedisStore};
//! use query_cache_test::FakeRedis;
//!
//! let server = FakeRedis::new();
//! let mut cache = QueryCache::new(RedisStore::new(server.clone()), CacheConfig::default());
//! assert!(cache.set_query("SELECT * FROM app_product", &[1, 2]));
//! assert!(server.received().iter().any(|name| name == "HSET"));
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use query_cache::{CacheError, CacheResult, CacheStore, ErrorKind as CacheErrorKind};
use redis::{ConnectionLike, ErrorKind, RedisError, RedisResult, Value};

#[derive(Default)]
struct State {
    values: HashMap<Vec<u8>, (Vec<u8>, Option<Instant>)>,
    hashes: HashMap<Vec<u8>, HashMap<Vec<u8>, Vec<u8>>>,
    received: Vec<String>,
    failing: Vec<String>,
}

impl State {
    fn live_value(&mut self, key: &[u8]) -> Option<&Vec<u8>> {
        let expired = matches!(
            self.values.get(key),
            Some((_, Some(expire_time))) if Instant::now() >= *expire_time
        );
        if expired {
            self.values.remove(key);
        }
        self.values.get(key).map(|(value, _)| value)
    }

    fn execute(&mut self, name: &str, args: &[Vec<u8>]) -> RedisResult<Value> {
        match (name, args) {
            ("PING", []) => Ok(Value::SimpleString("PONG".to_string())),
            ("GET", [key]) => Ok(self
                .live_value(key)
                .cloned()
                .map_or(Value::Nil, Value::BulkString)),
            ("SET", [key, value]) => {
                self.values.insert(key.clone(), (value.clone(), None));
                Ok(Value::Okay)
            }
            ("SET", [key, value, px, ms]) if px.eq_ignore_ascii_case(b"PX") => {
                let ms: u64 = std::str::from_utf8(ms)
                    .ok()
                    .and_then(|ms| ms.parse().ok())
                    .filter(|ms| *ms > 0)
                    .ok_or_else(|| {
                        RedisError::from((ErrorKind::ResponseError, "invalid expire time in 'set' command"))
                    })?;
                let expire_time = Instant::now() + Duration::from_millis(ms);
                self.values
                    .insert(key.clone(), (value.clone(), Some(expire_time)));
                Ok(Value::Okay)
            }
            ("DEL", keys) if !keys.is_empty() => {
                let mut removed = 0;
                for key in keys {
                    let had_value = self.live_value(key).is_some();
                    self.values.remove(key);
                    if had_value || self.hashes.remove(key).is_some() {
                        removed += 1;
                    }
                }
                Ok(Value::Int(removed))
            }
            ("EXISTS", [key]) => {
                let exists = self.live_value(key).is_some() || self.hashes.contains_key(key);
                Ok(Value::Int(exists as i64))
            }
            ("FLUSHDB", []) => {
                self.values.clear();
                self.hashes.clear();
                Ok(Value::Okay)
            }
            ("HSET", [map, field, value]) => {
                let added = self
                    .hashes
                    .entry(map.clone())
                    .or_default()
                    .insert(field.clone(), value.clone())
                    .is_none();
                Ok(Value::Int(added as i64))
            }
            ("HGET", [map, field]) => Ok(self
                .hashes
                .get(map)
                .and_then(|hash| hash.get(field))
                .cloned()
                .map_or(Value::Nil, Value::BulkString)),
            ("HDEL", [map, fields @ ..]) if !fields.is_empty() => {
                let Some(hash) = self.hashes.get_mut(map) else {
                    return Ok(Value::Int(0));
                };
                let removed = fields
                    .iter()
                    .filter(|field| hash.remove(*field).is_some())
                    .count();
                if hash.is_empty() {
                    self.hashes.remove(map);
                }
                Ok(Value::Int(removed as i64))
            }
            ("HLEN", [map]) => Ok(Value::Int(
                self.hashes.get(map).map_or(0, HashMap::len) as i64,
            )),
            ("HKEYS", [map]) => Ok(Value::Array(
                self.hashes
                    .get(map)
                    .map(|hash| hash.keys().cloned().map(Value::BulkString).collect())
                    .unwrap_or_default(),
            )),
            ("HGETALL", [map]) => Ok(Value::Array(
                self.hashes
                    .get(map)
                    .map(|hash| {
                        hash.iter()
                            .flat_map(|(field, value)| {
                                [
                                    Value::BulkString(field.clone()),
                                    Value::BulkString(value.clone()),
                                ]
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            )),
            _ => Err(RedisError::from((
                ErrorKind::ResponseError,
                "unknown command or wrong number of arguments",
                name.to_string(),
            ))),
        }
    }
}

/// Splits a packed command into its upper-cased name and arguments.
fn unpack(cmd: &[u8]) -> RedisResult<(String, Vec<Vec<u8>>)> {
    let invalid = || RedisError::from((ErrorKind::ResponseError, "invalid packed command"));
    let Value::Array(parts) = redis::parse_redis_value(cmd)? else {
        return Err(invalid());
    };
    let mut parts = parts.into_iter().map(|part| match part {
        Value::BulkString(bytes) => Ok(bytes),
        _ => Err(invalid()),
    });
    let name = parts.next().ok_or_else(invalid)??;
    let args = parts.collect::<RedisResult<Vec<_>>>()?;
    Ok((String::from_utf8_lossy(&name).to_ascii_uppercase(), args))
}

/// An in-process Redis stand-in with real state.
///
/// Clones share the same data, like several connections to one server.
/// Supports the commands a `RedisStore` sends: `PING`, `GET`, `SET` (with
/// `PX`), `DEL`, `EXISTS`, `FLUSHDB`, `HSET`, `HGET`, `HDEL`, `HLEN`,
/// `HKEYS` and `HGETALL`. Anything else is answered with an error.
#[derive(Clone, Default)]
pub struct FakeRedis {
    state: Arc<Mutex<State>>,
    down: Arc<AtomicBool>,
}

impl FakeRedis {
    /// Creates an empty server.
    pub fn new() -> Self {
        FakeRedis::default()
    }

    /// Simulates an outage: while down, every command fails with an I/O
    /// error and the connection reports itself closed. Data is kept.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::Relaxed);
    }

    /// Makes the commands named in `names` fail with a timeout while the
    /// connection stays open. An empty list restores normal service.
    pub fn fail_commands(&self, names: &[&str]) {
        self.lock().failing = names.iter().map(|name| name.to_ascii_uppercase()).collect();
    }

    /// Returns the names of every command received so far, in order.
    pub fn received(&self) -> Vec<String> {
        self.lock().received.clone()
    }

    /// Returns true if the server holds `key`, as a plain value or a hash.
    pub fn contains_key(&self, key: &str) -> bool {
        let mut state = self.lock();
        state.live_value(key.as_bytes()).is_some() || state.hashes.contains_key(key.as_bytes())
    }

    /// Returns the number of fields of the hash `map`.
    pub fn hash_len(&self, map: &str) -> usize {
        self.lock()
            .hashes
            .get(map.as_bytes())
            .map_or(0, HashMap::len)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ConnectionLike for FakeRedis {
    fn req_packed_command(&mut self, cmd: &[u8]) -> RedisResult<Value> {
        if self.down.load(Ordering::Relaxed) {
            return Err(RedisError::from(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "fake server is down",
            )));
        }
        let (name, args) = unpack(cmd)?;
        let mut state = self.lock();
        state.received.push(name.clone());
        if state.failing.contains(&name) {
            return Err(RedisError::from(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "fake server timed out",
            )));
        }
        state.execute(&name, &args)
    }

    fn req_packed_commands(
        &mut self,
        _cmd: &[u8],
        _offset: usize,
        _count: usize,
    ) -> RedisResult<Vec<Value>> {
        Err(RedisError::from((
            ErrorKind::ResponseError,
            "pipelines are not supported by the fake server",
        )))
    }

    fn get_db(&self) -> i64 {
        0
    }

    fn check_connection(&mut self) -> bool {
        !self.down.load(Ordering::Relaxed)
    }

    fn is_open(&self) -> bool {
        !self.down.load(Ordering::Relaxed)
    }
}

/// A store that fails every operation with the configured error kind while
/// still claiming to be open, like a server that accepted the connection
/// and then misbehaves.
pub struct FailingStore {
    kind: CacheErrorKind,
    calls: usize,
}

impl FailingStore {
    /// Creates a store failing with `kind`.
    pub fn new(kind: CacheErrorKind) -> Self {
        FailingStore { kind, calls: 0 }
    }

    /// Returns how many operations were attempted.
    pub fn calls(&self) -> usize {
        self.calls
    }

    fn fail<T>(&mut self) -> CacheResult<T> {
        self.calls += 1;
        Err(CacheError::from((self.kind, "Injected failure")))
    }
}

impl Default for FailingStore {
    fn default() -> Self {
        FailingStore::new(CacheErrorKind::IoError)
    }
}

impl CacheStore for FailingStore {
    fn get(&mut self, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        self.fail()
    }

    fn set(&mut self, _key: &str, _value: &[u8], _ttl: Option<Duration>) -> CacheResult<()> {
        self.fail()
    }

    fn del(&mut self, _keys: &[String]) -> CacheResult<usize> {
        self.fail()
    }

    fn exists(&mut self, _key: &str) -> CacheResult<bool> {
        self.fail()
    }

    fn flush_db(&mut self) -> CacheResult<()> {
        self.fail()
    }

    fn hset(&mut self, _map: &str, _field: &str, _value: &[u8]) -> CacheResult<()> {
        self.fail()
    }

    fn hget(&mut self, _map: &str, _field: &str) -> CacheResult<Option<Vec<u8>>> {
        self.fail()
    }

    fn hdel(&mut self, _map: &str, _fields: &[String]) -> CacheResult<usize> {
        self.fail()
    }

    fn hlen(&mut self, _map: &str) -> CacheResult<usize> {
        self.fail()
    }

    fn hkeys(&mut self, _map: &str) -> CacheResult<Vec<String>> {
        self.fail()
    }

    fn hgetall(&mut self, _map: &str) -> CacheResult<Vec<(String, Vec<u8>)>> {
        self.fail()
    }

    fn is_open(&self) -> bool {
        true
    }
}

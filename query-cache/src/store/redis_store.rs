use std::collections::HashMap;
use std::time::Duration;

use redis::{Commands, ConnectionLike};

use super::{CacheStore, StoreInfo};
use crate::errors::CacheResult;

/// A store backed by a Redis server.
///
/// Generic over the connection so anything that behaves like a Redis
/// connection can back the cache; [`RedisStore::connect`] opens a real one.
pub struct RedisStore<C = redis::Connection> {
    con: C,
}

impl RedisStore<redis::Connection> {
    /// Connects, authenticates and selects the database described by `info`.
    ///
    /// Reads and writes on the returned connection are bounded by
    /// `info.io_timeout`, so a stalled server surfaces as an error instead
    /// of blocking the caller.
    pub fn connect(info: &StoreInfo) -> CacheResult<Self> {
        let client = redis::Client::open(info.to_connection_info())?;
        let con = client.get_connection_with_timeout(info.connect_timeout)?;
        con.set_read_timeout(Some(info.io_timeout))?;
        con.set_write_timeout(Some(info.io_timeout))?;
        let mut store = RedisStore { con };
        store.ping()?;
        log::debug!(
            "connected to redis at {}:{} (db {})",
            info.host,
            info.port,
            info.db
        );
        Ok(store)
    }
}

impl<C: ConnectionLike> RedisStore<C> {
    /// Wraps an established connection.
    pub fn new(con: C) -> Self {
        RedisStore { con }
    }

    /// Checks the server answers.
    pub fn ping(&mut self) -> CacheResult<()> {
        let _: String = redis::cmd("PING").query(&mut self.con)?;
        Ok(())
    }

    /// Returns the underlying connection.
    pub fn into_inner(self) -> C {
        self.con
    }
}

impl<C: ConnectionLike> CacheStore for RedisStore<C> {
    fn get(&mut self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.con.get(key)?)
    }

    fn set(&mut self, key: &str, value: &[u8], ttl: Option<Duration>) -> CacheResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            // PX rejects 0
            cmd.arg("PX").arg((ttl.as_millis() as u64).max(1));
        }
        cmd.query::<()>(&mut self.con)?;
        Ok(())
    }

    fn del(&mut self, keys: &[String]) -> CacheResult<usize> {
        Ok(self.con.del(keys)?)
    }

    fn exists(&mut self, key: &str) -> CacheResult<bool> {
        Ok(self.con.exists(key)?)
    }

    fn flush_db(&mut self) -> CacheResult<()> {
        redis::cmd("FLUSHDB").query::<()>(&mut self.con)?;
        Ok(())
    }

    fn hset(&mut self, map: &str, field: &str, value: &[u8]) -> CacheResult<()> {
        self.con.hset::<_, _, _, ()>(map, field, value)?;
        Ok(())
    }

    fn hget(&mut self, map: &str, field: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.con.hget(map, field)?)
    }

    fn hdel(&mut self, map: &str, fields: &[String]) -> CacheResult<usize> {
        Ok(self.con.hdel(map, fields)?)
    }

    fn hlen(&mut self, map: &str) -> CacheResult<usize> {
        Ok(self.con.hlen(map)?)
    }

    fn hkeys(&mut self, map: &str) -> CacheResult<Vec<String>> {
        Ok(self.con.hkeys(map)?)
    }

    fn hgetall(&mut self, map: &str) -> CacheResult<Vec<(String, Vec<u8>)>> {
        let hash: HashMap<String, Vec<u8>> = self.con.hgetall(map)?;
        Ok(hash.into_iter().collect())
    }

    fn is_open(&self) -> bool {
        self.con.is_open()
    }
}

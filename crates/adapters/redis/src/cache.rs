//! Redis Cache 实现

use async_trait::async_trait;
use carelink_errors::AppResult;
use carelink_ports::CachePort;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::map_redis_error;

/// 比较并替换：值匹配时写入新值并设置毫秒级 TTL
const REPLACE_IF_EQUALS: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[3])
    return 1
else
    return 0
end
";

/// 为键加上命名空间前缀
pub fn namespaced_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}:{}", prefix, key)
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

/// Redis Cache
///
/// `ConnectionManager` 内部多路复用，clone 开销很小，可跨任务共享。
pub struct RedisCache {
    conn: ConnectionManager,
    prefix: String,
    replace_script: Script,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            prefix: String::new(),
            replace_script: Script::new(REPLACE_IF_EQUALS),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key(&self, key: &str) -> String {
        namespaced_key(&self.prefix, key)
    }
}

#[async_trait]
impl CachePort for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(self.key(key))
            .await
            .map_err(|e| map_redis_error("get", e))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.key(key)).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        cmd.query_async::<()>(&mut conn)
            .await
            .map_err(|e| map_redis_error("set", e))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.key(key))
            .await
            .map_err(|e| map_redis_error("delete", e))
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        conn.exists(self.key(key))
            .await
            .map_err(|e| map_redis_error("exists", e))
    }

    async fn replace_if_equals(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let replaced: i64 = self
            .replace_script
            .key(self.key(key))
            .arg(expected)
            .arg(value)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("replace_if_equals", e))?;

        Ok(replaced == 1)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let key = self.key(key);
        let _: () = redis::pipe()
            .atomic()
            .hset(&key, field, value)
            .ignore()
            .pexpire(&key, ttl_millis(ttl) as i64)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| map_redis_error("hash_set", e))?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> AppResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        conn.hgetall(self.key(key))
            .await
            .map_err(|e| map_redis_error("hash_get_all", e))
    }

    async fn hash_delete(&self, key: &str, field: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn
            .hdel(self.key(key), field)
            .await
            .map_err(|e| map_redis_error("hash_delete", e))?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_key() {
        assert_eq!(namespaced_key("carelink", "auth:user:1"), "carelink:auth:user:1");
        assert_eq!(namespaced_key("", "auth:user:1"), "auth:user:1");
    }

    #[test]
    fn test_sub_millisecond_ttl_rounds_up() {
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
    }
}

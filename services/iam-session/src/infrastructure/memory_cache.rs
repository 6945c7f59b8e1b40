//! 进程内缓存
//!
//! 实现与 Redis 相同的 `CachePort` 语义（含 TTL 与原子比较并替换），
//! 用于测试和本地运行。过期条目在读取时惰性清理。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use carelink_errors::{AppError, AppResult};
use carelink_ports::CachePort;
use parking_lot::Mutex;

enum Value {
    Text(String),
    Hash(HashMap<String, String>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

fn wrong_type(key: &str) -> AppError {
    AppError::internal(format!("Cache key {} holds the wrong kind of value", key))
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 未过期的条目；已过期的顺手删除
    fn live_entry<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
        let now = Instant::now();
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }

    fn live_text(entries: &mut HashMap<String, Entry>, key: &str) -> AppResult<Option<String>> {
        match Self::live_entry(entries, key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    /// 剩余 TTL；键不存在或永不过期时返回 None
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.lock();
        let entry = entries.get(key)?;
        let at = entry.expires_at?;
        at.checked_duration_since(Instant::now())
    }

    /// 未过期条目数
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CachePort for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Self::live_text(&mut self.entries.lock(), key)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(Self::live_entry(&mut self.entries.lock(), key).is_some())
    }

    async fn replace_if_equals(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> AppResult<bool> {
        let mut entries = self.entries.lock();
        if Self::live_text(&mut entries, key)?.as_deref() != Some(expected) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut entries = self.entries.lock();
        let expires_at = Some(Instant::now() + ttl);
        match Self::live_entry(&mut entries, key) {
            Some(entry) => {
                let Value::Hash(fields) = &mut entry.value else {
                    return Err(wrong_type(key));
                };
                fields.insert(field.to_string(), value.to_string());
                entry.expires_at = expires_at;
            }
            None => {
                let fields = HashMap::from([(field.to_string(), value.to_string())]);
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Hash(fields),
                        expires_at,
                    },
                );
            }
        }
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> AppResult<HashMap<String, String>> {
        let mut entries = self.entries.lock();
        match Self::live_entry(&mut entries, key) {
            None => Ok(HashMap::new()),
            Some(Entry {
                value: Value::Hash(fields),
                ..
            }) => Ok(fields.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hash_delete(&self, key: &str, field: &str) -> AppResult<bool> {
        let mut entries = self.entries.lock();
        let Some(entry) = Self::live_entry(&mut entries, key) else {
            return Ok(false);
        };
        let Value::Hash(fields) = &mut entry.value else {
            return Err(wrong_type(key));
        };
        let removed = fields.remove(field).is_some();
        // 与 Redis 一致：最后一个字段删除后键随之消失
        if fields.is_empty() {
            entries.remove(key);
        }
        Ok(removed)
    }
}

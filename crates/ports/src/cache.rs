//! Cache trait 定义

use async_trait::async_trait;
use carelink_errors::AppResult;
use std::collections::HashMap;
use std::time::Duration;

/// 键值缓存 trait
///
/// 实现必须可被任意数量的并发调用方安全使用；
/// 不可达或超时应返回 `AppError::Unavailable`。
#[async_trait]
pub trait CachePort: Send + Sync {
    /// 获取缓存值
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// 设置缓存值，`ttl` 为 None 时不过期
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()>;

    /// 删除缓存
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// 检查是否存在
    async fn exists(&self, key: &str) -> AppResult<bool>;

    /// 原子比较并替换：仅当当前值等于 `expected` 时写入 `value` 并重置 TTL
    ///
    /// 返回 true 表示替换成功。并发调用同一个 `expected` 时最多一个成功。
    async fn replace_if_equals(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> AppResult<bool>;

    /// 写入哈希字段，并把整个哈希的 TTL 重置为 `ttl`（两步原子完成）
    async fn hash_set(&self, key: &str, field: &str, value: &str, ttl: Duration) -> AppResult<()>;

    /// 读取哈希全部字段，键不存在时为空
    async fn hash_get_all(&self, key: &str) -> AppResult<HashMap<String, String>>;

    /// 删除哈希字段，返回字段此前是否存在
    async fn hash_delete(&self, key: &str, field: &str) -> AppResult<bool>;
}

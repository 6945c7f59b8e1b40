//! 撤销存储
//!
//! 三类条目：
//! - 令牌条目 `auth:revoked:token:{sha256}`，拦截单个令牌
//! - 会话条目 `auth:revoked:session:{sid}`，拦截该会话签发过的所有令牌
//! - 身份条目 `auth:revoked:user:{id}`，值为截止时间（毫秒），该身份在截止点及之前签发的令牌全部失效
//!
//! 条目 TTL 等于被拦截对象的剩余寿命，不需要清理任务。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use carelink_auth_core::token_digest;
use carelink_common::{SessionId, UserId};
use carelink_errors::{AppError, AppResult};
use carelink_ports::CachePort;
use carelink_telemetry::names;
use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

const TOKEN_PREFIX: &str = "auth:revoked:token:";
const SESSION_PREFIX: &str = "auth:revoked:session:";
const IDENTITY_PREFIX: &str = "auth:revoked:user:";

/// 撤销键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RevocationKey {
    /// 令牌原文的 SHA-256 摘要
    Token(String),
    /// 单个会话（设备）
    Session(SessionId),
    /// 身份级撤销
    Identity(UserId),
}

impl RevocationKey {
    /// 由令牌原文构造，原文不会写入缓存
    pub fn token(raw_token: &str) -> Self {
        Self::Token(token_digest(raw_token))
    }

    pub fn scope(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::Session(_) => "session",
            Self::Identity(_) => "identity",
        }
    }

    fn cache_key(&self) -> String {
        match self {
            Self::Token(digest) => format!("{}{}", TOKEN_PREFIX, digest),
            Self::Session(session_id) => format!("{}{}", SESSION_PREFIX, session_id),
            Self::Identity(user_id) => format!("{}{}", IDENTITY_PREFIX, user_id),
        }
    }
}

#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// 撤销 `key` 直到 `until`；幂等，`until` 已过去时不写入
    async fn revoke(&self, key: &RevocationKey, until: DateTime<Utc>) -> AppResult<()>;

    /// 未命中只表示"未知被撤销"，令牌仍须通过签名与有效期校验
    async fn is_revoked(&self, key: &RevocationKey) -> AppResult<bool>;

    /// 身份级撤销的截止时间
    async fn revoked_since(&self, user_id: &UserId) -> AppResult<Option<DateTime<Utc>>>;
}

/// 基于 `CachePort` 的撤销存储
pub struct CacheRevocationStore {
    cache: Arc<dyn CachePort>,
}

impl CacheRevocationStore {
    pub fn new(cache: Arc<dyn CachePort>) -> Self {
        Self { cache }
    }
}

/// 等到时钟越过截止毫秒，之后签发的令牌 `iat_ms` 一定晚于截止点
async fn wait_past(cutoff_ms: i64) {
    while Utc::now().timestamp_millis() <= cutoff_ms {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[async_trait]
impl RevocationStore for CacheRevocationStore {
    async fn revoke(&self, key: &RevocationKey, until: DateTime<Utc>) -> AppResult<()> {
        let now = Utc::now();
        let Ok(ttl) = (until - now).to_std() else {
            debug!(scope = key.scope(), "Revocation target already expired, skipping");
            return Ok(());
        };
        if ttl.is_zero() {
            return Ok(());
        }

        match key {
            RevocationKey::Token(_) | RevocationKey::Session(_) => {
                self.cache.set(&key.cache_key(), "1", Some(ttl)).await?;
            }
            RevocationKey::Identity(_) => {
                let cutoff_ms = now.timestamp_millis();
                self.cache
                    .set(&key.cache_key(), &cutoff_ms.to_string(), Some(ttl))
                    .await?;
                wait_past(cutoff_ms).await;
            }
        }

        metrics::counter!(names::REVOCATIONS_TOTAL, "scope" => key.scope()).increment(1);
        Ok(())
    }

    async fn is_revoked(&self, key: &RevocationKey) -> AppResult<bool> {
        self.cache.exists(&key.cache_key()).await
    }

    async fn revoked_since(&self, user_id: &UserId) -> AppResult<Option<DateTime<Utc>>> {
        let key = RevocationKey::Identity(*user_id).cache_key();
        let Some(raw) = self.cache.get(&key).await? else {
            return Ok(None);
        };
        let cutoff_ms: i64 = raw
            .parse()
            .map_err(|_| AppError::internal("Corrupt identity revocation entry"))?;
        Utc.timestamp_millis_opt(cutoff_ms)
            .single()
            .map(Some)
            .ok_or_else(|| AppError::internal("Corrupt identity revocation entry"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::MemoryCache;

    fn store() -> (Arc<MemoryCache>, CacheRevocationStore) {
        let cache = Arc::new(MemoryCache::new());
        (cache.clone(), CacheRevocationStore::new(cache))
    }

    #[tokio::test]
    async fn test_revoke_token_is_idempotent() {
        let (cache, store) = store();
        let key = RevocationKey::token("header.payload.signature");
        let until = Utc::now() + chrono::Duration::minutes(10);

        store.revoke(&key, until).await.unwrap();
        assert!(store.is_revoked(&key).await.unwrap());
        let entries_after_first = cache.len();

        store.revoke(&key, until).await.unwrap();
        assert!(store.is_revoked(&key).await.unwrap());
        assert_eq!(cache.len(), entries_after_first);
    }

    #[tokio::test]
    async fn test_raw_token_is_not_stored() {
        let (cache, store) = store();
        let raw = "header.payload.signature";
        store
            .revoke(&RevocationKey::token(raw), Utc::now() + chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert!(!cache.exists(&format!("{}{}", TOKEN_PREFIX, raw)).await.unwrap());
    }

    #[tokio::test]
    async fn test_entry_ttl_matches_remaining_lifetime() {
        let (cache, store) = store();
        let key = RevocationKey::token("t");
        store
            .revoke(&key, Utc::now() + chrono::Duration::seconds(30))
            .await
            .unwrap();

        let ttl = cache.remaining_ttl(&key.cache_key()).unwrap();
        assert!(ttl <= Duration::from_secs(30));
        assert!(ttl > Duration::from_secs(25));
    }

    #[tokio::test]
    async fn test_past_until_is_not_written() {
        let (cache, store) = store();
        let key = RevocationKey::token("old");
        store
            .revoke(&key, Utc::now() - chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert!(!store.is_revoked(&key).await.unwrap());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_identity_cutoff() {
        let (_, store) = store();
        let user_id = UserId::new();
        assert!(store.revoked_since(&user_id).await.unwrap().is_none());

        let before = Utc::now();
        store
            .revoke(&RevocationKey::Identity(user_id), before + chrono::Duration::hours(1))
            .await
            .unwrap();

        let cutoff = store.revoked_since(&user_id).await.unwrap().unwrap();
        assert!(cutoff.timestamp_millis() >= before.timestamp_millis());
        // 返回时时钟已越过截止点
        assert!(Utc::now().timestamp_millis() > cutoff.timestamp_millis());
        assert!(store.is_revoked(&RevocationKey::Identity(user_id)).await.unwrap());
    }

    #[tokio::test]
    async fn test_session_entry_is_scoped_to_one_session() {
        let (_, store) = store();
        let (closed, other) = (SessionId::new(), SessionId::new());
        store
            .revoke(&RevocationKey::Session(closed), Utc::now() + chrono::Duration::minutes(5))
            .await
            .unwrap();

        assert!(store.is_revoked(&RevocationKey::Session(closed)).await.unwrap());
        assert!(!store.is_revoked(&RevocationKey::Session(other)).await.unwrap());
        assert_eq!(RevocationKey::Session(closed).scope(), "session");
    }

    #[tokio::test]
    async fn test_corrupt_identity_entry_is_an_error() {
        let (cache, store) = store();
        let user_id = UserId::new();
        cache
            .set(&RevocationKey::Identity(user_id).cache_key(), "not-a-number", None)
            .await
            .unwrap();
        assert!(store.revoked_since(&user_id).await.is_err());
    }
}

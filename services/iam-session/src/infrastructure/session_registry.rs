//! 会话槽与会话索引
//!
//! 每次登录一个槽 `auth:session:{sid}`，保存当前有效刷新令牌的摘要。
//! 刷新时对槽做比较并替换，同一刷新令牌的并发轮换只有一个能成功。
//!
//! 每个身份另有一个哈希 `auth:sessions:{user_id}`，字段为会话 ID，值为设备与活跃时间，
//! 只用于列出和单独注销会话。槽才是会话是否存活的依据。

use std::sync::Arc;
use std::time::Duration;

use carelink_common::{SessionId, UserId};
use carelink_errors::{AppError, AppResult};
use carelink_ports::CachePort;
use tracing::warn;

use crate::domain::SessionInfo;

const SESSION_PREFIX: &str = "auth:session:";
const INDEX_PREFIX: &str = "auth:sessions:";

/// 槽内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSlot {
    pub user_id: UserId,
    pub refresh_digest: String,
}

impl SessionSlot {
    fn encode(user_id: &UserId, refresh_digest: &str) -> String {
        format!("{}:{}", user_id, refresh_digest)
    }

    fn decode(raw: &str) -> Option<Self> {
        let (user_id, digest) = raw.split_once(':')?;
        Some(Self {
            user_id: UserId::parse_str(user_id).ok()?,
            refresh_digest: digest.to_string(),
        })
    }
}

#[derive(Clone)]
pub struct SessionRegistry {
    cache: Arc<dyn CachePort>,
}

impl SessionRegistry {
    pub fn new(cache: Arc<dyn CachePort>) -> Self {
        Self { cache }
    }

    fn key(session_id: &SessionId) -> String {
        format!("{}{}", SESSION_PREFIX, session_id)
    }

    fn index_key(user_id: &UserId) -> String {
        format!("{}{}", INDEX_PREFIX, user_id)
    }

    /// 登录 / 注册时打开会话槽
    pub async fn open(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        refresh_digest: &str,
        ttl: Duration,
    ) -> AppResult<()> {
        self.cache
            .set(
                &Self::key(session_id),
                &SessionSlot::encode(user_id, refresh_digest),
                Some(ttl),
            )
            .await
    }

    /// 原子轮换：槽中仍是 `expected_digest` 时换成 `new_digest`
    pub async fn rotate(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        expected_digest: &str,
        new_digest: &str,
        ttl: Duration,
    ) -> AppResult<bool> {
        self.cache
            .replace_if_equals(
                &Self::key(session_id),
                &SessionSlot::encode(user_id, expected_digest),
                &SessionSlot::encode(user_id, new_digest),
                ttl,
            )
            .await
    }

    pub async fn close(&self, session_id: &SessionId) -> AppResult<()> {
        self.cache.delete(&Self::key(session_id)).await
    }

    pub async fn current(&self, session_id: &SessionId) -> AppResult<Option<SessionSlot>> {
        match self.cache.get(&Self::key(session_id)).await? {
            Some(raw) => SessionSlot::decode(&raw)
                .map(Some)
                .ok_or_else(|| AppError::internal("Corrupt session slot")),
            None => Ok(None),
        }
    }

    // ---- 会话索引 ----

    /// 写入或覆盖索引项，整个索引的 TTL 一并续期
    pub async fn track(&self, user_id: &UserId, info: &SessionInfo, ttl: Duration) -> AppResult<()> {
        let value = serde_json::to_string(info)
            .map_err(|e| AppError::internal(format!("Failed to encode session info: {}", e)))?;
        self.cache
            .hash_set(&Self::index_key(user_id), &info.session_id.to_string(), &value, ttl)
            .await
    }

    /// 索引中的全部会话；无法解析的项记录日志后跳过
    pub async fn tracked(&self, user_id: &UserId) -> AppResult<Vec<SessionInfo>> {
        let entries = self.cache.hash_get_all(&Self::index_key(user_id)).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(field, raw)| match serde_json::from_str::<SessionInfo>(&raw) {
                Ok(info) => Some(info),
                Err(e) => {
                    warn!(user_id = %user_id, session = %field, error = %e, "Skipping corrupt session index entry");
                    None
                }
            })
            .collect())
    }

    pub async fn untrack(&self, user_id: &UserId, session_id: &SessionId) -> AppResult<bool> {
        self.cache
            .hash_delete(&Self::index_key(user_id), &session_id.to_string())
            .await
    }

    pub async fn forget_user(&self, user_id: &UserId) -> AppResult<()> {
        self.cache.delete(&Self::index_key(user_id)).await
    }
}

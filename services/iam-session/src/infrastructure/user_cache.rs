//! 用户记录缓存（cache-aside）

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use carelink_common::UserId;
use carelink_errors::{AppError, AppResult};
use carelink_ports::CachePort;

use crate::domain::UserProfile;

const USER_CACHE_PREFIX: &str = "auth:user:";

/// 用户记录缓存
///
/// 只负责读写缓存本身；未命中时由调用方回源主存储并 `put`。
#[async_trait]
pub trait UserRecordCache: Send + Sync {
    async fn get(&self, user_id: &UserId) -> AppResult<Option<UserProfile>>;

    async fn put(&self, user_id: &UserId, profile: &UserProfile, ttl: Duration) -> AppResult<()>;

    /// 必须在写操作向调用方确认之前完成
    async fn invalidate(&self, user_id: &UserId) -> AppResult<()>;
}

pub struct CacheUserRecordCache {
    cache: Arc<dyn CachePort>,
}

impl CacheUserRecordCache {
    pub fn new(cache: Arc<dyn CachePort>) -> Self {
        Self { cache }
    }

    fn key(user_id: &UserId) -> String {
        format!("{}{}", USER_CACHE_PREFIX, user_id)
    }
}

#[async_trait]
impl UserRecordCache for CacheUserRecordCache {
    async fn get(&self, user_id: &UserId) -> AppResult<Option<UserProfile>> {
        match self.cache.get(&Self::key(user_id)).await? {
            Some(value) => {
                let profile: UserProfile = serde_json::from_str(&value).map_err(|e| {
                    AppError::internal(format!("Failed to deserialize cached user: {}", e))
                })?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, user_id: &UserId, profile: &UserProfile, ttl: Duration) -> AppResult<()> {
        let value = serde_json::to_string(profile)
            .map_err(|e| AppError::internal(format!("Failed to serialize user: {}", e)))?;
        self.cache.set(&Self::key(user_id), &value, Some(ttl)).await
    }

    async fn invalidate(&self, user_id: &UserId) -> AppResult<()> {
        self.cache.delete(&Self::key(user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewUser, UserRecord, UserRole};
    use crate::infrastructure::MemoryCache;

    fn profile() -> UserProfile {
        UserRecord::new(NewUser {
            phone: "13800000000".into(),
            username: None,
            email: None,
            password_hash: "secret-hash".into(),
            real_name: Some("张三".into()),
            role: UserRole::Volunteer,
        })
        .to_profile()
    }

    #[tokio::test]
    async fn test_put_get_invalidate() {
        let cache = Arc::new(MemoryCache::new());
        let users = CacheUserRecordCache::new(cache.clone());
        let profile = profile();

        assert!(users.get(&profile.id).await.unwrap().is_none());
        users.put(&profile.id, &profile, Duration::from_secs(3600)).await.unwrap();
        assert_eq!(users.get(&profile.id).await.unwrap(), Some(profile.clone()));
        assert!(cache.remaining_ttl(&CacheUserRecordCache::key(&profile.id)).is_some());

        users.invalidate(&profile.id).await.unwrap();
        assert!(users.get(&profile.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_an_error() {
        let cache = Arc::new(MemoryCache::new());
        let users = CacheUserRecordCache::new(cache.clone());
        let user_id = UserId::new();
        cache.set(&CacheUserRecordCache::key(&user_id), "{", None).await.unwrap();
        assert!(users.get(&user_id).await.is_err());
    }
}

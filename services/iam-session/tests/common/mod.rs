//! 集成测试公共设施：配置、装配和依赖故障替身

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use carelink_bootstrap::{Infrastructure, build_token_service};
use carelink_common::UserId;
use carelink_config::AppConfig;
use carelink_errors::{AppError, AppResult};
use carelink_ports::CachePort;
use chrono::{DateTime, Utc};
use figment::{Figment, providers::Serialized};
use iam_session::domain::{
    CredentialHasher, UniqueField, UserPatch, UserRecord, UserRepository,
};
use iam_session::infrastructure::{
    CacheRevocationStore, CacheUserRecordCache, InMemoryUserRepository, MemoryCache,
    SessionRegistry,
};
use iam_session::{RegisterRequest, SessionManager, TokenPair};

pub const PHONE: &str = "13800000000";
pub const PASSWORD: &str = "correct";

pub fn base_figment() -> Figment {
    Figment::new()
        .merge(Serialized::default("redis.url", "redis://127.0.0.1:6379"))
        .merge(Serialized::default(
            "jwt.secret",
            "integration-test-secret-at-least-32-bytes",
        ))
        .merge(Serialized::default("jwt.expires_in", 900))
        .merge(Serialized::default("jwt.refresh_expires_in", 86400))
        .merge(Serialized::default("password.memory_kib", 8))
        .merge(Serialized::default("password.iterations", 1))
        .merge(Serialized::default("session.io_timeout_ms", 100))
        .merge(Serialized::default("session.retry_backoff_ms", 1))
}

pub fn config() -> AppConfig {
    AppConfig::from_figment(base_figment()).unwrap()
}

/// 全部使用进程内实现的会话管理器
pub struct Harness {
    pub manager: SessionManager,
    pub cache: Arc<MemoryCache>,
    pub users: Arc<CountingRepository>,
    pub config: AppConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::from_config(config())
    }

    pub fn from_config(config: AppConfig) -> Self {
        let cache = Arc::new(MemoryCache::new());
        let users = Arc::new(CountingRepository::default());
        let infra = Infrastructure::with_cache(config.clone(), cache.clone());
        let manager = SessionManager::from_infrastructure(&infra, users.clone()).unwrap();
        Self {
            manager,
            cache,
            users,
            config,
        }
    }

    pub async fn register(&self, phone: &str) -> (UserId, TokenPair) {
        self.manager
            .register(RegisterRequest::new(phone, PASSWORD))
            .await
            .unwrap()
    }
}

/// 自定义撤销存储 / 用户缓存 / 会话槽所用缓存的会话管理器，与 `Harness` 共享密钥和主存储
pub fn manager_with(
    config: &AppConfig,
    users: Arc<dyn UserRepository>,
    revocation_cache: Arc<dyn CachePort>,
    user_cache: Arc<dyn CachePort>,
    session_cache: Arc<dyn CachePort>,
) -> SessionManager {
    SessionManager::new(
        Arc::new(build_token_service(config)),
        CredentialHasher::new(&config.password).unwrap(),
        users,
        Arc::new(CacheRevocationStore::new(revocation_cache)),
        Arc::new(CacheUserRecordCache::new(user_cache)),
        SessionRegistry::new(session_cache),
        &config.session,
    )
}

/// 所有调用都返回不可用
pub struct FailingCache;

#[async_trait]
impl CachePort for FailingCache {
    async fn get(&self, _key: &str) -> AppResult<Option<String>> {
        Err(AppError::unavailable("cache down"))
    }
    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> AppResult<()> {
        Err(AppError::unavailable("cache down"))
    }
    async fn delete(&self, _key: &str) -> AppResult<()> {
        Err(AppError::unavailable("cache down"))
    }
    async fn exists(&self, _key: &str) -> AppResult<bool> {
        Err(AppError::unavailable("cache down"))
    }
    async fn replace_if_equals(
        &self,
        _key: &str,
        _expected: &str,
        _value: &str,
        _ttl: Duration,
    ) -> AppResult<bool> {
        Err(AppError::unavailable("cache down"))
    }
    async fn hash_set(&self, _key: &str, _field: &str, _value: &str, _ttl: Duration) -> AppResult<()> {
        Err(AppError::unavailable("cache down"))
    }
    async fn hash_get_all(&self, _key: &str) -> AppResult<HashMap<String, String>> {
        Err(AppError::unavailable("cache down"))
    }
    async fn hash_delete(&self, _key: &str, _field: &str) -> AppResult<bool> {
        Err(AppError::unavailable("cache down"))
    }
}

/// 所有调用都挂起，直到被超时取消
pub struct HangingCache;

async fn hang<T>() -> AppResult<T> {
    tokio::time::sleep(Duration::from_secs(3600)).await;
    Err(AppError::internal("unreachable"))
}

#[async_trait]
impl CachePort for HangingCache {
    async fn get(&self, _key: &str) -> AppResult<Option<String>> {
        hang().await
    }
    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> AppResult<()> {
        hang().await
    }
    async fn delete(&self, _key: &str) -> AppResult<()> {
        hang().await
    }
    async fn exists(&self, _key: &str) -> AppResult<bool> {
        hang().await
    }
    async fn replace_if_equals(
        &self,
        _key: &str,
        _expected: &str,
        _value: &str,
        _ttl: Duration,
    ) -> AppResult<bool> {
        hang().await
    }
    async fn hash_set(&self, _key: &str, _field: &str, _value: &str, _ttl: Duration) -> AppResult<()> {
        hang().await
    }
    async fn hash_get_all(&self, _key: &str) -> AppResult<HashMap<String, String>> {
        hang().await
    }
    async fn hash_delete(&self, _key: &str, _field: &str) -> AppResult<bool> {
        hang().await
    }
}

/// 前 `failures` 次调用失败，之后委托给内部缓存
pub struct FlakyCache {
    inner: Arc<MemoryCache>,
    failures: AtomicUsize,
    delete_always_fails: bool,
}

impl FlakyCache {
    pub fn failing_first(inner: Arc<MemoryCache>, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
            delete_always_fails: false,
        }
    }

    /// 读写正常，删除总是失败
    pub fn failing_deletes(inner: Arc<MemoryCache>) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(0),
            delete_always_fails: true,
        }
    }

    fn trip(&self) -> AppResult<()> {
        let consumed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match consumed {
            Ok(_) => Err(AppError::unavailable("connection reset")),
            Err(_) => Ok(()),
        }
    }
}

#[async_trait]
impl CachePort for FlakyCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        self.trip()?;
        self.inner.get(key).await
    }
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> AppResult<()> {
        self.trip()?;
        self.inner.set(key, value, ttl).await
    }
    async fn delete(&self, key: &str) -> AppResult<()> {
        if self.delete_always_fails {
            return Err(AppError::unavailable("cache down"));
        }
        self.trip()?;
        self.inner.delete(key).await
    }
    async fn exists(&self, key: &str) -> AppResult<bool> {
        self.trip()?;
        self.inner.exists(key).await
    }
    async fn replace_if_equals(
        &self,
        key: &str,
        expected: &str,
        value: &str,
        ttl: Duration,
    ) -> AppResult<bool> {
        self.trip()?;
        self.inner.replace_if_equals(key, expected, value, ttl).await
    }
    async fn hash_set(&self, key: &str, field: &str, value: &str, ttl: Duration) -> AppResult<()> {
        self.trip()?;
        self.inner.hash_set(key, field, value, ttl).await
    }
    async fn hash_get_all(&self, key: &str) -> AppResult<HashMap<String, String>> {
        self.trip()?;
        self.inner.hash_get_all(key).await
    }
    async fn hash_delete(&self, key: &str, field: &str) -> AppResult<bool> {
        if self.delete_always_fails {
            return Err(AppError::unavailable("cache down"));
        }
        self.trip()?;
        self.inner.hash_delete(key, field).await
    }
}

/// 统计 `find_by_identity` 调用次数；`set_unavailable(true)` 后所有调用返回不可用
#[derive(Default)]
pub struct CountingRepository {
    inner: InMemoryUserRepository,
    identity_lookups: AtomicUsize,
    unavailable: std::sync::atomic::AtomicBool,
}

impl CountingRepository {
    pub fn identity_lookups(&self) -> usize {
        self.identity_lookups.load(Ordering::SeqCst)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(AppError::unavailable("primary store down"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl UserRepository for CountingRepository {
    async fn find_by_identity(&self, id: &UserId) -> AppResult<Option<UserRecord>> {
        self.identity_lookups.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.find_by_identity(id).await
    }

    async fn find_by_unique_field(
        &self,
        field: UniqueField,
        value: &str,
    ) -> AppResult<Option<UserRecord>> {
        self.check()?;
        self.inner.find_by_unique_field(field, value).await
    }

    async fn insert(&self, user: UserRecord) -> AppResult<UserRecord> {
        self.check()?;
        self.inner.insert(user).await
    }

    async fn update_fields(&self, id: &UserId, patch: &UserPatch) -> AppResult<UserRecord> {
        self.check()?;
        self.inner.update_fields(id, patch).await
    }

    async fn record_login(&self, id: &UserId, at: DateTime<Utc>) -> AppResult<UserRecord> {
        self.check()?;
        self.inner.record_login(id, at).await
    }

    async fn soft_delete(&self, id: &UserId) -> AppResult<()> {
        self.check()?;
        self.inner.soft_delete(id).await
    }
}

//! 基础设施资源管理
//!
//! 会话服务共享的 Redis 缓存与 Token 服务

use std::sync::Arc;
use std::time::Duration;

use carelink_adapter_redis::{RedisCache, check_connection, create_connection_manager};
use carelink_auth_core::TokenService;
use carelink_common::{RetryConfig, with_conditional_retry};
use carelink_config::AppConfig;
use carelink_errors::{AppError, AppResult};
use carelink_ports::CachePort;
use redis::aio::ConnectionManager;
use secrecy::ExposeSecret;
use tracing::{info, warn};

/// 启动阶段连接 Redis 的重试策略
fn startup_retry() -> RetryConfig {
    RetryConfig::new(3, Duration::from_millis(200), Duration::from_secs(2))
}

/// 按 JWT 配置构造 Token 服务
pub fn build_token_service(config: &AppConfig) -> TokenService {
    TokenService::new(
        config.jwt.secret.expose_secret(),
        i64::try_from(config.jwt.expires_in).unwrap_or(i64::MAX),
        i64::try_from(config.jwt.refresh_expires_in).unwrap_or(i64::MAX),
        config.jwt.issuer.clone(),
        config.jwt.audience.clone(),
    )
}

/// 基础设施资源容器
///
/// `redis_conn` 为 None 时表示注入了进程内缓存（测试或本地调试）。
pub struct Infrastructure {
    config: AppConfig,
    redis_conn: Option<ConnectionManager>,
    cache: Arc<dyn CachePort>,
    token_service: Arc<TokenService>,
}

impl Infrastructure {
    /// 从配置创建基础设施资源（连接 Redis，瞬时错误时重试）
    pub async fn from_config(config: AppConfig) -> AppResult<Self> {
        let url = config.redis.url.expose_secret().clone();
        let timeout = config.redis.connect_timeout();

        let redis_conn = with_conditional_retry(
            &startup_retry(),
            "Redis connection",
            || create_connection_manager(&url, timeout),
            AppError::is_transient,
        )
        .await?;

        let cache = RedisCache::new(redis_conn.clone()).with_prefix(config.redis.key_prefix.clone());
        info!(key_prefix = %config.redis.key_prefix, "Redis cache ready");

        let token_service = Arc::new(build_token_service(&config));

        Ok(Self {
            config,
            redis_conn: Some(redis_conn),
            cache: Arc::new(cache),
            token_service,
        })
    }

    /// 使用外部提供的缓存实现
    pub fn with_cache(config: AppConfig, cache: Arc<dyn CachePort>) -> Self {
        let token_service = Arc::new(build_token_service(&config));
        Self {
            config,
            redis_conn: None,
            cache,
            token_service,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> Arc<dyn CachePort> {
        self.cache.clone()
    }

    pub fn token_service(&self) -> Arc<TokenService> {
        self.token_service.clone()
    }

    /// 检查 Redis 连接；未使用 Redis 时视为健康
    pub async fn check_redis_connection(&self) -> bool {
        let Some(conn) = &self.redis_conn else {
            return true;
        };
        let mut conn = conn.clone();
        match check_connection(&mut conn).await {
            Ok(latency) => {
                info!(latency_ms = latency.as_millis() as u64, "Redis health check passed");
                true
            }
            Err(e) => {
                warn!(error = %e, "Redis health check failed");
                false
            }
        }
    }
}

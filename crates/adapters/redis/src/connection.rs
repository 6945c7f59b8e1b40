//! Redis 连接管理

use std::time::{Duration, Instant};

use carelink_errors::{AppError, AppResult};
use redis::Client;
use redis::aio::ConnectionManager;
use tracing::info;

use crate::error::map_redis_error;

/// 创建 Redis 连接管理器，建立连接的时间受 `timeout` 限制
pub async fn create_connection_manager(url: &str, timeout: Duration) -> AppResult<ConnectionManager> {
    let client = Client::open(url)
        .map_err(|e| AppError::internal(format!("Failed to create Redis client: {}", e)))?;

    let manager = tokio::time::timeout(timeout, ConnectionManager::new(client))
        .await
        .map_err(|_| AppError::unavailable("Timed out connecting to Redis"))?
        .map_err(|e| map_redis_error("connect", e))?;

    info!(timeout_ms = timeout.as_millis() as u64, "Redis connection manager ready");
    Ok(manager)
}

/// 检查 Redis 连接，返回往返延迟
pub async fn check_connection(conn: &mut ConnectionManager) -> AppResult<Duration> {
    let start = Instant::now();
    redis::cmd("PING")
        .query_async::<String>(conn)
        .await
        .map_err(|e| map_redis_error("health check", e))?;
    Ok(start.elapsed())
}

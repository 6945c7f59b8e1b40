//! Redis 错误映射

use carelink_errors::AppError;
use redis::RedisError;

/// 将 Redis 错误映射为应用错误
///
/// 连接类错误（超时、断开、拒绝、IO）映射为 `Unavailable`，调用方可以重试一次；
/// 其余（类型错误、脚本错误等）映射为 `Internal`。
pub fn map_redis_error(operation: &str, e: RedisError) -> AppError {
    if e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error() {
        AppError::unavailable(format!("Redis {} failed: {}", operation, e))
    } else {
        AppError::internal(format!("Redis {} failed: {}", operation, e))
    }
}

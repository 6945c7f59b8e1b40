//! carelink-telemetry - 可观测性库
//!
//! tracing 初始化、Prometheus 指标导出以及认证相关的指标名称

use metrics::{Unit, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    Tracing(String),

    #[error("Failed to install Prometheus recorder: {0}")]
    Metrics(String),
}

/// 认证子系统的指标名称
pub mod names {
    pub const LOGIN_TOTAL: &str = "auth_login_total";
    pub const REFRESH_TOTAL: &str = "auth_refresh_total";
    pub const VERIFY_TOTAL: &str = "auth_verify_total";
    pub const REVOCATIONS_TOTAL: &str = "auth_revocations_total";
    pub const USER_CACHE_TOTAL: &str = "auth_user_cache_total";
}

fn env_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
}

/// 初始化 tracing（文本格式）
pub fn init_tracing(log_level: &str) -> Result<(), TelemetryError> {
    tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| TelemetryError::Tracing(e.to_string()))
}

/// 初始化 JSON 格式的 tracing（生产环境）
pub fn init_tracing_json(log_level: &str) -> Result<(), TelemetryError> {
    tracing_subscriber::registry()
        .with(env_filter(log_level))
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| TelemetryError::Tracing(e.to_string()))
}

/// 初始化 Prometheus metrics 并注册指标描述
pub fn init_metrics() -> Result<PrometheusHandle, TelemetryError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!(names::LOGIN_TOTAL, Unit::Count, "Login attempts by outcome");
    describe_counter!(names::REFRESH_TOTAL, Unit::Count, "Refresh-token rotations by outcome");
    describe_counter!(names::VERIFY_TOTAL, Unit::Count, "Access-token verifications by outcome");
    describe_counter!(names::REVOCATIONS_TOTAL, Unit::Count, "Revocation entries written by scope");
    describe_counter!(names::USER_CACHE_TOTAL, Unit::Count, "User record cache lookups by result");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_tracing_init_is_an_error_not_a_panic() {
        let _ = init_tracing("debug");
        // 同一进程内只能安装一次全局 subscriber
        assert!(init_tracing_json("debug").is_err());
    }
}

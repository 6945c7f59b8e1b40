//! 服务运行时

use carelink_config::{AppConfig, ConfigError};
use carelink_telemetry::{
    PrometheusHandle, TelemetryError, init_metrics, init_tracing, init_tracing_json,
};
use tracing::info;

/// 服务运行时配置
pub struct RuntimeConfig {
    pub config_dir: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            config_dir: "config".to_string(),
        }
    }
}

/// 按运行时配置加载 `AppConfig`
pub fn load_config(runtime: &RuntimeConfig) -> Result<AppConfig, ConfigError> {
    AppConfig::load(&runtime.config_dir)
}

/// 初始化服务运行时
///
/// 生产环境输出 JSON 日志，其余环境输出文本日志。
/// 开启 `telemetry.metrics_enabled` 时返回 Prometheus 渲染句柄。
pub fn init_runtime(config: &AppConfig) -> Result<Option<PrometheusHandle>, TelemetryError> {
    if config.is_production() {
        init_tracing_json(&config.telemetry.log_level)?;
    } else {
        init_tracing(&config.telemetry.log_level)?;
    }

    let metrics = if config.telemetry.metrics_enabled {
        Some(init_metrics()?)
    } else {
        None
    };

    info!(
        app_name = %config.app_name,
        app_env = %config.app_env,
        metrics_enabled = metrics.is_some(),
        "Runtime initialized"
    );
    Ok(metrics)
}

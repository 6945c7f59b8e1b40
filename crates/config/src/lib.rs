//! carelink-config - 配置加载库
//!
//! 加载顺序：`{dir}/default.toml` → `{dir}/{APP_ENV}.toml` → `CARELINK_` 前缀的环境变量
//! （嵌套字段用 `__` 分隔，例如 `CARELINK_JWT__SECRET`）。

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use thiserror::Error;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "CARELINK_";

/// JWT 密钥最小长度（字节）
const MIN_JWT_SECRET_LEN: usize = 32;

/// 令牌有效期、缓存 TTL 等秒级配置的上限（一年）
pub const MAX_LIFETIME_SECS: u64 = 366 * 24 * 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Redis 配置
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Secret<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_key_prefix() -> String {
    "carelink".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

impl RedisConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// JWT 配置
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: Secret<String>,
    /// 访问令牌有效期（秒）
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
    /// 刷新令牌有效期（秒）
    #[serde(default = "default_refresh_expires_in")]
    pub refresh_expires_in: u64,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_audience")]
    pub audience: String,
}

fn default_expires_in() -> u64 {
    7200
}

fn default_refresh_expires_in() -> u64 {
    604800
}

fn default_issuer() -> String {
    "carelink-auth".to_string()
}

fn default_audience() -> String {
    "carelink-mobile".to_string()
}

/// 会话配置
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// 用户缓存 TTL（秒）
    #[serde(default = "default_user_cache_ttl_secs")]
    pub user_cache_ttl_secs: u64,
    /// 单次缓存 / 主存储调用超时（毫秒）
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    /// 瞬时依赖错误的最大尝试次数（包含第一次）
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// 剩余有效期低于该值时提示客户端刷新（秒）
    #[serde(default = "default_expiring_soon_secs")]
    pub expiring_soon_secs: u64,
}

fn default_user_cache_ttl_secs() -> u64 {
    3600
}

fn default_io_timeout_ms() -> u64 {
    500
}

fn default_retry_attempts() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    25
}

fn default_expiring_soon_secs() -> u64 {
    300
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_cache_ttl_secs: default_user_cache_ttl_secs(),
            io_timeout_ms: default_io_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            expiring_soon_secs: default_expiring_soon_secs(),
        }
    }
}

/// 密码哈希配置（argon2id）
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    #[serde(default = "default_memory_kib")]
    pub memory_kib: u32,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

fn default_memory_kib() -> u32 {
    19456
}

fn default_iterations() -> u32 {
    2
}

fn default_parallelism() -> u32 {
    1
}

fn default_min_length() -> usize {
    6
}

fn default_max_length() -> usize {
    128
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_kib: default_memory_kib(),
            iterations: default_iterations(),
            parallelism: default_parallelism(),
            min_length: default_min_length(),
            max_length: default_max_length(),
        }
    }
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 是否安装 Prometheus recorder
    #[serde(default)]
    pub metrics_enabled: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_enabled: false,
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub password: PasswordConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_app_name() -> String {
    "carelink-iam-session".to_string()
}

fn default_app_env() -> String {
    "development".to_string()
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| default_app_env());

        let figment = Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        Self::from_figment(figment)
    }

    /// 从任意 figment 提取并校验
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.expose_secret().len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "jwt.secret must be at least {} bytes",
                MIN_JWT_SECRET_LEN
            )));
        }
        if self.jwt.expires_in == 0 || self.jwt.refresh_expires_in == 0 {
            return Err(ConfigError::Invalid("token lifetimes must be positive".into()));
        }
        if self.jwt.expires_in >= self.jwt.refresh_expires_in {
            return Err(ConfigError::Invalid(
                "jwt.expires_in must be shorter than jwt.refresh_expires_in".into(),
            ));
        }
        let lifetimes = [
            ("jwt.expires_in", self.jwt.expires_in),
            ("jwt.refresh_expires_in", self.jwt.refresh_expires_in),
            ("session.user_cache_ttl_secs", self.session.user_cache_ttl_secs),
            ("session.expiring_soon_secs", self.session.expiring_soon_secs),
        ];
        if let Some((name, _)) = lifetimes.iter().find(|(_, secs)| *secs > MAX_LIFETIME_SECS) {
            return Err(ConfigError::Invalid(format!(
                "{} must not exceed {} seconds",
                name, MAX_LIFETIME_SECS
            )));
        }
        if self.session.user_cache_ttl_secs == 0 || self.session.io_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "session.user_cache_ttl_secs and session.io_timeout_ms must be positive".into(),
            ));
        }
        if self.password.min_length == 0 || self.password.min_length > self.password.max_length {
            return Err(ConfigError::Invalid("password length bounds are inconsistent".into()));
        }
        Ok(())
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}

#[cfg(test)]
mod tests;

//! 服务错误定义

use carelink_auth_core::TokenError;
use carelink_errors::AppError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{DeviceError, EmailError, UsernameError};

/// 机器可读的错误类别，HTTP 层据此映射状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorKind {
    TokenMissing,
    TokenExpired,
    TokenInvalid,
    TokenRevoked,
    AccountDisabled,
    InvalidCredentials,
    Conflict,
    Forbidden,
    Validation,
    DependencyUnavailable,
    Internal,
}

impl AuthErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenMissing => "token_missing",
            Self::TokenExpired => "token_expired",
            Self::TokenInvalid => "token_invalid",
            Self::TokenRevoked => "token_revoked",
            Self::AccountDisabled => "account_disabled",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Conflict => "conflict",
            Self::Forbidden => "forbidden",
            Self::Validation => "validation",
            Self::DependencyUnavailable => "dependency_unavailable",
            Self::Internal => "internal",
        }
    }

    /// 建议的 HTTP 状态码
    pub fn suggested_status(&self) -> u16 {
        match self {
            Self::TokenMissing
            | Self::TokenExpired
            | Self::TokenInvalid
            | Self::TokenRevoked
            | Self::InvalidCredentials => 401,
            Self::AccountDisabled | Self::Forbidden => 403,
            Self::Conflict => 409,
            Self::Validation => 400,
            Self::DependencyUnavailable => 503,
            Self::Internal => 500,
        }
    }
}

/// 认证错误
///
/// Display 文本会直接返回给客户端，不得包含密码、哈希或令牌内容。
#[derive(Debug, Error)]
pub enum AuthError {
    /// 密码错误与用户不存在共用同一条消息
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Missing bearer token")]
    TokenMissing,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::InvalidCredentials => AuthErrorKind::InvalidCredentials,
            Self::AccountDisabled => AuthErrorKind::AccountDisabled,
            Self::Conflict(_) => AuthErrorKind::Conflict,
            Self::TokenMissing => AuthErrorKind::TokenMissing,
            Self::TokenExpired => AuthErrorKind::TokenExpired,
            Self::TokenInvalid => AuthErrorKind::TokenInvalid,
            Self::TokenRevoked => AuthErrorKind::TokenRevoked,
            Self::Forbidden(_) => AuthErrorKind::Forbidden,
            Self::Validation(_) => AuthErrorKind::Validation,
            Self::DependencyUnavailable(_) => AuthErrorKind::DependencyUnavailable,
            Self::Internal(_) => AuthErrorKind::Internal,
        }
    }

    /// 安全相关的依赖失败：无论底层错误是什么都按不可用处理，不放行
    pub fn dependency(error: AppError) -> Self {
        Self::DependencyUnavailable(error.to_string())
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::TokenExpired,
            TokenError::Signing(msg) => Self::Internal(msg),
            TokenError::Malformed(_) | TokenError::KindMismatch { .. } => Self::TokenInvalid,
        }
    }
}

impl From<EmailError> for AuthError {
    fn from(err: EmailError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<DeviceError> for AuthError {
    fn from(err: DeviceError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<UsernameError> for AuthError {
    fn from(err: UsernameError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<AppError> for AuthError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Unavailable(msg) => Self::DependencyUnavailable(msg),
            AppError::Conflict(msg) => Self::Conflict(msg),
            AppError::Validation(msg) | AppError::NotFound(msg) => Self::Validation(msg),
            AppError::Unauthorized(_) => Self::InvalidCredentials,
            AppError::Forbidden(msg) => Self::Forbidden(msg),
            AppError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => AppError::unauthorized("Invalid credentials"),
            AuthError::TokenMissing => AppError::unauthorized("Missing bearer token"),
            AuthError::TokenExpired => AppError::unauthorized("Token expired"),
            AuthError::TokenInvalid => AppError::unauthorized("Invalid token"),
            AuthError::TokenRevoked => AppError::unauthorized("Token revoked"),
            AuthError::AccountDisabled => AppError::forbidden("Account is disabled"),
            AuthError::Forbidden(msg) => AppError::forbidden(msg),
            AuthError::Conflict(msg) => AppError::conflict(msg),
            AuthError::Validation(msg) => AppError::validation(msg),
            AuthError::DependencyUnavailable(_) => {
                AppError::unavailable("Authentication service temporarily unavailable")
            }
            AuthError::Internal(_) => AppError::internal("Internal server error"),
        }
    }
}

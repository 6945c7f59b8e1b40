//! 请求与响应

use carelink_auth_core::IssuedPair;
use carelink_common::{SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DeviceInfo, UserProfile, UserRole};
use crate::error::AuthError;

/// 注册请求
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub phone: String,
    pub password: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
    /// 缺省为 `user`，只允许自选 `user` / `volunteer`
    #[serde(default)]
    pub role: Option<UserRole>,
    /// 注册后直接登录所用的设备
    #[serde(default)]
    pub device: Option<DeviceInfo>,
}

impl RegisterRequest {
    pub fn new(phone: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            password: password.into(),
            username: None,
            email: None,
            real_name: None,
            role: None,
            device: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = Some(device);
        self
    }
}

/// 资料更新请求
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub real_name: Option<String>,
    pub gender: Option<String>,
}

/// 返回给客户端的令牌对，有效期单位为秒
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_in: i64,
    pub refresh_expires_in: i64,
}

impl From<IssuedPair> for TokenPair {
    fn from(pair: IssuedPair) -> Self {
        Self {
            access_expires_in: pair.access.claims.exp - pair.access.claims.iat,
            refresh_expires_in: pair.refresh.claims.exp - pair.refresh.claims.iat,
            access_token: pair.access.token,
            refresh_token: pair.refresh.token,
        }
    }
}

/// 通过校验的请求上下文
#[derive(Debug, Clone, Serialize)]
pub struct UserContext {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub role: UserRole,
    pub profile: UserProfile,
    pub token_expires_at: DateTime<Utc>,
    /// 访问令牌即将过期，客户端应尽快刷新
    pub expiring_soon: bool,
}

impl UserContext {
    pub fn require_role(&self, roles: &[UserRole]) -> Result<(), AuthError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!(
                "role {} is not permitted",
                self.role
            )))
        }
    }

    pub fn can_volunteer(&self) -> Result<(), AuthError> {
        if self.role.can_volunteer() {
            Ok(())
        } else {
            Err(AuthError::Forbidden("volunteer permission required".into()))
        }
    }
}

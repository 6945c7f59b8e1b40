//! 登录设备与会话列表

use carelink_common::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_FIELD_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Device field {0} is too long (max 128 characters)")]
    FieldTooLong(&'static str),
}

/// 客户端上报的设备信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub device_type: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub app_version: Option<String>,
}

impl DeviceInfo {
    pub fn new(
        device_id: impl Into<String>,
        device_type: impl Into<String>,
        device_name: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            device_type: device_type.into(),
            device_name: device_name.into(),
            platform: None,
            app_version: None,
        }
    }

    /// 客户端未上报设备时的占位
    pub fn unknown(now: DateTime<Utc>) -> Self {
        Self::new(format!("web_{}", now.timestamp_millis()), "mobile", "Unknown Device")
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_app_version(mut self, app_version: impl Into<String>) -> Self {
        self.app_version = Some(app_version.into());
        self
    }

    /// 去掉首尾空白，空字段用占位值补齐
    pub fn normalize(self, now: DateTime<Utc>) -> Result<Self, DeviceError> {
        let fallback = Self::unknown(now);
        let required = |value: String, name: &'static str, default: String| {
            let value = value.trim();
            if value.chars().count() > MAX_FIELD_LEN {
                return Err(DeviceError::FieldTooLong(name));
            }
            Ok(if value.is_empty() { default } else { value.to_string() })
        };
        let optional = |value: Option<String>, name: &'static str| {
            let value = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
            match value {
                Some(v) if v.chars().count() > MAX_FIELD_LEN => Err(DeviceError::FieldTooLong(name)),
                other => Ok(other),
            }
        };

        Ok(Self {
            device_id: required(self.device_id, "device_id", fallback.device_id)?,
            device_type: required(self.device_type, "device_type", fallback.device_type)?,
            device_name: required(self.device_name, "device_name", fallback.device_name)?,
            platform: optional(self.platform, "platform")?,
            app_version: optional(self.app_version, "app_version")?,
        })
    }
}

/// 会话索引中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub device: DeviceInfo,
    pub created_at: DateTime<Utc>,
    /// 最近一次签发刷新令牌的时间
    pub last_active_at: DateTime<Utc>,
}

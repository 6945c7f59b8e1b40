//! 用户记录

use std::fmt;
use std::str::FromStr;

use carelink_common::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    Volunteer,
    Admin,
    SuperAdmin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Volunteer => "volunteer",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }

    /// 注册时允许自选的角色
    pub fn is_self_assignable(&self) -> bool {
        matches!(self, Self::User | Self::Volunteer)
    }

    /// 是否具备志愿者能力（管理员也可以）
    pub fn can_volunteer(&self) -> bool {
        matches!(self, Self::Volunteer | Self::Admin | Self::SuperAdmin)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "volunteer" => Ok(Self::Volunteer),
            "admin" => Ok(Self::Admin),
            "super_admin" => Ok(Self::SuperAdmin),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// 账户状态，只有 `Active` 可以通过认证
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Active,
    Inactive,
    Suspended,
    Banned,
}

impl UserStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
            Self::Banned => "banned",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 主存储中的用户行（含密码哈希，不进入缓存）
#[derive(Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub phone: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: String,
    pub real_name: Option<String>,
    pub gender: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    pub is_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub login_count: u64,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("phone", &self.phone)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"[REDACTED]")
            .field("real_name", &self.real_name)
            .field("gender", &self.gender)
            .field("role", &self.role)
            .field("status", &self.status)
            .field("is_verified", &self.is_verified)
            .field("last_login_at", &self.last_login_at)
            .field("login_count", &self.login_count)
            .field("password_changed_at", &self.password_changed_at)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("deleted_at", &self.deleted_at)
            .finish()
    }
}

/// 注册时写入主存储的字段
#[derive(Debug, Clone)]
pub struct NewUser {
    pub phone: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: String,
    pub real_name: Option<String>,
    pub role: UserRole,
}

impl UserRecord {
    pub fn new(new_user: NewUser) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::new(),
            phone: new_user.phone,
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            real_name: new_user.real_name,
            gender: None,
            role: new_user.role,
            status: UserStatus::Active,
            is_verified: false,
            last_login_at: None,
            login_count: 0,
            password_changed_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// 登录计数加一并记录登录时间
    pub fn record_login(&mut self, at: DateTime<Utc>) {
        self.login_count = self.login_count.saturating_add(1);
        self.last_login_at = Some(at);
        self.updated_at = at;
    }

    /// 去掉密码哈希后的快照
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            phone: self.phone.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            real_name: self.real_name.clone(),
            gender: self.gender.clone(),
            role: self.role,
            status: self.status,
            is_verified: self.is_verified,
            last_login_at: self.last_login_at,
            login_count: self.login_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// 用户记录缓存中的快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub phone: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub real_name: Option<String>,
    pub gender: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    pub is_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub login_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 部分字段更新，None 表示不修改
#[derive(Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub real_name: Option<String>,
    pub gender: Option<String>,
    pub password_hash: Option<String>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    pub is_verified: Option<bool>,
}

impl fmt::Debug for UserPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserPatch")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("real_name", &self.real_name)
            .field("gender", &self.gender)
            .field("password_hash", &self.password_hash.as_ref().map(|_| "[REDACTED]"))
            .field("password_changed_at", &self.password_changed_at)
            .field("role", &self.role)
            .field("status", &self.status)
            .field("is_verified", &self.is_verified)
            .finish()
    }
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// 写入非空字段并刷新 `updated_at`
    pub fn apply(&self, record: &mut UserRecord, now: DateTime<Utc>) {
        if let Some(username) = &self.username {
            record.username = Some(username.clone());
        }
        if let Some(email) = &self.email {
            record.email = Some(email.clone());
        }
        if let Some(real_name) = &self.real_name {
            record.real_name = Some(real_name.clone());
        }
        if let Some(gender) = &self.gender {
            record.gender = Some(gender.clone());
        }
        if let Some(hash) = &self.password_hash {
            record.password_hash = hash.clone();
        }
        if let Some(at) = self.password_changed_at {
            record.password_changed_at = Some(at);
        }
        if let Some(role) = self.role {
            record.role = role;
        }
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(verified) = self.is_verified {
            record.is_verified = verified;
        }
        record.updated_at = now;
    }
}

//! 用户主存储端口

use async_trait::async_trait;
use carelink_common::UserId;
use carelink_errors::AppResult;
use chrono::{DateTime, Utc};

use crate::domain::identifier::UniqueField;
use crate::domain::user::{UserPatch, UserRecord};

/// 用户主存储
///
/// 只在缓存未命中或写操作时访问。已软删除的用户对所有查询不可见。
/// 不可达时实现应返回 `AppError::Unavailable`。
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 根据 ID 查找用户
    async fn find_by_identity(&self, id: &UserId) -> AppResult<Option<UserRecord>>;

    /// 根据唯一字段（手机号 / 邮箱 / 用户名）查找用户
    async fn find_by_unique_field(
        &self,
        field: UniqueField,
        value: &str,
    ) -> AppResult<Option<UserRecord>>;

    /// 插入新用户，任一唯一字段冲突时返回 `AppError::Conflict`
    async fn insert(&self, user: UserRecord) -> AppResult<UserRecord>;

    /// 部分更新，返回更新后的记录；用户不存在时返回 `AppError::NotFound`
    async fn update_fields(&self, id: &UserId, patch: &UserPatch) -> AppResult<UserRecord>;

    /// 在存储侧原子地把登录计数加一并写入登录时间，返回更新后的记录
    async fn record_login(&self, id: &UserId, at: DateTime<Utc>) -> AppResult<UserRecord>;

    /// 软删除
    async fn soft_delete(&self, id: &UserId) -> AppResult<()>;
}

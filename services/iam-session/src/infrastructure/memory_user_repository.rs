//! 进程内用户主存储

use std::collections::HashMap;

use async_trait::async_trait;
use carelink_common::UserId;
use carelink_errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::{UniqueField, UserPatch, UserRecord, UserRepository};

/// 唯一约束覆盖已软删除的行，与关系库的唯一索引一致
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, UserRecord>>,
}

fn field_value(record: &UserRecord, field: UniqueField) -> Option<&str> {
    match field {
        UniqueField::Phone => Some(record.phone.as_str()),
        UniqueField::Email => record.email.as_deref(),
        UniqueField::Username => record.username.as_deref(),
    }
}

fn same_value(field: UniqueField, stored: &str, candidate: &str) -> bool {
    match field {
        UniqueField::Email => stored.eq_ignore_ascii_case(candidate),
        _ => stored == candidate,
    }
}

fn ensure_unique(
    users: &HashMap<UserId, UserRecord>,
    owner: Option<&UserId>,
    field: UniqueField,
    candidate: Option<&str>,
) -> AppResult<()> {
    let Some(candidate) = candidate else {
        return Ok(());
    };
    let taken = users.values().any(|record| {
        Some(&record.id) != owner
            && field_value(record, field).is_some_and(|stored| same_value(field, stored, candidate))
    });
    if taken {
        return Err(AppError::conflict(format!("{} already registered", field)));
    }
    Ok(())
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 包含已软删除行的总数
    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_identity(&self, id: &UserId) -> AppResult<Option<UserRecord>> {
        Ok(self
            .users
            .read()
            .get(id)
            .filter(|record| !record.is_deleted())
            .cloned())
    }

    async fn find_by_unique_field(
        &self,
        field: UniqueField,
        value: &str,
    ) -> AppResult<Option<UserRecord>> {
        Ok(self
            .users
            .read()
            .values()
            .find(|record| {
                !record.is_deleted()
                    && field_value(record, field).is_some_and(|stored| same_value(field, stored, value))
            })
            .cloned())
    }

    async fn insert(&self, user: UserRecord) -> AppResult<UserRecord> {
        let mut users = self.users.write();
        ensure_unique(&users, None, UniqueField::Phone, Some(user.phone.as_str()))?;
        ensure_unique(&users, None, UniqueField::Email, user.email.as_deref())?;
        ensure_unique(&users, None, UniqueField::Username, user.username.as_deref())?;
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_fields(&self, id: &UserId, patch: &UserPatch) -> AppResult<UserRecord> {
        let mut users = self.users.write();
        match users.get(id) {
            Some(record) if !record.is_deleted() => {}
            _ => return Err(AppError::not_found(format!("User {} not found", id))),
        }
        ensure_unique(&users, Some(id), UniqueField::Email, patch.email.as_deref())?;
        ensure_unique(&users, Some(id), UniqueField::Username, patch.username.as_deref())?;

        let record = users
            .get_mut(id)
            .ok_or_else(|| AppError::not_found(format!("User {} not found", id)))?;
        patch.apply(record, Utc::now());
        Ok(record.clone())
    }

    async fn record_login(&self, id: &UserId, at: DateTime<Utc>) -> AppResult<UserRecord> {
        let mut users = self.users.write();
        let record = users
            .get_mut(id)
            .filter(|record| !record.is_deleted())
            .ok_or_else(|| AppError::not_found(format!("User {} not found", id)))?;
        record.record_login(at);
        Ok(record.clone())
    }

    async fn soft_delete(&self, id: &UserId) -> AppResult<()> {
        let mut users = self.users.write();
        let record = users
            .get_mut(id)
            .filter(|record| !record.is_deleted())
            .ok_or_else(|| AppError::not_found(format!("User {} not found", id)))?;
        let now = Utc::now();
        record.deleted_at = Some(now);
        record.updated_at = now;
        Ok(())
    }
}

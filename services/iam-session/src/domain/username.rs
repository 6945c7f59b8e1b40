//! Username 值对象

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::identifier::is_valid_phone;

const MIN_CHARS: usize = 3;
const MAX_CHARS: usize = 50;

/// Username 值对象
///
/// 只允许字母、数字和下划线，且不能是手机号形状，
/// 保证登录标识可以按形状无歧义地解析。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Username(String);

impl Username {
    pub fn new(username: impl Into<String>) -> Result<Self, UsernameError> {
        let username = username.into().trim().to_string();
        Self::validate(&username)?;
        Ok(Self(username))
    }

    fn validate(username: &str) -> Result<(), UsernameError> {
        let len = username.chars().count();
        if len < MIN_CHARS {
            return Err(UsernameError::TooShort);
        }
        if len > MAX_CHARS {
            return Err(UsernameError::TooLong);
        }
        if !username.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(UsernameError::InvalidCharacters);
        }
        if is_valid_phone(username) {
            return Err(UsernameError::LooksLikePhone);
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Username 错误
#[derive(Debug, thiserror::Error)]
pub enum UsernameError {
    #[error("Username is too short (minimum 3 characters)")]
    TooShort,

    #[error("Username is too long (maximum 50 characters)")]
    TooLong,

    #[error("Username may only contain letters, digits and underscores")]
    InvalidCharacters,

    #[error("Username must not be a phone number")]
    LooksLikePhone,
}

//! 登录标识

use std::fmt;

/// 主存储中具有唯一约束的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniqueField {
    Phone,
    Email,
    Username,
}

impl UniqueField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Username => "username",
        }
    }
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 中国大陆手机号：`1[3-9]` 开头的 11 位数字
pub fn is_valid_phone(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 11
        && bytes[0] == b'1'
        && (b'3'..=b'9').contains(&bytes[1])
        && bytes.iter().all(u8::is_ascii_digit)
}

/// 登录时提交的标识，按形状解析
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginIdentifier {
    Phone(String),
    Email(String),
    Username(String),
}

impl LoginIdentifier {
    /// 含 `@` 视为邮箱，符合手机号格式视为手机号，其余视为用户名
    pub fn parse(raw: &str) -> Self {
        let value = raw.trim();
        if value.contains('@') {
            Self::Email(value.to_lowercase())
        } else if is_valid_phone(value) {
            Self::Phone(value.to_string())
        } else {
            Self::Username(value.to_string())
        }
    }

    pub fn field(&self) -> UniqueField {
        match self {
            Self::Phone(_) => UniqueField::Phone,
            Self::Email(_) => UniqueField::Email,
            Self::Username(_) => UniqueField::Username,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Phone(v) | Self::Email(v) | Self::Username(v) => v,
        }
    }
}

//! Email 值对象

use serde::{Deserialize, Serialize};
use std::fmt;

/// Email 值对象，统一小写存储
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Email(String);

impl Email {
    /// 创建新的 Email
    ///
    /// 语法按 RFC 5322 校验；域名还必须是带点的公网形式（不接受 `user@localhost`）。
    pub fn new(email: impl Into<String>) -> Result<Self, EmailError> {
        let email = email.into().trim().to_string();

        if !email_address::EmailAddress::is_valid(&email) {
            return Err(EmailError::InvalidFormat(email));
        }

        let dotted = email.rsplit_once('@').is_some_and(|(_, domain)| {
            domain.contains('.') && !domain.split('.').any(str::is_empty)
        });
        if !dotted {
            return Err(EmailError::InvalidFormat(email));
        }

        Ok(Self(email.to_lowercase()))
    }

    /// 获取邮箱域名
    pub fn domain(&self) -> Option<&str> {
        self.0.rsplit_once('@').map(|(_, domain)| domain)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Email 错误
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Invalid email format: {0}")]
    InvalidFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(Email::new("user@example.com").is_ok());
        assert!(Email::new("user.name@example.com").is_ok());
        assert!(Email::new("user+tag@example.co.uk").is_ok());
        assert!(Email::new("user_name@example-domain.com").is_ok());
    }

    #[test]
    fn test_invalid_emails() {
        // 含空格
        assert!(Email::new("john doe@exa mple.com").is_err());
        assert!(Email::new("user name@example.com").is_err());

        // 多个 @
        assert!(Email::new("user@@example.com").is_err());

        // 缺少 @ 或某一侧为空
        assert!(Email::new("userexample.com").is_err());
        assert!(Email::new("@example.com").is_err());
        assert!(Email::new("user@").is_err());

        // 域名不带点或有空标签
        assert!(Email::new("alice@localhost").is_err());
        assert!(Email::new("a@.com").is_err());

        assert!(Email::new("").is_err());
    }

    #[test]
    fn test_email_trimmed_and_lowercased() {
        let email = Email::new(" User@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "user@example.com");
        assert_eq!(email.domain(), Some("example.com"));
    }
}

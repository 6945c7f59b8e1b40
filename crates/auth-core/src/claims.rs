//! JWT Claims

use std::fmt;

use carelink_common::{SessionId, UserId};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// 令牌类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 令牌主体：签发时写入 claims 的身份信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: UserId,
    pub session_id: SessionId,
    pub role: String,
}

impl TokenSubject {
    pub fn new(user_id: UserId, session_id: SessionId, role: impl Into<String>) -> Self {
        Self {
            user_id,
            session_id,
            role: role.into(),
        }
    }
}

/// JWT Claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Session ID，同一次登录签发的所有令牌共享
    pub sid: String,
    /// Token type (access or refresh)
    pub token_type: TokenKind,
    /// Issued at（秒）
    pub iat: i64,
    /// Issued at（毫秒），用于与身份级撤销时间点比较
    #[serde(default)]
    pub iat_ms: i64,
    /// Expiration time（秒）
    pub exp: i64,
    /// JWT ID
    pub jti: String,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// 签发时的用户角色
    #[serde(default)]
    pub role: String,
}

impl Claims {
    /// `now + ttl` 超出可表示范围时返回 None
    pub(crate) fn new(
        subject: &TokenSubject,
        kind: TokenKind,
        ttl: Duration,
        issuer: &str,
        audience: &str,
    ) -> Option<Self> {
        let now = Utc::now();
        let exp = now.checked_add_signed(ttl)?;
        Some(Self {
            sub: subject.user_id.to_string(),
            sid: subject.session_id.to_string(),
            token_type: kind,
            iat: now.timestamp(),
            iat_ms: now.timestamp_millis(),
            exp: exp.timestamp(),
            jti: uuid::Uuid::now_v7().to_string(),
            iss: issuer.to_string(),
            aud: audience.to_string(),
            role: subject.role.clone(),
        })
    }

    pub fn user_id(&self) -> Option<UserId> {
        UserId::parse_str(&self.sub).ok()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        SessionId::parse_str(&self.sid).ok()
    }

    pub fn kind(&self) -> TokenKind {
        self.token_type
    }

    /// 毫秒精度的签发时间；旧令牌缺少 `iat_ms` 时退化为秒精度
    pub fn issued_at_millis(&self) -> i64 {
        if self.iat_ms > 0 {
            self.iat_ms
        } else {
            self.iat.saturating_mul(1000)
        }
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.issued_at_millis())
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// 剩余有效期，已过期时为零
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at() - now).max(Duration::zero())
    }

    /// 剩余有效期不超过 `threshold` 时返回 true
    pub fn is_expiring_soon(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        self.remaining(now) <= threshold
    }
}

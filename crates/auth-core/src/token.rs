//! Token 服务

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::claims::{Claims, TokenKind, TokenSubject};

/// 令牌校验失败的原因
///
/// `Expired` 必须与其他失败区分：客户端据此决定刷新还是重新登录。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Token expired")]
    Expired,

    #[error("Token kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        expected: TokenKind,
        actual: TokenKind,
    },

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// 已签发的令牌及其 claims
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// 同一主体、同一会话的一对令牌
#[derive(Debug, Clone)]
pub struct IssuedPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// 令牌摘要（SHA-256 十六进制），用作撤销与会话槽的键，避免原文落入缓存
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Token 服务
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    issuer: String,
    audience: String,
}

impl TokenService {
    pub fn new(
        secret: &str,
        access_token_expires_in: i64,
        refresh_token_expires_in: i64,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl: Duration::try_seconds(access_token_expires_in).unwrap_or(Duration::MAX),
            refresh_ttl: Duration::try_seconds(refresh_token_expires_in).unwrap_or(Duration::MAX),
            issuer: issuer.into(),
            audience: audience.into(),
        }
    }

    /// 签发令牌，`exp = now + ttl`
    pub fn issue(
        &self,
        subject: &TokenSubject,
        kind: TokenKind,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenError> {
        let claims = Claims::new(subject, kind, ttl, &self.issuer, &self.audience)
            .ok_or_else(|| TokenError::Signing("token lifetime out of range".into()))?;
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        Ok(IssuedToken { token, claims })
    }

    /// 按配置的有效期签发 access + refresh
    pub fn issue_pair(&self, subject: &TokenSubject) -> Result<IssuedPair, TokenError> {
        Ok(IssuedPair {
            access: self.issue(subject, TokenKind::Access, self.access_ttl)?,
            refresh: self.issue(subject, TokenKind::Refresh, self.refresh_ttl)?,
        })
    }

    /// 校验签名、签发方、受众、类型以及 `iat <= now < exp`
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss", "aud"]);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.leeway = 0; // 不允许时间偏差

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed(e.to_string()),
            })?
            .claims;

        let now = Utc::now().timestamp();
        if now >= claims.exp {
            return Err(TokenError::Expired);
        }
        if claims.iat > now {
            return Err(TokenError::Malformed("token issued in the future".into()));
        }
        if claims.jti.is_empty() || claims.user_id().is_none() || claims.session_id().is_none() {
            return Err(TokenError::Malformed("missing token identity".into()));
        }
        if claims.token_type != expected {
            return Err(TokenError::KindMismatch {
                expected,
                actual: claims.token_type,
            });
        }

        Ok(claims)
    }

    /// 不校验签名的解码，只用于诊断（例如向客户端报告过期时间），不能作为授权依据
    pub fn decode_unsafe(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()
            .map(|data| data.claims)
    }

    /// 令牌声明的过期时间（不校验签名）
    pub fn expires_at(&self, token: &str) -> Option<DateTime<Utc>> {
        self.decode_unsafe(token).map(|claims| claims.expires_at())
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carelink_common::{SessionId, UserId};

    const SECRET: &str = "test-secret-key-at-least-32-chars-long";

    fn service() -> TokenService {
        TokenService::new(SECRET, 3600, 86400, "carelink-auth", "carelink-mobile")
    }

    fn subject() -> TokenSubject {
        TokenSubject::new(UserId::new(), SessionId::new(), "user")
    }

    #[test]
    fn test_issue_and_verify_access_token() {
        let service = service();
        let subject = subject();
        let issued = service.issue(&subject, TokenKind::Access, Duration::minutes(5)).unwrap();

        let claims = service.verify(&issued.token, TokenKind::Access).unwrap();
        assert_eq!(claims.user_id(), Some(subject.user_id));
        assert_eq!(claims.session_id(), Some(subject.session_id));
        assert_eq!(claims.role, "user");
        assert!(claims.expires_at() > claims.issued_at());
    }

    #[test]
    fn test_kind_mismatch_both_directions() {
        let service = service();
        let pair = service.issue_pair(&subject()).unwrap();

        assert!(matches!(
            service.verify(&pair.refresh.token, TokenKind::Access),
            Err(TokenError::KindMismatch { expected: TokenKind::Access, actual: TokenKind::Refresh })
        ));
        assert!(matches!(
            service.verify(&pair.access.token, TokenKind::Refresh),
            Err(TokenError::KindMismatch { expected: TokenKind::Refresh, actual: TokenKind::Access })
        ));
    }

    #[test]
    fn test_expired_is_distinguishable() {
        let service = service();
        let expired = service.issue(&subject(), TokenKind::Access, Duration::zero()).unwrap();
        assert_eq!(service.verify(&expired.token, TokenKind::Access), Err(TokenError::Expired));

        let long_gone = service.issue(&subject(), TokenKind::Access, Duration::hours(-2)).unwrap();
        assert_eq!(service.verify(&long_gone.token, TokenKind::Access), Err(TokenError::Expired));
    }

    #[test]
    fn test_tampered_token_is_malformed() {
        let service = service();
        let issued = service.issue(&subject(), TokenKind::Access, Duration::minutes(5)).unwrap();
        let mut tampered = issued.token.clone();
        tampered.pop();
        tampered.push(if issued.token.ends_with('A') { 'B' } else { 'A' });

        assert!(matches!(service.verify(&tampered, TokenKind::Access), Err(TokenError::Malformed(_))));
        assert!(matches!(service.verify("garbage", TokenKind::Access), Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_foreign_secret_issuer_and_audience_rejected() {
        let ours = service();
        let other_secret = TokenService::new(
            "another-secret-key-at-least-32-chars!!",
            3600,
            86400,
            "carelink-auth",
            "carelink-mobile",
        );
        let other_audience = TokenService::new(SECRET, 3600, 86400, "carelink-auth", "admin-console");
        let other_issuer = TokenService::new(SECRET, 3600, 86400, "someone-else", "carelink-mobile");

        for foreign in [other_secret, other_audience, other_issuer] {
            let issued = foreign.issue(&subject(), TokenKind::Access, Duration::minutes(5)).unwrap();
            assert!(matches!(
                ours.verify(&issued.token, TokenKind::Access),
                Err(TokenError::Malformed(_))
            ));
        }
    }

    #[test]
    fn test_decode_unsafe_recovers_identity_and_kind() {
        let service = service();
        let subject = subject();
        let issued = service.issue(&subject, TokenKind::Access, Duration::minutes(5)).unwrap();

        let claims = service.decode_unsafe(&issued.token).unwrap();
        assert_eq!(claims.user_id(), Some(subject.user_id));
        assert_eq!(claims.token_type, TokenKind::Access);
        assert_eq!(serde_json::to_value(claims.token_type).unwrap(), "access");
    }

    #[test]
    fn test_decode_unsafe_ignores_signature_and_expiry() {
        let other = TokenService::new("unrelated-secret-unrelated-secret-xx", 1, 2, "x", "y");
        let expired = other.issue(&subject(), TokenKind::Refresh, Duration::hours(-1)).unwrap();

        let claims = service().decode_unsafe(&expired.token).unwrap();
        assert_eq!(claims.kind(), TokenKind::Refresh);
        assert!(service().expires_at(&expired.token).unwrap() < Utc::now());
        assert!(service().decode_unsafe("not.a.jwt").is_none());
    }

    #[test]
    fn test_token_digest_is_stable_and_distinct() {
        assert_eq!(token_digest("abc"), token_digest("abc"));
        assert_ne!(token_digest("abc"), token_digest("abd"));
        assert_eq!(token_digest("abc").len(), 64);
    }

    #[test]
    fn test_expiring_soon() {
        let service = service();
        let issued = service.issue(&subject(), TokenKind::Access, Duration::minutes(3)).unwrap();
        let now = Utc::now();
        assert!(issued.claims.is_expiring_soon(Duration::minutes(5), now));
        assert!(!issued.claims.is_expiring_soon(Duration::minutes(1), now));
    }

    #[test]
    fn test_out_of_range_lifetime_is_an_error() {
        let service = TokenService::new(
            "0123456789abcdef0123456789abcdef",
            60,
            i64::MAX,
            "iss",
            "aud",
        );
        assert_eq!(service.refresh_ttl(), Duration::MAX);

        let err = service.issue_pair(&subject()).unwrap_err();
        assert!(matches!(err, TokenError::Signing(_)));
    }
}

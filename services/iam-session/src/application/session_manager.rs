//! 会话管理器
//!
//! 校验热路径的检查顺序（任一失败立即返回）：
//! 1. 令牌签名、签发方、受众、类型与有效期
//! 2. 撤销存储（令牌条目与身份截止点），查询失败一律拒绝
//! 3. 用户记录（缓存，未命中或缓存故障时回源主存储）
//! 4. 账户状态必须为 active
//!
//! 撤销存储同时查询令牌条目、会话条目与身份截止点。

use std::sync::Arc;
use std::time::Duration;

use carelink_auth_core::{Claims, TokenError, TokenKind, TokenService, TokenSubject, token_digest};
use carelink_bootstrap::Infrastructure;
use carelink_common::{SessionId, UserId};
use carelink_config::SessionConfig;
use carelink_errors::AppError;
use carelink_telemetry::names;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use http::HeaderMap;
use http::header::AUTHORIZATION;
use tracing::{debug, info, warn};

use crate::application::dto::{ProfileUpdate, RegisterRequest, TokenPair, UserContext};
use crate::application::guard::DependencyGuard;
use crate::domain::{
    CredentialHasher, DeviceInfo, Email, LoginIdentifier, NewUser, SessionInfo, UserPatch,
    UserProfile, UserRecord, UserRepository, UserRole, UserStatus, Username, is_valid_phone,
};
use crate::error::AuthError;
use crate::infrastructure::{
    CacheRevocationStore, CacheUserRecordCache, RevocationKey, RevocationStore, SessionRegistry,
    SessionSlot, UserRecordCache,
};

const GENDERS: [&str; 3] = ["male", "female", "other"];

/// 会话相关的时间参数
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub user_cache_ttl: Duration,
    pub expiring_soon: chrono::Duration,
}

impl SessionSettings {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            user_cache_ttl: Duration::from_secs(config.user_cache_ttl_secs),
            expiring_soon: i64::try_from(config.expiring_soon_secs)
                .ok()
                .and_then(chrono::Duration::try_seconds)
                .unwrap_or(chrono::Duration::MAX),
        }
    }
}

/// 从 `Authorization: Bearer <token>` 中取出令牌
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn outcome<T>(result: &Result<T, AuthError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) => e.kind().as_str(),
    }
}

fn identity_of(claims: &Claims) -> Result<(UserId, SessionId), AuthError> {
    match (claims.user_id(), claims.session_id()) {
        (Some(user_id), Some(session_id)) => Ok((user_id, session_id)),
        _ => Err(AuthError::TokenInvalid),
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// 空白视为未提供
fn optional_email(email: Option<&str>) -> Result<Option<String>, AuthError> {
    match trimmed(email) {
        Some(email) => Ok(Some(Email::new(email)?.into_inner())),
        None => Ok(None),
    }
}

fn optional_username(username: Option<&str>) -> Result<Option<String>, AuthError> {
    match trimmed(username) {
        Some(username) => Ok(Some(Username::new(username)?.into_inner())),
        None => Ok(None),
    }
}

/// 未上报的设备用占位值
fn device_or_placeholder(device: Option<DeviceInfo>) -> Result<DeviceInfo, AuthError> {
    let now = Utc::now();
    match device {
        Some(device) => Ok(device.normalize(now)?),
        None => Ok(DeviceInfo::unknown(now)),
    }
}

fn normalize_gender(gender: Option<&str>) -> Result<Option<String>, AuthError> {
    let Some(gender) = trimmed(gender) else {
        return Ok(None);
    };
    let gender = gender.to_lowercase();
    if !GENDERS.contains(&gender.as_str()) {
        return Err(AuthError::Validation("Gender must be male, female or other".into()));
    }
    Ok(Some(gender))
}

/// 会话管理器
///
/// 自身不持有可变状态，所有共享状态都在撤销存储、用户缓存和会话槽中；
/// clone 后可在任意数量的请求任务间并发使用。
#[derive(Clone)]
pub struct SessionManager {
    tokens: Arc<TokenService>,
    hasher: CredentialHasher,
    users: Arc<dyn UserRepository>,
    revocations: Arc<dyn RevocationStore>,
    user_cache: Arc<dyn UserRecordCache>,
    sessions: SessionRegistry,
    guard: DependencyGuard,
    settings: SessionSettings,
}

impl SessionManager {
    pub fn new(
        tokens: Arc<TokenService>,
        hasher: CredentialHasher,
        users: Arc<dyn UserRepository>,
        revocations: Arc<dyn RevocationStore>,
        user_cache: Arc<dyn UserRecordCache>,
        sessions: SessionRegistry,
        config: &SessionConfig,
    ) -> Self {
        Self {
            tokens,
            hasher,
            users,
            revocations,
            user_cache,
            sessions,
            guard: DependencyGuard::from_config(config),
            settings: SessionSettings::from_config(config),
        }
    }

    /// 用基础设施中的缓存装配撤销存储、用户缓存和会话槽
    pub fn from_infrastructure(
        infra: &Infrastructure,
        users: Arc<dyn UserRepository>,
    ) -> Result<Self, AuthError> {
        let config = infra.config();
        let cache = infra.cache();
        Ok(Self::new(
            infra.token_service(),
            CredentialHasher::new(&config.password)?,
            users,
            Arc::new(CacheRevocationStore::new(cache.clone())),
            Arc::new(CacheUserRecordCache::new(cache.clone())),
            SessionRegistry::new(cache),
            &config.session,
        ))
    }

    fn refresh_ttl(&self) -> Duration {
        self.tokens.refresh_ttl().to_std().unwrap_or_default()
    }

    // ---- 注册与登录 ----

    /// 注册并直接签发令牌对；任一唯一字段已被占用时返回 `Conflict`，不签发令牌
    pub async fn register(&self, request: RegisterRequest) -> Result<(UserId, TokenPair), AuthError> {
        let phone = request.phone.trim().to_string();
        if !is_valid_phone(&phone) {
            return Err(AuthError::Validation("Invalid phone number".into()));
        }
        let email = optional_email(request.email.as_deref())?;
        let username = optional_username(request.username.as_deref())?;
        let device = device_or_placeholder(request.device)?;
        self.hasher.validate_policy(&request.password)?;

        let role = request.role.unwrap_or_default();
        if !role.is_self_assignable() {
            return Err(AuthError::Validation(format!(
                "Role {} cannot be chosen at registration",
                role
            )));
        }

        let password_hash = self.hash_password(&request.password).await?;
        let record = UserRecord::new(NewUser {
            phone,
            username,
            email,
            password_hash,
            real_name: trimmed(request.real_name.as_deref()),
            role,
        });

        let record = self
            .guard
            .run_once("user insert", self.users.insert(record))
            .await
            .map_err(|e| {
                if matches!(e, AppError::Conflict(_)) {
                    debug!(error = %e, "Registration rejected");
                }
                AuthError::from(e)
            })?;
        info!(user_id = %record.id, role = %record.role, "User registered");

        let user_id = record.id;
        let pair = self.start_session(record, device).await?;
        Ok((user_id, pair))
    }

    /// 登录
    ///
    /// 标识不存在与密码错误返回同一个 `InvalidCredentials`，且耗时相当；
    /// 密码正确后才检查账户状态。
    pub async fn login(&self, identifier: &str, password: &str) -> Result<TokenPair, AuthError> {
        self.login_with_device(identifier, password, None).await
    }

    /// 带设备信息登录，设备出现在 `list_sessions` 中
    pub async fn login_with_device(
        &self,
        identifier: &str,
        password: &str,
        device: Option<DeviceInfo>,
    ) -> Result<TokenPair, AuthError> {
        let result = self.login_inner(identifier, password, device).await;
        metrics::counter!(names::LOGIN_TOTAL, "outcome" => outcome(&result)).increment(1);
        result
    }

    async fn login_inner(
        &self,
        identifier: &str,
        password: &str,
        device: Option<DeviceInfo>,
    ) -> Result<TokenPair, AuthError> {
        let device = device_or_placeholder(device)?;
        let identifier = LoginIdentifier::parse(identifier);
        let found = self
            .guard
            .run("user lookup", || {
                self.users
                    .find_by_unique_field(identifier.field(), identifier.value())
            })
            .await?;

        let Some(record) = found else {
            self.dummy_verify(password).await;
            debug!(field = %identifier.field(), "Login for unknown identifier");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.verify_password(password, &record.password_hash).await? {
            debug!(user_id = %record.id, "Login with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        if !record.status.is_active() {
            info!(user_id = %record.id, status = %record.status, "Login rejected for disabled account");
            return Err(AuthError::AccountDisabled);
        }

        self.start_session(record, device).await
    }

    /// 签发令牌对、打开会话槽、登记会话索引、记录登录信息并预热用户缓存
    async fn start_session(&self, record: UserRecord, device: DeviceInfo) -> Result<TokenPair, AuthError> {
        let user_id = record.id;
        let session_id = SessionId::new();
        let subject = TokenSubject::new(user_id, session_id, record.role.as_str());
        let pair = self.tokens.issue_pair(&subject)?;

        let digest = token_digest(&pair.refresh.token);
        let ttl = self.refresh_ttl();
        self.guard
            .run("session open", || {
                self.sessions.open(&session_id, &user_id, &digest, ttl)
            })
            .await
            .map_err(AuthError::dependency)?;

        let issued_at = pair.refresh.claims.issued_at();
        let info = SessionInfo {
            session_id,
            device,
            created_at: issued_at,
            last_active_at: issued_at,
        };
        self.track_session(&user_id, &info).await;

        let record = match self
            .guard
            .run_once("login metadata update", self.users.record_login(&user_id, Utc::now()))
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to record login metadata");
                record
            }
        };
        self.warm_cache(&record.to_profile()).await;

        info!(user_id = %user_id, session_id = %session_id, "Session started");
        Ok(TokenPair::from(pair))
    }

    // ---- 校验 ----

    /// 校验访问令牌（每个受保护请求的热路径）
    pub async fn verify_access(&self, token: &str) -> Result<UserContext, AuthError> {
        let result = self.verify_access_inner(token).await;
        metrics::counter!(names::VERIFY_TOTAL, "outcome" => outcome(&result)).increment(1);
        result
    }

    async fn verify_access_inner(&self, token: &str) -> Result<UserContext, AuthError> {
        let claims = self.check_token(token, TokenKind::Access).await?;
        let (user_id, session_id) = identity_of(&claims)?;

        let profile = self.load_profile(&user_id).await?;
        if !profile.status.is_active() {
            debug!(user_id = %user_id, status = %profile.status, "Access denied for disabled account");
            return Err(AuthError::AccountDisabled);
        }

        Ok(UserContext {
            user_id,
            session_id,
            role: profile.role,
            token_expires_at: claims.expires_at(),
            expiring_soon: claims.is_expiring_soon(self.settings.expiring_soon, Utc::now()),
            profile,
        })
    }

    /// 中间件入口：从请求头提取 Bearer 令牌并校验
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<UserContext, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::TokenMissing)?;
        self.verify_access(token).await
    }

    /// 可选认证：没有或无效的令牌视为匿名；依赖故障仍然上报
    pub async fn authenticate_optional(
        &self,
        headers: &HeaderMap,
    ) -> Result<Option<UserContext>, AuthError> {
        let Some(token) = bearer_token(headers) else {
            return Ok(None);
        };
        match self.verify_access(token).await {
            Ok(context) => Ok(Some(context)),
            Err(e @ AuthError::DependencyUnavailable(_)) => Err(e),
            Err(e) => {
                debug!(kind = e.kind().as_str(), "Optional authentication ignored token");
                Ok(None)
            }
        }
    }

    /// 令牌校验 + 撤销检查
    async fn check_token(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
        let claims = self.tokens.verify(token, kind).map_err(|e| {
            match &e {
                TokenError::Expired => debug!(kind = %kind, "Token expired"),
                other => debug!(kind = %kind, error = %other, "Token rejected"),
            }
            AuthError::from(e)
        })?;
        self.ensure_not_revoked(token, &claims).await?;
        Ok(claims)
    }

    /// 撤销存储不可用时拒绝请求
    async fn ensure_not_revoked(&self, token: &str, claims: &Claims) -> Result<(), AuthError> {
        let (user_id, session_id) = identity_of(claims)?;
        let token_key = RevocationKey::token(token);
        let session_key = RevocationKey::Session(session_id);

        let (revoked, session_revoked, cutoff) = tokio::join!(
            self.guard
                .run("revocation lookup", || self.revocations.is_revoked(&token_key)),
            self.guard.run("session revocation lookup", || {
                self.revocations.is_revoked(&session_key)
            }),
            self.guard.run("identity revocation lookup", || {
                self.revocations.revoked_since(&user_id)
            }),
        );

        if revoked.map_err(AuthError::dependency)? {
            debug!(user_id = %user_id, session_id = %session_id, kind = %claims.kind(), "Token revoked");
            return Err(AuthError::TokenRevoked);
        }
        if session_revoked.map_err(AuthError::dependency)? {
            debug!(user_id = %user_id, session_id = %session_id, kind = %claims.kind(), "Session revoked");
            return Err(AuthError::TokenRevoked);
        }
        if let Some(cutoff) = cutoff.map_err(AuthError::dependency)? {
            if claims.issued_at_millis() <= cutoff.timestamp_millis() {
                debug!(
                    user_id = %user_id,
                    session_id = %session_id,
                    kind = %claims.kind(),
                    "Token issued before identity revocation"
                );
                return Err(AuthError::TokenRevoked);
            }
        }
        Ok(())
    }

    /// cache-aside 读取用户记录
    ///
    /// 缓存故障按未命中处理；主存储故障返回 `DependencyUnavailable`。
    async fn load_profile(&self, user_id: &UserId) -> Result<UserProfile, AuthError> {
        match self
            .guard
            .run("user cache get", || self.user_cache.get(user_id))
            .await
        {
            Ok(Some(profile)) => {
                metrics::counter!(names::USER_CACHE_TOTAL, "result" => "hit").increment(1);
                return Ok(profile);
            }
            Ok(None) => {
                metrics::counter!(names::USER_CACHE_TOTAL, "result" => "miss").increment(1);
            }
            Err(e) => {
                metrics::counter!(names::USER_CACHE_TOTAL, "result" => "error").increment(1);
                warn!(user_id = %user_id, error = %e, "User cache unavailable, falling back to primary store");
            }
        }

        let record = self
            .guard
            .run("user lookup", || self.users.find_by_identity(user_id))
            .await?;
        let Some(record) = record else {
            debug!(user_id = %user_id, "Token subject no longer exists");
            return Err(AuthError::TokenInvalid);
        };

        let profile = record.to_profile();
        self.warm_cache(&profile).await;
        Ok(profile)
    }

    /// 写缓存失败只记录日志
    async fn warm_cache(&self, profile: &UserProfile) {
        let ttl = self.settings.user_cache_ttl;
        if let Err(e) = self
            .guard
            .run("user cache put", || self.user_cache.put(&profile.id, profile, ttl))
            .await
        {
            warn!(user_id = %profile.id, error = %e, "Failed to populate user cache");
        }
    }

    // ---- 刷新与登出 ----

    /// 刷新令牌轮换
    ///
    /// 会话槽上的比较并替换决定胜负：同一刷新令牌并发刷新只有一个成功，其余返回 `TokenRevoked`。
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let result = self.refresh_inner(refresh_token).await;
        metrics::counter!(names::REFRESH_TOTAL, "outcome" => outcome(&result)).increment(1);
        result
    }

    async fn refresh_inner(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.check_token(refresh_token, TokenKind::Refresh).await?;
        let (user_id, session_id) = identity_of(&claims)?;

        let profile = self.load_profile(&user_id).await?;
        if !profile.status.is_active() {
            return Err(AuthError::AccountDisabled);
        }

        let subject = TokenSubject::new(user_id, session_id, profile.role.as_str());
        let pair = self.tokens.issue_pair(&subject)?;

        let presented = token_digest(refresh_token);
        let next = token_digest(&pair.refresh.token);
        let rotated = self
            .guard
            .run_once(
                "session rotate",
                self.sessions
                    .rotate(&session_id, &user_id, &presented, &next, self.refresh_ttl()),
            )
            .await
            .map_err(AuthError::dependency)?;

        if !rotated {
            debug!(user_id = %user_id, session_id = %session_id, "Refresh token is no longer current for its session");
            return Err(AuthError::TokenRevoked);
        }

        // 槽已轮换，旧令牌即使撤销写入失败也无法再次使用
        if let Err(e) = self
            .revoke_token(RevocationKey::Token(presented), claims.expires_at())
            .await
        {
            warn!(user_id = %user_id, session_id = %session_id, error = %e, "Failed to revoke rotated refresh token");
        }
        self.touch_session(&user_id, &session_id, pair.refresh.claims.issued_at())
            .await;

        info!(user_id = %user_id, session_id = %session_id, "Refresh token rotated");
        Ok(TokenPair::from(pair))
    }

    /// 登出
    ///
    /// 撤销访问令牌、关闭会话槽并清除用户缓存；已过期的访问令牌直接视为成功。
    /// 提供的刷新令牌属于同一身份时一并撤销。
    pub async fn logout(&self, access_token: &str, refresh_token: Option<&str>) -> Result<(), AuthError> {
        let access = match self.tokens.verify(access_token, TokenKind::Access) {
            Ok(claims) => Some(claims),
            Err(TokenError::Expired) => {
                debug!("Logout with expired access token");
                None
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(claims) = &access {
            let (user_id, session_id) = identity_of(claims)?;
            self.revoke_token(RevocationKey::token(access_token), claims.expires_at())
                .await?;
            self.close_session(&user_id, &session_id).await?;
            self.invalidate_user(&user_id).await?;
            info!(user_id = %user_id, session_id = %session_id, "Logged out");
        }

        if let Some(refresh_token) = refresh_token {
            self.revoke_supplied_refresh(refresh_token, access.as_ref())
                .await?;
        }
        Ok(())
    }

    async fn revoke_supplied_refresh(
        &self,
        refresh_token: &str,
        access: Option<&Claims>,
    ) -> Result<(), AuthError> {
        let claims = match self.tokens.verify(refresh_token, TokenKind::Refresh) {
            Ok(claims) => claims,
            Err(e) => {
                debug!(error = %e, "Ignoring unusable refresh token on logout");
                return Ok(());
            }
        };
        if access.is_some_and(|access| access.sub != claims.sub) {
            debug!("Ignoring refresh token of another identity on logout");
            return Ok(());
        }

        let (user_id, session_id) = identity_of(&claims)?;
        self.revoke_token(RevocationKey::token(refresh_token), claims.expires_at())
            .await?;
        self.close_session(&user_id, &session_id).await
    }

    // ---- 设备会话 ----

    /// 该身份当前存活的会话，按最近活跃时间倒序
    ///
    /// 槽已不存在或早于身份截止点的索引项视为失效，顺手从索引中清掉。
    pub async fn list_sessions(&self, user_id: &UserId) -> Result<Vec<SessionInfo>, AuthError> {
        let (tracked, cutoff) = tokio::join!(
            self.guard
                .run("session index read", || self.sessions.tracked(user_id)),
            self.guard.run("identity revocation lookup", || {
                self.revocations.revoked_since(user_id)
            }),
        );
        let tracked = tracked.map_err(AuthError::dependency)?;
        let cutoff = cutoff.map_err(AuthError::dependency)?;

        let slots = join_all(tracked.iter().map(|info| {
            self.guard
                .run("session lookup", move || self.sessions.current(&info.session_id))
        }))
        .await;

        let mut live = Vec::with_capacity(tracked.len());
        for (info, slot) in tracked.into_iter().zip(slots) {
            let owned = slot
                .map_err(AuthError::dependency)?
                .is_some_and(|slot| slot.user_id == *user_id);
            let cut_off = cutoff.is_some_and(|cutoff| {
                info.last_active_at.timestamp_millis() <= cutoff.timestamp_millis()
            });
            if owned && !cut_off {
                live.push(info);
            } else {
                self.forget_session(user_id, &info.session_id).await;
            }
        }
        live.sort_by(|a, b| b.last_active_at.cmp(&a.last_active_at));
        Ok(live)
    }

    /// 注销指定设备的会话
    ///
    /// 会话必须属于该身份；该会话签发过的访问令牌与刷新令牌立即失效。
    /// 已经结束但仍在索引里的会话只清理索引。
    pub async fn logout_session(
        &self,
        user_id: &UserId,
        session_id: &SessionId,
    ) -> Result<(), AuthError> {
        let slot = self
            .guard
            .run("session lookup", || self.sessions.current(session_id))
            .await
            .map_err(AuthError::dependency)?;

        match slot {
            Some(slot) if slot.user_id == *user_id => {}
            Some(_) => {
                warn!(user_id = %user_id, session_id = %session_id, "Attempt to close a session of another account");
                return Err(AuthError::Forbidden("Session does not belong to this account".into()));
            }
            None => {
                let removed = self
                    .guard
                    .run("session index remove", || self.sessions.untrack(user_id, session_id))
                    .await
                    .map_err(AuthError::dependency)?;
                if !removed {
                    return Err(AuthError::Forbidden("Session does not belong to this account".into()));
                }
                debug!(user_id = %user_id, session_id = %session_id, "Session already ended, index cleaned");
                return Ok(());
            }
        }

        let until = Utc::now()
            .checked_add_signed(self.tokens.refresh_ttl())
            .ok_or_else(|| AuthError::Internal("Session revocation window out of range".into()))?;
        self.revoke_token(RevocationKey::Session(*session_id), until)
            .await?;
        self.close_session(user_id, session_id).await?;
        info!(user_id = %user_id, session_id = %session_id, "Device session closed");
        Ok(())
    }

    /// 撤销该身份的全部会话
    pub async fn logout_all(&self, user_id: &UserId) -> Result<(), AuthError> {
        self.revoke_identity(user_id).await?;
        self.invalidate_user(user_id).await?;
        info!(user_id = %user_id, "All sessions revoked");
        Ok(())
    }

    // ---- 写操作：提交后同步失效缓存 ----

    /// 修改密码：校验旧密码、写入新哈希、失效缓存，并撤销此前签发的所有令牌
    pub async fn change_password(
        &self,
        user_id: &UserId,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        let record = self
            .guard
            .run("user lookup", || self.users.find_by_identity(user_id))
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !self.verify_password(old_password, &record.password_hash).await? {
            debug!(user_id = %user_id, "Password change with wrong current password");
            return Err(AuthError::InvalidCredentials);
        }
        self.hasher.validate_policy(new_password)?;

        let patch = UserPatch {
            password_hash: Some(self.hash_password(new_password).await?),
            password_changed_at: Some(Utc::now()),
            ..Default::default()
        };
        self.commit_write(user_id, &patch).await?;
        self.revoke_identity(user_id).await?;

        info!(user_id = %user_id, "Password changed, outstanding sessions revoked");
        Ok(())
    }

    pub async fn update_profile(
        &self,
        user_id: &UserId,
        update: ProfileUpdate,
    ) -> Result<UserProfile, AuthError> {
        let patch = UserPatch {
            username: optional_username(update.username.as_deref())?,
            email: optional_email(update.email.as_deref())?,
            real_name: trimmed(update.real_name.as_deref()),
            gender: normalize_gender(update.gender.as_deref())?,
            ..Default::default()
        };
        if patch.is_empty() {
            return Err(AuthError::Validation("Nothing to update".into()));
        }

        let record = self.commit_write(user_id, &patch).await?;
        info!(user_id = %user_id, "Profile updated");
        Ok(record.to_profile())
    }

    pub async fn change_role(&self, user_id: &UserId, role: UserRole) -> Result<UserProfile, AuthError> {
        let patch = UserPatch {
            role: Some(role),
            ..Default::default()
        };
        let record = self.commit_write(user_id, &patch).await?;
        info!(user_id = %user_id, role = %role, "Role changed");
        Ok(record.to_profile())
    }

    /// 修改账户状态；非 active 状态立即撤销该身份的全部令牌
    pub async fn set_status(
        &self,
        user_id: &UserId,
        status: UserStatus,
    ) -> Result<UserProfile, AuthError> {
        let patch = UserPatch {
            status: Some(status),
            ..Default::default()
        };
        let record = self.commit_write(user_id, &patch).await?;
        if !status.is_active() {
            self.revoke_identity(user_id).await?;
        }
        info!(user_id = %user_id, status = %status, "Account status changed");
        Ok(record.to_profile())
    }

    /// 软删除账户并撤销全部令牌
    pub async fn delete_account(&self, user_id: &UserId) -> Result<(), AuthError> {
        self.guard
            .run_once("user soft delete", self.users.soft_delete(user_id))
            .await?;
        self.invalidate_user(user_id).await?;
        self.revoke_identity(user_id).await?;
        info!(user_id = %user_id, "Account deleted");
        Ok(())
    }

    async fn commit_write(&self, user_id: &UserId, patch: &UserPatch) -> Result<UserRecord, AuthError> {
        let record = self
            .guard
            .run("user update", || self.users.update_fields(user_id, patch))
            .await?;
        self.invalidate_user(user_id).await?;
        Ok(record)
    }

    // ---- 诊断 ----

    /// 令牌声明的过期时间（不校验签名，不能作为授权依据）
    pub fn token_expiry(&self, token: &str) -> Option<DateTime<Utc>> {
        self.tokens.expires_at(token)
    }

    /// 会话槽当前内容
    pub async fn session_slot(&self, session_id: &SessionId) -> Result<Option<SessionSlot>, AuthError> {
        self.guard
            .run("session lookup", || self.sessions.current(session_id))
            .await
            .map_err(AuthError::from)
    }

    // ---- 内部 ----

    async fn revoke_token(&self, key: RevocationKey, until: DateTime<Utc>) -> Result<(), AuthError> {
        self.guard
            .run("token revocation", || self.revocations.revoke(&key, until))
            .await
            .map_err(AuthError::dependency)
    }

    async fn revoke_identity(&self, user_id: &UserId) -> Result<(), AuthError> {
        let key = RevocationKey::Identity(*user_id);
        let until = Utc::now()
            .checked_add_signed(self.tokens.refresh_ttl())
            .ok_or_else(|| AuthError::Internal("Identity revocation window out of range".into()))?;
        self.guard
            .run("identity revocation", || self.revocations.revoke(&key, until))
            .await
            .map_err(AuthError::dependency)?;

        // 截止点已经生效，索引只影响列表展示
        if let Err(e) = self
            .guard
            .run("session index clear", || self.sessions.forget_user(user_id))
            .await
        {
            warn!(user_id = %user_id, error = %e, "Failed to clear session index");
        }
        Ok(())
    }

    /// 关闭会话槽；索引清理失败只记录日志
    async fn close_session(&self, user_id: &UserId, session_id: &SessionId) -> Result<(), AuthError> {
        self.guard
            .run("session close", || self.sessions.close(session_id))
            .await
            .map_err(AuthError::dependency)?;
        self.forget_session(user_id, session_id).await;
        Ok(())
    }

    async fn forget_session(&self, user_id: &UserId, session_id: &SessionId) {
        if let Err(e) = self
            .guard
            .run("session index remove", || self.sessions.untrack(user_id, session_id))
            .await
        {
            warn!(user_id = %user_id, session_id = %session_id, error = %e, "Failed to remove session index entry");
        }
    }

    /// 索引写入失败只记录日志，槽仍然是会话存活的依据
    async fn track_session(&self, user_id: &UserId, info: &SessionInfo) {
        let ttl = self.refresh_ttl();
        if let Err(e) = self
            .guard
            .run("session index write", || self.sessions.track(user_id, info, ttl))
            .await
        {
            warn!(user_id = %user_id, session_id = %info.session_id, error = %e, "Failed to record session in index");
        }
    }

    /// 刷新后更新最近活跃时间并续期索引
    async fn touch_session(&self, user_id: &UserId, session_id: &SessionId, at: DateTime<Utc>) {
        let tracked = match self
            .guard
            .run("session index read", || self.sessions.tracked(user_id))
            .await
        {
            Ok(tracked) => tracked,
            Err(e) => {
                warn!(user_id = %user_id, session_id = %session_id, error = %e, "Failed to read session index");
                return;
            }
        };
        if let Some(mut info) = tracked.into_iter().find(|info| info.session_id == *session_id) {
            info.last_active_at = at;
            self.track_session(user_id, &info).await;
        }
    }

    /// 已提交的写操作之后调用，失败必须上报
    async fn invalidate_user(&self, user_id: &UserId) -> Result<(), AuthError> {
        self.guard
            .run("user cache invalidate", || self.user_cache.invalidate(user_id))
            .await
            .map_err(|e| {
                warn!(user_id = %user_id, error = %e, "Failed to invalidate user cache");
                AuthError::dependency(e)
            })
    }

    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("Password hashing task failed: {}", e)))?
    }

    async fn verify_password(&self, password: &str, stored_hash: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        let stored_hash = stored_hash.to_owned();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &stored_hash))
            .await
            .map_err(|e| AuthError::Internal(format!("Password verification task failed: {}", e)))
    }

    async fn dummy_verify(&self, password: &str) {
        let hasher = self.hasher.clone();
        let password = password.to_owned();
        let _ = tokio::task::spawn_blocking(move || hasher.dummy_verify(&password)).await;
    }
}

//! 凭证哈希（argon2id，PHC 字符串编码）

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use carelink_config::PasswordConfig;

use crate::error::AuthError;

/// 用于 `dummy_verify` 的固定口令，只为消耗同等计算量
const DUMMY_PASSWORD: &str = "carelink-dummy-password";

/// 凭证哈希器
///
/// 每次 `hash` 都生成新盐；`verify` 使用存储哈希中记录的盐和参数重新推导，
/// 比较由 `password-hash` 以常量时间完成。
#[derive(Clone)]
pub struct CredentialHasher {
    params: Params,
    min_length: usize,
    max_length: usize,
    dummy_hash: String,
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("m_cost", &self.params.m_cost())
            .field("t_cost", &self.params.t_cost())
            .field("p_cost", &self.params.p_cost())
            .finish()
    }
}

impl CredentialHasher {
    pub fn new(config: &PasswordConfig) -> Result<Self, AuthError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| AuthError::Internal(format!("Invalid argon2 parameters: {}", e)))?;

        let mut hasher = Self {
            params,
            min_length: config.min_length,
            max_length: config.max_length,
            dummy_hash: String::new(),
        };
        hasher.dummy_hash = hasher.hash(DUMMY_PASSWORD)?;
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// 生成 PHC 格式的哈希
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    /// 校验口令；存储哈希无法解析时返回 false
    pub fn verify(&self, password: &str, stored_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            return false;
        };
        self.argon2()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    /// 对固定哈希做一次校验，让不存在的账号与错误密码耗时一致
    pub fn dummy_verify(&self, password: &str) {
        let _ = self.verify(password, &self.dummy_hash);
    }

    /// 长度策略（按字符计）
    pub fn validate_policy(&self, password: &str) -> Result<(), AuthError> {
        let len = password.chars().count();
        if len < self.min_length {
            return Err(AuthError::Validation(format!(
                "Password must be at least {} characters",
                self.min_length
            )));
        }
        if len > self.max_length {
            return Err(AuthError::Validation(format!(
                "Password must be at most {} characters",
                self.max_length
            )));
        }
        Ok(())
    }
}

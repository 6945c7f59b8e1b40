//! IAM Session Service Library
//!
//! 认证与会话生命周期：
//! - `domain`: 用户记录、登录标识、密码哈希、主存储端口
//! - `infrastructure`: 撤销存储、用户记录缓存、会话槽与会话索引，以及进程内实现
//! - `application`: `SessionManager`，注册 / 登录 / 校验 / 刷新 / 登出 / 设备会话等流程

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use application::{
    DependencyGuard, ProfileUpdate, RegisterRequest, SessionManager, SessionSettings, TokenPair,
    UserContext, bearer_token,
};
pub use domain::{DeviceInfo, SessionInfo};
pub use error::{AuthError, AuthErrorKind};

//! carelink-auth-core - 认证核心库
//!
//! 令牌编解码：签发、校验、不校验签名的诊断解码

mod claims;
mod token;

pub use claims::*;
pub use token::*;

//! carelink-bootstrap - 统一服务启动骨架
//!
//! 配置加载、tracing 初始化以及 Redis / Token 服务等共享资源的装配

mod infrastructure;
mod runtime;

pub use infrastructure::*;
pub use runtime::*;

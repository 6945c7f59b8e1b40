//! IAM Session Service

use std::sync::Arc;

use carelink_bootstrap::{Infrastructure, RuntimeConfig, init_runtime, load_config};
use iam_session::SessionManager;
use iam_session::infrastructure::InMemoryUserRepository;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载配置
    let config = load_config(&RuntimeConfig::default())?;

    // 初始化运行时
    let _metrics = init_runtime(&config)?;

    info!("Starting IAM Session Service");

    let infra = Infrastructure::from_config(config).await?;
    if !infra.check_redis_connection().await {
        warn!("Redis is not reachable yet, revocation checks will fail closed");
    }

    // 进程内主存储，重启后用户数据不保留
    let manager = SessionManager::from_infrastructure(&infra, Arc::new(InMemoryUserRepository::new()))?;
    info!(
        access_ttl_secs = infra.config().jwt.expires_in,
        refresh_ttl_secs = infra.config().jwt.refresh_expires_in,
        "Session manager ready"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down IAM Session Service");
    drop(manager);

    Ok(())
}

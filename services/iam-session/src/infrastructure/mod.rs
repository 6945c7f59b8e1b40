//! 基础设施层
//!
//! 撤销存储、用户记录缓存和会话槽都建立在同一个 `CachePort` 之上，
//! 各自维护独立的键空间与 TTL 规则。

pub mod memory_cache;
pub mod memory_user_repository;
pub mod revocation_store;
pub mod session_registry;
pub mod user_cache;

pub use memory_cache::MemoryCache;
pub use memory_user_repository::InMemoryUserRepository;
pub use revocation_store::{CacheRevocationStore, RevocationKey, RevocationStore};
pub use session_registry::{SessionRegistry, SessionSlot};
pub use user_cache::{CacheUserRecordCache, UserRecordCache};

//! 应用层

mod dto;
mod guard;
mod session_manager;

pub use dto::*;
pub use guard::*;
pub use session_manager::*;

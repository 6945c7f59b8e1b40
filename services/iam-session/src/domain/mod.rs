//! 领域层

pub mod email;
pub mod identifier;
pub mod password;
pub mod repository;
pub mod session;
pub mod user;
pub mod username;

pub use email::*;
pub use identifier::*;
pub use password::*;
pub use repository::*;
pub use session::*;
pub use user::*;
pub use username::*;

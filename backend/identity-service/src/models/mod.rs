/// Data models for identity and authentication
pub mod auth;
pub mod session;
pub mod user;

pub use auth::{AuthenticatedUser, LoginRequest, LogoutRequest, RefreshRequest, TokenPair};
pub use session::{ClientInfo, RefreshSession};
pub use user::{Role, UnknownRole, User};

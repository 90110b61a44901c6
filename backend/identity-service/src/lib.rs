/// Identity Service Library
///
/// Issues and revokes credentials for Nova sessions: short-lived RS256 access
/// tokens plus rotating, device-bound refresh tokens backed by Redis.
///
/// ## Modules
///
/// - `bootstrap`: Builds an `AuthFlow` from `Settings`
/// - `cache`: Refresh-session store (Redis, in-memory)
/// - `config`: Service configuration
/// - `context`: Per-request deadline and cancellation
/// - `db`: User directory
/// - `error`: Error types
/// - `models`: Data models and request DTOs
/// - `security`: JWT, fingerprints, password hashing
/// - `services`: Login / refresh / logout flow
/// - `telemetry`: Tracing subscriber setup
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod models;
pub mod security;
pub mod services;
pub mod telemetry;

// Re-export commonly used types
pub use context::RequestContext;
pub use error::{IdentityError, Result};
pub use services::AuthFlow;

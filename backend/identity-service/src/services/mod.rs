/// Service layer for identity-service
///
/// - Auth flow: login, refresh-token rotation, logout and logout-all-devices
pub mod auth_flow;

pub use auth_flow::AuthFlow;

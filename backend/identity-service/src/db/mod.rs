/// User directory access for identity service
pub mod users;

pub use users::{InMemoryUserDirectory, UserDirectory};

pub mod auth;
pub mod error;
pub mod models;
pub mod openapi;
pub mod repo;
pub mod routes;
pub mod security;

// Re-export commonly used items for tests / external users
pub use auth::{Auth, SessionStore};
pub use routes::{config, AppState};
pub use security::SecurityHeaders;

pub mod auth;
pub mod error;
pub mod models;
pub mod openapi;
pub mod repo;
pub mod routes;
pub mod settings; // env-driven Config
pub mod tree; // flat comment rows -> reply forest

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};

// Frameworks layer: configuration and the axum server bootstrap.

pub mod config;
pub mod server;

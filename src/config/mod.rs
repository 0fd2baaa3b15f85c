/// Database configuration and connection management
pub mod database;

/// Project seed loading from config.toml
pub mod projects;

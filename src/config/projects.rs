//! Project seed configuration loading from config.toml
//!
//! The project metadata store is owned elsewhere; for a standalone deployment the
//! projects, their bills of quantities, catalogues and supervisors are described in
//! `config.toml` and seeded on startup.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Projects to seed
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

/// Configuration for a single project
#[derive(Debug, Deserialize, Clone)]
pub struct ProjectConfig {
    /// Unique project name
    pub name: String,
    /// Bill of quantities
    #[serde(default)]
    pub scope: Vec<ScopeItemConfig>,
    /// Material catalogue
    #[serde(default)]
    pub materials: Vec<String>,
    /// Tool catalogue
    #[serde(default)]
    pub tools: Vec<String>,
    /// Actor ids of the supervisors attached to the project
    #[serde(default)]
    pub supervisors: Vec<String>,
}

/// One bill-of-quantities line
#[derive(Debug, Deserialize, Clone)]
pub struct ScopeItemConfig {
    /// Work line description
    pub label: String,
    /// Required quantity
    pub total: i64,
}

/// Loads project configuration from a TOML file
///
/// # Errors
/// Returns [`Error::Config`] if the file cannot be read or is not valid TOML for [`Config`].
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path_ref.display()),
    })
}

/// Loads project configuration from the default location (./config.toml)
pub fn load_default_config() -> Result<Config> {
    load_config("config.toml")
}

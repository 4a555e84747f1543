//! Declarative layering policies driven by TOML configuration.
//!
//! # Architecture
//!
//! ```text
//! TOML text
//!   ↓ serde (DTO layer)
//! config_dto types
//!   ↓ validate + convert (loader)
//! PolicyBuilder
//!   ↓ build()
//! Policy
//! ```

use std::path::Path;

use crate::policy::Policy;

pub mod config_dto;
pub mod loader;

/// Errors from reading TOML and loading a policy.
#[derive(Debug, thiserror::Error)]
pub enum LoadPolicyError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// TOML deserialization failed.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Field validation or policy validation failed.
    #[error("{0}")]
    Load(#[from] loader::LoadError),
}

/// Parses TOML content and builds the policy it describes.
///
/// # Errors
///
/// Returns an error if TOML parsing or validation fails.
pub fn load_policy_from_toml(content: &str) -> Result<Policy, LoadPolicyError> {
    let dto: config_dto::PolicyConfigDto = toml::from_str(content)?;
    Ok(loader::load(dto)?)
}

/// Reads a TOML policy file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or validated.
pub fn load_policy_from_file(path: &Path) -> Result<Policy, LoadPolicyError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadPolicyError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_policy_from_toml(&content)
}

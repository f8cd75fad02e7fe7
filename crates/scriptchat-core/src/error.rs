//! Core domain errors.

use thiserror::Error;

/// Core domain errors for ScriptChat.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Script not found.
    #[error("Script not found: {0}")]
    ScriptNotFound(String),

    /// Role not found within a script.
    #[error("Role '{role}' not found in script '{script}'")]
    RoleNotFound { script: String, role: String },

    /// A script with this id is already stored.
    #[error("Duplicate script id: {0}")]
    DuplicateScript(String),

    /// Two roles of one script share an id.
    #[error("Duplicate role id '{role}' in script '{script}'")]
    DuplicateRole { script: String, role: String },

    /// Reading or writing the store record failed.
    #[error("Persistence error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

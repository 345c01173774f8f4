//! Error types for the Promptweave domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Promptweave operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Module store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Manifest errors ---
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    // --- Rule errors ---
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    // --- Analytics errors ---
    #[error("Analytics error: {0}")]
    Analytics(#[from] AnalyticsError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Failed to read module {name}: {reason}")]
    Io { name: String, reason: String },

    /// Raised instead of degrading to empty text when strict mode is on.
    #[error("Missing module in strict mode: {0}")]
    Strict(String),
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest at {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse manifest: {0}")]
    Parse(String),

    #[error("Manifest validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Error)]
pub enum RuleError {
    #[error("Rule parse error in `{expr}`: {reason}")]
    Parse { expr: String, reason: String },

    #[error("Unknown rule variable `{name}` in `{expr}`")]
    UnknownVariable { expr: String, name: String },
}

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Invalid outcome for {key}: {reason}")]
    InvalidOutcome { key: String, reason: String },

    #[error("Analytics backend unavailable: {0}")]
    Unavailable(String),
}

//! Error types for the BaZhi Guru application.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The remote call a consultation pipeline failure belongs to.
///
/// The interactive flow runs `TranslateQuestion` → `Consult` →
/// `TranslateReply` strictly in order; the profile-generation flow runs
/// `Analysis` and then `Extraction`. The same tags drive progress
/// reporting, so a surfaced failure names the exact stage that aborted
/// the exchange.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    /// EN→ZH translation of the user's question.
    TranslateQuestion,
    /// The guru consultation itself, in Chinese.
    Consult,
    /// ZH→EN translation of the guru's answer.
    TranslateReply,
    /// Full native BaZhi analysis (profile generation, call D).
    Analysis,
    /// Structured elemental extraction over the analysis (call E).
    Extraction,
}

/// A shared error type for the entire application.
///
/// This provides typed, structured error variants with automatic conversion
/// from common error types via the `From` trait. The first four variants are
/// the user-facing taxonomy: auth failures stay inline at the auth surface,
/// store failures surface as a generic save/load message but are always
/// logged, pipeline failures abort the whole exchange, and parse failures
/// abort profile generation without persisting anything.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum GuruError {
    /// Authentication failure (sign-in, sign-up, reset)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Store failure (document database layer)
    #[error("Store error during {operation}: {message}")]
    Store {
        operation: &'static str,
        message: String,
    },

    /// Remote consultation/translation failure, tagged with its stage
    #[error("Pipeline error at {stage}: {message}")]
    Pipeline {
        stage: PipelineStage,
        message: String,
    },

    /// Structured-extraction output could not be understood
    #[error("Parse error: {0}")]
    Parse(String),

    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GuruError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates an Auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Creates a Store error tagged with the failing operation
    pub fn store(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Store {
            operation,
            message: message.into(),
        }
    }

    /// Creates a Pipeline error tagged with the failing stage
    pub fn pipeline(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self::Pipeline {
            stage,
            message: message.into(),
        }
    }

    /// Creates a Parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is an Auth error
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Check if this is a Store error
    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    /// Check if this is a Pipeline error
    pub fn is_pipeline(&self) -> bool {
        matches!(self, Self::Pipeline { .. })
    }

    /// Check if this is a Parse error
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }

    /// Check if this is a NotFound error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error indicates a file/entity was not found.
    ///
    /// Returns true for:
    /// - `NotFound` errors
    /// - `Io` errors with "not found" in the message
    ///
    /// This helper centralizes the logic for detecting "not found" conditions
    /// across different error types; absent documents and absent sessions are
    /// handled as empty results, not failures.
    pub fn is_not_found_or_missing(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Io { message } => message.to_lowercase().contains("not found"),
            _ => false,
        }
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for GuruError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for GuruError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for GuruError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for GuruError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// Conversion from String (for error messages)
impl From<String> for GuruError {
    fn from(err: String) -> Self {
        Self::Internal(err)
    }
}

/// A type alias for `Result<T, GuruError>`.
pub type Result<T> = std::result::Result<T, GuruError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_helpers_produce_matching_variants() {
        assert!(GuruError::auth("bad password").is_auth());
        assert!(GuruError::store("save_profile", "disk full").is_store());
        assert!(
            GuruError::pipeline(PipelineStage::Consult, "relay 500").is_pipeline()
        );
        assert!(GuruError::parse("no JSON object").is_parse());
        assert!(GuruError::not_found("session", "chat9").is_not_found());
    }

    #[test]
    fn pipeline_stage_renders_kebab_case() {
        assert_eq!(PipelineStage::TranslateQuestion.to_string(), "translate-question");
        assert_eq!(PipelineStage::Consult.to_string(), "consult");
        assert_eq!(PipelineStage::TranslateReply.to_string(), "translate-reply");
    }

    #[test]
    fn missing_detection_covers_io_messages() {
        let io = GuruError::io("document not found: users/u1");
        assert!(io.is_not_found_or_missing());

        let other = GuruError::io("permission denied");
        assert!(!other.is_not_found_or_missing());
    }

    #[test]
    fn io_error_converts_with_kind() {
        let err: GuruError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, GuruError::Io { .. }));
        assert!(err.to_string().contains("NotFound"));
    }
}

//! Error types for the email triage service.

/// Errors returned by the classification pipeline.
///
/// Configuration problems stop the binary before the pipeline exists, and
/// attachment problems degrade to placeholders, so only the engine can fail
/// a classification.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

/// Configuration-related errors, reported at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Inference engine errors.
///
/// Only `Unavailable` raised during warm-up ever reaches a caller of
/// `EmailClassifier::classify`; everything else is degraded to defaults.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model {model} unavailable: {reason}")]
    Unavailable { model: String, reason: String },

    #[error("Inference failed on {model}: {reason}")]
    InferenceFailed { model: String, reason: String },
}

/// Errors while pulling a subject/body out of an attached file.
///
/// Handled inside the source extractor, which substitutes a placeholder body.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Attachment {name} could not be read")]
    Unreadable { name: String },

    #[error("Attachment {name} is not valid UTF-8 text")]
    NotUtf8 { name: String },
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;

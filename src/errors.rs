use thiserror::Error;

pub type Result<T> = std::result::Result<T, CursorError>;

/// Failures raised by the cursor engine and its transports.
///
/// Variants are split into two families. Transient ones (`ConnectionLost`,
/// `CursorNotFound`, `CursorFailure`) are expected to succeed against a fresh
/// stream and are eligible for bounded retry. Everything else is permanent and
/// propagates on first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("cursor not found on server: {0}")]
    CursorNotFound(String),

    #[error("cursor failure (code {code}): {message}")]
    CursorFailure { code: i32, message: String },

    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("cursor option '{0}' cannot change after iteration started; reset first")]
    AlreadyIterating(String),

    #[error("invalid read target: {0}")]
    InvalidReadTarget(String),

    #[error("stream source was dropped")]
    SourceDropped,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("BSON: {0}")]
    Bson(String),

    #[error("Serde JSON: {0}")]
    Json(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CursorError {
    /// Default retry classification.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost(_) | Self::CursorNotFound(_) | Self::CursorFailure { .. }
        )
    }
}

impl From<std::io::Error> for CursorError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<bson::error::Error> for CursorError {
    fn from(e: bson::error::Error) -> Self {
        Self::Bson(e.to_string())
    }
}

impl From<serde_json::Error> for CursorError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

impl From<toml::de::Error> for CursorError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

use thiserror::Error;

/// Errors that can occur while answering code-analysis queries.
#[derive(Error, Debug)]
pub enum FdepError {
    /// A malformed or unsupported condition, argument or operator.
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("unsupported entity type: {kind}")]
    UnsupportedEntity { kind: String },

    /// A named module, function or type does not exist.
    #[error("{entity} not found: {name}")]
    NotFound { entity: String, name: String },

    /// The database handle is missing or the connection broke.
    #[error("database unavailable: {message}")]
    Unavailable { message: String },

    #[error("database error: {message} (operation: {operation})")]
    Database { message: String, operation: String },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl FdepError {
    /// Shorthand for a `Validation` error.
    pub fn validation(message: impl Into<String>) -> Self {
        FdepError::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for a `NotFound` error.
    pub fn not_found(entity: &str, name: impl Into<String>) -> Self {
        FdepError::NotFound {
            entity: entity.to_string(),
            name: name.into(),
        }
    }

    /// Returns `true` for failures of the store itself, which warrant a
    /// session recovery before the error is surfaced.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            FdepError::Unavailable { .. } | FdepError::Database { .. } | FdepError::Sqlite(_)
        )
    }
}

/// Convenience alias for results using `FdepError`.
pub type Result<T> = std::result::Result<T, FdepError>;

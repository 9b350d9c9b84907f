// ⚠️ Engine errors
// Library code returns these; binaries wrap them in anyhow with context.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// A single import row that could not become a canonical product.
///
/// Not an `EngineError`: rejections are expected during a batch and are
/// collected into the import report instead of aborting it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct RowRejection {
    pub reason: String,
}

impl RowRejection {
    pub fn new(reason: impl Into<String>) -> Self {
        RowRejection {
            reason: reason.into(),
        }
    }

    pub fn missing_required_fields() -> Self {
        RowRejection::new("missing required fields")
    }
}

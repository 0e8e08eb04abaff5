use thiserror::Error;

/// Crate-wide error type. Variants map to the four error kinds of the engine's
/// error taxonomy: configuration, structural-invalid, numeric-non-finite, and
/// serialization-mismatch.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("structural invalid genome: {0}")]
    StructuralInvalid(String),

    #[error("numeric non-finite: {0}")]
    NonFinite(String),

    #[error("serialization mismatch: expected parameter length {expected}, found {found}")]
    SerializationMismatch { expected: usize, found: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown cell type tag: {0}")]
    UnknownCellType(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

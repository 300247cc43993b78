// Error types for the indexing engine

use std::path::PathBuf;

/// Errors produced by the engine. Each variant maps to a policy from the
/// error-handling table: boundary rejection, skip-and-log, refuse-to-open,
/// or partial-commit-and-exit.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("path escapes repository root: {0}")]
    PathEscapesRoot(PathBuf),

    #[error("file too large ({size} bytes, limit {limit}): {path}")]
    FileTooLarge { path: String, size: u64, limit: u64 },

    #[error("parse failure in {path}: {message}")]
    ParseFailure { path: String, message: String },

    #[error("index store at {0} is corrupt; delete .pui/ and run `pui index` to rebuild")]
    StoreCorrupt(PathBuf),

    #[error("index schema is v{found} but this build supports up to v{supported}; upgrade pui or rebuild the index")]
    SchemaTooNew { found: i64, supported: i64 },

    #[error("token budget {budget} too small: mandatory sections need {required}")]
    BudgetTooSmall { budget: usize, required: usize },

    #[error("symbol not found: {query}")]
    SymbolNotFound {
        query: String,
        suggestions: Vec<String>,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Process exit code for this error. 2 (usage) is produced by clap
    /// before the engine runs; everything else maps here.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::SchemaTooNew { .. } => 4,
            EngineError::Cancelled => 5,
            EngineError::InvalidArgument(_) | EngineError::PathEscapesRoot(_) => 2,
            _ => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

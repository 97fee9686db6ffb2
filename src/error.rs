use thiserror::Error;

/// The single error type threaded through the storage and transaction core.
///
/// Kinds follow the tagged-not-exceptional model: callers match on the variant to decide
/// whether a failure is recoverable (`Constraint`, `Transaction`) or fatal to the engine
/// (`Corruption`, which flips the engine into read-only mode until a clean reopen).
#[derive(Error, Debug)]
pub enum DecentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("page overflow: data exceeds page capacity")]
    PageOverflow,

    #[error("page not found: page_id={0}")]
    PageNotFound(u64),

    #[error("invalid page format")]
    InvalidPage,

    #[error("invalid page size: {0} (must be a power of two in 512..=65536)")]
    InvalidPageSize(usize),

    #[error("data corruption: {0}")]
    Corruption(String),

    #[error("WAL error: {0}")]
    Wal(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("engine is busy: {0}")]
    Busy(String),

    #[error("database is in read-only mode after corruption")]
    ReadOnly,

    #[error("schema error: {0}")]
    Schema(String),

    #[error("unique constraint violation: {0}")]
    UniqueViolation(String),

    #[error("foreign key constraint violation: {0}")]
    ForeignKeyViolation(String),

    #[error("not-null constraint violation: column {0}")]
    NotNullViolation(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("sql error: {0}")]
    Sql(String),

    #[error("out of space: {0}")]
    OutOfSpace(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DecentError {
    /// Whether this error should flip the engine into read-only mode.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecentError::Corruption(_))
    }
}

pub type Result<T> = std::result::Result<T, DecentError>;

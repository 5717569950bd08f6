//! Error types for pgshape

use std::fmt;
use thiserror::Error;

/// Result type alias for pgshape operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Driver-reported failure details.
///
/// The engine stores this instead of propagating it when a statement fails to
/// prepare or execute; see [`Engine::error_info`](crate::Engine::error_info).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Five-character SQLSTATE code (`"00000"` means success).
    pub sqlstate: String,
    /// Primary driver message.
    pub message: String,
    /// Optional driver detail line.
    pub detail: Option<String>,
}

impl ErrorInfo {
    pub fn new(sqlstate: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sqlstate: sqlstate.into(),
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Build from a `tokio_postgres` error, keeping the server SQLSTATE when present.
    pub fn from_pg(err: &tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db) => Self {
                sqlstate: db.code().code().to_string(),
                message: db.message().to_string(),
                detail: db.detail().map(str::to_string),
            },
            // HY000: general driver error without a server code.
            None => Self::new("HY000", err.to_string()),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.sqlstate, self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

/// Error types for statement compilation and execution
#[derive(Debug, Error)]
pub enum OrmError {
    /// Malformed table or column name
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Structurally invalid specification (e.g. `table.*` inside a join)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Statement preparation failed
    #[error("Prepare error: {0}")]
    Prepare(ErrorInfo),

    /// Statement execution failed
    #[error("Execute error: {0}")]
    Execute(ErrorInfo),

    /// The transactional callback failed; the transaction was rolled back
    #[error("Transaction rolled back: {0}")]
    Transaction(#[source] Box<OrmError>),

    /// The transactional callback asked for a rollback
    #[error("Transaction aborted by callback")]
    TransactionAborted,

    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Raw driver error outside the prepare/execute path
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create an invalid identifier error
    pub fn invalid_identifier(message: impl Into<String>) -> Self {
        Self::InvalidIdentifier(message.into())
    }

    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Check if this error was raised while compiling a statement
    pub fn is_compile_error(&self) -> bool {
        matches!(self, Self::InvalidIdentifier(_) | Self::InvalidArgument(_))
    }

    /// Check if this error came out of a transactional callback
    pub fn is_transaction_error(&self) -> bool {
        matches!(self, Self::Transaction(_) | Self::TransactionAborted)
    }

    /// Driver error details, if this error carries them
    pub fn error_info(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Prepare(info) | Self::Execute(info) => Some(info),
            _ => None,
        }
    }
}

//! # Database Error Types
//!
//! Error types for store operations, and the engine-wide error that joins
//! them with domain errors.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          CoreError (orbia-core)            │
//! │       │                                   │                             │
//! │       ▼                                   │                             │
//! │  DbError ← categorized                    │                             │
//! │       │                                   │                             │
//! │       └──────────────┬────────────────────┘                             │
//! │                      ▼                                                  │
//! │  EngineError { Domain | Storage }  → code(), is_retryable()            │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │  Request layer maps code() to a user-facing message                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use orbia_core::{CoreError, ValidationError};
use thiserror::Error;

// SQLITE_BUSY, SQLITE_LOCKED and SQLITE_BUSY_SNAPSHOT primary/extended codes.
const SQLITE_BUSY_CODES: &[&str] = &["5", "6", "517", "261", "262"];

/// Store operation errors.
///
/// These wrap sqlx errors and add the categorization callers act on.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Inserting a duplicate code for the tenant
    /// - Duplicate sale number (counter corrupted by hand)
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint violation (negative stock, broken totals).
    #[error("Constraint violation: {message}")]
    CheckViolation { message: String },

    /// Another writer holds the database lock.
    ///
    /// Safe to retry the whole operation.
    #[error("Database busy: {0}")]
    Busy(String),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored value could not be decoded (e.g. a malformed rate).
    #[error("Corrupt stored value in {field}: {reason}")]
    Corrupt { field: String, reason: String },

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn corrupt(field: impl Into<String>, reason: impl Into<String>) -> Self {
        DbError::Corrupt {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// True for lock contention and pool timeouts.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Busy(_) | DbError::PoolExhausted)
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → busy code / constraint message
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                let busy = db_err
                    .code()
                    .is_some_and(|code| SQLITE_BUSY_CODES.contains(&&*code));

                if busy || msg.contains("database is locked") {
                    DbError::Busy(msg.to_string())
                } else if let Some(field) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    DbError::UniqueViolation {
                        field: field.to_string(),
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("CHECK constraint failed") {
                    DbError::CheckViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Engine Error
// =============================================================================

/// Error returned by every public engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// User-actionable business failure.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// Store failure.
    #[error(transparent)]
    Storage(#[from] DbError),
}

impl EngineError {
    /// Stable SCREAMING_SNAKE code for the request layer.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Domain(e) => e.code(),
            EngineError::Storage(DbError::NotFound { .. }) => "NOT_FOUND",
            EngineError::Storage(DbError::UniqueViolation { .. }) => "DUPLICATE",
            EngineError::Storage(DbError::Busy(_)) | EngineError::Storage(DbError::PoolExhausted) => {
                "STORE_BUSY"
            }
            EngineError::Storage(_) => "STORE_ERROR",
        }
    }

    /// Whether re-running the whole operation can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Domain(_) => false,
            EngineError::Storage(e) => e.is_retryable(),
        }
    }

    /// The domain error, if this is one.
    pub fn as_domain(&self) -> Option<&CoreError> {
        match self {
            EngineError::Domain(e) => Some(e),
            EngineError::Storage(_) => None,
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Domain(CoreError::Validation(err))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Storage(DbError::from(err))
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Unit Tests
// =============================================================================

//! # Ledger Error Types
//!
//! What callers of the engine and the sale manager see.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      LedgerError Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Caller input   │  │  Business rule  │  │  Contention             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Validation     │  │  Insufficient-  │  │  Conflict               │ │
//! │  │  NotFound       │  │    Stock        │  │  (retried internally,   │ │
//! │  │                 │  │  AlreadyCancel- │  │   surfaced when the     │ │
//! │  │                 │  │    led / -Comp. │  │   budget runs out)      │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Storage(DbError) - anything else the store reported            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these leave partial state behind: every operation is one
//! transaction and an error drops it uncommitted.

use tally_core::{CoreError, ValidationError};
use tally_db::DbError;
use thiserror::Error;

/// Result type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors returned by [`crate::InventoryEngine`] and [`crate::SaleManager`].
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed input; nothing was attempted.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A subtracting movement would take stock below zero.
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// The sale was already cancelled.
    #[error("Sale {sale_code} is already cancelled")]
    AlreadyCancelled { sale_code: String },

    /// The sale was already completed.
    #[error("Sale {sale_code} is already completed")]
    AlreadyCompleted { sale_code: String },

    /// A concurrent writer changed the data first.
    ///
    /// ## When This Occurs
    /// - Compare-and-set on stock or sale status matched no row
    /// - SQLite stayed locked past `busy_timeout`
    /// - No free sale code found
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other store failure.
    #[error("Storage error: {0}")]
    Storage(DbError),
}

impl LedgerError {
    /// Creates a NotFound error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// True if redoing the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Conflict(_))
    }
}

impl From<CoreError> for LedgerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InsufficientStock {
                sku,
                available,
                requested,
            } => LedgerError::InsufficientStock {
                sku,
                available,
                requested,
            },
            CoreError::AlreadyCancelled { sale_code } => LedgerError::AlreadyCancelled { sale_code },
            CoreError::AlreadyCompleted { sale_code } => LedgerError::AlreadyCompleted { sale_code },
            CoreError::Validation(e) => LedgerError::Validation(e),
        }
    }
}

/// ## Error Mapping
/// ```text
/// DbError::NotFound          → LedgerError::NotFound
/// DbError::Busy / StaleWrite → LedgerError::Conflict
/// Other                      → LedgerError::Storage
/// ```
impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => LedgerError::NotFound { entity, id },
            e if e.is_contention() => LedgerError::Conflict(e.to_string()),
            e => LedgerError::Storage(e),
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Failures while loading [`crate::LedgerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contention_becomes_conflict() {
        let err: LedgerError = DbError::Busy("database is locked".into()).into();
        assert!(err.is_retryable());

        let err: LedgerError = DbError::stale("Product", "p1").into();
        assert!(matches!(err, LedgerError::Conflict(_)));

        let err: LedgerError = DbError::not_found("Sale", "s1").into();
        assert!(matches!(err, LedgerError::NotFound { .. }));
        assert!(!err.is_retryable());

        let err: LedgerError = DbError::PoolExhausted.into();
        assert!(matches!(err, LedgerError::Storage(_)));
    }

    #[test]
    fn test_core_error_mapping() {
        let err: LedgerError = CoreError::InsufficientStock {
            sku: "A".into(),
            available: 1,
            requested: 2,
        }
        .into();
        assert_eq!(err.to_string(), "Insufficient stock for A: available 1, requested 2");

        let err: LedgerError = CoreError::Validation(ValidationError::required("actor")).into();
        assert!(matches!(err, LedgerError::Validation(_)));
    }
}

//! Error types for the circulation registry

use thiserror::Error;

use crate::models::item::ItemKey;

/// Stable error codes for the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    DbFailure = 3,
    NoSuchRecord = 5,
    ItemNotAvailable = 7,
    Duplicate = 8,
    BadValue = 18,
    HasOpenLoans = 21,
    StaleWrite = 22,
    LedgerInconsistent = 23,
}

/// Business rule that blocked a mutation, with enough context for a user-facing message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    #[error("{entity} {key} already exists")]
    DuplicateKey { entity: &'static str, key: String },

    #[error(
        "item {key}: total copies cannot drop to {requested_total} while {on_loan} are on loan ({available} available)"
    )]
    StockBelowLoaned {
        key: ItemKey,
        requested_total: i32,
        on_loan: i32,
        available: i32,
    },

    #[error("{entity} {key} has {open_loans} open loan(s)")]
    OpenLoans {
        entity: &'static str,
        key: String,
        open_loans: usize,
    },

    #[error("item {key}: all {total_copies} copies are already on the shelf")]
    StockCeiling { key: ItemKey, total_copies: i32 },
}

/// Main error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(#[from] Conflict),

    #[error("Stale write: {entity} {key} was modified by someone else, reload it and retry")]
    StaleWrite { entity: &'static str, key: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store failure: {0}")]
    Store(String),

    /// The loan ledger write failed after the catalog change in the same unit of
    /// work; the whole unit of work was rolled back, nothing was committed.
    #[error("Loan ledger write failed for [{}], nothing committed: {source}", join_keys(.item_keys))]
    LedgerWrite {
        item_keys: Vec<ItemKey>,
        #[source]
        source: Box<AppError>,
    },
}

fn join_keys(keys: &[ItemKey]) -> String {
    keys.iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::NotFound(_) => ErrorCode::NoSuchRecord,
            AppError::Conflict(Conflict::DuplicateKey { .. }) => ErrorCode::Duplicate,
            AppError::Conflict(Conflict::OpenLoans { .. }) => ErrorCode::HasOpenLoans,
            AppError::Conflict(Conflict::StockBelowLoaned { .. }) => ErrorCode::BadValue,
            AppError::Conflict(Conflict::StockCeiling { .. }) => ErrorCode::ItemNotAvailable,
            AppError::StaleWrite { .. } => ErrorCode::StaleWrite,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Store(_) => ErrorCode::Failure,
            AppError::LedgerWrite { .. } => ErrorCode::LedgerInconsistent,
        }
    }

    /// Infrastructure failure rather than a business rule
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::Store(_) | AppError::LedgerWrite { .. }
        )
    }

    pub fn stale(entity: &'static str, key: impl ToString) -> Self {
        AppError::StaleWrite {
            entity,
            key: key.to_string(),
        }
    }
}

/// Result type alias for registry operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_write_message_names_items() {
        let err = AppError::LedgerWrite {
            item_keys: vec![ItemKey::new("A"), ItemKey::new("B")],
            source: Box::new(AppError::Store("connection reset".to_string())),
        };
        let message = err.to_string();
        assert!(message.contains("[A, B]"));
        assert!(message.contains("nothing committed"));
        assert!(message.contains("connection reset"));
        assert_eq!(err.code(), ErrorCode::LedgerInconsistent);
        assert!(err.is_store_failure());
    }

    #[test]
    fn test_conflict_carries_stock_context() {
        let err: AppError = Conflict::StockBelowLoaned {
            key: ItemKey::new("A"),
            requested_total: 1,
            on_loan: 2,
            available: 3,
        }
        .into();
        assert!(err.to_string().contains("2 are on loan (3 available)"));
        assert!(!err.is_store_failure());
    }
}

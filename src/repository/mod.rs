//! Repository layer: store contracts and their PostgreSQL implementation.
//!
//! Every operation of the core runs inside one [`UnitOfWork`] obtained from a
//! [`Registry`]. Dropping a unit of work without committing rolls it back.

pub mod accounts;
pub mod items;
pub mod loans;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Transaction};

use crate::{
    error::{AppError, AppResult, Conflict},
    models::{
        account::{Account, AccountId, AccountPatch},
        item::{CatalogItem, CatalogPatch, ItemKey},
        loan::LoanRecord,
        version::VersionToken,
    },
};

/// Row lock taken when reading a record the unit of work is about to act on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    /// Serializes against every other writer of the row
    Exclusive,
}

impl RowLock {
    fn clause(self) -> &'static str {
        match self {
            RowLock::Exclusive => "FOR UPDATE",
        }
    }
}

/// Keyed store of catalog items
#[async_trait]
pub trait CatalogStore: Send {
    async fn find_item(&mut self, key: &ItemKey) -> AppResult<Option<CatalogItem>>;

    /// Read an item and lock its row until the unit of work ends
    async fn lock_item(&mut self, key: &ItemKey, lock: RowLock) -> AppResult<Option<CatalogItem>>;

    /// Batch read; unknown keys are skipped
    async fn find_items(&mut self, keys: &[ItemKey]) -> AppResult<Vec<CatalogItem>>;

    async fn list_items(&mut self) -> AppResult<Vec<CatalogItem>>;

    /// Insert a new item; `false` when the key is taken
    async fn insert_item(&mut self, item: &CatalogItem) -> AppResult<bool>;

    /// Conditional decrement: takes one copy only while `available_copies > 0`
    async fn take_copy(&mut self, key: &ItemKey) -> AppResult<Option<CatalogItem>>;

    /// Conditional increment: puts one copy back only while `available_copies < total_copies`
    async fn restore_copy(&mut self, key: &ItemKey) -> AppResult<Option<CatalogItem>>;

    async fn delete_item(&mut self, key: &ItemKey) -> AppResult<u64>;
}

/// Append-only ledger of loans
#[async_trait]
pub trait LoanLedgerStore: Send {
    async fn open_loans_for_account(&mut self, account_id: &AccountId) -> AppResult<Vec<LoanRecord>>;

    async fn open_loans_for_item(&mut self, key: &ItemKey) -> AppResult<Vec<LoanRecord>>;

    /// Batch insert. Fails when any (account, item) pair already has an open loan.
    async fn insert_loans(&mut self, loans: &[LoanRecord]) -> AppResult<()>;

    /// Close the open loan of `item_key` held by `account_id`, if there is one
    async fn close_loan(
        &mut self,
        account_id: &AccountId,
        item_key: &ItemKey,
        returned_at: chrono::DateTime<chrono::Utc>,
    ) -> AppResult<Option<LoanRecord>>;

    /// Number of open loans per item
    async fn open_loan_counts(&mut self) -> AppResult<HashMap<ItemKey, i64>>;
}

/// Keyed store of accounts
#[async_trait]
pub trait AccountStore: Send {
    async fn find_account(&mut self, id: &AccountId) -> AppResult<Option<Account>>;

    async fn lock_account(&mut self, id: &AccountId, lock: RowLock) -> AppResult<Option<Account>>;

    async fn list_accounts(&mut self) -> AppResult<Vec<Account>>;

    /// Insert a new account; `false` when the id or email is taken
    async fn insert_account(&mut self, account: &Account) -> AppResult<bool>;

    async fn delete_account(&mut self, id: &AccountId) -> AppResult<u64>;
}

/// Compare-and-swap on a versioned record.
///
/// Applies `mutation` to the record at `key` only while its stored version
/// equals `expected`, and reports how many rows were touched.
#[async_trait]
pub trait ConditionalUpdate<K: Sync, M: Sync>: Send {
    async fn update_if_current(&mut self, key: &K, mutation: &M, expected: VersionToken) -> AppResult<u64>;
}

/// One transaction spanning catalog, ledger and accounts
#[async_trait]
pub trait UnitOfWork:
    CatalogStore
    + LoanLedgerStore
    + AccountStore
    + ConditionalUpdate<ItemKey, CatalogPatch>
    + ConditionalUpdate<AccountId, AccountPatch>
    + Send
{
    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Source of units of work
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Registry: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>>;
}

/// PostgreSQL registry holding the connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Registry for Repository {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// Unit of work backed by one database transaction
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        let PgUnitOfWork { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}

/// Turn a unique violation into a duplicate-key conflict, pass anything else through
pub(crate) fn unique_conflict(err: sqlx::Error, entity: &'static str, key: impl ToString) -> AppError {
    match err.as_database_error() {
        Some(db) if db.is_unique_violation() => Conflict::DuplicateKey {
            entity,
            key: key.to_string(),
        }
        .into(),
        _ => AppError::Database(err),
    }
}

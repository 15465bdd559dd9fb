//! In-process registry.
//!
//! Units of work are serialized: each one holds the store's async mutex from
//! `begin` until it is committed or dropped, and works on a private copy of the
//! tables that replaces the shared copy on commit. Failures can be injected at
//! chosen points to exercise the error paths of the core.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    AccountStore, CatalogStore, ConditionalUpdate, LoanLedgerStore, Registry, RowLock, UnitOfWork,
};
use crate::{
    error::{AppError, AppResult, Conflict},
    models::{
        account::{Account, AccountId, AccountPatch},
        item::{CatalogItem, CatalogPatch, ItemKey},
        loan::LoanRecord,
        version::VersionToken,
    },
};

/// Store call that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Begin,
    TakeCopy,
    InsertLoans,
    CloseLoan,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    items: BTreeMap<ItemKey, CatalogItem>,
    loans: Vec<LoanRecord>,
    accounts: BTreeMap<AccountId, Account>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Tables,
    fail_points: HashSet<FailPoint>,
    contended: HashSet<ItemKey>,
    loan_batches: Vec<usize>,
}

#[derive(Clone, Default)]
pub struct MemoryRegistry {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call at `point` fail with a store error
    pub async fn fail_at(&self, point: FailPoint) {
        self.shared.lock().await.fail_points.insert(point);
    }

    pub async fn clear_failures(&self) {
        self.shared.lock().await.fail_points.clear();
    }

    /// Make `take_copy` on `key` find no stock, as when a concurrent checkout
    /// took the last copy after this unit of work read the row
    pub async fn contend(&self, key: ItemKey) {
        self.shared.lock().await.contended.insert(key);
    }

    /// Size of every batch handed to `insert_loans`, committed or not
    pub async fn loan_batches(&self) -> Vec<usize> {
        self.shared.lock().await.loan_batches.clone()
    }

    /// Committed state of an item
    pub async fn item(&self, key: &ItemKey) -> Option<CatalogItem> {
        self.shared.lock().await.tables.items.get(key).cloned()
    }

    /// Committed loan ledger, open and closed
    pub async fn loans(&self) -> Vec<LoanRecord> {
        self.shared.lock().await.tables.loans.clone()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let guard = self.shared.clone().lock_owned().await;
        if guard.fail_points.contains(&FailPoint::Begin) {
            return Err(injected(FailPoint::Begin));
        }
        let work = guard.tables.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, work }))
    }
}

fn injected(point: FailPoint) -> AppError {
    AppError::Store(format!("injected failure at {:?}", point))
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<Shared>,
    work: Tables,
}

impl MemoryUnitOfWork {
    fn trip(&self, point: FailPoint) -> AppResult<()> {
        if self.guard.fail_points.contains(&point) {
            return Err(injected(point));
        }
        Ok(())
    }

    fn open_loans(&self) -> impl Iterator<Item = &LoanRecord> {
        self.work.loans.iter().filter(|l| l.is_open())
    }

    fn email_taken(&self, email: &str, except: Option<&AccountId>) -> bool {
        self.work
            .accounts
            .values()
            .any(|a| a.email == email && Some(&a.id) != except)
    }
}

#[async_trait]
impl CatalogStore for MemoryUnitOfWork {
    async fn find_item(&mut self, key: &ItemKey) -> AppResult<Option<CatalogItem>> {
        Ok(self.work.items.get(key).cloned())
    }

    async fn lock_item(&mut self, key: &ItemKey, _lock: RowLock) -> AppResult<Option<CatalogItem>> {
        Ok(self.work.items.get(key).cloned())
    }

    async fn find_items(&mut self, keys: &[ItemKey]) -> AppResult<Vec<CatalogItem>> {
        Ok(keys
            .iter()
            .filter_map(|k| self.work.items.get(k).cloned())
            .collect())
    }

    async fn list_items(&mut self) -> AppResult<Vec<CatalogItem>> {
        let mut items: Vec<CatalogItem> = self.work.items.values().cloned().collect();
        items.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.key.cmp(&b.key)));
        Ok(items)
    }

    async fn insert_item(&mut self, item: &CatalogItem) -> AppResult<bool> {
        if self.work.items.contains_key(&item.key) {
            return Ok(false);
        }
        self.work.items.insert(item.key.clone(), item.clone());
        Ok(true)
    }

    async fn take_copy(&mut self, key: &ItemKey) -> AppResult<Option<CatalogItem>> {
        self.trip(FailPoint::TakeCopy)?;
        if self.guard.contended.contains(key) {
            return Ok(None);
        }
        Ok(match self.work.items.get_mut(key) {
            Some(item) if item.available_copies > 0 => {
                item.available_copies -= 1;
                Some(item.clone())
            }
            _ => None,
        })
    }

    async fn restore_copy(&mut self, key: &ItemKey) -> AppResult<Option<CatalogItem>> {
        Ok(match self.work.items.get_mut(key) {
            Some(item) if item.available_copies < item.total_copies => {
                item.available_copies += 1;
                Some(item.clone())
            }
            _ => None,
        })
    }

    async fn delete_item(&mut self, key: &ItemKey) -> AppResult<u64> {
        Ok(self.work.items.remove(key).map_or(0, |_| 1))
    }
}

#[async_trait]
impl LoanLedgerStore for MemoryUnitOfWork {
    async fn open_loans_for_account(&mut self, account_id: &AccountId) -> AppResult<Vec<LoanRecord>> {
        let mut loans: Vec<LoanRecord> = self
            .open_loans()
            .filter(|l| &l.account_id == account_id)
            .cloned()
            .collect();
        loans.sort_by(|a, b| {
            a.borrowed_at
                .cmp(&b.borrowed_at)
                .then_with(|| a.item_key.cmp(&b.item_key))
        });
        Ok(loans)
    }

    async fn open_loans_for_item(&mut self, key: &ItemKey) -> AppResult<Vec<LoanRecord>> {
        Ok(self
            .open_loans()
            .filter(|l| &l.item_key == key)
            .cloned()
            .collect())
    }

    async fn insert_loans(&mut self, loans: &[LoanRecord]) -> AppResult<()> {
        self.guard.loan_batches.push(loans.len());
        self.trip(FailPoint::InsertLoans)?;
        let mut held: HashSet<(AccountId, ItemKey)> = self
            .open_loans()
            .map(|l| (l.account_id, l.item_key.clone()))
            .collect();
        for loan in loans.iter().filter(|l| l.is_open()) {
            if !held.insert((loan.account_id, loan.item_key.clone())) {
                return Err(Conflict::DuplicateKey {
                    entity: "open loan",
                    key: loan.account_id.to_string(),
                }
                .into());
            }
        }
        self.work.loans.extend_from_slice(loans);
        Ok(())
    }

    async fn close_loan(
        &mut self,
        account_id: &AccountId,
        item_key: &ItemKey,
        returned_at: DateTime<Utc>,
    ) -> AppResult<Option<LoanRecord>> {
        self.trip(FailPoint::CloseLoan)?;
        let loan = self
            .work
            .loans
            .iter_mut()
            .find(|l| l.is_open() && &l.account_id == account_id && &l.item_key == item_key);
        Ok(loan.map(|l| {
            l.returned_at = Some(returned_at);
            l.clone()
        }))
    }

    async fn open_loan_counts(&mut self) -> AppResult<HashMap<ItemKey, i64>> {
        let mut counts = HashMap::new();
        for loan in self.open_loans() {
            *counts.entry(loan.item_key.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[async_trait]
impl AccountStore for MemoryUnitOfWork {
    async fn find_account(&mut self, id: &AccountId) -> AppResult<Option<Account>> {
        Ok(self.work.accounts.get(id).cloned())
    }

    async fn lock_account(&mut self, id: &AccountId, _lock: RowLock) -> AppResult<Option<Account>> {
        Ok(self.work.accounts.get(id).cloned())
    }

    async fn list_accounts(&mut self) -> AppResult<Vec<Account>> {
        let mut accounts: Vec<Account> = self.work.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.username.cmp(&b.username).then_with(|| a.id.cmp(&b.id)));
        Ok(accounts)
    }

    async fn insert_account(&mut self, account: &Account) -> AppResult<bool> {
        if self.work.accounts.contains_key(&account.id) || self.email_taken(&account.email, None) {
            return Ok(false);
        }
        self.work.accounts.insert(account.id, account.clone());
        Ok(true)
    }

    async fn delete_account(&mut self, id: &AccountId) -> AppResult<u64> {
        Ok(self.work.accounts.remove(id).map_or(0, |_| 1))
    }
}

#[async_trait]
impl ConditionalUpdate<ItemKey, CatalogPatch> for MemoryUnitOfWork {
    async fn update_if_current(
        &mut self,
        key: &ItemKey,
        patch: &CatalogPatch,
        expected: VersionToken,
    ) -> AppResult<u64> {
        match self.work.items.get_mut(key) {
            Some(item) if item.version() == expected => {
                patch.apply_to(item);
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

#[async_trait]
impl ConditionalUpdate<AccountId, AccountPatch> for MemoryUnitOfWork {
    async fn update_if_current(
        &mut self,
        id: &AccountId,
        patch: &AccountPatch,
        expected: VersionToken,
    ) -> AppResult<u64> {
        let current = self
            .work
            .accounts
            .get(id)
            .is_some_and(|a| a.version() == expected);
        if !current {
            return Ok(0);
        }
        if self.email_taken(&patch.email, Some(id)) {
            return Err(Conflict::DuplicateKey {
                entity: "account email",
                key: patch.email.clone(),
            }
            .into());
        }
        if let Some(account) = self.work.accounts.get_mut(id) {
            patch.apply_to(account);
        }
        Ok(1)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.trip(FailPoint::Commit)?;
        let MemoryUnitOfWork { mut guard, work } = *self;
        guard.tables = work;
        Ok(())
    }
}

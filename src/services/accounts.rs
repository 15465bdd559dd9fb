//! Account management service

use std::sync::Arc;

use super::guard::OptimisticGuard;
use crate::{
    clock::Clock,
    error::{AppError, AppResult, Conflict},
    models::{
        account::{Account, AccountDraft, AccountId, AccountUpdate},
        version::VersionToken,
    },
    repository::{AccountStore, LoanLedgerStore, Registry, RowLock, UnitOfWork},
};

/// Same guard pattern as the catalog, applied to accounts
#[derive(Clone)]
pub struct AccountGuard {
    registry: Arc<dyn Registry>,
    clock: Arc<dyn Clock>,
}

impl AccountGuard {
    pub fn new(registry: Arc<dyn Registry>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    pub async fn get(&self, id: AccountId) -> AppResult<Account> {
        let mut uow = self.registry.begin().await?;
        uow.find_account(&id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {} not found", id)))
    }

    pub async fn list(&self) -> AppResult<Vec<Account>> {
        let mut uow = self.registry.begin().await?;
        uow.list_accounts().await
    }

    /// Register an account under a fresh id
    pub async fn create(&self, draft: AccountDraft) -> AppResult<Account> {
        let account = draft.into_account(AccountId::generate(), self.clock.now());
        let mut uow = self.registry.begin().await?;

        if !uow.insert_account(&account).await? {
            tracing::warn!("Account create: email {} already registered", account.email);
            return Err(Conflict::DuplicateKey {
                entity: "account",
                key: account.email.clone(),
            }
            .into());
        }

        uow.commit().await?;
        tracing::info!("Account create: {} ({})", account.id, account.username);
        Ok(account)
    }

    /// Update profile fields if nobody changed the account since `expected` was read
    pub async fn update(&self, update: AccountUpdate, expected: VersionToken) -> AppResult<Account> {
        let mut uow = self.registry.begin().await?;
        let id = update.id;

        uow.lock_account(&id, RowLock::Exclusive)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {} not found", id)))?;

        let patch = update.into_patch(expected.successor(self.clock.now()));
        let rows = OptimisticGuard::apply(&mut *uow, &id, &patch, expected).await?;
        OptimisticGuard::ensure_applied(rows, "account", &id)?;

        let updated = uow
            .find_account(&id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {} not found", id)))?;
        uow.commit().await?;

        tracing::info!("Account update: {}", id);
        Ok(updated)
    }

    /// Delete an account that has no open loan
    pub async fn delete(&self, id: AccountId) -> AppResult<()> {
        let mut uow = self.registry.begin().await?;

        uow.lock_account(&id, RowLock::Exclusive)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {} not found", id)))?;

        let open_loans = uow.open_loans_for_account(&id).await?.len();
        if open_loans > 0 {
            tracing::warn!("Account delete: {} still has {} open loan(s)", id, open_loans);
            return Err(Conflict::OpenLoans {
                entity: "account",
                key: id.to_string(),
                open_loans,
            }
            .into());
        }

        uow.delete_account(&id).await?;
        uow.commit().await?;
        tracing::info!("Account delete: {}", id);
        Ok(())
    }
}

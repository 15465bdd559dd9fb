//! Checkout and return of catalog items

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexSet;

use crate::{
    clock::Clock,
    error::{AppError, AppResult, Conflict},
    models::{
        account::AccountId,
        cart::Cart,
        item::{CatalogItem, ItemKey},
        loan::{
            CheckoutOutcome, LoanRecord, OpenLoan, RejectedItem, RejectionReason, ReturnReceipt,
            StockDiscrepancy,
        },
    },
    repository::{AccountStore, CatalogStore, LoanLedgerStore, Registry, RowLock, UnitOfWork},
};

/// Orchestrates checkout and return across the catalog and the loan ledger.
///
/// Holds no state between calls: every operation reads what it needs inside
/// its own unit of work.
#[derive(Clone)]
pub struct LendingCoordinator {
    registry: Arc<dyn Registry>,
    clock: Arc<dyn Clock>,
}

impl LendingCoordinator {
    pub fn new(registry: Arc<dyn Registry>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    /// Lend every eligible item in `item_keys` to `account_id`.
    ///
    /// Items already on loan to the account, out of stock, or unknown are
    /// returned in `rejected` while the others are still lent. Catalog
    /// decrements and new loans commit together or not at all.
    pub async fn checkout(
        &self,
        account_id: AccountId,
        item_keys: &IndexSet<ItemKey>,
    ) -> AppResult<CheckoutOutcome> {
        if item_keys.is_empty() {
            return Err(AppError::Validation(
                "checkout needs at least one item key".to_string(),
            ));
        }

        let mut uow = self.registry.begin().await?;

        // Exclusive: checkouts by the same account run one at a time, so the
        // open-loan read below sees loans committed by the previous one
        uow.lock_account(&account_id, RowLock::Exclusive)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {} not found", account_id)))?;

        let keys: Vec<ItemKey> = item_keys.iter().cloned().collect();
        let items: HashMap<ItemKey, CatalogItem> = uow
            .find_items(&keys)
            .await?
            .into_iter()
            .map(|item| (item.key.clone(), item))
            .collect();
        let borrowed: HashSet<ItemKey> = uow
            .open_loans_for_account(&account_id)
            .await?
            .into_iter()
            .map(|loan| loan.item_key)
            .collect();

        let mut rejected = Vec::new();
        let mut eligible = Vec::new();
        for key in item_keys {
            let item = items.get(key);
            let reason = if borrowed.contains(key) {
                Some(RejectionReason::AlreadyBorrowed)
            } else {
                match item {
                    None => Some(RejectionReason::UnknownItem),
                    Some(item) if !item.has_stock() => Some(RejectionReason::OutOfStock),
                    Some(_) => None,
                }
            };

            match reason {
                Some(reason) => {
                    tracing::info!(
                        "Checkout: item {} not lent to account {} ({})",
                        key,
                        account_id,
                        reason
                    );
                    rejected.push(RejectedItem {
                        key: key.clone(),
                        reason,
                        item: item.cloned(),
                    });
                }
                None => eligible.push(key),
            }
        }

        let now = self.clock.now();
        let mut loans = Vec::with_capacity(eligible.len());
        for key in eligible {
            match uow.take_copy(key).await? {
                Some(_) => loans.push(LoanRecord::open(account_id, key.clone(), now)),
                None => {
                    // Another checkout took the last copy since we read the row
                    tracing::info!("Checkout: last copy of item {} taken concurrently", key);
                    rejected.push(RejectedItem {
                        key: key.clone(),
                        reason: RejectionReason::OutOfStock,
                        item: items.get(key).cloned(),
                    });
                }
            }
        }
        rejected.sort_by_key(|r| item_keys.get_index_of(&r.key));

        if let Err(e) = uow.insert_loans(&loans).await {
            let item_keys: Vec<ItemKey> = loans.iter().map(|l| l.item_key.clone()).collect();
            tracing::error!(
                "Checkout: loan ledger write failed for account {}, rolled back: {}",
                account_id,
                e
            );
            return Err(AppError::LedgerWrite {
                item_keys,
                source: Box::new(e),
            });
        }

        uow.commit().await?;

        tracing::info!(
            "Checkout: account {} borrowed {} item(s), {} rejected",
            account_id,
            loans.len(),
            rejected.len()
        );

        Ok(CheckoutOutcome { loans, rejected })
    }

    /// Check out the cart's contents and empty it once the loans are committed
    pub async fn checkout_cart(&self, account_id: AccountId, cart: &mut Cart) -> AppResult<CheckoutOutcome> {
        let outcome = self.checkout(account_id, cart.keys()).await?;
        cart.clear();
        Ok(outcome)
    }

    /// Put a copy back on the shelf and close the account's open loan for it
    pub async fn return_item(&self, account_id: AccountId, item_key: &ItemKey) -> AppResult<ReturnReceipt> {
        let mut uow = self.registry.begin().await?;

        let item = uow
            .find_item(item_key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", item_key)))?;

        let restored = match uow.restore_copy(item_key).await? {
            Some(restored) => restored,
            None => {
                tracing::warn!("Return: every copy of item {} is already on the shelf", item_key);
                return Err(Conflict::StockCeiling {
                    key: item_key.clone(),
                    total_copies: item.total_copies,
                }
                .into());
            }
        };

        let loan = match uow.close_loan(&account_id, item_key, self.clock.now()).await {
            Ok(Some(loan)) => loan,
            Ok(None) => {
                // Dropping the unit of work discards the increment
                tracing::info!(
                    "Return: account {} has no open loan for item {}",
                    account_id,
                    item_key
                );
                return Err(AppError::NotFound(format!(
                    "No open loan of item {} for account {}",
                    item_key, account_id
                )));
            }
            Err(e) => {
                tracing::error!(
                    "Return: closing loan of item {} for account {} failed, rolled back: {}",
                    item_key,
                    account_id,
                    e
                );
                return Err(AppError::LedgerWrite {
                    item_keys: vec![item_key.clone()],
                    source: Box::new(e),
                });
            }
        };

        uow.commit().await?;

        tracing::info!("Return: account {} returned item {}", account_id, item_key);

        Ok(ReturnReceipt {
            loan,
            item: restored,
        })
    }

    /// Open loans of an account joined with their catalog entries
    pub async fn open_loans(&self, account_id: AccountId) -> AppResult<Vec<OpenLoan>> {
        let mut uow = self.registry.begin().await?;

        uow.find_account(&account_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {} not found", account_id)))?;

        let loans = uow.open_loans_for_account(&account_id).await?;
        if loans.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<ItemKey> = loans.iter().map(|l| l.item_key.clone()).collect();
        let items: HashMap<ItemKey, CatalogItem> = uow
            .find_items(&keys)
            .await?
            .into_iter()
            .map(|item| (item.key.clone(), item))
            .collect();

        let mut result = Vec::with_capacity(loans.len());
        for loan in &loans {
            match items.get(&loan.item_key) {
                Some(item) => result.push(OpenLoan::new(loan, item)),
                None => tracing::warn!(
                    "Open loan {} references missing item {}",
                    loan.id,
                    loan.item_key
                ),
            }
        }

        Ok(result)
    }

    /// Compare every item's loaned-out count with the ledger's open loans
    pub async fn audit_stock(&self) -> AppResult<Vec<StockDiscrepancy>> {
        let mut uow = self.registry.begin().await?;
        let items = uow.list_items().await?;
        let mut counts = uow.open_loan_counts().await?;

        let mut discrepancies = Vec::new();
        for item in items {
            let open_loans = counts.remove(&item.key).unwrap_or(0);
            let expected_open_loans = i64::from(item.on_loan());
            if open_loans != expected_open_loans {
                discrepancies.push(StockDiscrepancy {
                    key: item.key,
                    expected_open_loans,
                    open_loans,
                    item_present: true,
                });
            }
        }

        let mut orphans: Vec<StockDiscrepancy> = counts
            .into_iter()
            .map(|(key, open_loans)| StockDiscrepancy {
                key,
                expected_open_loans: 0,
                open_loans,
                item_present: false,
            })
            .collect();
        orphans.sort_by(|a, b| a.key.cmp(&b.key));
        discrepancies.extend(orphans);

        for discrepancy in &discrepancies {
            tracing::warn!("Stock audit: {}", discrepancy);
        }

        Ok(discrepancies)
    }
}

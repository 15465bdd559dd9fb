//! Loan (borrow) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::account::AccountId;
use super::item::{CatalogItem, ItemKey};

/// Loan ledger entry; open while `returned_at` is `None`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LoanRecord {
    pub id: Uuid,
    pub item_key: ItemKey,
    pub account_id: AccountId,
    pub borrowed_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl LoanRecord {
    /// New open loan with a fresh id
    pub fn open(account_id: AccountId, item_key: ItemKey, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_key,
            account_id,
            borrowed_at: now,
            returned_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.returned_at.is_none()
    }
}

/// Open loan joined with its catalog entry, for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenLoan {
    pub loan_id: Uuid,
    pub item_key: ItemKey,
    pub title: String,
    pub creator: String,
    pub distributor: String,
    pub borrowed_at: DateTime<Utc>,
}

impl OpenLoan {
    pub fn new(loan: &LoanRecord, item: &CatalogItem) -> Self {
        Self {
            loan_id: loan.id,
            item_key: loan.item_key.clone(),
            title: item.title.clone(),
            creator: item.creator.clone(),
            distributor: item.distributor.clone(),
            borrowed_at: loan.borrowed_at,
        }
    }
}

/// Why a requested item was left out of a checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The account already holds an open loan for this item
    AlreadyBorrowed,
    /// No copy left on the shelf
    OutOfStock,
    /// The key is not in the catalog
    UnknownItem,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RejectionReason::AlreadyBorrowed => "already borrowed",
            RejectionReason::OutOfStock => "out of stock",
            RejectionReason::UnknownItem => "unknown item",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedItem {
    pub key: ItemKey,
    pub reason: RejectionReason,
    /// Catalog snapshot seen by the checkout, when the item exists
    pub item: Option<CatalogItem>,
}

/// Result of a checkout: loans created and items turned down
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutOutcome {
    pub loans: Vec<LoanRecord>,
    pub rejected: Vec<RejectedItem>,
}

impl CheckoutOutcome {
    /// Every requested item was lent
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }

    pub fn rejected_keys(&self) -> Vec<ItemKey> {
        self.rejected.iter().map(|r| r.key.clone()).collect()
    }
}

/// Closed loan and the catalog row after its copy went back on the shelf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnReceipt {
    pub loan: LoanRecord,
    pub item: CatalogItem,
}

/// Catalog row whose counters disagree with the loan ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDiscrepancy {
    pub key: ItemKey,
    /// `total_copies - available_copies`, or 0 when the item is gone from the catalog
    pub expected_open_loans: i64,
    pub open_loans: i64,
    pub item_present: bool,
}

impl std::fmt::Display for StockDiscrepancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.item_present {
            write!(
                f,
                "item {}: counters say {} copies out, ledger has {} open loans",
                self.key, self.expected_open_loans, self.open_loans
            )
        } else {
            write!(
                f,
                "item {}: missing from catalog with {} open loans",
                self.key, self.open_loans
            )
        }
    }
}

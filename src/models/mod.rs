//! Data models for the circulation registry

pub mod account;
pub mod cart;
pub mod item;
pub mod loan;
pub mod version;

// Re-export commonly used types
pub use account::{Account, AccountDraft, AccountId, AccountPatch, AccountUpdate};
pub use cart::Cart;
pub use item::{CatalogDraft, CatalogItem, CatalogPatch, ItemKey};
pub use loan::{
    CheckoutOutcome, LoanRecord, OpenLoan, RejectedItem, RejectionReason, ReturnReceipt,
    StockDiscrepancy,
};
pub use version::VersionToken;

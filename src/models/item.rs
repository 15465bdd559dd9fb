//! Catalog item model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::version::VersionToken;

/// Immutable catalog key (ISBN or any other identifier chosen by the catalog)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct ItemKey(String);

impl ItemKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ItemKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ItemKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Catalog item as stored, including its stock counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CatalogItem {
    #[sqlx(rename = "item_key")]
    pub key: ItemKey,
    pub title: String,
    pub creator: String,
    pub distributor: String,
    pub note: Option<String>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
}

impl CatalogItem {
    pub fn version(&self) -> VersionToken {
        VersionToken::new(self.last_modified_at)
    }

    /// Copies currently out on loan
    pub fn on_loan(&self) -> i32 {
        self.total_copies - self.available_copies
    }

    pub fn has_stock(&self) -> bool {
        self.available_copies > 0
    }
}

/// Item fields supplied by an administrator when registering or editing an item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDraft {
    pub key: ItemKey,
    pub title: String,
    pub creator: String,
    pub distributor: String,
    #[serde(default)]
    pub note: Option<String>,
    pub total_copies: i32,
}

impl CatalogDraft {
    /// Build a freshly registered item: every copy is on the shelf
    pub fn into_item(self, now: DateTime<Utc>) -> CatalogItem {
        let now = VersionToken::new(now).as_datetime();
        CatalogItem {
            key: self.key,
            title: self.title,
            creator: self.creator,
            distributor: self.distributor,
            note: self.note,
            total_copies: self.total_copies,
            available_copies: self.total_copies,
            created_at: now,
            last_modified_at: now,
        }
    }

    /// Mutation applied by a guarded update, stamped with the next version
    pub fn into_patch(self, modified_at: VersionToken) -> CatalogPatch {
        CatalogPatch {
            title: self.title,
            creator: self.creator,
            distributor: self.distributor,
            note: self.note,
            total_copies: self.total_copies,
            modified_at,
        }
    }
}

/// Descriptive and stock changes applied to an existing item.
///
/// Stores apply `total_copies` as a delta on the live row:
/// `available += new_total - old_total`, so copies on loan stay on loan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogPatch {
    pub title: String,
    pub creator: String,
    pub distributor: String,
    pub note: Option<String>,
    pub total_copies: i32,
    pub modified_at: VersionToken,
}

impl CatalogPatch {
    /// Apply the patch to an in-memory row
    pub fn apply_to(&self, item: &mut CatalogItem) {
        item.available_copies += self.total_copies - item.total_copies;
        item.total_copies = self.total_copies;
        item.title = self.title.clone();
        item.creator = self.creator.clone();
        item.distributor = self.distributor.clone();
        item.note = self.note.clone();
        item.last_modified_at = self.modified_at.as_datetime();
    }
}

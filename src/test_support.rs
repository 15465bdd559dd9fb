//! Fixtures shared by the unit tests

use std::sync::Arc;

use indexmap::IndexSet;

use crate::{
    clock::SystemClock,
    models::{
        account::{AccountDraft, AccountId},
        item::{CatalogDraft, CatalogItem, ItemKey},
    },
    repository::{memory::MemoryRegistry, CatalogStore, Registry, UnitOfWork},
    services::Services,
};

pub fn keys(keys: &[&str]) -> IndexSet<ItemKey> {
    keys.iter().map(|k| ItemKey::new(*k)).collect()
}

pub fn draft(key: &str, total: i32) -> CatalogDraft {
    CatalogDraft {
        key: ItemKey::new(key),
        title: format!("Title {}", key),
        creator: "Creator".to_string(),
        distributor: "Distributor".to_string(),
        note: None,
        total_copies: total,
    }
}

pub fn account_draft(username: &str) -> AccountDraft {
    AccountDraft {
        username: username.to_string(),
        email: format!("{}@example.org", username),
        is_admin: false,
        password_hash: "$2a$10$hash".to_string(),
    }
}

/// In-memory registry with the services wired on top of it
pub struct TestRegistry {
    pub registry: MemoryRegistry,
    pub services: Services,
}

impl TestRegistry {
    pub async fn new() -> Self {
        let registry = MemoryRegistry::new();
        let services = Services::new(Arc::new(registry.clone()), Arc::new(SystemClock));
        Self { registry, services }
    }

    pub async fn item(&self, key: &str, total: i32) -> CatalogItem {
        self.services
            .catalog
            .create(draft(key, total))
            .await
            .expect("seed item")
    }

    pub async fn account(&self, username: &str) -> AccountId {
        self.services
            .accounts
            .create(account_draft(username))
            .await
            .expect("seed account")
            .id
    }

    /// Committed available copies of an item
    pub async fn stock(&self, key: &str) -> i32 {
        self.registry
            .item(&ItemKey::new(key))
            .await
            .expect("item exists")
            .available_copies
    }

    /// Move the counter without touching the ledger, as a half-applied write would
    pub async fn tamper_stock(&self, key: &str, available: i32) {
        let key = ItemKey::new(key);
        let mut uow = self.registry.begin().await.expect("begin");
        loop {
            let current = uow.find_item(&key).await.unwrap().unwrap().available_copies;
            if current == available {
                break;
            }
            if current < available {
                uow.restore_copy(&key).await.unwrap().expect("below total");
            } else {
                uow.take_copy(&key).await.unwrap().expect("above zero");
            }
        }
        uow.commit().await.expect("commit");
    }
}

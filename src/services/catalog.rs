//! Catalog management service

use std::collections::HashMap;
use std::sync::Arc;

use super::guard::OptimisticGuard;
use crate::{
    clock::Clock,
    error::{AppError, AppResult, Conflict},
    models::{
        cart::Cart,
        item::{CatalogDraft, CatalogItem, ItemKey},
        version::VersionToken,
    },
    repository::{CatalogStore, LoanLedgerStore, Registry, RowLock, UnitOfWork},
};

/// Create, edit and delete catalog items without breaking the stock invariants
#[derive(Clone)]
pub struct CatalogGuard {
    registry: Arc<dyn Registry>,
    clock: Arc<dyn Clock>,
}

impl CatalogGuard {
    pub fn new(registry: Arc<dyn Registry>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    /// Get an item by key
    pub async fn get(&self, key: &ItemKey) -> AppResult<CatalogItem> {
        let mut uow = self.registry.begin().await?;
        uow.find_item(key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", key)))
    }

    /// All items, ordered by title
    pub async fn list(&self) -> AppResult<Vec<CatalogItem>> {
        let mut uow = self.registry.begin().await?;
        uow.list_items().await
    }

    /// Items in a cart, in cart order; keys no longer in the catalog are skipped
    pub async fn cart_items(&self, cart: &Cart) -> AppResult<Vec<CatalogItem>> {
        if cart.is_empty() {
            return Ok(Vec::new());
        }

        let mut uow = self.registry.begin().await?;
        let keys: Vec<ItemKey> = cart.keys().iter().cloned().collect();
        let mut found: HashMap<ItemKey, CatalogItem> = uow
            .find_items(&keys)
            .await?
            .into_iter()
            .map(|item| (item.key.clone(), item))
            .collect();

        Ok(keys.iter().filter_map(|k| found.remove(k)).collect())
    }

    /// Register a new item with every copy available
    pub async fn create(&self, draft: CatalogDraft) -> AppResult<CatalogItem> {
        validate_total(draft.total_copies)?;

        let item = draft.into_item(self.clock.now());
        let mut uow = self.registry.begin().await?;

        if !uow.insert_item(&item).await? {
            tracing::warn!("Catalog create: item {} already exists", item.key);
            return Err(Conflict::DuplicateKey {
                entity: "item",
                key: item.key.to_string(),
            }
            .into());
        }

        uow.commit().await?;
        tracing::info!(
            "Catalog create: item {} registered with {} copies",
            item.key,
            item.total_copies
        );
        Ok(item)
    }

    /// Update an existing item if nobody changed it since `expected` was read.
    ///
    /// The new total may not drop below the copies currently on loan. The bound
    /// is the loaned-out count, not shelf stock: shrinking to exactly the
    /// loaned-out count is allowed and leaves no copy available, and
    /// `available_copies` can never go negative. The loaned-out count is
    /// carried over unchanged.
    pub async fn update(&self, draft: CatalogDraft, expected: VersionToken) -> AppResult<CatalogItem> {
        validate_total(draft.total_copies)?;

        let mut uow = self.registry.begin().await?;
        let key = draft.key.clone();

        let current = uow
            .lock_item(&key, RowLock::Exclusive)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", key)))?;

        if draft.total_copies < current.on_loan() {
            tracing::warn!(
                "Catalog update: item {} total {} below {} copies on loan",
                key,
                draft.total_copies,
                current.on_loan()
            );
            return Err(Conflict::StockBelowLoaned {
                key,
                requested_total: draft.total_copies,
                on_loan: current.on_loan(),
                available: current.available_copies,
            }
            .into());
        }

        let patch = draft.into_patch(expected.successor(self.clock.now()));
        let rows = OptimisticGuard::apply(&mut *uow, &key, &patch, expected).await?;
        OptimisticGuard::ensure_applied(rows, "item", &key)?;

        let updated = uow
            .find_item(&key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", key)))?;
        uow.commit().await?;

        tracing::info!(
            "Catalog update: item {} now {} total / {} available",
            key,
            updated.total_copies,
            updated.available_copies
        );
        Ok(updated)
    }

    /// Delete an item that has no open loan
    pub async fn delete(&self, key: &ItemKey) -> AppResult<()> {
        let mut uow = self.registry.begin().await?;

        // Row lock first: a checkout in flight commits its loan before we count
        uow.lock_item(key, RowLock::Exclusive)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", key)))?;

        let open_loans = uow.open_loans_for_item(key).await?.len();
        if open_loans > 0 {
            tracing::warn!("Catalog delete: item {} has {} open loan(s)", key, open_loans);
            return Err(Conflict::OpenLoans {
                entity: "item",
                key: key.to_string(),
                open_loans,
            }
            .into());
        }

        uow.delete_item(key).await?;
        uow.commit().await?;
        tracing::info!("Catalog delete: item {} removed", key);
        Ok(())
    }
}

fn validate_total(total_copies: i32) -> AppResult<()> {
    if total_copies < 0 {
        return Err(AppError::Validation(format!(
            "total copies must be zero or more, got {}",
            total_copies
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::MockClock,
        repository::memory::MemoryRegistry,
        test_support::{draft, keys, TestRegistry},
    };
    use chrono::{Duration, TimeZone, Utc};
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_create_stamps_both_timestamps_from_clock() {
        let at = Utc.with_ymd_and_hms(2024, 4, 1, 9, 30, 0).unwrap();
        let mut clock = MockClock::new();
        clock.expect_now().return_const(at);
        let catalog = CatalogGuard::new(Arc::new(MemoryRegistry::new()), Arc::new(clock));

        let item = assert_ok!(catalog.create(draft("A", 3)).await);
        assert_eq!(item.created_at, at);
        assert_eq!(item.last_modified_at, at);
        assert_eq!(item.available_copies, 3);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates_and_negative_totals() {
        let t = TestRegistry::new().await;
        t.item("A", 1).await;

        let err = assert_err!(t.services.catalog.create(draft("A", 5)).await);
        assert!(matches!(err, AppError::Conflict(Conflict::DuplicateKey { .. })));
        assert_eq!(t.stock("A").await, 1);

        let err = assert_err!(t.services.catalog.create(draft("B", -1)).await);
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_with_stale_token_changes_nothing() {
        let t = TestRegistry::new().await;
        let item = t.item("A", 2).await;

        let mut first = draft("A", 4);
        first.title = "First editor".to_string();
        assert_ok!(t.services.catalog.update(first, item.version()).await);

        let mut second = draft("A", 9);
        second.title = "Second editor".to_string();
        let err = assert_err!(t.services.catalog.update(second, item.version()).await);
        assert!(matches!(err, AppError::StaleWrite { entity: "item", .. }));

        let stored = assert_ok!(t.services.catalog.get(&ItemKey::new("A")).await);
        assert_eq!(stored.title, "First editor");
        assert_eq!(stored.total_copies, 4);
    }

    #[tokio::test]
    async fn test_update_keeps_loaned_out_count() {
        let t = TestRegistry::new().await;
        let account = t.account("hanako").await;
        let other = t.account("taro").await;
        t.item("A", 5).await;
        assert_ok!(t.services.lending.checkout(account, &keys(&["A"])).await);
        assert_ok!(t.services.lending.checkout(other, &keys(&["A"])).await);

        let current = assert_ok!(t.services.catalog.get(&ItemKey::new("A")).await);
        let updated = assert_ok!(t.services.catalog.update(draft("A", 8), current.version()).await);
        assert_eq!(updated.available_copies, 6);
        assert_eq!(updated.on_loan(), 2);
        assert!(updated.version() > current.version());
    }

    #[tokio::test]
    async fn test_update_below_loaned_out_count_is_a_conflict() {
        let t = TestRegistry::new().await;
        let account = t.account("hanako").await;
        let other = t.account("taro").await;
        t.item("A", 5).await;
        assert_ok!(t.services.lending.checkout(account, &keys(&["A"])).await);
        assert_ok!(t.services.lending.checkout(other, &keys(&["A"])).await);

        let current = assert_ok!(t.services.catalog.get(&ItemKey::new("A")).await);
        let err = assert_err!(t.services.catalog.update(draft("A", 1), current.version()).await);
        match err {
            AppError::Conflict(Conflict::StockBelowLoaned {
                requested_total,
                on_loan,
                available,
                ..
            }) => {
                assert_eq!((requested_total, on_loan, available), (1, 2, 3));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        // Shrinking to exactly the loaned-out count empties the shelf
        let updated = assert_ok!(t.services.catalog.update(draft("A", 2), current.version()).await);
        assert_eq!(updated.total_copies, 2);
        assert_eq!(updated.available_copies, 0);
    }

    #[tokio::test]
    async fn test_update_missing_item_is_not_found() {
        let t = TestRegistry::new().await;
        let token = VersionToken::new(Utc::now() - Duration::minutes(1));
        let err = assert_err!(t.services.catalog.update(draft("ghost", 1), token).await);
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_blocked_by_open_loan() {
        let t = TestRegistry::new().await;
        let account = t.account("hanako").await;
        t.item("A", 1).await;
        assert_ok!(t.services.lending.checkout(account, &keys(&["A"])).await);

        let err = assert_err!(t.services.catalog.delete(&ItemKey::new("A")).await);
        assert!(matches!(
            err,
            AppError::Conflict(Conflict::OpenLoans { open_loans: 1, .. })
        ));

        assert_ok!(t.services.lending.return_item(account, &ItemKey::new("A")).await);
        assert_ok!(t.services.catalog.delete(&ItemKey::new("A")).await);
    }

    #[tokio::test]
    async fn test_create_then_delete_then_get_is_not_found() {
        let t = TestRegistry::new().await;
        t.item("A", 2).await;

        assert_ok!(t.services.catalog.delete(&ItemKey::new("A")).await);
        let err = assert_err!(t.services.catalog.get(&ItemKey::new("A")).await);
        assert!(matches!(err, AppError::NotFound(_)));

        let err = assert_err!(t.services.catalog.delete(&ItemKey::new("A")).await);
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cart_items_follow_cart_order() {
        let t = TestRegistry::new().await;
        t.item("A", 1).await;
        t.item("B", 1).await;

        let cart: Cart = ["B", "gone", "A"].into_iter().map(ItemKey::from).collect();
        let items = assert_ok!(t.services.catalog.cart_items(&cart).await);
        let keys: Vec<&str> = items.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["B", "A"]);

        assert_eq!(assert_ok!(t.services.catalog.list().await).len(), 2);
    }
}

//! Catalog items on PostgreSQL

use async_trait::async_trait;

use super::{CatalogStore, ConditionalUpdate, PgUnitOfWork, RowLock};
use crate::{
    error::AppResult,
    models::{
        item::{CatalogItem, CatalogPatch, ItemKey},
        version::VersionToken,
    },
};

const ITEM_COLUMNS: &str = "item_key, title, creator, distributor, note, \
     total_copies, available_copies, created_at, last_modified_at";

#[async_trait]
impl CatalogStore for PgUnitOfWork {
    async fn find_item(&mut self, key: &ItemKey) -> AppResult<Option<CatalogItem>> {
        let item = sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT {} FROM catalog_items WHERE item_key = $1",
            ITEM_COLUMNS
        ))
        .bind(key.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(item)
    }

    async fn lock_item(&mut self, key: &ItemKey, lock: RowLock) -> AppResult<Option<CatalogItem>> {
        let item = sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT {} FROM catalog_items WHERE item_key = $1 {}",
            ITEM_COLUMNS,
            lock.clause()
        ))
        .bind(key.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(item)
    }

    async fn find_items(&mut self, keys: &[ItemKey]) -> AppResult<Vec<CatalogItem>> {
        let keys: Vec<String> = keys.iter().map(|k| k.as_str().to_string()).collect();
        let items = sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT {} FROM catalog_items WHERE item_key = ANY($1)",
            ITEM_COLUMNS
        ))
        .bind(keys)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(items)
    }

    async fn list_items(&mut self) -> AppResult<Vec<CatalogItem>> {
        let items = sqlx::query_as::<_, CatalogItem>(&format!(
            "SELECT {} FROM catalog_items ORDER BY title, item_key",
            ITEM_COLUMNS
        ))
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(items)
    }

    async fn insert_item(&mut self, item: &CatalogItem) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO catalog_items (
                item_key, title, creator, distributor, note,
                total_copies, available_copies, created_at, last_modified_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (item_key) DO NOTHING
            "#,
        )
        .bind(item.key.as_str())
        .bind(&item.title)
        .bind(&item.creator)
        .bind(&item.distributor)
        .bind(&item.note)
        .bind(item.total_copies)
        .bind(item.available_copies)
        .bind(item.created_at)
        .bind(item.last_modified_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn take_copy(&mut self, key: &ItemKey) -> AppResult<Option<CatalogItem>> {
        let item = sqlx::query_as::<_, CatalogItem>(&format!(
            r#"
            UPDATE catalog_items
            SET available_copies = available_copies - 1
            WHERE item_key = $1 AND available_copies > 0
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(key.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(item)
    }

    async fn restore_copy(&mut self, key: &ItemKey) -> AppResult<Option<CatalogItem>> {
        let item = sqlx::query_as::<_, CatalogItem>(&format!(
            r#"
            UPDATE catalog_items
            SET available_copies = available_copies + 1
            WHERE item_key = $1 AND available_copies < total_copies
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(key.as_str())
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(item)
    }

    async fn delete_item(&mut self, key: &ItemKey) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM catalog_items WHERE item_key = $1")
            .bind(key.as_str())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ConditionalUpdate<ItemKey, CatalogPatch> for PgUnitOfWork {
    async fn update_if_current(
        &mut self,
        key: &ItemKey,
        patch: &CatalogPatch,
        expected: VersionToken,
    ) -> AppResult<u64> {
        // SET expressions see the pre-update row, so the delta uses the old total
        let result = sqlx::query(
            r#"
            UPDATE catalog_items
            SET title = $2,
                creator = $3,
                distributor = $4,
                note = $5,
                available_copies = available_copies + ($6 - total_copies),
                total_copies = $6,
                last_modified_at = $7
            WHERE item_key = $1 AND last_modified_at = $8
            "#,
        )
        .bind(key.as_str())
        .bind(&patch.title)
        .bind(&patch.creator)
        .bind(&patch.distributor)
        .bind(&patch.note)
        .bind(patch.total_copies)
        .bind(patch.modified_at.as_datetime())
        .bind(expected.as_datetime())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }
}

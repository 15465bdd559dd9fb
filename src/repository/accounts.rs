//! Accounts on PostgreSQL

use async_trait::async_trait;

use super::{unique_conflict, AccountStore, ConditionalUpdate, PgUnitOfWork, RowLock};
use crate::{
    error::AppResult,
    models::{
        account::{Account, AccountId, AccountPatch},
        version::VersionToken,
    },
};

const ACCOUNT_COLUMNS: &str = "account_id, username, email, is_admin, password_hash, last_modified_at";

#[async_trait]
impl AccountStore for PgUnitOfWork {
    async fn find_account(&mut self, id: &AccountId) -> AppResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE account_id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(account)
    }

    async fn lock_account(&mut self, id: &AccountId, lock: RowLock) -> AppResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE account_id = $1 {}",
            ACCOUNT_COLUMNS,
            lock.clause()
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(account)
    }

    async fn list_accounts(&mut self) -> AppResult<Vec<Account>> {
        let accounts = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts ORDER BY username, account_id",
            ACCOUNT_COLUMNS
        ))
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(accounts)
    }

    async fn insert_account(&mut self, account: &Account) -> AppResult<bool> {
        // No conflict target: a taken id and a taken email both skip the insert
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (account_id, username, email, is_admin, password_hash, last_modified_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(account.id.as_uuid())
        .bind(&account.username)
        .bind(&account.email)
        .bind(account.is_admin)
        .bind(&account.password_hash)
        .bind(account.last_modified_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_account(&mut self, id: &AccountId) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM accounts WHERE account_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ConditionalUpdate<AccountId, AccountPatch> for PgUnitOfWork {
    async fn update_if_current(
        &mut self,
        id: &AccountId,
        patch: &AccountPatch,
        expected: VersionToken,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET username = $2,
                email = $3,
                is_admin = $4,
                password_hash = COALESCE($5, password_hash),
                last_modified_at = $6
            WHERE account_id = $1 AND last_modified_at = $7
            "#,
        )
        .bind(id.as_uuid())
        .bind(&patch.username)
        .bind(&patch.email)
        .bind(patch.is_admin)
        .bind(&patch.password_hash)
        .bind(patch.modified_at.as_datetime())
        .bind(expected.as_datetime())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| unique_conflict(e, "account email", &patch.email))?;

        Ok(result.rows_affected())
    }
}

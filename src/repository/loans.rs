//! Loan ledger on PostgreSQL

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};

use super::{unique_conflict, LoanLedgerStore, PgUnitOfWork};
use crate::{
    error::AppResult,
    models::{account::AccountId, item::ItemKey, loan::LoanRecord},
};

const LOAN_COLUMNS: &str = "id, item_key, account_id, borrowed_at, returned_at";

#[async_trait]
impl LoanLedgerStore for PgUnitOfWork {
    async fn open_loans_for_account(&mut self, account_id: &AccountId) -> AppResult<Vec<LoanRecord>> {
        let loans = sqlx::query_as::<_, LoanRecord>(&format!(
            r#"
            SELECT {} FROM loans
            WHERE account_id = $1 AND returned_at IS NULL
            ORDER BY borrowed_at, item_key
            "#,
            LOAN_COLUMNS
        ))
        .bind(account_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(loans)
    }

    async fn open_loans_for_item(&mut self, key: &ItemKey) -> AppResult<Vec<LoanRecord>> {
        let loans = sqlx::query_as::<_, LoanRecord>(&format!(
            r#"
            SELECT {} FROM loans
            WHERE item_key = $1 AND returned_at IS NULL
            ORDER BY borrowed_at
            "#,
            LOAN_COLUMNS
        ))
        .bind(key.as_str())
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(loans)
    }

    async fn insert_loans(&mut self, loans: &[LoanRecord]) -> AppResult<()> {
        if loans.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO loans (id, item_key, account_id, borrowed_at, returned_at) ",
        );
        builder.push_values(loans, |mut row, loan| {
            row.push_bind(loan.id)
                .push_bind(loan.item_key.as_str().to_string())
                .push_bind(loan.account_id.as_uuid())
                .push_bind(loan.borrowed_at)
                .push_bind(loan.returned_at);
        });

        builder
            .build()
            .execute(&mut *self.tx)
            .await
            .map_err(|e| unique_conflict(e, "open loan", &loans[0].account_id))?;

        Ok(())
    }

    async fn close_loan(
        &mut self,
        account_id: &AccountId,
        item_key: &ItemKey,
        returned_at: DateTime<Utc>,
    ) -> AppResult<Option<LoanRecord>> {
        let loan = sqlx::query_as::<_, LoanRecord>(&format!(
            r#"
            UPDATE loans SET returned_at = $3
            WHERE account_id = $1 AND item_key = $2 AND returned_at IS NULL
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(account_id.as_uuid())
        .bind(item_key.as_str())
        .bind(returned_at)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(loan)
    }

    async fn open_loan_counts(&mut self) -> AppResult<HashMap<ItemKey, i64>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT item_key, COUNT(*)
            FROM loans
            WHERE returned_at IS NULL
            GROUP BY item_key
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(key, count)| (ItemKey::from(key), count))
            .collect())
    }
}

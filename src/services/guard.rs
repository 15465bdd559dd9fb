//! Optimistic concurrency guard shared by catalog and account edits

use std::fmt::Display;

use crate::{
    error::{AppError, AppResult},
    models::version::VersionToken,
    repository::ConditionalUpdate,
};

/// Compare-and-swap wrapper over any [`ConditionalUpdate`] store.
///
/// The guard does not know which entity family it is protecting: the store
/// decides how the mutation is written, the guard only carries the version
/// predicate and turns "nothing matched" into [`AppError::StaleWrite`].
pub struct OptimisticGuard;

impl OptimisticGuard {
    /// Apply `mutation` to `key` if its stored version is still `expected`.
    /// Returns the rows-affected count reported by the store.
    pub async fn apply<K, M, S>(
        store: &mut S,
        key: &K,
        mutation: &M,
        expected: VersionToken,
    ) -> AppResult<u64>
    where
        S: ConditionalUpdate<K, M> + ?Sized,
        K: Sync,
        M: Sync,
    {
        ConditionalUpdate::<K, M>::update_if_current(store, key, mutation, expected).await
    }

    /// Map a zero rows-affected count to `StaleWrite`
    pub fn ensure_applied(rows: u64, entity: &'static str, key: &impl Display) -> AppResult<()> {
        if rows == 0 {
            tracing::info!("Stale write rejected for {} {}", entity, key);
            return Err(AppError::stale(entity, key));
        }
        Ok(())
    }
}

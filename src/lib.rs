//! Circulation registry
//!
//! Consistency core of a lending library: checkout and return of catalog
//! items, catalog and account administration under optimistic concurrency,
//! over a transactional record store.

pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use services::Services;

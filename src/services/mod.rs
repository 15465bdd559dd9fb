//! Business logic services

pub mod accounts;
pub mod catalog;
pub mod guard;
pub mod lending;

use std::sync::Arc;

use crate::{clock::Clock, repository::Registry};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub lending: lending::LendingCoordinator,
    pub catalog: catalog::CatalogGuard,
    pub accounts: accounts::AccountGuard,
}

impl Services {
    /// Create all services on top of the given registry
    pub fn new(registry: Arc<dyn Registry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            lending: lending::LendingCoordinator::new(registry.clone(), clock.clone()),
            catalog: catalog::CatalogGuard::new(registry.clone(), clock.clone()),
            accounts: accounts::AccountGuard::new(registry, clock),
        }
    }
}

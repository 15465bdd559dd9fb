//! Per-request checkout cart

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use super::item::ItemKey;

/// Ordered, duplicate-free list of item keys a patron wants to borrow.
///
/// Owned by the caller (typically the session layer) and passed explicitly to
/// the lending operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    keys: IndexSet<ItemKey>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key; returns `false` when it was already in the cart
    pub fn add(&mut self, key: ItemKey) -> bool {
        self.keys.insert(key)
    }

    /// Remove a key, keeping the order of the rest
    pub fn remove(&mut self, key: &ItemKey) -> bool {
        self.keys.shift_remove(key)
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn keys(&self) -> &IndexSet<ItemKey> {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<ItemKey> for Cart {
    fn from_iter<I: IntoIterator<Item = ItemKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

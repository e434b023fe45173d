//! Order Ledger
//!
//! Per-item order counts for the current session. Counts are always
//! positive: an item whose count would drop to zero is removed.

pub mod session;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::menu::{Catalog, MenuItem};

pub use session::SessionStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderLedger {
    counts: BTreeMap<String, u32>,
}

/// A ledger entry joined with its catalog item
#[derive(Debug, Clone, Serialize)]
pub struct OrderLine {
    pub item: MenuItem,
    pub count: u32,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one order, creating the entry at 1 if absent.
    pub fn increment(&mut self, item_id: &str) -> u32 {
        let count = self.counts.entry(item_id.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Removes one order. Floors at zero and drops the entry when it gets there;
    /// absent items are left alone.
    pub fn decrement(&mut self, item_id: &str) -> u32 {
        let Some(count) = self.counts.get_mut(item_id) else {
            return 0;
        };

        *count = count.saturating_sub(1);
        let remaining = *count;
        if remaining == 0 {
            self.counts.remove(item_id);
        }
        remaining
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    /// Drops zero counts and ids the catalog does not know. Returns how many
    /// entries were removed.
    pub fn retain_known(&mut self, catalog: &Catalog) -> usize {
        let before = self.counts.len();
        self.counts
            .retain(|id, count| *count > 0 && catalog.contains_id(id));
        before - self.counts.len()
    }

    pub fn total(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn count(&self, item_id: &str) -> u32 {
        self.counts.get(item_id).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, u32)> {
        self.counts.iter().map(|(id, count)| (id.as_str(), *count))
    }

    /// Joins the ledger with the catalog in catalog order.
    /// Ids that are not in the catalog are skipped.
    pub fn lines(&self, catalog: &Catalog) -> Vec<OrderLine> {
        catalog
            .items()
            .iter()
            .filter_map(|item| {
                self.counts.get(&item.id).map(|count| OrderLine {
                    item: item.clone(),
                    count: *count,
                })
            })
            .collect()
    }
}

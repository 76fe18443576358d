use super::{ClothingCatalog, ClothingCategory, ClothingItem};
use crate::composition::{CompositionError, CompositionResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Selected item id per category.
///
/// Only constructible from a catalog, so every category always has exactly
/// one entry and every entry names an item of that category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionState {
    selected: BTreeMap<ClothingCategory, String>,
}

impl SelectionState {
    /// First item of each category
    pub fn defaults(catalog: &ClothingCatalog) -> Self {
        let selected = catalog
            .categories()
            .filter_map(|category| catalog.first(category).map(|item| (category, item.id.clone())))
            .collect();
        Self { selected }
    }

    pub fn get(&self, category: ClothingCategory) -> Option<&str> {
        self.selected.get(&category).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClothingCategory, &str)> + '_ {
        self.selected.iter().map(|(category, id)| (*category, id.as_str()))
    }

    /// (category, item name) pairs for the outfit summary panel
    pub fn summary<'a>(&'a self, catalog: &'a ClothingCatalog) -> Vec<(ClothingCategory, &'a str)> {
        self.iter()
            .filter_map(|(category, id)| catalog.find(category, id).map(|item| (category, item.name.as_str())))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChange {
    pub category: ClothingCategory,
    pub previous: String,
    pub current: String,
}

impl SelectionChange {
    /// Re-selection of the item that was already selected
    pub fn is_reselection(&self) -> bool {
        self.previous == self.current
    }
}

/// Observer called after every accepted selection
pub type SelectionCallback = Arc<dyn Fn(&SelectionChange) + Send + Sync>;

pub struct SelectionManager {
    catalog: Arc<ClothingCatalog>,
    state: SelectionState,
    listeners: Vec<SelectionCallback>,
}

impl std::fmt::Debug for SelectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionManager")
            .field("state", &self.state)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl SelectionManager {
    pub fn new(catalog: Arc<ClothingCatalog>) -> Self {
        let state = SelectionState::defaults(&catalog);
        Self {
            catalog,
            state,
            listeners: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &ClothingCatalog {
        &self.catalog
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    /// Catalog entry currently selected for `category`
    pub fn resolve(&self, category: ClothingCategory) -> Option<&ClothingItem> {
        self.state
            .get(category)
            .and_then(|id| self.catalog.find(category, id))
    }

    pub fn subscribe(&mut self, callback: SelectionCallback) {
        self.listeners.push(callback);
    }

    /// Replace the selection for `category`. Unknown ids are rejected and
    /// leave the state untouched. Re-selecting the current id still notifies.
    pub fn select(&mut self, category: ClothingCategory, item_id: &str) -> CompositionResult<SelectionChange> {
        if self.catalog.find(category, item_id).is_none() {
            debug!("Rejected selection of '{}' for {}", item_id, category);
            return Err(CompositionError::InvalidSelection {
                category,
                item_id: item_id.to_string(),
            });
        }

        let previous = self
            .state
            .selected
            .insert(category, item_id.to_string())
            .unwrap_or_default();
        let change = SelectionChange {
            category,
            previous,
            current: item_id.to_string(),
        };

        if change.is_reselection() {
            debug!("Re-selected {} for {}", item_id, category);
        } else {
            info!("Selected {} for {} (was {})", item_id, category, change.previous);
        }

        for listener in &self.listeners {
            listener(&change);
        }

        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> SelectionManager {
        SelectionManager::new(Arc::new(ClothingCatalog::builtin()))
    }

    #[test]
    fn test_defaults_to_first_item() {
        let manager = manager();
        assert_eq!(manager.state().get(ClothingCategory::Top), Some("shirt1"));
        assert_eq!(manager.state().get(ClothingCategory::Bottom), Some("pants1"));
        assert_eq!(manager.state().iter().count(), 2);
    }

    #[test]
    fn test_select_replaces_entry() {
        let mut manager = manager();
        let change = manager.select(ClothingCategory::Top, "shirt3").unwrap();
        assert_eq!(change.previous, "shirt1");
        assert_eq!(change.current, "shirt3");
        assert_eq!(manager.resolve(ClothingCategory::Top).unwrap().name, "Hoodie");
    }

    #[test]
    fn test_unknown_id_leaves_state_unchanged() {
        let mut manager = manager();
        let before = manager.state().clone();

        let err = manager.select(ClothingCategory::Top, "nope").unwrap_err();
        assert!(matches!(err, CompositionError::InvalidSelection { .. }));

        // an id from the other category is just as unknown
        assert!(manager.select(ClothingCategory::Top, "pants2").is_err());
        assert_eq!(manager.state(), &before);
    }

    #[test]
    fn test_reselection_still_notifies() {
        let mut manager = manager();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        manager.subscribe(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let change = manager.select(ClothingCategory::Bottom, "pants1").unwrap();
        assert!(change.is_reselection());
        manager.select(ClothingCategory::Bottom, "pants2").unwrap();
        let _ = manager.select(ClothingCategory::Bottom, "missing");

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_summary_names() {
        let mut manager = manager();
        manager.select(ClothingCategory::Bottom, "pants2").unwrap();
        let catalog = ClothingCatalog::builtin();
        let summary = manager.state().summary(&catalog);
        assert_eq!(
            summary,
            vec![(ClothingCategory::Top, "Basic T-Shirt"), (ClothingCategory::Bottom, "Shorts")]
        );
    }
}

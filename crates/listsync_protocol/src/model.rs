//! Lists and items, the values derived by folding events.

use serde::{Deserialize, Serialize};

/// A single entry on a shopping list.
///
/// Items are immutable once created; the only way to change one is to
/// delete it and add another. Two items are "the same item" when their
/// `id`s match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Caller-generated id, unique within its list.
    pub id: String,
    /// Display name.
    pub name: String,
}

impl Item {
    /// Creates a new item.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A named list of items in append order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingList {
    /// Unique list id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Items in the order they were added.
    #[serde(default)]
    pub items: Vec<Item>,
}

impl ShoppingList {
    /// Creates an empty list.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            items: Vec::new(),
        }
    }

    /// Builder-style helper that appends an item.
    #[must_use]
    pub fn with_item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    /// Returns true if any item carries `item_id`.
    pub fn contains(&self, item_id: &str) -> bool {
        self.items.iter().any(|item| item.id == item_id)
    }
}

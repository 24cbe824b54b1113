//! Domain events and the fold that derives list state from them.

use crate::model::{Item, ShoppingList};
use serde::{Deserialize, Serialize};

/// A domain event on the `app-event` channel.
///
/// On the wire the variant is identified by the `action` field:
///
/// | Variant | `action` |
/// |---------|----------|
/// | `ListsInit` | `lists.init` |
/// | `SuggestionsUpdate` | `suggestions.update` |
/// | `AddItem` | `item.add` |
/// | `DeleteItem` | `item.delete` |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum AppEvent {
    /// Authoritative full-state snapshot. Only ever sent by the server.
    #[serde(rename = "lists.init")]
    ListsInit {
        /// Every list the user can see.
        lists: Vec<ShoppingList>,
    },

    /// Suggestion data; carries no state effect yet.
    #[serde(rename = "suggestions.update")]
    SuggestionsUpdate,

    /// Append `item` to the list `list_id`.
    #[serde(rename = "item.add")]
    AddItem {
        /// Target list.
        #[serde(rename = "listId")]
        list_id: String,
        /// The new item.
        item: Item,
    },

    /// Remove every item with `item_id` from the list `list_id`.
    #[serde(rename = "item.delete")]
    DeleteItem {
        /// Target list.
        #[serde(rename = "listId")]
        list_id: String,
        /// Id of the item to remove.
        #[serde(rename = "itemId")]
        item_id: String,
    },
}

impl AppEvent {
    /// Convenience constructor for [`AppEvent::AddItem`].
    pub fn add_item(list_id: impl Into<String>, item: Item) -> Self {
        Self::AddItem {
            list_id: list_id.into(),
            item,
        }
    }

    /// Convenience constructor for [`AppEvent::DeleteItem`].
    pub fn delete_item(list_id: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self::DeleteItem {
            list_id: list_id.into(),
            item_id: item_id.into(),
        }
    }

    /// Returns the wire discriminant.
    pub fn action(&self) -> &'static str {
        match self {
            AppEvent::ListsInit { .. } => "lists.init",
            AppEvent::SuggestionsUpdate => "suggestions.update",
            AppEvent::AddItem { .. } => "item.add",
            AppEvent::DeleteItem { .. } => "item.delete",
        }
    }

    /// Returns true for the authoritative snapshot variant.
    pub fn is_snapshot(&self) -> bool {
        matches!(self, AppEvent::ListsInit { .. })
    }
}

/// Applies one event to a list collection.
///
/// Total and pure: unknown list or item ids are no-ops, and
/// `ListsInit` replaces the whole collection.
pub fn fold(mut lists: Vec<ShoppingList>, event: &AppEvent) -> Vec<ShoppingList> {
    match event {
        AppEvent::ListsInit { lists: snapshot } => snapshot.clone(),
        AppEvent::SuggestionsUpdate => lists,
        AppEvent::AddItem { list_id, item } => {
            if let Some(list) = lists.iter_mut().find(|l| &l.id == list_id) {
                list.items.push(item.clone());
            }
            lists
        }
        AppEvent::DeleteItem { list_id, item_id } => {
            if let Some(list) = lists.iter_mut().find(|l| &l.id == list_id) {
                list.items.retain(|item| &item.id != item_id);
            }
            lists
        }
    }
}

/// Folds a sequence of events left to right.
pub fn fold_all<'a, I>(lists: Vec<ShoppingList>, events: I) -> Vec<ShoppingList>
where
    I: IntoIterator<Item = &'a AppEvent>,
{
    events.into_iter().fold(lists, fold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn groceries() -> Vec<ShoppingList> {
        vec![
            ShoppingList::new("g1", "Groceries"),
            ShoppingList::new("h1", "Hardware").with_item(Item::new("n1", "Nails")),
        ]
    }

    #[test]
    fn add_then_delete_scenario() {
        let state = fold(groceries(), &AppEvent::add_item("g1", Item::new("i1", "Milk")));
        assert_eq!(state[0].items, vec![Item::new("i1", "Milk")]);

        let state = fold(state, &AppEvent::delete_item("g1", "i1"));
        assert!(state[0].items.is_empty());
        assert_eq!(state[1].items.len(), 1);
    }

    #[test]
    fn unknown_list_is_noop() {
        let before = groceries();
        let after = fold(before.clone(), &AppEvent::add_item("nope", Item::new("x", "X")));
        assert_eq!(after, before);

        let after = fold(before.clone(), &AppEvent::delete_item("nope", "n1"));
        assert_eq!(after, before);
    }

    #[test]
    fn unknown_item_is_noop() {
        let before = groceries();
        let after = fold(before.clone(), &AppEvent::delete_item("h1", "missing"));
        assert_eq!(after, before);
    }

    #[test]
    fn delete_removes_every_match() {
        let state = fold_all(
            groceries(),
            &[
                AppEvent::add_item("g1", Item::new("dup", "Eggs")),
                AppEvent::add_item("g1", Item::new("dup", "Eggs again")),
                AppEvent::delete_item("g1", "dup"),
            ],
        );
        assert!(state[0].items.is_empty());
    }

    #[test]
    fn lists_init_replaces_state() {
        let snapshot = vec![ShoppingList::new("other", "Other")];
        let state = fold(
            groceries(),
            &AppEvent::ListsInit {
                lists: snapshot.clone(),
            },
        );
        assert_eq!(state, snapshot);
    }

    #[test]
    fn suggestions_update_is_ignored() {
        assert_eq!(fold(groceries(), &AppEvent::SuggestionsUpdate), groceries());
    }

    #[test]
    fn wire_shape_uses_action_tag() {
        let event = AppEvent::add_item("g1", Item::new("i1", "Milk"));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "action": "item.add",
                "listId": "g1",
                "item": {"id": "i1", "name": "Milk"}
            })
        );

        let json = serde_json::to_value(AppEvent::delete_item("g1", "i1")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"action": "item.delete", "listId": "g1", "itemId": "i1"})
        );
    }

    #[test]
    fn decode_every_action() {
        let cases = [
            (r#"{"action":"lists.init","lists":[]}"#, "lists.init"),
            (r#"{"action":"suggestions.update"}"#, "suggestions.update"),
            (
                r#"{"action":"suggestions.update","suggestions":["milk"]}"#,
                "suggestions.update",
            ),
            (
                r#"{"action":"item.add","listId":"g","item":{"id":"i","name":"n"}}"#,
                "item.add",
            ),
            (
                r#"{"action":"item.delete","listId":"g","itemId":"i"}"#,
                "item.delete",
            ),
        ];

        for (json, action) in cases {
            let event: AppEvent = serde_json::from_str(json).unwrap();
            assert_eq!(event.action(), action);
        }
    }

    #[test]
    fn decode_unknown_action_fails() {
        let result: Result<AppEvent, _> = serde_json::from_str(r#"{"action":"item.rename"}"#);
        assert!(result.is_err());
    }

    fn item_strategy() -> impl Strategy<Value = Item> {
        ("[a-d]", "[a-z]{1,6}").prop_map(|(id, name)| Item::new(id, name))
    }

    fn event_strategy() -> impl Strategy<Value = AppEvent> {
        let list_id = prop::sample::select(vec!["g1", "h1", "missing"]);
        prop_oneof![
            (list_id.clone(), item_strategy())
                .prop_map(|(list, item)| AppEvent::add_item(list, item)),
            (list_id, "[a-d]").prop_map(|(list, id)| AppEvent::delete_item(list, id)),
            Just(AppEvent::SuggestionsUpdate),
            prop::collection::vec(item_strategy(), 0..3).prop_map(|items| {
                let mut list = ShoppingList::new("g1", "Groceries");
                list.items = items;
                AppEvent::ListsInit { lists: vec![list] }
            }),
        ]
    }

    proptest! {
        #[test]
        fn fold_respects_concatenation(
            first in prop::collection::vec(event_strategy(), 0..12),
            second in prop::collection::vec(event_strategy(), 0..12),
        ) {
            let stepwise = fold_all(fold_all(groceries(), &first), &second);
            let joined: Vec<AppEvent> = first.iter().chain(second.iter()).cloned().collect();
            prop_assert_eq!(stepwise, fold_all(groceries(), &joined));
        }

        #[test]
        fn add_then_delete_restores_items(
            prefix in prop::collection::vec(event_strategy(), 0..12),
            name in "[a-z]{1,6}",
        ) {
            let before = fold_all(groceries(), &prefix);
            let after = fold_all(
                before.clone(),
                &[
                    AppEvent::add_item("g1", Item::new("fresh", name)),
                    AppEvent::delete_item("g1", "fresh"),
                ],
            );
            prop_assert_eq!(after, before);
        }
    }
}

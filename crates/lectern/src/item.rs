//! # Items
//!
//! The unit of content handled by the loader. Beyond its identifier, an optional
//! display order and an optional title, the payload is opaque JSON owned by the
//! consumer.

use serde::{Deserialize, Serialize};

/// Identifies a named group of items, e.g. a course module.
pub type CollectionKey = String;

/// Identifies one item inside a collection.
pub type ItemId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Stores that key files by identifier may leave this out of the payload.
    #[serde(default)]
    pub id: ItemId,
    /// Declared presentation order. Items without one fall back to their
    /// position in the identifier list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Item {
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self {
            id: id.into(),
            order: None,
            title: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Human readable name used in progress snapshots.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

/// Sorts `(position, item)` pairs into presentation order: declared order first,
/// list position as fallback and tie breaker.
pub(crate) fn sort_for_presentation(items: &mut [(usize, Item)]) {
    items.sort_by_key(|(position, item)| {
        (item.order.unwrap_or(*position as i64), *position)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_falls_back_to_id() {
        let item = Item::new("lesson-3");
        assert_eq!(item.label(), "lesson-3");
        let item = item.with_title("Blood Flow Pathways");
        assert_eq!(item.label(), "Blood Flow Pathways");
    }

    #[test]
    fn test_deserialize_minimal_item() {
        let item: Item = serde_json::from_str(r#"{"id":"module-1-lesson-2","order":2}"#).unwrap();
        assert_eq!(item.id, "module-1-lesson-2");
        assert_eq!(item.order, Some(2));
        assert!(item.title.is_none());
        assert!(item.payload.is_null());
    }

    #[test]
    fn test_presentation_sort_uses_order_then_position() {
        let mut items = vec![
            (0, Item::new("a").with_order(3)),
            (1, Item::new("b")),
            (2, Item::new("c").with_order(0)),
            (3, Item::new("d").with_order(1)),
        ];
        sort_for_presentation(&mut items);
        let ids: Vec<_> = items.iter().map(|(_, i)| i.id.as_str()).collect();
        // c(0), b(pos 1), d(1, pos 3), a(3)
        assert_eq!(ids, vec!["c", "b", "d", "a"]);
    }
}

//! Payloads delivered to [`TreeObserver`](crate::TreeObserver) implementations.

use serde_json::Value;

use crate::record::{ItemId, RecordRef};

/// One record visited by the pre-order traversal performed on wrap.
#[derive(Debug, Clone)]
pub struct InitEvent {
    /// `None` for the root.
    pub parent: Option<RecordRef>,
    pub item: RecordRef,
    pub id: Option<ItemId>,
    /// Pre-order position of the record, starting at 0 for the root.
    pub index: usize,
    pub depth: usize,
}

/// A record was inserted as child `index` of `parent`.
#[derive(Debug, Clone)]
pub struct AddEvent {
    pub parent: RecordRef,
    pub index: usize,
    pub item: RecordRef,
    pub id: Option<ItemId>,
    /// Ids of the records already attached below `item`, in pre-order.
    /// Empty when a leaf was added.
    pub descendant_ids: Vec<Option<ItemId>>,
    /// Opaque value handed to `add_child` and forwarded to flat item hooks.
    pub state: Option<Value>,
}

/// Child `index` of `parent` was detached. `item` still carries its own
/// children.
#[derive(Debug, Clone)]
pub struct RemoveEvent {
    pub parent: RecordRef,
    pub index: usize,
    pub item: RecordRef,
}

/// A record was relocated. `new_index` refers to `new_parent`'s children
/// after the record was taken out of `old_parent`.
#[derive(Debug, Clone)]
pub struct MoveEvent {
    pub old_parent: RecordRef,
    pub old_index: usize,
    pub new_parent: RecordRef,
    pub new_index: usize,
    pub item: RecordRef,
}

impl MoveEvent {
    pub fn is_within_parent(&self) -> bool {
        self.old_parent.ptr_eq(&self.new_parent)
    }
}

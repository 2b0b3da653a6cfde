use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, TreeError};

/// Attribute under which children live unless configured otherwise.
pub const DEFAULT_CHILDREN_PROP: &str = "items";

/// Caller-owned payload participating in a tree.
///
/// Plain attributes are kept as JSON values. Child lists are kept per
/// attribute name so that the children attribute can be chosen at runtime;
/// a list that was never created reads as empty.
#[derive(Debug, Default)]
pub struct Record {
    fields: Map<String, Value>,
    lists: BTreeMap<String, Vec<RecordRef>>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a leaf record from plain attributes.
    pub fn with_fields(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            lists: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Set a plain attribute, returning the previous value.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: Value,
    ) -> Option<Value> {
        self.fields.insert(name.into(), value)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Children stored under `prop`, or `None` when the attribute is absent.
    pub fn children(&self, prop: &str) -> Option<&[RecordRef]> {
        self.lists.get(prop).map(Vec::as_slice)
    }

    pub fn child_count(&self, prop: &str) -> usize {
        self.lists.get(prop).map_or(0, Vec::len)
    }

    pub(crate) fn children_mut_or_create(
        &mut self,
        prop: &str,
    ) -> &mut Vec<RecordRef> {
        self.lists.entry(prop.to_owned()).or_default()
    }

    pub(crate) fn children_mut(
        &mut self,
        prop: &str,
    ) -> Option<&mut Vec<RecordRef>> {
        self.lists.get_mut(prop)
    }
}

/// Shared reference to a [`Record`].
///
/// Cloning is cheap and yields the same record; identity is pointer identity.
#[derive(Clone, Default)]
pub struct RecordRef(Rc<RefCell<Record>>);

impl RecordRef {
    pub fn new(record: Record) -> Self {
        Self(Rc::new(RefCell::new(record)))
    }

    /// Build a record graph from a JSON object.
    ///
    /// Arrays found under `children_prop` become child records, recursively.
    /// A `null` children attribute is treated as absent; any other non-array
    /// value there is kept as a plain attribute.
    pub fn from_json(value: Value, children_prop: &str) -> Result<Self> {
        let object = match value {
            Value::Object(object) => object,
            Value::Null => return Err(TreeError::NullRecord),
            other => {
                return Err(TreeError::NotAnObject {
                    found: json_kind(&other),
                });
            },
        };

        let mut record = Record::new();
        for (key, value) in object {
            if key != children_prop {
                record.fields.insert(key, value);
                continue;
            }
            match value {
                Value::Array(items) => {
                    let children = items
                        .into_iter()
                        .map(|item| Self::from_json(item, children_prop))
                        .collect::<Result<Vec<_>>>()?;
                    record.lists.insert(key, children);
                },
                Value::Null => {},
                other => {
                    record.fields.insert(key, other);
                },
            }
        }

        Ok(Self::new(record))
    }

    /// Render the record graph back to JSON.
    ///
    /// A children attribute that was never created is omitted; one that was
    /// created and emptied renders as `[]`.
    pub fn to_json(&self, children_prop: &str) -> Value {
        let record = self.borrow();
        let mut object = record.fields.clone();
        if let Some(children) = record.children(children_prop) {
            let items = children
                .iter()
                .map(|child| child.to_json(children_prop))
                .collect();
            object.insert(children_prop.to_owned(), Value::Array(items));
        }
        Value::Object(object)
    }

    pub fn borrow(&self) -> Ref<'_, Record> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Record> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &RecordRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Clone of a plain attribute.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.borrow().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.borrow_mut().set(name, value)
    }

    pub fn child_count(&self, prop: &str) -> usize {
        self.borrow().child_count(prop)
    }

    pub fn child(&self, prop: &str, index: usize) -> Option<RecordRef> {
        self.borrow()
            .children(prop)
            .and_then(|children| children.get(index))
            .cloned()
    }

    /// Snapshot of the child references under `prop`.
    pub fn children(&self, prop: &str) -> Vec<RecordRef> {
        self.borrow()
            .children(prop)
            .map(<[RecordRef]>::to_vec)
            .unwrap_or_default()
    }

    /// Position of `child` among this record's children, by identity.
    pub fn index_of(&self, prop: &str, child: &RecordRef) -> Option<usize> {
        self.borrow()
            .children(prop)?
            .iter()
            .position(|candidate| candidate.ptr_eq(child))
    }

    /// Whether `other` is this record or one of its descendants.
    pub fn contains(&self, prop: &str, other: &RecordRef) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.children(prop)
            .iter()
            .any(|child| child.contains(prop, other))
    }

    /// Number of records in the subtree rooted here, this one included.
    pub fn subtree_len(&self, prop: &str) -> usize {
        walk(self, None, 0, 0, prop, &mut |_, _, _, _| {})
    }

    pub(crate) fn key(&self) -> RecordKey {
        RecordKey(Rc::as_ptr(&self.0) as usize)
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(record) => f.debug_tuple("RecordRef").field(&*record).finish(),
            Err(_) => f.write_str("RecordRef(<borrowed>)"),
        }
    }
}

impl From<Record> for RecordRef {
    fn from(record: Record) -> Self {
        Self::new(record)
    }
}

/// Address-based key for a live record. Only meaningful while the record is
/// kept alive by whoever holds the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct RecordKey(usize);

/// Pre-order walk starting at `item`.
///
/// `callback` receives `(item, parent, flat_index, depth)`; the returned value
/// is the next unused flat index, so starting from 0 it is the subtree size.
pub(crate) fn walk<F>(
    item: &RecordRef,
    parent: Option<&RecordRef>,
    index: usize,
    depth: usize,
    prop: &str,
    callback: &mut F,
) -> usize
where
    F: FnMut(&RecordRef, Option<&RecordRef>, usize, usize),
{
    callback(item, parent, index, depth);
    let mut next = index + 1;
    for child in item.children(prop) {
        next = walk(&child, Some(item), next, depth + 1, prop, callback);
    }
    next
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Identity assigned to a record by the configured id function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Number(u64),
    Uuid(Uuid),
    Text(String),
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Number(value) => write!(f, "{value}"),
            ItemId::Uuid(value) => write!(f, "{value}"),
            ItemId::Text(value) => f.write_str(value),
        }
    }
}

impl From<u64> for ItemId {
    fn from(value: u64) -> Self {
        ItemId::Number(value)
    }
}

impl From<Uuid> for ItemId {
    fn from(value: Uuid) -> Self {
        ItemId::Uuid(value)
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        ItemId::Text(value)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        ItemId::Text(value.to_owned())
    }
}

/// Ready-made id functions for
/// [`TreeOptions::item_id`](crate::TreeOptions::item_id).
pub struct ItemIds;

impl ItemIds {
    /// Hand out `start`, `start + 1`, ... in call order.
    pub fn sequential(
        start: u64,
    ) -> impl FnMut(&RecordRef, Option<&RecordRef>) -> ItemId {
        let mut next = start;
        move |_, _| {
            let id = ItemId::Number(next);
            next += 1;
            id
        }
    }

    /// Random v4 UUID per call.
    pub fn uuid_v4() -> impl FnMut(&RecordRef, Option<&RecordRef>) -> ItemId {
        |_, _| ItemId::Uuid(Uuid::new_v4())
    }
}

//! Navigation and mutation façade over a record tree.
//!
//! A [`TreeWrapper`] owns the configuration and the parent-by-id index.
//! [`TreeHandle`]s are cheap views bound to one record and its parent; every
//! structural edit goes through a handle, which splices the record graph in
//! place and then notifies the configured observers.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::{debug, trace, warn};
use serde_json::Value;

use crate::error::{Result, TreeError};
use crate::event::{AddEvent, InitEvent, MoveEvent, RemoveEvent};
use crate::observer::{Callbacks, ObserverBus, TreeObserver};
use crate::options::{ItemIdFn, TreeOptions};
use crate::record::{ItemId, RecordKey, RecordRef, walk};

struct IndexEntry {
    record: RecordRef,
    parent: Option<RecordRef>,
}

/// `id -> parent` lookup plus the reverse `record -> id` mapping needed to
/// drop entries when a subtree leaves the tree. Entries hold their record,
/// which keeps the address-based keys unique.
#[derive(Default)]
struct ParentIndex {
    entries: HashMap<ItemId, IndexEntry>,
    ids: HashMap<RecordKey, ItemId>,
}

impl ParentIndex {
    fn insert(
        &mut self,
        id: ItemId,
        record: &RecordRef,
        parent: Option<&RecordRef>,
    ) {
        if let Some(previous) = self.ids.insert(record.key(), id.clone()) {
            if previous != id {
                self.entries.remove(&previous);
            }
        }
        let entry = IndexEntry {
            record: record.clone(),
            parent: parent.cloned(),
        };
        if let Some(replaced) = self.entries.insert(id, entry) {
            if !replaced.record.ptr_eq(record) {
                self.ids.remove(&replaced.record.key());
            }
        }
    }

    fn forget_subtree(&mut self, item: &RecordRef, prop: &str) {
        walk(item, None, 0, 0, prop, &mut |record, _, _, _| {
            if let Some(id) = self.ids.remove(&record.key()) {
                self.entries.remove(&id);
            }
        });
    }

    fn reparent(&mut self, item: &RecordRef, parent: &RecordRef) {
        let Some(id) = self.ids.get(&item.key()) else {
            return;
        };
        if let Some(entry) = self.entries.get_mut(id) {
            entry.parent = Some(parent.clone());
        }
    }

    fn parent_of(&self, id: &ItemId) -> Option<Option<RecordRef>> {
        self.entries.get(id).map(|entry| entry.parent.clone())
    }

    fn id_of(&self, record: &RecordRef) -> Option<ItemId> {
        self.ids.get(&record.key()).cloned()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.ids.clear();
    }
}

/// Marks the context as busy for as long as it lives: observers are being
/// notified or the id function is running.
struct DispatchGuard<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl<'a> DispatchGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        let previous = flag.replace(true);
        Self { flag, previous }
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

struct TreeContext {
    children_prop: String,
    item_id: RefCell<Option<ItemIdFn>>,
    observer: Option<ObserverBus>,
    callbacks: RefCell<Callbacks>,
    index: RefCell<ParentIndex>,
    root: RefCell<Option<RecordRef>>,
    dispatching: Cell<bool>,
}

impl TreeContext {
    fn prop(&self) -> &str {
        &self.children_prop
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.dispatching.get() {
            warn!("rejected tree mutation issued from a tree callback");
            return Err(TreeError::Reentrant);
        }
        Ok(())
    }

    fn assign_id(
        &self,
        item: &RecordRef,
        parent: Option<&RecordRef>,
    ) -> Option<ItemId> {
        let id = {
            let _guard = DispatchGuard::enter(&self.dispatching);
            let mut item_id = self.item_id.borrow_mut();
            item_id.as_mut().map(|item_id| item_id(item, parent))
        }?;
        self.index.borrow_mut().insert(id.clone(), item, parent);
        Some(id)
    }

    /// Assign ids to `item` and everything already attached below it.
    fn assign_subtree_ids(
        &self,
        item: &RecordRef,
        parent: &RecordRef,
    ) -> (Option<ItemId>, Vec<Option<ItemId>>) {
        let mut ids = Vec::new();
        let prop = self.prop();
        walk(item, Some(parent), 0, 0, prop, &mut |record, parent, _, _| {
            ids.push(self.assign_id(record, parent));
        });
        let mut ids = ids.into_iter();
        let id = ids.next().flatten();
        (id, ids.collect())
    }

    fn emit<F>(&self, mut deliver: F) -> Result<()>
    where
        F: FnMut(&mut dyn TreeObserver) -> Result<()>,
    {
        let _guard = DispatchGuard::enter(&self.dispatching);
        if let Some(bus) = self.observer.as_ref() {
            let mut bus = bus.clone();
            deliver(&mut bus)?;
        }
        deliver(&mut *self.callbacks.borrow_mut())
    }

    fn handle(
        self: &Rc<Self>,
        record: RecordRef,
        parent: Option<RecordRef>,
    ) -> TreeHandle {
        TreeHandle {
            record,
            parent,
            ctx: Rc::clone(self),
        }
    }
}

/// Entry point: binds a record tree and hands out [`TreeHandle`]s.
pub struct TreeWrapper {
    ctx: Rc<TreeContext>,
}

impl Default for TreeWrapper {
    fn default() -> Self {
        Self::new(TreeOptions::default())
    }
}

impl TreeWrapper {
    pub fn new(options: TreeOptions) -> Self {
        let TreeOptions {
            children_prop,
            item_id,
            observer,
            callbacks,
        } = options;

        Self {
            ctx: Rc::new(TreeContext {
                children_prop,
                item_id: RefCell::new(item_id),
                observer,
                callbacks: RefCell::new(callbacks),
                index: RefCell::new(ParentIndex::default()),
                root: RefCell::new(None),
                dispatching: Cell::new(false),
            }),
        }
    }

    pub fn children_prop(&self) -> &str {
        self.ctx.prop()
    }

    /// Bind `record` as the tree root.
    ///
    /// Walks the tree in pre-order, assigning ids and emitting `on_init` for
    /// every record, then returns the root handle. Wrapping again replaces
    /// the parent-by-id index but leaves observers untouched.
    pub fn wrap(&self, record: RecordRef) -> Result<TreeHandle> {
        self.ctx.ensure_idle()?;
        if self.ctx.root.borrow().is_some() {
            debug!("re-wrapping tree; parent index reset");
        }
        self.ctx.index.borrow_mut().clear();
        *self.ctx.root.borrow_mut() = Some(record.clone());

        let mut visited = Vec::new();
        let count = walk(
            &record,
            None,
            0,
            0,
            self.ctx.prop(),
            &mut |item, parent, index, depth| {
                let id = self.ctx.assign_id(item, parent);
                visited.push(InitEvent {
                    parent: parent.cloned(),
                    item: item.clone(),
                    id,
                    index,
                    depth,
                });
            },
        );
        debug!("wrapped tree with {count} records");

        for event in &visited {
            trace!("init: index={}, depth={}", event.index, event.depth);
            self.ctx.emit(|observer| observer.on_init(event))?;
        }

        Ok(self.ctx.handle(record, None))
    }

    /// Convert `value` with [`RecordRef::from_json`] and wrap the result.
    ///
    /// `Value::Null` is rejected with [`TreeError::NullRecord`].
    pub fn wrap_json(&self, value: Value) -> Result<TreeHandle> {
        let record = RecordRef::from_json(value, self.ctx.prop())?;
        self.wrap(record)
    }

    /// Rebuild a handle for `item` using the parent-by-id index.
    pub fn handle_for_id(
        &self,
        item: RecordRef,
        id: &ItemId,
    ) -> Result<TreeHandle> {
        let parent = self
            .ctx
            .index
            .borrow()
            .parent_of(id)
            .ok_or_else(|| TreeError::UnknownId(id.clone()))?;
        Ok(self.ctx.handle(item, parent))
    }

    /// Rebuild a handle for `item` with an explicitly known parent.
    pub fn handle_with_parent(
        &self,
        item: RecordRef,
        parent: Option<RecordRef>,
    ) -> TreeHandle {
        self.ctx.handle(item, parent)
    }

    /// Indexed parent of `id`: `Some(None)` for the root, `None` when the id
    /// is unknown.
    pub fn parent_of(&self, id: &ItemId) -> Option<Option<RecordRef>> {
        self.ctx.index.borrow().parent_of(id)
    }

    pub fn id_of(&self, record: &RecordRef) -> Option<ItemId> {
        self.ctx.index.borrow().id_of(record)
    }

    /// The most recently wrapped record.
    pub fn root(&self) -> Option<RecordRef> {
        self.ctx.root.borrow().clone()
    }

    /// Pre-order walk of any record using the configured children attribute.
    /// `callback` receives `(item, parent, flat_index, depth)`.
    pub fn traverse<F>(&self, item: &RecordRef, mut callback: F) -> usize
    where
        F: FnMut(&RecordRef, Option<&RecordRef>, usize, usize),
    {
        walk(item, None, 0, 0, self.ctx.prop(), &mut callback)
    }
}

impl fmt::Debug for TreeWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeWrapper")
            .field("children_prop", &self.ctx.children_prop)
            .field("indexed", &self.ctx.index.borrow().entries.len())
            .finish()
    }
}

/// View of one record and its parent, carrying the mutation methods.
///
/// Handles are cheap to clone and hold no resources; two handles bound to
/// the same record behave identically.
#[derive(Clone)]
pub struct TreeHandle {
    record: RecordRef,
    parent: Option<RecordRef>,
    ctx: Rc<TreeContext>,
}

impl TreeHandle {
    pub fn unwrap(&self) -> RecordRef {
        self.record.clone()
    }

    pub fn parent(&self) -> Option<RecordRef> {
        self.parent.clone()
    }

    pub fn child_count(&self) -> usize {
        self.record.child_count(self.ctx.prop())
    }

    /// Position of this record among its parent's children.
    pub fn index_in_parent(&self) -> Option<usize> {
        self.parent
            .as_ref()?
            .index_of(self.ctx.prop(), &self.record)
    }

    /// Handle for the child at `index`, or `None` when out of range.
    pub fn child(&self, index: usize) -> Option<TreeHandle> {
        let child = self.record.child(self.ctx.prop(), index)?;
        Some(self.ctx.handle(child, Some(self.record.clone())))
    }

    /// Insert `item` as child `index`.
    ///
    /// `index` is clamped to the current child count; the event reports the
    /// position the record actually landed at.
    pub fn add_child(
        &self,
        index: usize,
        item: RecordRef,
        state: Option<Value>,
    ) -> Result<()> {
        self.ctx.ensure_idle()?;
        let index = {
            let mut record = self.record.borrow_mut();
            let children = record.children_mut_or_create(self.ctx.prop());
            let index = index.min(children.len());
            children.insert(index, item.clone());
            index
        };

        let (id, descendant_ids) =
            self.ctx.assign_subtree_ids(&item, &self.record);
        let event = AddEvent {
            parent: self.record.clone(),
            index,
            item,
            id,
            descendant_ids,
            state,
        };
        trace!(
            "add: index={index}, id={:?}, descendants={}",
            event.id,
            event.descendant_ids.len()
        );
        self.ctx.emit(|observer| observer.on_add(&event))
    }

    /// Insert `item` as the sibling right before this record.
    pub fn add_above(
        &self,
        item: RecordRef,
        state: Option<Value>,
    ) -> Result<()> {
        let (parent, index) = self.parent_and_index()?;
        parent.add_child(index, item, state)
    }

    /// Insert `item` as the sibling right after this record.
    pub fn add_below(
        &self,
        item: RecordRef,
        state: Option<Value>,
    ) -> Result<()> {
        let (parent, index) = self.parent_and_index()?;
        parent.add_child(index + 1, item, state)
    }

    /// Detach the child at `index` and return it. Nothing happens, and no
    /// event is emitted, when there is no child there.
    pub fn remove_child(&self, index: usize) -> Result<Option<RecordRef>> {
        self.ctx.ensure_idle()?;
        let prop = self.ctx.prop();
        let removed = {
            let mut record = self.record.borrow_mut();
            match record.children_mut(prop) {
                Some(children) if index < children.len() => {
                    children.remove(index)
                },
                _ => return Ok(None),
            }
        };

        self.ctx.index.borrow_mut().forget_subtree(&removed, prop);
        let event = RemoveEvent {
            parent: self.record.clone(),
            index,
            item: removed.clone(),
        };
        trace!("remove: index={index}");
        self.ctx.emit(|observer| observer.on_remove(&event))?;
        Ok(Some(removed))
    }

    /// Detach this record from its parent.
    pub fn remove(&self) -> Result<RecordRef> {
        let (parent, index) = self.parent_and_index()?;
        parent.remove_child(index)?.ok_or(TreeError::NotAChild)
    }

    /// Move child `from` to position `to` among the same children.
    ///
    /// `to` is read against the children after the record was taken out and
    /// is clamped to their count. Returns the moved record, or `None` when
    /// `from` is out of range.
    pub fn move_child(
        &self,
        from: usize,
        to: usize,
    ) -> Result<Option<RecordRef>> {
        self.ctx.ensure_idle()?;
        let (item, to) = {
            let mut record = self.record.borrow_mut();
            let Some(children) = record.children_mut(self.ctx.prop()) else {
                return Ok(None);
            };
            if from >= children.len() {
                return Ok(None);
            }
            let item = children.remove(from);
            let to = to.min(children.len());
            children.insert(to, item.clone());
            (item, to)
        };

        let event = MoveEvent {
            old_parent: self.record.clone(),
            old_index: from,
            new_parent: self.record.clone(),
            new_index: to,
            item: item.clone(),
        };
        trace!("move within parent: {from} -> {to}");
        self.ctx.emit(|observer| observer.on_move(&event))?;
        Ok(Some(item))
    }

    /// Move child `from` under `dest`, at position `to` (clamped).
    ///
    /// Fails with [`TreeError::MoveUnderItself`] when `dest` is this record
    /// or lies inside the subtree being moved; the tree is left untouched.
    pub fn move_child_to(
        &self,
        from: usize,
        dest: &TreeHandle,
        to: usize,
    ) -> Result<Option<RecordRef>> {
        self.ctx.ensure_idle()?;
        if dest.record.ptr_eq(&self.record) {
            return Err(TreeError::MoveUnderItself);
        }
        let prop = self.ctx.prop();
        let Some(item) = self.record.child(prop, from) else {
            return Ok(None);
        };
        if item.contains(prop, &dest.record) {
            return Err(TreeError::MoveUnderItself);
        }

        if let Some(children) = self.record.borrow_mut().children_mut(prop) {
            children.remove(from);
        }
        let to = {
            let mut dest_record = dest.record.borrow_mut();
            let children = dest_record.children_mut_or_create(prop);
            let to = to.min(children.len());
            children.insert(to, item.clone());
            to
        };
        self.ctx.index.borrow_mut().reparent(&item, &dest.record);

        let event = MoveEvent {
            old_parent: self.record.clone(),
            old_index: from,
            new_parent: dest.record.clone(),
            new_index: to,
            item: item.clone(),
        };
        trace!("move across parents: {from} -> {to}");
        self.ctx.emit(|observer| observer.on_move(&event))?;
        Ok(Some(item))
    }

    /// Pre-order walk of this record's subtree. `callback` receives
    /// `(item, parent, flat_index, depth)` with this record at index 0 and
    /// depth 0; the return value is the number of records visited.
    pub fn traverse<F>(&self, mut callback: F) -> usize
    where
        F: FnMut(&RecordRef, Option<&RecordRef>, usize, usize),
    {
        walk(
            &self.record,
            self.parent.as_ref(),
            0,
            0,
            self.ctx.prop(),
            &mut callback,
        )
    }

    fn parent_and_index(&self) -> Result<(TreeHandle, usize)> {
        let parent = self.parent.clone().ok_or(TreeError::NoParent)?;
        let index = parent
            .index_of(self.ctx.prop(), &self.record)
            .ok_or(TreeError::NotAChild)?;
        Ok((self.ctx.handle(parent, None), index))
    }
}

impl fmt::Debug for TreeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeHandle")
            .field("record", &self.record)
            .field("has_parent", &self.parent.is_some())
            .finish()
    }
}

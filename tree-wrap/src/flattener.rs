//! Depth-tagged flat projection of a wrapped tree.
//!
//! [`TreeFlattener`] subscribes to an [`ObserverBus`] and keeps a
//! pre-order list of [`FlatItem`]s in sync with every tree event, editing
//! only the rows of the affected subtree.

use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use log::{debug, trace, warn};
use serde_json::{Map, Value};

use crate::error::{Result, TreeError};
use crate::event::{AddEvent, InitEvent, MoveEvent, RemoveEvent};
use crate::observer::{ObserverBus, ObserverToken, TreeObserver};
use crate::options::{FlattenerOptions, WrapperCreatedFn};
use crate::record::{ItemId, RecordRef, walk};
use crate::wrapper::TreeWrapper;

/// Identity of a flat row, unique within one flattener.
///
/// Assigned when the row is created and kept when the row is moved, so it
/// works as a list key for virtualized rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlatKey(u64);

/// One row of the flat view.
#[derive(Debug, Clone)]
pub struct FlatItem {
    /// The record itself, not a copy.
    pub item: RecordRef,
    /// Tree depth, `0` for the root.
    pub depth: usize,
    pub id: Option<ItemId>,
    /// Caller-attached fields, typically filled by the
    /// `on_wrapper_created` hook.
    pub fields: Map<String, Value>,
    key: FlatKey,
}

impl FlatItem {
    pub fn key(&self) -> FlatKey {
        self.key
    }
}

/// Result of mapping a sibling index to a flat position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FlatSlot {
    index: usize,
    /// The scan left the parent's block before counting enough siblings.
    passed_all_siblings: bool,
}

struct FlatState {
    options: FlattenerOptions,
    items: Vec<FlatItem>,
    root: Option<RecordRef>,
    next_key: u64,
}

impl FlatState {
    fn new(options: FlattenerOptions) -> Self {
        Self {
            options,
            items: Vec::new(),
            root: None,
            next_key: 0,
        }
    }

    fn new_row(
        &mut self,
        item: RecordRef,
        id: Option<ItemId>,
        depth: usize,
    ) -> FlatItem {
        let key = FlatKey(self.next_key);
        self.next_key += 1;
        FlatItem {
            item,
            depth,
            id,
            fields: Map::new(),
            key,
        }
    }

    fn reset(&mut self, root: &RecordRef) {
        if !self.items.is_empty() {
            debug!("flat view reset: {} rows dropped", self.items.len());
        }
        self.items.clear();
        self.root = Some(root.clone());
    }

    /// Depth of `parent` and the flat position right after its row.
    ///
    /// With the root excluded, the remembered root has no row and maps to
    /// `(0, 0)`.
    fn find_position_after_parent(
        &self,
        parent: &RecordRef,
    ) -> Result<(usize, usize)> {
        if let Some(position) =
            self.items.iter().position(|row| row.item.ptr_eq(parent))
        {
            return Ok((self.items[position].depth, position + 1));
        }

        let is_hidden_root = !self.options.include_root
            && self.root.as_ref().is_some_and(|root| root.ptr_eq(parent));
        if is_hidden_root {
            return Ok((0, 0));
        }

        warn!(
            "parent record not found among {} flat rows",
            self.items.len()
        );
        Err(TreeError::MissingParent)
    }
    /// Flat position of sibling `sibling_index` at `child_depth`, scanning
    /// from `start`. Deeper rows belong to earlier siblings and are skipped.
    fn tree_index_to_flat_index(
        &self,
        child_depth: usize,
        sibling_index: usize,
        start: usize,
    ) -> Option<FlatSlot> {
        if sibling_index == 0 {
            return Some(FlatSlot {
                index: start,
                passed_all_siblings: false,
            });
        }

        let mut siblings = 0;
        for (index, row) in self.items.iter().enumerate().skip(start) {
            if row.depth < child_depth {
                return Some(FlatSlot {
                    index,
                    passed_all_siblings: true,
                });
            }
            if row.depth == child_depth {
                if siblings == sibling_index {
                    return Some(FlatSlot {
                        index,
                        passed_all_siblings: false,
                    });
                }
                siblings += 1;
            }
        }
        None
    }

    /// Depth a new child of `parent` gets and the flat position where child
    /// `index` goes.
    fn insert_position(
        &self,
        parent: &RecordRef,
        index: usize,
    ) -> Result<(usize, usize)> {
        let (parent_depth, start) = self.find_position_after_parent(parent)?;
        let child_depth = parent_depth + 1;
        let at = self
            .tree_index_to_flat_index(child_depth, index, start)
            .map_or(self.items.len(), |slot| slot.index);
        Ok((child_depth, at))
    }

    /// Splice out the rows of `item`, child `index` of `parent`. Returns the
    /// flat position they occupied together with the rows.
    fn take_subtree(
        &mut self,
        parent: &RecordRef,
        index: usize,
        item: &RecordRef,
    ) -> Result<(usize, Vec<FlatItem>)> {
        let (parent_depth, start) = self.find_position_after_parent(parent)?;
        let child_depth = parent_depth + 1;

        let at = match self.tree_index_to_flat_index(child_depth, index, start)
        {
            Some(FlatSlot {
                index: at,
                passed_all_siblings: false,
            }) if self
                .items
                .get(at)
                .is_some_and(|row| row.item.ptr_eq(item)) =>
            {
                at
            },
            _ => {
                warn!("no flat row for child {index} at depth {parent_depth}");
                return Err(TreeError::Desynchronized {
                    index,
                    depth: parent_depth,
                });
            },
        };

        let expected = item.subtree_len(&self.options.children_prop);
        let found = 1 + self.items[at + 1..]
            .iter()
            .take_while(|row| row.depth > child_depth)
            .count();
        if found != expected {
            warn!(
                "subtree at row {at} spans {found} rows, tree has {expected}"
            );
            return Err(TreeError::SubtreeLengthMismatch {
                at,
                expected,
                found,
            });
        }

        trace!("splice out: at={at}, len={expected}");
        Ok((at, self.items.drain(at..at + expected).collect()))
    }

    /// Move the rows of `event.item` to their new place, shifting depths.
    /// The block goes back where it was if the new parent has no row.
    fn move_subtree(&mut self, event: &MoveEvent) -> Result<()> {
        let (from, mut block) =
            self.take_subtree(&event.old_parent, event.old_index, &event.item)?;

        let (child_depth, at) =
            match self.insert_position(&event.new_parent, event.new_index) {
                Ok(position) => position,
                Err(err) => {
                    self.items.splice(from..from, block);
                    return Err(err);
                },
            };

        let base = block.first().map_or(child_depth, |row| row.depth);
        for row in &mut block {
            row.depth = child_depth + (row.depth - base);
        }

        trace!("move block: {from} -> {at}, len={}", block.len());
        self.items.splice(at..at, block);
        Ok(())
    }
}

/// Bus subscriber that feeds a [`FlatState`].
///
/// The `on_wrapper_created` hook lives outside the state and runs while the
/// state is not borrowed, so a hook may read the flattener.
#[derive(Clone)]
struct FlatFeed {
    state: Rc<RefCell<FlatState>>,
    hook: Rc<RefCell<Option<WrapperCreatedFn>>>,
}

impl FlatFeed {
    fn new(mut options: FlattenerOptions) -> Self {
        let hook = options.on_wrapper_created.take();
        Self {
            state: Rc::new(RefCell::new(FlatState::new(options))),
            hook: Rc::new(RefCell::new(hook)),
        }
    }

    fn decorate(&self, row: &mut FlatItem, state: Option<&Value>) {
        if let Some(hook) = self.hook.borrow_mut().as_mut() {
            hook(row, state);
        }
    }

    fn push(&self, item: RecordRef, id: Option<ItemId>, depth: usize) {
        let mut row = self.state.borrow_mut().new_row(item, id, depth);
        self.decorate(&mut row, None);
        self.state.borrow_mut().items.push(row);
    }
}

impl TreeObserver for FlatFeed {
    fn on_init(&mut self, event: &InitEvent) -> Result<()> {
        if event.depth == 0 {
            let mut flat = self.state.borrow_mut();
            flat.reset(&event.item);
            if !flat.options.include_root {
                return Ok(());
            }
        }
        self.push(event.item.clone(), event.id.clone(), event.depth);
        Ok(())
    }

    fn on_add(&mut self, event: &AddEvent) -> Result<()> {
        let (at, mut block) = {
            let mut flat = self.state.borrow_mut();
            let (child_depth, at) =
                flat.insert_position(&event.parent, event.index)?;

            let mut records = Vec::new();
            walk(
                &event.item,
                None,
                0,
                child_depth,
                &flat.options.children_prop,
                &mut |record, _, _, depth| {
                    records.push((record.clone(), depth))
                },
            );

            let mut block = Vec::with_capacity(records.len());
            for (position, (record, depth)) in records.into_iter().enumerate() {
                let id = match position {
                    0 => event.id.clone(),
                    _ => event
                        .descendant_ids
                        .get(position - 1)
                        .cloned()
                        .flatten(),
                };
                block.push(flat.new_row(record, id, depth));
            }
            (at, block)
        };

        for (position, row) in block.iter_mut().enumerate() {
            let state = match position {
                0 => event.state.as_ref(),
                _ => None,
            };
            self.decorate(row, state);
        }

        trace!("splice in: at={at}, len={}", block.len());
        self.state.borrow_mut().items.splice(at..at, block);
        Ok(())
    }

    fn on_remove(&mut self, event: &RemoveEvent) -> Result<()> {
        self.state.borrow_mut().take_subtree(
            &event.parent,
            event.index,
            &event.item,
        )?;
        Ok(())
    }

    fn on_move(&mut self, event: &MoveEvent) -> Result<()> {
        self.state.borrow_mut().move_subtree(event)
    }
}

/// Live flat view of a tree, fed by an [`ObserverBus`].
///
/// The rows are borrowed from shared state: hold the [`Ref`] returned by
/// [`TreeFlattener::items`] only between mutations.
pub struct TreeFlattener {
    feed: FlatFeed,
    token: ObserverToken,
}

impl TreeFlattener {
    /// Attach a new, empty flat view to `bus`.
    pub fn new(bus: &ObserverBus, options: FlattenerOptions) -> Self {
        let feed = FlatFeed::new(options);
        let token = bus.attach(feed.clone());
        Self { feed, token }
    }

    /// Attach to `bus` using the children attribute of `tree`.
    ///
    /// If `tree` already wraps a record, the flat view starts out as its
    /// current projection.
    pub fn for_tree(
        tree: &TreeWrapper,
        bus: &ObserverBus,
        options: FlattenerOptions,
    ) -> Self {
        let flattener =
            Self::new(bus, options.children_prop(tree.children_prop()));
        if let Some(root) = tree.root() {
            flattener.seed(tree, &root);
        }
        flattener
    }

    fn seed(&self, tree: &TreeWrapper, root: &RecordRef) {
        let include_root = {
            let mut flat = self.feed.state.borrow_mut();
            flat.reset(root);
            flat.options.include_root
        };
        tree.traverse(root, |item, _, _, depth| {
            if depth > 0 || include_root {
                self.feed.push(item.clone(), tree.id_of(item), depth);
            }
        });
        debug!("flat view seeded with {} rows", self.len());
    }

    /// Subscription token, for [`ObserverBus::detach`].
    pub fn token(&self) -> ObserverToken {
        self.token
    }

    pub fn items(&self) -> Ref<'_, [FlatItem]> {
        Ref::map(self.feed.state.borrow(), |state| state.items.as_slice())
    }

    pub fn get(&self, index: usize) -> Option<Ref<'_, FlatItem>> {
        Ref::filter_map(self.feed.state.borrow(), |state| {
            state.items.get(index)
        })
        .ok()
    }

    pub fn len(&self) -> usize {
        self.feed.state.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feed.state.borrow().items.is_empty()
    }

    /// Owned copy of the rows.
    pub fn snapshot(&self) -> Vec<FlatItem> {
        self.feed.state.borrow().items.clone()
    }

    /// Flat index of the row showing `record`.
    pub fn position_of(&self, record: &RecordRef) -> Option<usize> {
        self.feed
            .state
            .borrow()
            .items
            .iter()
            .position(|row| row.item.ptr_eq(record))
    }
}

impl fmt::Debug for TreeFlattener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.feed.state.borrow();
        f.debug_struct("TreeFlattener")
            .field("options", &state.options)
            .field("hook", &self.feed.hook.borrow().is_some())
            .field("rows", &state.items.len())
            .field("token", &self.token)
            .finish()
    }
}

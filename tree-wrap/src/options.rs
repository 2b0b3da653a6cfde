use std::fmt;

use serde_json::Value;

use crate::error::Result;
use crate::event::{AddEvent, InitEvent, MoveEvent, RemoveEvent};
use crate::flattener::FlatItem;
use crate::observer::{Callbacks, ObserverBus};
use crate::record::{DEFAULT_CHILDREN_PROP, ItemId, RecordRef};

/// Identity function: `(item, parent) -> id`. `parent` is `None` for the root.
pub type ItemIdFn = Box<dyn FnMut(&RecordRef, Option<&RecordRef>) -> ItemId>;

/// Hook run on every freshly built flat item, with the optional state value
/// that was passed to `add_child`.
pub type WrapperCreatedFn = Box<dyn FnMut(&mut FlatItem, Option<&Value>)>;

/// Configuration for [`TreeWrapper`](crate::TreeWrapper).
pub struct TreeOptions {
    pub(crate) children_prop: String,
    pub(crate) item_id: Option<ItemIdFn>,
    pub(crate) observer: Option<ObserverBus>,
    pub(crate) callbacks: Callbacks,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            children_prop: DEFAULT_CHILDREN_PROP.to_owned(),
            item_id: None,
            observer: None,
            callbacks: Callbacks::default(),
        }
    }
}

impl TreeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute holding each record's children.
    #[must_use]
    pub fn children_prop(mut self, prop: impl Into<String>) -> Self {
        self.children_prop = prop.into();
        self
    }

    /// Function assigning ids on wrap and on every add. Enables the
    /// parent-by-id index.
    #[must_use]
    pub fn item_id<F>(mut self, item_id: F) -> Self
    where
        F: FnMut(&RecordRef, Option<&RecordRef>) -> ItemId + 'static,
    {
        self.item_id = Some(Box::new(item_id));
        self
    }

    /// Deliver events to every subscriber of `bus`.
    #[must_use]
    pub fn observer(mut self, bus: ObserverBus) -> Self {
        self.observer = Some(bus);
        self
    }

    /// Replace all direct callbacks at once.
    #[must_use]
    pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    #[must_use]
    pub fn on_init<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&InitEvent) -> Result<()> + 'static,
    {
        self.callbacks = std::mem::take(&mut self.callbacks).with_init(handler);
        self
    }

    #[must_use]
    pub fn on_add<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&AddEvent) -> Result<()> + 'static,
    {
        self.callbacks = std::mem::take(&mut self.callbacks).with_add(handler);
        self
    }

    #[must_use]
    pub fn on_remove<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&RemoveEvent) -> Result<()> + 'static,
    {
        self.callbacks =
            std::mem::take(&mut self.callbacks).with_remove(handler);
        self
    }

    #[must_use]
    pub fn on_move<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&MoveEvent) -> Result<()> + 'static,
    {
        self.callbacks = std::mem::take(&mut self.callbacks).with_move(handler);
        self
    }
}

impl fmt::Debug for TreeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeOptions")
            .field("children_prop", &self.children_prop)
            .field("item_id", &self.item_id.is_some())
            .field("observer", &self.observer)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

/// Configuration for [`TreeFlattener`](crate::TreeFlattener).
pub struct FlattenerOptions {
    pub(crate) include_root: bool,
    pub(crate) children_prop: String,
    pub(crate) on_wrapper_created: Option<WrapperCreatedFn>,
}

impl Default for FlattenerOptions {
    fn default() -> Self {
        Self {
            include_root: true,
            children_prop: DEFAULT_CHILDREN_PROP.to_owned(),
            on_wrapper_created: None,
        }
    }
}

impl FlattenerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the depth-0 record gets a row.
    #[must_use]
    pub fn include_root(mut self, include: bool) -> Self {
        self.include_root = include;
        self
    }

    /// Attribute read when measuring removed subtrees. Must match the tree's.
    #[must_use]
    pub fn children_prop(mut self, prop: impl Into<String>) -> Self {
        self.children_prop = prop.into();
        self
    }

    #[must_use]
    pub fn on_wrapper_created<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&mut FlatItem, Option<&Value>) + 'static,
    {
        self.on_wrapper_created = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for FlattenerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlattenerOptions")
            .field("include_root", &self.include_root)
            .field("children_prop", &self.children_prop)
            .field("on_wrapper_created", &self.on_wrapper_created.is_some())
            .finish()
    }
}

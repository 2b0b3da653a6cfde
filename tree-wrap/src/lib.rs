//! Editable record trees with a live, depth-tagged flat projection.
//!
//! The crate is built from three pieces:
//! - [`TreeWrapper`] binds a nested record graph and hands out
//!   [`TreeHandle`]s for navigation and structural edits (add, remove,
//!   move within or across parents).
//! - [`ObserverBus`] fans every structural event out to its subscribers,
//!   in registration order.
//! - [`TreeFlattener`] subscribes to a bus and keeps the pre-order list of
//!   [`FlatItem`]s in sync, touching only the rows of the edited subtree.
//!
//! A typical setup wires all three together:
//!
//! ```
//! use serde_json::json;
//! use tree_wrap::{
//!     FlattenerOptions, ObserverBus, RecordRef, TreeFlattener, TreeOptions,
//!     TreeWrapper,
//! };
//!
//! let bus = ObserverBus::new();
//! let tree = TreeWrapper::new(TreeOptions::new().observer(bus.clone()));
//! let flat = TreeFlattener::for_tree(&tree, &bus, FlattenerOptions::new());
//!
//! let root = tree.wrap_json(json!({ "items": [{ "name": "a" }] }))?;
//! let b = RecordRef::from_json(json!({ "name": "b" }), "items")?;
//! root.add_child(1, b, None)?;
//!
//! let depths: Vec<usize> = flat.items().iter().map(|row| row.depth).collect();
//! assert_eq!(depths, vec![0, 1, 1]);
//! # Ok::<(), tree_wrap::TreeError>(())
//! ```
//!
//! Everything is single-threaded: records are shared through `Rc`, and
//! observers run synchronously inside the mutation that caused them.

mod error;
mod event;
mod flattener;
mod observer;
mod options;
mod record;
mod wrapper;

pub use error::{ErrorKind, Result, TreeError};
pub use event::{AddEvent, InitEvent, MoveEvent, RemoveEvent};
pub use flattener::{FlatItem, FlatKey, TreeFlattener};
pub use observer::{
    Callbacks, ObserverBus, ObserverToken, SharedObserver, TreeObserver,
};
pub use options::{FlattenerOptions, ItemIdFn, TreeOptions, WrapperCreatedFn};
pub use record::{DEFAULT_CHILDREN_PROP, ItemId, ItemIds, Record, RecordRef};
pub use wrapper::{TreeHandle, TreeWrapper};

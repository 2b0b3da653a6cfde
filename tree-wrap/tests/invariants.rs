//! Property-based invariant tests for the flat view under random edits.
//!
//! A generated sequence of add, remove and move operations is applied to a
//! wrapped tree, with the root both shown and hidden. After every step:
//!
//! 1. The flat rows match a fresh pre-order walk of the tree, row by row,
//!    in depth and record identity.
//! 2. Every row carries the id the wrapper has indexed for its record.
//! 3. The parent-by-id index points at each record's actual parent.
//! 4. Row keys are unique.
//! 5. A move rejected with `MoveUnderItself` leaves the tree untouched.

use std::collections::HashSet;

use proptest::prelude::*;
use serde_json::{Value, json};
use tree_wrap::{
    FlattenerOptions, ItemIds, ObserverBus, RecordRef, TreeError,
    TreeFlattener, TreeHandle, TreeOptions, TreeWrapper,
};

// ── Helpers ─────────────────────────────────────────────────────────────

/// One edit. `node` and `dest` pick a record by pre-order position, modulo
/// the current record count; child indices may run past the end.
#[derive(Debug, Clone)]
enum Edit {
    Add {
        node: usize,
        index: usize,
        children: usize,
    },
    Remove {
        node: usize,
        index: usize,
    },
    Move {
        node: usize,
        from: usize,
        to: usize,
    },
    MoveTo {
        node: usize,
        from: usize,
        dest: usize,
        to: usize,
    },
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (any::<usize>(), 0usize..6, 0usize..3).prop_map(
            |(node, index, children)| Edit::Add {
                node,
                index,
                children,
            }
        ),
        (any::<usize>(), 0usize..4)
            .prop_map(|(node, index)| Edit::Remove { node, index }),
        (any::<usize>(), 0usize..4, 0usize..6)
            .prop_map(|(node, from, to)| Edit::Move { node, from, to }),
        (any::<usize>(), 0usize..4, any::<usize>(), 0usize..6).prop_map(
            |(node, from, dest, to)| Edit::MoveTo {
                node,
                from,
                dest,
                to,
            }
        ),
    ]
}

struct Harness {
    tree: TreeWrapper,
    flat: TreeFlattener,
    root: TreeHandle,
    include_root: bool,
    created: usize,
}

impl Harness {
    fn new(include_root: bool) -> Self {
        let bus = ObserverBus::new();
        let tree = TreeWrapper::new(
            TreeOptions::new()
                .observer(bus.clone())
                .item_id(ItemIds::sequential(1)),
        );
        let flat = TreeFlattener::for_tree(
            &tree,
            &bus,
            FlattenerOptions::new().include_root(include_root),
        );
        let root = tree
            .wrap_json(json!({ "name": "root", "items": [
                { "name": "a", "items": [{ "name": "a1" }, { "name": "a2" }] },
                { "name": "b" },
                { "name": "c", "items": [{ "name": "c1" }] }
            ]}))
            .unwrap();
        Self {
            tree,
            flat,
            root,
            include_root,
            created: 0,
        }
    }

    /// Handles for every record, in pre-order.
    fn nodes(&self) -> Vec<TreeHandle> {
        let mut records = Vec::new();
        self.root.traverse(|item, parent, _, _| {
            records.push((item.clone(), parent.cloned()));
        });
        records
            .into_iter()
            .map(|(item, parent)| self.tree.handle_with_parent(item, parent))
            .collect()
    }

    fn new_record(&mut self, children: usize) -> RecordRef {
        self.created += 1;
        let name = format!("n{}", self.created);
        let items: Vec<Value> = (0..children)
            .map(|child| json!({ "name": format!("{name}.{child}") }))
            .collect();
        RecordRef::from_json(json!({ "name": name, "items": items }), "items")
            .unwrap()
    }

    fn apply(&mut self, edit: &Edit) -> Result<(), TestCaseError> {
        let nodes = self.nodes();
        let pick = |position: usize| nodes[position % nodes.len()].clone();

        let outcome = match *edit {
            Edit::Add {
                node,
                index,
                children,
            } => {
                let item = self.new_record(children);
                pick(node).add_child(index, item, None)
            },
            Edit::Remove { node, index } => {
                pick(node).remove_child(index).map(|_| ())
            },
            Edit::Move { node, from, to } => {
                pick(node).move_child(from, to).map(|_| ())
            },
            Edit::MoveTo {
                node,
                from,
                dest,
                to,
            } => {
                let before = self.root.unwrap().to_json("items");
                let moved = pick(node).move_child_to(from, &pick(dest), to);
                if let Err(TreeError::MoveUnderItself) = moved {
                    let after = self.root.unwrap().to_json("items");
                    prop_assert_eq!(after, before);
                    return Ok(());
                }
                moved.map(|_| ())
            },
        };
        outcome.map_err(|err| TestCaseError::fail(err.to_string()))
    }

    fn check_in_sync(&self) -> Result<(), TestCaseError> {
        let mut expected = Vec::new();
        self.root.traverse(|item, parent, _, depth| {
            if self.include_root || depth > 0 {
                expected.push((depth, item.clone(), parent.cloned()));
            }
        });
        let rows = self.flat.snapshot();

        let row_depths: Vec<usize> = rows.iter().map(|row| row.depth).collect();
        let tree_depths: Vec<usize> =
            expected.iter().map(|(depth, _, _)| *depth).collect();
        prop_assert_eq!(row_depths, tree_depths);

        for (row, (_, item, parent)) in rows.iter().zip(&expected) {
            prop_assert!(row.item.ptr_eq(item));

            let id = self.tree.id_of(&row.item);
            prop_assert!(id.is_some());
            prop_assert_eq!(&row.id, &id);

            let indexed = id.and_then(|id| self.tree.parent_of(&id));
            let agrees = match (indexed, parent) {
                (Some(Some(indexed)), Some(parent)) => indexed.ptr_eq(parent),
                (Some(None), None) => true,
                _ => false,
            };
            prop_assert!(agrees);
        }

        let keys: HashSet<_> = rows.iter().map(|row| row.key()).collect();
        prop_assert_eq!(keys.len(), rows.len());
        Ok(())
    }
}

// ═════════════════════════════════════════════════════════════════════════
// Flat view follows every edit
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn flat_view_tracks_random_edits(
        include_root in any::<bool>(),
        edits in prop::collection::vec(edit_strategy(), 1..40),
    ) {
        let mut harness = Harness::new(include_root);
        harness.check_in_sync()?;
        for edit in &edits {
            harness.apply(edit)?;
            harness.check_in_sync()?;
        }
    }
}

//! Tree lifecycle notifications.
//!
//! [`TreeObserver`] is the consumer interface: all methods default to a no-op
//! so an implementation only overrides the events it cares about. The
//! [`ObserverBus`] fans every event out to its subscribers in registration
//! order, and [`Callbacks`] adapts plain closures for callers that do not
//! want a dedicated type.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::error::Result;
use crate::event::{AddEvent, InitEvent, MoveEvent, RemoveEvent};

/// Trait implemented by consumers of tree events.
///
/// Events are delivered synchronously from inside the mutation that caused
/// them. Returning an error aborts delivery to later subscribers and is
/// surfaced to the caller of the mutation.
pub trait TreeObserver {
    fn on_init(&mut self, _event: &InitEvent) -> Result<()> {
        Ok(())
    }

    fn on_add(&mut self, _event: &AddEvent) -> Result<()> {
        Ok(())
    }

    fn on_remove(&mut self, _event: &RemoveEvent) -> Result<()> {
        Ok(())
    }

    fn on_move(&mut self, _event: &MoveEvent) -> Result<()> {
        Ok(())
    }
}

/// Observer shared between the bus and whoever else needs to read it.
pub type SharedObserver = Rc<RefCell<dyn TreeObserver>>;

/// Handle returned by [`ObserverBus::attach`], used to detach again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

#[derive(Default)]
struct BusState {
    next_token: u64,
    subscribers: Vec<(ObserverToken, SharedObserver)>,
}

/// Multi-subscriber dispatcher for tree events.
///
/// Cloning yields another handle to the same subscriber list.
#[derive(Clone, Default)]
pub struct ObserverBus {
    state: Rc<RefCell<BusState>>,
}

impl ObserverBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer owned by the bus.
    pub fn attach<O>(&self, observer: O) -> ObserverToken
    where
        O: TreeObserver + 'static,
    {
        self.attach_shared(Rc::new(RefCell::new(observer)))
    }

    /// Register an observer the caller keeps a handle to.
    pub fn attach_shared(&self, observer: SharedObserver) -> ObserverToken {
        let mut state = self.state.borrow_mut();
        let token = ObserverToken(state.next_token);
        state.next_token += 1;
        state.subscribers.push((token, observer));
        debug!(
            "observer attached: token={}, subscribers={}",
            token.0,
            state.subscribers.len()
        );
        token
    }

    /// Remove a subscriber. Returns `false` if the token was unknown.
    pub fn detach(&self, token: ObserverToken) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.subscribers.len();
        state.subscribers.retain(|(candidate, _)| *candidate != token);
        let removed = state.subscribers.len() != before;
        if removed {
            debug!("observer detached: token={}", token.0);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.state.borrow().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().subscribers.is_empty()
    }

    fn dispatch<F>(&self, mut deliver: F) -> Result<()>
    where
        F: FnMut(&mut dyn TreeObserver) -> Result<()>,
    {
        // Subscribers attached while dispatching only see the next event.
        let subscribers: Vec<SharedObserver> = self
            .state
            .borrow()
            .subscribers
            .iter()
            .map(|(_, observer)| Rc::clone(observer))
            .collect();

        for observer in subscribers {
            deliver(&mut *observer.borrow_mut())?;
        }
        Ok(())
    }
}

impl fmt::Debug for ObserverBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverBus")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl TreeObserver for ObserverBus {
    fn on_init(&mut self, event: &InitEvent) -> Result<()> {
        self.dispatch(|observer| observer.on_init(event))
    }

    fn on_add(&mut self, event: &AddEvent) -> Result<()> {
        self.dispatch(|observer| observer.on_add(event))
    }

    fn on_remove(&mut self, event: &RemoveEvent) -> Result<()> {
        self.dispatch(|observer| observer.on_remove(event))
    }

    fn on_move(&mut self, event: &MoveEvent) -> Result<()> {
        self.dispatch(|observer| observer.on_move(event))
    }
}

type Handler<E> = Box<dyn FnMut(&E) -> Result<()>>;

/// Closure-based observer, for callers that only need a couple of hooks.
#[derive(Default)]
pub struct Callbacks {
    on_init: Option<Handler<InitEvent>>,
    on_add: Option<Handler<AddEvent>>,
    on_remove: Option<Handler<RemoveEvent>>,
    on_move: Option<Handler<MoveEvent>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_init<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&InitEvent) -> Result<()> + 'static,
    {
        self.on_init = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn with_add<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&AddEvent) -> Result<()> + 'static,
    {
        self.on_add = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn with_remove<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&RemoveEvent) -> Result<()> + 'static,
    {
        self.on_remove = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn with_move<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&MoveEvent) -> Result<()> + 'static,
    {
        self.on_move = Some(Box::new(handler));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.on_init.is_none()
            && self.on_add.is_none()
            && self.on_remove.is_none()
            && self.on_move.is_none()
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_init", &self.on_init.is_some())
            .field("on_add", &self.on_add.is_some())
            .field("on_remove", &self.on_remove.is_some())
            .field("on_move", &self.on_move.is_some())
            .finish()
    }
}

impl TreeObserver for Callbacks {
    fn on_init(&mut self, event: &InitEvent) -> Result<()> {
        match self.on_init.as_mut() {
            Some(handler) => handler(event),
            None => Ok(()),
        }
    }

    fn on_add(&mut self, event: &AddEvent) -> Result<()> {
        match self.on_add.as_mut() {
            Some(handler) => handler(event),
            None => Ok(()),
        }
    }

    fn on_remove(&mut self, event: &RemoveEvent) -> Result<()> {
        match self.on_remove.as_mut() {
            Some(handler) => handler(event),
            None => Ok(()),
        }
    }

    fn on_move(&mut self, event: &MoveEvent) -> Result<()> {
        match self.on_move.as_mut() {
            Some(handler) => handler(event),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TreeError;
    use crate::record::RecordRef;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
    }

    impl TreeObserver for Recorder {
        fn on_add(&mut self, event: &AddEvent) -> Result<()> {
            self.log
                .borrow_mut()
                .push(format!("{}:add@{}", self.name, event.index));
            Ok(())
        }
    }

    struct Failing;

    impl TreeObserver for Failing {
        fn on_add(&mut self, _event: &AddEvent) -> Result<()> {
            Err(TreeError::MissingParent)
        }
    }

    fn add_event(index: usize) -> AddEvent {
        AddEvent {
            parent: RecordRef::default(),
            index,
            item: RecordRef::default(),
            id: None,
            descendant_ids: Vec::new(),
            state: None,
        }
    }

    fn remove_event() -> RemoveEvent {
        RemoveEvent {
            parent: RecordRef::default(),
            index: 0,
            item: RecordRef::default(),
        }
    }

    #[test]
    fn subscribers_run_in_registration_order() {
        let log = Log::default();
        let mut bus = ObserverBus::new();
        bus.attach(Recorder {
            name: "first",
            log: Rc::clone(&log),
        });
        bus.attach(Recorder {
            name: "second",
            log: Rc::clone(&log),
        });

        bus.on_add(&add_event(3)).unwrap();

        assert_eq!(*log.borrow(), vec!["first:add@3", "second:add@3"]);
    }

    #[test]
    fn missing_handlers_are_skipped() {
        let log = Log::default();
        let mut bus = ObserverBus::new();
        bus.attach(Recorder {
            name: "only-add",
            log: Rc::clone(&log),
        });

        bus.on_remove(&remove_event()).unwrap();

        assert!(log.borrow().is_empty());
    }

    #[test]
    fn subscriber_error_stops_later_subscribers() {
        let log = Log::default();
        let mut bus = ObserverBus::new();
        bus.attach(Failing);
        bus.attach(Recorder {
            name: "late",
            log: Rc::clone(&log),
        });

        let result = bus.on_add(&add_event(0));

        assert!(matches!(result, Err(TreeError::MissingParent)));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn detached_subscribers_no_longer_receive_events() {
        let log = Log::default();
        let mut bus = ObserverBus::new();
        let token = bus.attach(Recorder {
            name: "gone",
            log: Rc::clone(&log),
        });
        assert_eq!(bus.len(), 1);

        assert!(bus.detach(token));
        assert!(!bus.detach(token));
        assert!(bus.is_empty());

        bus.on_add(&add_event(0)).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn clones_share_the_subscriber_list() {
        let log = Log::default();
        let bus = ObserverBus::new();
        let mut other = bus.clone();
        bus.attach(Recorder {
            name: "shared",
            log: Rc::clone(&log),
        });

        other.on_add(&add_event(1)).unwrap();

        assert_eq!(*log.borrow(), vec!["shared:add@1"]);
    }

    #[test]
    fn callbacks_forward_to_configured_closures() {
        let log = Log::default();
        let sink = Rc::clone(&log);
        let mut callbacks = Callbacks::new().with_remove(move |event| {
            sink.borrow_mut().push(format!("remove@{}", event.index));
            Ok(())
        });
        assert!(!callbacks.is_empty());

        callbacks.on_add(&add_event(0)).unwrap();
        callbacks.on_remove(&remove_event()).unwrap();

        assert_eq!(*log.borrow(), vec!["remove@0"]);
    }
}

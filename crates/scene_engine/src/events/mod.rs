//! Event channel
//!
//! Explicit callback registration used by scene nodes (transform updates) and
//! by the renderer (context loss, init failure, frame hooks).
//! - Listeners registered per event kind
//! - Dispatch in subscription order
//! - A listener returning [`Propagation::StopImmediate`] halts the remaining
//!   listeners for that fire only

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Something that can be dispatched through an [`EventChannel`]
pub trait Event {
    /// Key listeners subscribe to
    type Kind: Copy + Eq + Hash + fmt::Debug;

    /// Kind of this event instance
    fn kind(&self) -> Self::Kind;
}

/// Returned by listeners to control dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// Keep notifying later listeners
    #[default]
    Continue,
    /// Skip every remaining listener for this fire
    StopImmediate,
}

/// Handle returned by [`EventChannel::on`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<E> = Box<dyn FnMut(&E) -> Propagation>;

struct Listener<E> {
    id: ListenerId,
    once: bool,
    callback: Callback<E>,
}

/// Publish/subscribe channel keyed by event kind
pub struct EventChannel<E: Event> {
    listeners: HashMap<E::Kind, Vec<Listener<E>>>,
    next_id: u64,
}

impl<E: Event> EventChannel<E> {
    /// Create an empty channel
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
            next_id: 0,
        }
    }

    fn register(&mut self, kind: E::Kind, once: bool, callback: Callback<E>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners
            .entry(kind)
            .or_default()
            .push(Listener { id, once, callback });
        id
    }

    /// Subscribe to every event of `kind`
    pub fn on<F>(&mut self, kind: E::Kind, listener: F) -> ListenerId
    where
        F: FnMut(&E) -> Propagation + 'static,
    {
        self.register(kind, false, Box::new(listener))
    }

    /// Subscribe to the next event of `kind` only
    pub fn once<F>(&mut self, kind: E::Kind, listener: F) -> ListenerId
    where
        F: FnMut(&E) -> Propagation + 'static,
    {
        self.register(kind, true, Box::new(listener))
    }

    /// Remove one listener. Returns false if it was not registered.
    pub fn off(&mut self, kind: E::Kind, id: ListenerId) -> bool {
        let Some(list) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| l.id != id);
        before != list.len()
    }

    /// Remove every listener for `kind`
    pub fn off_all(&mut self, kind: E::Kind) {
        self.listeners.remove(&kind);
    }

    /// Whether anything listens for `kind`
    pub fn has_listeners(&self, kind: E::Kind) -> bool {
        self.listeners.get(&kind).is_some_and(|l| !l.is_empty())
    }

    /// Dispatch an event. Returns true if a listener stopped propagation.
    pub fn fire(&mut self, event: &E) -> bool {
        let Some(list) = self.listeners.get_mut(&event.kind()) else {
            return false;
        };

        let mut stopped = false;
        let mut fired_once = Vec::new();
        for listener in list.iter_mut() {
            let result = (listener.callback)(event);
            if listener.once {
                fired_once.push(listener.id);
            }
            if result == Propagation::StopImmediate {
                stopped = true;
                break;
            }
        }

        if !fired_once.is_empty() {
            list.retain(|l| !fired_once.contains(&l.id));
        }
        stopped
    }
}

impl<E: Event> Default for EventChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> fmt::Debug for EventChannel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<_, _> = self
            .listeners
            .iter()
            .map(|(kind, list)| (*kind, list.len()))
            .collect();
        f.debug_struct("EventChannel")
            .field("listeners", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestKind {
        Clicked,
        Hovered,
    }

    struct TestEvent(TestKind, u32);

    impl Event for TestEvent {
        type Kind = TestKind;

        fn kind(&self) -> TestKind {
            self.0
        }
    }

    #[test]
    fn test_dispatch_in_subscription_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut channel = EventChannel::<TestEvent>::new();

        for tag in ["a", "b", "c"] {
            let log = Rc::clone(&log);
            channel.on(TestKind::Clicked, move |e| {
                log.borrow_mut().push((tag, e.1));
                Propagation::Continue
            });
        }

        assert!(!channel.fire(&TestEvent(TestKind::Clicked, 7)));
        assert_eq!(*log.borrow(), vec![("a", 7), ("b", 7), ("c", 7)]);
    }

    #[test]
    fn test_stop_immediate_halts_remaining_listeners() {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut channel = EventChannel::<TestEvent>::new();

        let h = Rc::clone(&hits);
        channel.on(TestKind::Clicked, move |_| {
            h.borrow_mut().push(1);
            Propagation::StopImmediate
        });
        let h = Rc::clone(&hits);
        channel.on(TestKind::Clicked, move |_| {
            h.borrow_mut().push(2);
            Propagation::Continue
        });

        assert!(channel.fire(&TestEvent(TestKind::Clicked, 0)));
        // The next fire dispatches again from the first listener
        assert!(channel.fire(&TestEvent(TestKind::Clicked, 0)));
        assert_eq!(*hits.borrow(), vec![1, 1]);
    }

    #[test]
    fn test_off_and_once() {
        let count = Rc::new(RefCell::new(0));
        let mut channel = EventChannel::<TestEvent>::new();

        let c = Rc::clone(&count);
        let id = channel.on(TestKind::Hovered, move |_| {
            *c.borrow_mut() += 1;
            Propagation::Continue
        });
        let c = Rc::clone(&count);
        channel.once(TestKind::Hovered, move |_| {
            *c.borrow_mut() += 10;
            Propagation::Continue
        });

        channel.fire(&TestEvent(TestKind::Hovered, 0));
        channel.fire(&TestEvent(TestKind::Hovered, 0));
        assert_eq!(*count.borrow(), 12);

        assert!(channel.off(TestKind::Hovered, id));
        assert!(!channel.off(TestKind::Hovered, id));
        assert!(!channel.has_listeners(TestKind::Hovered));
        channel.fire(&TestEvent(TestKind::Hovered, 0));
        assert_eq!(*count.borrow(), 12);
    }
}

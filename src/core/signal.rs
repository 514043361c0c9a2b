//! Notification channels owned by the object that emits them.
//!
//! A `Signal` is a plain observer list. Emitting never holds a borrow while
//! a subscriber runs, so subscribers may subscribe, unsubscribe, clear or
//! emit on the same signal from inside their callback. A value emitted from
//! inside a subscriber is queued and delivered to the current subscribers
//! once the value in flight has reached all of them.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;

/// Handle returned by `Signal::subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Slot<T> = (SubscriptionId, Box<dyn FnMut(&T)>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Keep,
    Detach,
}

pub struct Signal<T> {
    slots: RefCell<Vec<Slot<T>>>,
    /// Ids removed while their slot was out for emission.
    removed: RefCell<Vec<SubscriptionId>>,
    queued: RefCell<VecDeque<(T, Delivery)>>,
    emitting: Cell<bool>,
    /// Set by `clear` during an emission; applied when the emission ends.
    clear_requested: Cell<bool>,
    next_id: Cell<u64>,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
            removed: RefCell::new(Vec::new()),
            queued: RefCell::new(VecDeque::new()),
            emitting: Cell::new(false),
            clear_requested: Cell::new(false),
            next_id: Cell::new(0),
        }
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("subscribers", &self.len())
            .field("emitting", &self.emitting.get())
            .finish()
    }
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, slot: impl FnMut(&T) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.slots.borrow_mut().push((id, Box::new(slot)));
        id
    }

    /// Removes a subscriber. Returns false if it was not attached or is
    /// being called right now; in the latter case it is dropped once the
    /// emission ends.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut slots = self.slots.borrow_mut();
        if let Some(pos) = slots.iter().position(|(slot_id, _)| *slot_id == id) {
            slots.remove(pos);
            return true;
        }
        if self.emitting.get() {
            self.removed.borrow_mut().push(id);
        }
        false
    }

    /// Detaches every subscriber. During an emission the values already
    /// queued are still delivered first.
    pub fn clear(&self) {
        if self.emitting.get() {
            self.clear_requested.set(true);
            return;
        }
        self.slots.borrow_mut().clear();
        self.removed.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn deliver(&self, value: &T, delivery: Delivery) {
        let mut firing = std::mem::take(&mut *self.slots.borrow_mut());
        for (id, slot) in firing.iter_mut() {
            if self.removed.borrow().contains(id) {
                continue;
            }
            slot(value);
        }
        if delivery == Delivery::Detach {
            return;
        }
        let mut slots = self.slots.borrow_mut();
        let added = std::mem::take(&mut *slots);
        firing.extend(added);
        let removed = self.removed.borrow();
        firing.retain(|(id, _)| !removed.contains(id));
        *slots = firing;
    }
}

impl<T: Clone> Signal<T> {
    /// Calls every subscriber; subscribers stay attached.
    pub fn emit(&self, value: &T) {
        self.dispatch(value, Delivery::Keep);
    }

    /// Calls every current subscriber and detaches them. Subscribers added
    /// while firing stay attached.
    pub fn emit_once(&self, value: &T) {
        self.dispatch(value, Delivery::Detach);
    }

    fn dispatch(&self, value: &T, delivery: Delivery) {
        if self.emitting.get() {
            self.queued.borrow_mut().push_back((value.clone(), delivery));
            return;
        }
        self.emitting.set(true);
        self.deliver(value, delivery);
        loop {
            let next = self.queued.borrow_mut().pop_front();
            let Some((value, delivery)) = next else {
                break;
            };
            self.deliver(&value, delivery);
        }
        self.emitting.set(false);
        self.removed.borrow_mut().clear();
        if self.clear_requested.replace(false) {
            self.slots.borrow_mut().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn counter() -> (Rc<Cell<u32>>, impl FnMut(&u32) + 'static) {
        let hits = Rc::new(Cell::new(0));
        let inner = Rc::clone(&hits);
        (hits, move |v: &u32| inner.set(inner.get() + v))
    }

    #[test]
    fn emit_keeps_subscribers() {
        let signal = Signal::new();
        let (hits, slot) = counter();
        signal.subscribe(slot);
        signal.emit(&1);
        signal.emit(&2);
        assert_eq!(hits.get(), 3);
        assert_eq!(signal.len(), 1);
    }

    #[test]
    fn emit_once_detaches() {
        let signal = Signal::new();
        let (hits, slot) = counter();
        signal.subscribe(slot);
        signal.emit_once(&1);
        signal.emit_once(&1);
        signal.emit(&1);
        assert_eq!(hits.get(), 1);
        assert!(signal.is_empty());
    }

    #[test]
    fn emit_without_subscribers_is_fine() {
        let signal: Signal<u32> = Signal::new();
        signal.emit(&1);
        signal.emit_once(&1);
        assert!(signal.is_empty());
    }

    #[test]
    fn unsubscribe() {
        let signal = Signal::new();
        let (hits, slot) = counter();
        let id = signal.subscribe(slot);
        assert!(signal.unsubscribe(id));
        signal.emit(&1);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn unsubscribe_during_emit() {
        let signal: Rc<Signal<u32>> = Rc::new(Signal::new());
        let id_cell = Rc::new(Cell::new(None));
        let weak = Rc::downgrade(&signal);
        let id_for_slot = Rc::clone(&id_cell);
        let id = signal.subscribe(move |_| {
            if let (Some(signal), Some(id)) = (weak.upgrade(), id_for_slot.get()) {
                signal.unsubscribe(id);
            }
        });
        id_cell.set(Some(id));
        signal.emit(&1);
        assert!(signal.is_empty());
    }

    #[test]
    fn clear_during_emit_wins() {
        let signal: Rc<Signal<u32>> = Rc::new(Signal::new());
        let weak = Rc::downgrade(&signal);
        signal.subscribe(move |_| {
            if let Some(signal) = weak.upgrade() {
                signal.clear();
            }
        });
        let (hits, slot) = counter();
        signal.subscribe(slot);
        signal.emit(&1);
        assert!(signal.is_empty());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn emit_from_subscriber_reaches_everyone_in_order() {
        let signal: Rc<Signal<u32>> = Rc::new(Signal::new());
        let weak = Rc::downgrade(&signal);
        signal.subscribe(move |v| {
            if *v == 1 {
                if let Some(signal) = weak.upgrade() {
                    signal.emit(&2);
                }
            }
        });
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        signal.subscribe(move |v| sink.borrow_mut().push(*v));

        signal.emit(&1);
        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(signal.len(), 2);
    }

    #[test]
    fn clear_during_emit_delivers_queued_values_first() {
        let signal: Rc<Signal<u32>> = Rc::new(Signal::new());
        let weak = Rc::downgrade(&signal);
        signal.subscribe(move |v| {
            if let (1, Some(signal)) = (*v, weak.upgrade()) {
                signal.emit(&2);
                signal.clear();
            }
        });
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        signal.subscribe(move |v| sink.borrow_mut().push(*v));

        signal.emit(&1);
        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert!(signal.is_empty());
        signal.emit(&3);
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn unsubscribe_unknown_id_leaves_nothing_behind() {
        let signal = Signal::new();
        let (hits, slot) = counter();
        let id = signal.subscribe(slot);
        assert!(signal.unsubscribe(id));
        assert!(!signal.unsubscribe(id));
        assert!(signal.removed.borrow().is_empty());
        signal.emit(&1);
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn subscribe_during_emit_is_kept() {
        let signal: Rc<Signal<u32>> = Rc::new(Signal::new());
        let weak = Rc::downgrade(&signal);
        signal.subscribe(move |_| {
            if let Some(signal) = weak.upgrade() {
                signal.subscribe(|_| {});
            }
        });
        signal.emit(&1);
        assert_eq!(signal.len(), 2);
    }
}

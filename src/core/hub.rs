//! Process-wide event notifications, owned by the toolkit and passed to
//! every live event it builds.

use std::rc::Rc;
use tracing::info;

use crate::core::event::TextEvent;
use crate::core::signal::{Signal, SubscriptionId};

#[derive(Debug, Default)]
pub struct EventHub {
    any_event_entered: Signal<Rc<TextEvent>>,
    force_exit: Signal<()>,
}

impl EventHub {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Fires whenever any event built on this hub is entered.
    pub fn on_any_event_entered(&self) -> &Signal<Rc<TextEvent>> {
        &self.any_event_entered
    }

    /// Ask every live event to exit.
    pub fn force_exit_all(&self) {
        info!(target: "text_events::hub", live = self.force_exit.len(), "forcing all events to exit");
        self.force_exit.emit(&());
    }

    /// Number of events built on this hub that have not exited yet.
    pub fn live_events(&self) -> usize {
        self.force_exit.len()
    }

    pub(crate) fn attach(&self, slot: impl FnMut(&()) + 'static) -> SubscriptionId {
        self.force_exit.subscribe(slot)
    }

    pub(crate) fn detach(&self, id: SubscriptionId) {
        self.force_exit.unsubscribe(id);
    }
}

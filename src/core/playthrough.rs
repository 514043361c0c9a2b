//! Drives one live event by index, for terminal and browser views.

use rand::Rng;
use std::cell::Cell;
use std::rc::Rc;
use tracing::debug;

use crate::core::choice::Choice;
use crate::core::event::TextEvent;
use crate::core::outcome::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Choices are on offer.
    AwaitingChoice,
    /// An outcome's text is showing and waits to be acknowledged.
    ShowingOutcome,
    Finished,
}

/// Result of taking a choice.
#[derive(Debug, Clone)]
pub enum Step {
    /// An outcome to show, followed by the choice's post text if any.
    Outcome {
        outcome: Rc<Outcome>,
        post_text: Option<String>,
    },
    /// The event is over.
    Ended,
    /// The index did not name an offered choice, or nothing is on offer.
    Ignored,
}

#[derive(Debug)]
pub struct Playthrough {
    event: Rc<TextEvent>,
    offered: Vec<Rc<Choice>>,
    current: Option<Rc<Outcome>>,
    finished: Rc<Cell<bool>>,
}

impl Playthrough {
    /// Enter `event` and offer its top-level choices.
    pub fn start(event: Rc<TextEvent>) -> Self {
        let finished = Rc::new(Cell::new(event.is_exited()));
        let flag = Rc::clone(&finished);
        event.on_exited().subscribe(move |_| flag.set(true));
        event.enter();
        Self {
            offered: event.choices().to_vec(),
            event,
            current: None,
            finished,
        }
    }

    pub fn event(&self) -> &Rc<TextEvent> {
        &self.event
    }

    pub fn stage(&self) -> Stage {
        if self.finished.get() {
            Stage::Finished
        } else if self.current.is_some() {
            Stage::ShowingOutcome
        } else {
            Stage::AwaitingChoice
        }
    }

    pub fn is_finished(&self) -> bool {
        self.stage() == Stage::Finished
    }

    /// Choices the player can take right now.
    pub fn offered_choices(&self) -> &[Rc<Choice>] {
        match self.stage() {
            Stage::AwaitingChoice => &self.offered,
            _ => &[],
        }
    }

    /// The outcome waiting to be acknowledged.
    pub fn current_outcome(&self) -> Option<&Rc<Outcome>> {
        self.current.as_ref()
    }

    pub fn choose(&mut self, index: usize) -> Step {
        self.choose_with(index, &mut rand::thread_rng())
    }

    pub fn choose_with<R: Rng + ?Sized>(&mut self, index: usize, rng: &mut R) -> Step {
        let Some(choice) = self.offered_choices().get(index).cloned() else {
            debug!(target: "text_events::playthrough", index, stage = ?self.stage(), "choice ignored");
            return Step::Ignored;
        };
        self.offered.clear();
        let post_text = Some(choice.post_text().to_string()).filter(|t| !t.is_empty());
        match choice.pick_with(rng) {
            Some(outcome) if !outcome.is_final() => {
                self.current = Some(Rc::clone(&outcome));
                Step::Outcome { outcome, post_text }
            }
            _ => {
                self.event.exit();
                Step::Ended
            }
        }
    }

    /// Dismiss the current outcome's text and offer what follows it.
    pub fn acknowledge(&mut self) {
        let Some(outcome) = self.current.take() else {
            return;
        };
        outcome.acknowledge();
        if !self.finished.get() {
            self.offered = outcome.choices().to_vec();
        }
    }

    /// Leave the event early.
    pub fn abandon(&mut self) {
        self.current = None;
        self.offered.clear();
        self.event.exit();
    }
}

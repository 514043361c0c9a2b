//! Live text events: one dialogue node instantiated from its definition,
//! with choice eligibility resolved against the current game state.

use std::cell::Cell;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::choice::{Choice, ChoiceSelected};
use crate::core::hub::EventHub;
use crate::core::outcome::{Outcome, DEFAULT_ACKNOWLEDGMENT_TEXT};
use crate::core::registry::ActionRegistry;
use crate::core::signal::{Signal, SubscriptionId};
use crate::schema::event::{ChoiceDef, EventDef, EventId, OutcomeDef};
use crate::schema::value::AssetRef;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("event {id}: title is empty")]
    MissingTitle { id: EventId },
    #[error("event {id}: {path} has invalid weight {weight}")]
    InvalidWeight {
        id: EventId,
        path: String,
        weight: f32,
    },
    #[error("event {id}: {path} has an action without a callback name")]
    EmptyAction { id: EventId, path: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    Constructed,
    Entered,
    Exited,
}

/// Everything instantiation needs besides the definition itself.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub registry: Arc<ActionRegistry>,
    pub hub: Rc<EventHub>,
    /// Label of synthesized acknowledgment choices and of outcomes that
    /// do not author their own.
    pub acknowledgment_text: String,
}

impl BuildContext {
    pub fn new(registry: Arc<ActionRegistry>, hub: Rc<EventHub>) -> Self {
        Self {
            registry,
            hub,
            acknowledgment_text: DEFAULT_ACKNOWLEDGMENT_TEXT.to_string(),
        }
    }

    pub fn with_acknowledgment_text(mut self, text: impl Into<String>) -> Self {
        self.acknowledgment_text = text.into();
        self
    }
}

#[derive(Debug)]
pub struct TextEvent {
    id: EventId,
    title: String,
    body: String,
    media: Option<AssetRef>,
    labels: Vec<String>,
    ban_after_use: bool,
    enabled: bool,
    debug: bool,
    choices: Vec<Rc<Choice>>,
    entry_outcome: Option<Rc<Outcome>>,
    state: Cell<EventState>,
    hub: Rc<EventHub>,
    hub_subscription: Cell<Option<SubscriptionId>>,
    me: Weak<TextEvent>,
    on_entered: Signal<()>,
    on_exited: Signal<Rc<TextEvent>>,
    on_choice_selected: Signal<ChoiceSelected>,
    on_final_choice: Signal<ChoiceSelected>,
}

impl TextEvent {
    /// Build a live event from its definition.
    ///
    /// Choices whose condition evaluates false are left out, at every
    /// nesting level. Events or non-final outcomes without choices get a
    /// synthesized acknowledgment choice so the player can always move on.
    pub fn instantiate(def: &EventDef, ctx: &BuildContext) -> Result<Rc<TextEvent>, BuildError> {
        check_event(def)?;

        let mut choices = build_choices(&def.choices, ctx);
        if choices.is_empty() {
            if !def.choices.is_empty() {
                warn!(
                    target: "text_events::event",
                    event = %def.id,
                    title = %def.title,
                    "every choice was filtered out; offering an acknowledgment instead"
                );
            }
            choices.push(acknowledgment_choice(ctx));
        }
        let entry_outcome = def
            .entry_outcome
            .as_ref()
            .map(|o| build_outcome(o, ctx));

        let event = Rc::new_cyclic(|me| TextEvent {
            id: def.id,
            title: def.title.clone(),
            body: def.body.clone(),
            media: def.media.clone(),
            labels: def.labels.clone(),
            ban_after_use: def.ban_after_use,
            enabled: def.enabled,
            debug: def.debug,
            choices,
            entry_outcome,
            state: Cell::new(EventState::Constructed),
            hub: Rc::clone(&ctx.hub),
            hub_subscription: Cell::new(None),
            me: me.clone(),
            on_entered: Signal::new(),
            on_exited: Signal::new(),
            on_choice_selected: Signal::new(),
            on_final_choice: Signal::new(),
        });
        event.wire();
        debug!(
            target: "text_events::event",
            event = %event.id,
            choices = event.choices.len(),
            "event instantiated"
        );
        Ok(event)
    }

    fn wire(self: &Rc<Self>) {
        let me = Rc::downgrade(self);
        let id = self.hub.attach(move |_| {
            if let Some(event) = me.upgrade() {
                event.exit();
            }
        });
        self.hub_subscription.set(Some(id));

        self.track(&self.choices);
        for choice in &self.choices {
            let me = Rc::downgrade(self);
            choice.on_final_choice().subscribe(move |reached: &ChoiceSelected| {
                if let Some(event) = me.upgrade() {
                    event.finish(reached);
                }
            });
        }
    }

    /// Forwards selections of `choices`, and of the choices nested below
    /// whatever they lead to, to this event's selection notification.
    fn track(self: &Rc<Self>, choices: &[Rc<Choice>]) {
        for choice in choices {
            let me = Rc::downgrade(self);
            choice
                .on_choice_selected()
                .subscribe(move |selected: &ChoiceSelected| {
                    let Some(event) = me.upgrade() else {
                        return;
                    };
                    if event.state() == EventState::Exited {
                        return;
                    }
                    if let Some(outcome) = &selected.outcome {
                        event.track(outcome.choices());
                    }
                    event.on_choice_selected.emit(selected);
                });
        }
    }

    fn finish(&self, reached: &ChoiceSelected) {
        if self.state() == EventState::Exited {
            return;
        }
        self.on_final_choice.emit_once(reached);
        self.exit();
    }

    /// Mark the event as entered and announce it. Only the first call has
    /// any effect.
    pub fn enter(&self) {
        if self.state() != EventState::Constructed {
            debug!(target: "text_events::event", event = %self.id, state = ?self.state(), "enter ignored");
            return;
        }
        self.state.set(EventState::Entered);
        info!(target: "text_events::event", event = %self.id, title = %self.title, "event entered");
        if let Some(me) = self.me.upgrade() {
            self.hub.on_any_event_entered().emit(&me);
        }
        self.on_entered.emit(&());
        if let Some(outcome) = &self.entry_outcome {
            outcome.execute();
        }
    }

    /// Tear the event down: announce the exit, then drop every subscriber.
    /// Calling it again does nothing.
    pub fn exit(&self) {
        if self.state() == EventState::Exited {
            debug!(target: "text_events::event", event = %self.id, "already exited");
            return;
        }
        self.state.set(EventState::Exited);
        info!(target: "text_events::event", event = %self.id, "event exited");
        if let Some(me) = self.me.upgrade() {
            self.on_exited.emit(&me);
        }
        if let Some(id) = self.hub_subscription.take() {
            self.hub.detach(id);
        }
        self.on_entered.clear();
        self.on_exited.clear();
        self.on_choice_selected.clear();
        self.on_final_choice.clear();
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn media(&self) -> Option<&AssetRef> {
        self.media.as_ref()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn ban_after_use(&self) -> bool {
        self.ban_after_use
    }

    /// Whether the definition takes part in random draws.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Eligible top-level choices, in authored order.
    pub fn choices(&self) -> &[Rc<Choice>] {
        &self.choices
    }

    pub fn entry_outcome(&self) -> Option<&Rc<Outcome>> {
        self.entry_outcome.as_ref()
    }

    pub fn state(&self) -> EventState {
        self.state.get()
    }

    pub fn is_exited(&self) -> bool {
        self.state() == EventState::Exited
    }

    pub fn on_entered(&self) -> &Signal<()> {
        &self.on_entered
    }

    pub fn on_exited(&self) -> &Signal<Rc<TextEvent>> {
        &self.on_exited
    }

    /// Fires for every selection anywhere in this event's choice tree.
    pub fn on_choice_selected(&self) -> &Signal<ChoiceSelected> {
        &self.on_choice_selected
    }

    /// Fires once, when a branch of this event ends. The payload names the
    /// innermost choice that ended it.
    pub fn on_final_choice(&self) -> &Signal<ChoiceSelected> {
        &self.on_final_choice
    }

    /// Definition of the event as currently instantiated. Choices filtered
    /// out by their condition and synthesized choices are not included.
    pub fn to_def(&self) -> EventDef {
        EventDef {
            id: self.id,
            title: self.title.clone(),
            body: self.body.clone(),
            media: self.media.clone(),
            labels: self.labels.clone(),
            ban_after_use: self.ban_after_use,
            enabled: self.enabled,
            debug: self.debug,
            entry_outcome: self.entry_outcome.as_ref().map(|o| o.to_def()),
            choices: self
                .choices
                .iter()
                .filter(|c| !c.is_synthesized())
                .map(|c| c.to_def())
                .collect(),
        }
    }
}

impl Drop for TextEvent {
    fn drop(&mut self) {
        if let Some(id) = self.hub_subscription.take() {
            self.hub.detach(id);
        }
    }
}

fn check_event(def: &EventDef) -> Result<(), BuildError> {
    if def.title.trim().is_empty() {
        return Err(BuildError::MissingTitle { id: def.id });
    }
    if let Some(entry) = &def.entry_outcome {
        check_outcome(def.id, entry, "entry outcome")?;
    }
    check_choices(def.id, &def.choices, "")
}

fn check_choices(id: EventId, choices: &[ChoiceDef], prefix: &str) -> Result<(), BuildError> {
    for (c, choice) in choices.iter().enumerate() {
        for (r, result) in choice.results.iter().enumerate() {
            let path = format!("{}choice {} result {}", prefix, c, r);
            check_outcome(id, result, &path)?;
            check_choices(id, &result.choices, &format!("{} / ", path))?;
        }
    }
    Ok(())
}

fn check_outcome(id: EventId, outcome: &OutcomeDef, path: &str) -> Result<(), BuildError> {
    if !outcome.weight.is_finite() || outcome.weight < 0.0 {
        return Err(BuildError::InvalidWeight {
            id,
            path: path.to_string(),
            weight: outcome.weight,
        });
    }
    if outcome.actions.iter().any(|a| !a.is_valid()) {
        return Err(BuildError::EmptyAction {
            id,
            path: path.to_string(),
        });
    }
    Ok(())
}

fn build_choices(defs: &[ChoiceDef], ctx: &BuildContext) -> Vec<Rc<Choice>> {
    defs.iter()
        .filter_map(|def| {
            let results = def.results.iter().map(|r| build_outcome(r, ctx)).collect();
            let mut choice = Choice::new(def.text.clone(), results)
                .with_hover_text(def.hover_text.clone())
                .with_post_text(def.post_text.clone());
            if let Some(condition) = &def.condition {
                choice = choice.with_condition(condition.clone());
            }
            if choice.is_eligible(&ctx.registry) {
                Some(Rc::new(choice))
            } else {
                debug!(target: "text_events::event", choice = %def.text, "choice not eligible");
                None
            }
        })
        .collect()
}

fn build_outcome(def: &OutcomeDef, ctx: &BuildContext) -> Rc<Outcome> {
    let mut choices = build_choices(&def.choices, ctx);
    if !def.is_final() && choices.is_empty() {
        choices.push(acknowledgment_choice(ctx));
    }
    let mut outcome = Outcome::new(
        def.text.clone(),
        def.weight,
        def.actions.clone(),
        choices,
        &ctx.registry,
    );
    if let Some(text) = &def.acknowledgment_text {
        outcome = outcome.with_acknowledgment_text(text.clone());
    }
    Rc::new(outcome.with_default_acknowledgment(&ctx.acknowledgment_text))
}

/// A single "continue" option whose only outcome ends the branch.
fn acknowledgment_choice(ctx: &BuildContext) -> Rc<Choice> {
    let ending = Rc::new(Outcome::new(String::new(), 1.0, vec![], vec![], &ctx.registry));
    Rc::new(Choice::synthesized(ctx.acknowledgment_text.clone(), vec![ending]))
}

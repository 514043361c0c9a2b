//! Player-facing choices and the weighted pick.

use rand::Rng;
use std::cell::Cell;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

use crate::core::outcome::Outcome;
use crate::core::registry::ActionRegistry;
use crate::core::signal::Signal;
use crate::schema::call::SerializedCall;
use crate::schema::event::ChoiceDef;

/// Payload of the selection notifications: the choice that was taken and
/// the outcome it produced, if any.
#[derive(Debug, Clone)]
pub struct ChoiceSelected {
    pub choice: Rc<Choice>,
    pub outcome: Option<Rc<Outcome>>,
}

/// Index of the outcome a cumulative draw lands on.
///
/// `draw` is expected in `[0, total)`. The first outcome whose cumulative
/// weight meets or exceeds the draw wins; zero-weight outcomes are never
/// chosen unless every weight is zero, in which case the first one is.
pub fn select_weighted(weights: &[f32], draw: f64) -> usize {
    let mut cumulative = 0.0f64;
    let mut last_positive = None;
    for (index, weight) in weights.iter().enumerate() {
        let weight = sanitize(*weight);
        if weight <= 0.0 {
            continue;
        }
        cumulative += weight;
        last_positive = Some(index);
        if cumulative >= draw {
            return index;
        }
    }
    last_positive.unwrap_or(0)
}

fn sanitize(weight: f32) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight as f64
    } else {
        0.0
    }
}

#[derive(Debug)]
pub struct Choice {
    text: String,
    hover_text: String,
    post_text: String,
    condition: Option<SerializedCall>,
    results: Vec<Rc<Outcome>>,
    synthesized: bool,
    resolved: Cell<bool>,
    on_choice_selected: Signal<ChoiceSelected>,
    on_final_choice: Signal<ChoiceSelected>,
}

impl Choice {
    pub fn new(text: impl Into<String>, results: Vec<Rc<Outcome>>) -> Self {
        Self {
            text: text.into(),
            hover_text: String::new(),
            post_text: String::new(),
            condition: None,
            results,
            synthesized: false,
            resolved: Cell::new(false),
            on_choice_selected: Signal::new(),
            on_final_choice: Signal::new(),
        }
    }

    /// A choice made up by the engine so the player can always move on.
    /// Never written back to content.
    pub(crate) fn synthesized(text: impl Into<String>, results: Vec<Rc<Outcome>>) -> Self {
        Self {
            synthesized: true,
            ..Self::new(text, results)
        }
    }

    pub fn with_hover_text(mut self, text: impl Into<String>) -> Self {
        self.hover_text = text.into();
        self
    }

    pub fn with_post_text(mut self, text: impl Into<String>) -> Self {
        self.post_text = text.into();
        self
    }

    pub fn with_condition(mut self, condition: SerializedCall) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn hover_text(&self) -> &str {
        &self.hover_text
    }

    /// Shown after the choice is taken; empty means none.
    pub fn post_text(&self) -> &str {
        &self.post_text
    }

    pub fn condition(&self) -> Option<&SerializedCall> {
        self.condition.as_ref()
    }

    pub fn results(&self) -> &[Rc<Outcome>] {
        &self.results
    }

    pub fn is_synthesized(&self) -> bool {
        self.synthesized
    }

    /// True once the branch below this choice has ended.
    pub fn is_resolved(&self) -> bool {
        self.resolved.get()
    }

    pub fn on_choice_selected(&self) -> &Signal<ChoiceSelected> {
        &self.on_choice_selected
    }

    pub fn on_final_choice(&self) -> &Signal<ChoiceSelected> {
        &self.on_final_choice
    }

    /// Evaluates the gating predicate. Choices without a usable condition
    /// are always eligible; an unresolvable one is treated as false.
    pub fn is_eligible(&self, registry: &ActionRegistry) -> bool {
        match &self.condition {
            Some(condition) if condition.is_valid() => condition.evaluate(registry),
            _ => true,
        }
    }

    /// Pick an outcome using the thread-local generator.
    pub fn pick(self: &Rc<Self>) -> Option<Rc<Outcome>> {
        self.pick_with(&mut rand::thread_rng())
    }

    /// Pick an outcome, execute its actions and announce the selection.
    ///
    /// A choice with no outcomes ends its branch immediately and returns
    /// `None`; nothing executes and no selection is announced.
    pub fn pick_with<R: Rng + ?Sized>(self: &Rc<Self>, rng: &mut R) -> Option<Rc<Outcome>> {
        let outcome = match self.results.len() {
            0 => {
                debug!(target: "text_events::choice", choice = %self.text, "choice has no outcomes");
                self.finish(&ChoiceSelected {
                    choice: Rc::clone(self),
                    outcome: None,
                });
                return None;
            }
            1 => Rc::clone(&self.results[0]),
            _ => {
                let weights: Vec<f32> = self.results.iter().map(|r| r.weight()).collect();
                let total: f64 = weights.iter().map(|w| sanitize(*w)).sum();
                let index = if total > 0.0 {
                    select_weighted(&weights, rng.gen_range(0.0..total))
                } else {
                    0
                };
                trace!(target: "text_events::choice", choice = %self.text, index, total, "weighted draw");
                Rc::clone(&self.results[index])
            }
        };

        outcome.execute();
        let selected = ChoiceSelected {
            choice: Rc::clone(self),
            outcome: Some(Rc::clone(&outcome)),
        };

        // Wired before announcing, so a subscriber may carry on from inside
        // the selection notification.
        if !outcome.is_final() {
            self.await_branch_end(&outcome);
        }

        self.on_choice_selected.emit_once(&selected);
        if outcome.is_final() {
            self.finish(&selected);
        }
        Some(outcome)
    }

    /// Arranges for this choice to finish when the branch below a non-final
    /// outcome ends.
    fn await_branch_end(self: &Rc<Self>, outcome: &Rc<Outcome>) {
        if outcome.choices().is_empty() {
            // Nothing nested to wait for; the branch ends once the text is dismissed.
            let choice = Rc::downgrade(self);
            let acknowledged = Rc::downgrade(outcome);
            outcome.on_acknowledged().subscribe(move |_| {
                if let Some(choice) = choice.upgrade() {
                    let outcome = acknowledged.upgrade();
                    choice.finish(&ChoiceSelected {
                        choice: Rc::clone(&choice),
                        outcome,
                    });
                }
            });
            return;
        }
        for nested in outcome.choices() {
            let choice: Weak<Choice> = Rc::downgrade(self);
            nested.on_final_choice.subscribe(move |reached: &ChoiceSelected| {
                if let Some(choice) = choice.upgrade() {
                    choice.finish(reached);
                }
            });
        }
    }

    /// Announces that this branch ended, at most once.
    fn finish(&self, reached: &ChoiceSelected) {
        if self.resolved.replace(true) {
            return;
        }
        self.on_final_choice.emit_once(reached);
    }

    /// Authored form of this choice, including nested outcomes.
    pub fn to_def(&self) -> ChoiceDef {
        ChoiceDef {
            text: self.text.clone(),
            hover_text: self.hover_text.clone(),
            post_text: self.post_text.clone(),
            condition: self.condition.clone(),
            results: self.results.iter().map(|r| r.to_def()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::ActionRegistry;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::sync::Arc;

    fn registry() -> Arc<ActionRegistry> {
        Arc::new(ActionRegistry::new())
    }

    fn outcome(text: &str, weight: f32, choices: Vec<Rc<Choice>>) -> Rc<Outcome> {
        Rc::new(Outcome::new(text, weight, vec![], choices, &registry()))
    }

    fn record(signal: &Signal<ChoiceSelected>) -> Rc<RefCell<Vec<ChoiceSelected>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        signal.subscribe(move |s: &ChoiceSelected| sink.borrow_mut().push(s.clone()));
        seen
    }

    #[test]
    fn select_weighted_boundaries() {
        let weights = [10.0, 0.0, 30.0];
        assert_eq!(select_weighted(&weights, 0.0), 0);
        assert_eq!(select_weighted(&weights, 10.0), 0);
        assert_eq!(select_weighted(&weights, 10.5), 2);
        assert_eq!(select_weighted(&weights, 39.9), 2);
        assert_eq!(select_weighted(&[0.0, 0.0], 0.0), 0);
        assert_eq!(select_weighted(&[f32::NAN, 5.0], 1.0), 1);
    }

    #[test]
    fn single_outcome_is_taken() {
        let choice = Rc::new(Choice::new("Wait", vec![outcome("Time passes.", 0.0, vec![])]));
        let picked = choice.pick_with(&mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(picked.text(), "Time passes.");
    }

    #[test]
    fn all_zero_weights_take_the_first() {
        let choice = Rc::new(Choice::new(
            "Gamble",
            vec![outcome("first", 0.0, vec![]), outcome("second", 0.0, vec![])],
        ));
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..20 {
            assert_eq!(choice.pick_with(&mut rng).unwrap().text(), "first");
        }
    }

    #[test]
    fn no_outcomes_finishes_without_selection() {
        let choice = Rc::new(Choice::new("Leave", vec![]));
        let selected = record(choice.on_choice_selected());
        let finals = record(choice.on_final_choice());
        assert!(choice.pick().is_none());
        assert!(selected.borrow().is_empty());
        assert_eq!(finals.borrow().len(), 1);
        assert!(finals.borrow()[0].outcome.is_none());
    }

    #[test]
    fn final_outcome_fires_both_notifications() {
        let choice = Rc::new(Choice::new("Leave", vec![outcome("", 1.0, vec![])]));
        let selected = record(choice.on_choice_selected());
        let finals = record(choice.on_final_choice());
        choice.pick();
        assert_eq!(selected.borrow().len(), 1);
        assert_eq!(finals.borrow().len(), 1);
        assert!(choice.is_resolved());
    }

    #[test]
    fn text_outcome_finishes_on_acknowledgment() {
        let choice = Rc::new(Choice::new("Look", vec![outcome("A quiet room.", 1.0, vec![])]));
        let finals = record(choice.on_final_choice());
        let picked = choice.pick().unwrap();
        assert!(finals.borrow().is_empty());
        picked.acknowledge();
        assert_eq!(finals.borrow().len(), 1);
    }

    #[test]
    fn acknowledging_during_selection_still_finishes() {
        let choice = Rc::new(Choice::new("Look", vec![outcome("A quiet room.", 1.0, vec![])]));
        choice.on_choice_selected().subscribe(|s: &ChoiceSelected| {
            if let Some(outcome) = &s.outcome {
                outcome.acknowledge();
            }
        });
        let finals = record(choice.on_final_choice());
        choice.pick();
        assert_eq!(finals.borrow().len(), 1);
        assert!(choice.is_resolved());
    }

    #[test]
    fn finality_bubbles_up_through_nesting() {
        let c3 = Rc::new(Choice::new("C3", vec![outcome("", 1.0, vec![])]));
        let c2 = Rc::new(Choice::new("C2", vec![outcome("r2", 1.0, vec![Rc::clone(&c3)])]));
        let c1 = Rc::new(Choice::new("C1", vec![outcome("r1", 1.0, vec![Rc::clone(&c2)])]));
        let finals = record(c1.on_final_choice());

        c1.pick();
        c2.pick();
        assert!(finals.borrow().is_empty());
        c3.pick();

        let finals = finals.borrow();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].choice.text(), "C3");
        assert!(finals[0].outcome.as_ref().is_some_and(|o| o.is_final()));
    }

    #[test]
    fn to_def_keeps_authored_fields() {
        let choice = Choice::new("Bribe", vec![outcome("He pockets it.", 40.0, vec![])])
            .with_hover_text("Costs 5 gold")
            .with_post_text("You feel lighter.")
            .with_condition(SerializedCall::new("has_gold", vec![]));
        let def = choice.to_def();
        assert_eq!(def.text, "Bribe");
        assert_eq!(def.hover_text, "Costs 5 gold");
        assert_eq!(def.post_text, "You feel lighter.");
        assert_eq!(def.condition.unwrap().name, "has_gold");
        assert_eq!(def.results[0].weight, 40.0);
    }
}

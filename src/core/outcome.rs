//! Outcomes — the weighted results of a choice.
//!
//! Binding an outcome's action calls against the registry starts on a
//! background thread as soon as the outcome is built. `execute` joins that
//! work before running any callback, so actions never run half-resolved.

use std::cell::{Cell, OnceCell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

use crate::core::call::{BoundAction, CallError};
use crate::core::choice::Choice;
use crate::core::registry::ActionRegistry;
use crate::core::signal::Signal;
use crate::schema::call::SerializedCall;
use crate::schema::event::OutcomeDef;
use crate::schema::value::ArgValue;

/// Acknowledgment label used when neither the outcome nor the
/// configuration provides one.
pub const DEFAULT_ACKNOWLEDGMENT_TEXT: &str = "Continue...";

type Prepared = Vec<Result<BoundAction, CallError>>;

fn resolve_all(registry: &ActionRegistry, calls: &[SerializedCall]) -> Prepared {
    calls.iter().map(|c| c.resolve_action(registry)).collect()
}

/// One bounded resolution job per outcome, joined on first use.
struct Preparation {
    registry: Arc<ActionRegistry>,
    calls: Vec<SerializedCall>,
    worker: RefCell<Option<JoinHandle<Prepared>>>,
    ready: OnceCell<Prepared>,
}

impl Preparation {
    fn start(registry: Arc<ActionRegistry>, calls: Vec<SerializedCall>) -> Self {
        let prep = Self {
            registry,
            calls,
            worker: RefCell::new(None),
            ready: OnceCell::new(),
        };
        if prep.calls.is_empty() {
            let _ = prep.ready.set(Vec::new());
            return prep;
        }

        let registry = Arc::clone(&prep.registry);
        let calls = prep.calls.clone();
        match thread::Builder::new()
            .name("text-events-prepare".to_string())
            .spawn(move || resolve_all(&registry, &calls))
        {
            Ok(handle) => *prep.worker.borrow_mut() = Some(handle),
            Err(e) => debug!(
                target: "text_events::outcome",
                error = %e,
                "could not spawn preparation thread; resolving on first execute"
            ),
        }
        prep
    }

    /// Blocks until the bindings are available. Runs the resolution at most once.
    fn wait(&self) -> &Prepared {
        self.ready.get_or_init(|| {
            let worker = self.worker.borrow_mut().take();
            match worker.map(JoinHandle::join) {
                Some(Ok(prepared)) => prepared,
                Some(Err(_)) => {
                    warn!(
                        target: "text_events::outcome",
                        "preparation thread panicked; resolving inline"
                    );
                    resolve_all(&self.registry, &self.calls)
                }
                None => resolve_all(&self.registry, &self.calls),
            }
        })
    }

    fn is_ready(&self) -> bool {
        self.ready.get().is_some()
            || self
                .worker
                .borrow()
                .as_ref()
                .is_some_and(JoinHandle::is_finished)
    }
}

impl fmt::Debug for Preparation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preparation")
            .field("calls", &self.calls.len())
            .field("ready", &self.ready.get().is_some())
            .finish()
    }
}

/// One possible outcome of a choice.
#[derive(Debug)]
pub struct Outcome {
    text: String,
    authored_acknowledgment: Option<String>,
    acknowledgment_text: String,
    weight: f32,
    choices: Vec<Rc<Choice>>,
    preparation: Preparation,
    acknowledged: Cell<bool>,
    on_acknowledged: Signal<()>,
}

impl Outcome {
    /// Build an outcome and start binding its actions against `registry`.
    ///
    /// Negative or non-finite weights are clamped to zero.
    pub fn new(
        text: impl Into<String>,
        weight: f32,
        actions: Vec<SerializedCall>,
        choices: Vec<Rc<Choice>>,
        registry: &Arc<ActionRegistry>,
    ) -> Self {
        let text = text.into();
        let weight = if weight.is_finite() && weight >= 0.0 {
            weight
        } else {
            warn!(
                target: "text_events::outcome",
                outcome = %text,
                weight,
                "weight must be a non-negative number; using 0"
            );
            0.0
        };
        Self {
            text,
            authored_acknowledgment: None,
            acknowledgment_text: DEFAULT_ACKNOWLEDGMENT_TEXT.to_string(),
            weight,
            choices,
            preparation: Preparation::start(Arc::clone(registry), actions),
            acknowledged: Cell::new(false),
            on_acknowledged: Signal::new(),
        }
    }

    pub fn with_acknowledgment_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.authored_acknowledgment = Some(text.clone());
        self.acknowledgment_text = text;
        self
    }

    /// Sets the label used when none was authored.
    pub(crate) fn with_default_acknowledgment(mut self, text: &str) -> Self {
        if self.authored_acknowledgment.is_none() {
            self.acknowledgment_text = text.to_string();
        }
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn acknowledgment_text(&self) -> &str {
        &self.acknowledgment_text
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn actions(&self) -> &[SerializedCall] {
        &self.preparation.calls
    }

    /// Nested choices offered after this outcome's text.
    pub fn choices(&self) -> &[Rc<Choice>] {
        &self.choices
    }

    /// An outcome without text ends its branch.
    pub fn is_final(&self) -> bool {
        self.text.is_empty()
    }

    /// True once action binding has finished (or was never needed).
    pub fn is_prepared(&self) -> bool {
        self.preparation.is_ready()
    }

    /// Run every bound action in declaration order.
    ///
    /// Returns the value produced by each action that ran successfully.
    /// Unresolved calls and failing callbacks are logged and skipped; the
    /// remaining actions still run.
    pub fn execute(&self) -> Vec<Option<ArgValue>> {
        let prepared = self.preparation.wait();
        let mut returns = Vec::with_capacity(prepared.len());
        for bound in prepared {
            let Ok(bound) = bound else {
                continue;
            };
            match bound.invoke() {
                Ok(value) => returns.push(value),
                Err(e) => error!(
                    target: "text_events::outcome",
                    outcome = %self.text,
                    call = %bound.call(),
                    error = %e,
                    "action failed; continuing with the remaining actions"
                ),
            }
        }
        returns
    }

    /// The player dismissed this outcome's text. Fires the acknowledgment
    /// notification at most once.
    pub fn acknowledge(&self) {
        if self.acknowledged.replace(true) {
            debug!(target: "text_events::outcome", outcome = %self.text, "already acknowledged");
            return;
        }
        self.on_acknowledged.emit_once(&());
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.get()
    }

    pub fn on_acknowledged(&self) -> &Signal<()> {
        &self.on_acknowledged
    }

    /// Authored form of this outcome. Synthesized choices are left out.
    pub fn to_def(&self) -> OutcomeDef {
        OutcomeDef {
            text: self.text.clone(),
            acknowledgment_text: self.authored_acknowledgment.clone(),
            weight: self.weight,
            actions: self.preparation.calls.clone(),
            choices: self
                .choices
                .iter()
                .filter(|c| !c.is_synthesized())
                .map(|c| c.to_def())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registry::ActionError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn registry(log: Arc<Mutex<Vec<String>>>) -> Arc<ActionRegistry> {
        let mut registry = ActionRegistry::new();
        let seen = Arc::clone(&log);
        registry
            .register_action("note", "Note", vec![], move |args| {
                seen.lock()
                    .map_err(|_| ActionError::failed("poisoned"))?
                    .push(format!("note{}", args.len()));
                Ok(None)
            })
            .unwrap();
        registry
            .register_action("count", "Count", vec![], |_| Ok(Some(ArgValue::Int(3))))
            .unwrap();
        registry
            .register_action("fail", "Fail", vec![], |_| Err(ActionError::failed("no rope")))
            .unwrap();
        registry
            .register_action("explode", "Explode", vec![], |_| panic!("kaboom"))
            .unwrap();
        Arc::new(registry)
    }

    fn call(name: &str) -> SerializedCall {
        SerializedCall::new(name, vec![])
    }

    #[test]
    fn finality_is_empty_text() {
        let registry = Arc::new(ActionRegistry::new());
        assert!(Outcome::new("", 1.0, vec![], vec![], &registry).is_final());
        assert!(!Outcome::new("You wait.", 1.0, vec![], vec![], &registry).is_final());
    }

    #[test]
    fn execute_runs_in_order_and_collects_returns() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = registry(Arc::clone(&log));
        let outcome = Outcome::new(
            "The ledger balances.",
            1.0,
            vec![call("note"), call("count"), call("note")],
            vec![],
            &registry,
        );
        let returns = outcome.execute();
        assert_eq!(returns, vec![None, Some(ArgValue::Int(3)), None]);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn unresolved_call_is_skipped() {
        let registry = registry(Arc::new(Mutex::new(Vec::new())));
        let alone = Outcome::new("x", 1.0, vec![call("vanish")], vec![], &registry);
        assert!(alone.execute().is_empty());

        let mixed = Outcome::new("x", 1.0, vec![call("vanish"), call("count")], vec![], &registry);
        assert_eq!(mixed.execute(), vec![Some(ArgValue::Int(3))]);
    }

    #[test]
    fn failures_do_not_stop_later_actions() {
        let registry = registry(Arc::new(Mutex::new(Vec::new())));
        let outcome = Outcome::new(
            "x",
            1.0,
            vec![call("fail"), call("explode"), call("count")],
            vec![],
            &registry,
        );
        assert_eq!(outcome.execute(), vec![Some(ArgValue::Int(3))]);
    }

    #[test]
    fn execute_again_reuses_bindings() {
        let resolutions = Arc::new(AtomicUsize::new(0));
        let mut registry = ActionRegistry::new();
        let counter = Arc::clone(&resolutions);
        registry
            .register_action("tick", "", vec![], move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            })
            .unwrap();
        let registry = Arc::new(registry);
        let outcome = Outcome::new("x", 1.0, vec![call("tick")], vec![], &registry);
        outcome.execute();
        outcome.execute();
        assert!(outcome.is_prepared());
        assert_eq!(resolutions.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn acknowledge_fires_once() {
        let registry = Arc::new(ActionRegistry::new());
        let outcome = Outcome::new("You rest.", 1.0, vec![], vec![], &registry);
        outcome.acknowledge();

        let hits = Rc::new(Cell::new(0));
        let outcome = Outcome::new("You rest.", 1.0, vec![], vec![], &registry);
        let seen = Rc::clone(&hits);
        outcome.on_acknowledged().subscribe(move |_| seen.set(seen.get() + 1));
        outcome.acknowledge();
        outcome.acknowledge();
        assert_eq!(hits.get(), 1);
        assert!(outcome.is_acknowledged());
    }

    #[test]
    fn invalid_weight_is_clamped() {
        let registry = Arc::new(ActionRegistry::new());
        assert_eq!(Outcome::new("x", -4.0, vec![], vec![], &registry).weight(), 0.0);
        assert_eq!(Outcome::new("x", f32::NAN, vec![], vec![], &registry).weight(), 0.0);
    }

    #[test]
    fn to_def_round_trips_authored_fields() {
        let registry = Arc::new(ActionRegistry::new());
        let outcome = Outcome::new("Dawn breaks.", 2.5, vec![call("note")], vec![], &registry)
            .with_acknowledgment_text("Onward");
        let def = outcome.to_def();
        assert_eq!(def.text, "Dawn breaks.");
        assert_eq!(def.weight, 2.5);
        assert_eq!(def.acknowledgment_text.as_deref(), Some("Onward"));
        assert_eq!(def.actions, vec![call("note")]);
    }
}

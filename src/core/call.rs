//! Binding serialized calls to registered callbacks.
//!
//! Resolution failures are recoverable: they are logged with the call's
//! name, stored arguments and stored argument types, and the caller treats
//! the call as inert (`None` for actions, `false` for predicates).

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::core::registry::{ActionError, ActionFn, ActionRegistry, CallArgs, PredicateFn};
use crate::schema::call::SerializedCall;
use crate::schema::value::{ArgValue, ParamSpec, ParamType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Action,
    Predicate,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action => f.write_str("action"),
            Self::Predicate => f.write_str("predicate"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CallError {
    #[error("call has no callback name")]
    Empty,
    #[error("no {kind} named '{name}' is registered")]
    Unresolved { kind: CallKind, name: String },
}

/// An action call bound to its callback, with arguments conformed to the
/// callback's current signature.
#[derive(Clone)]
pub struct BoundAction {
    call: SerializedCall,
    callable: Arc<ActionFn>,
}

impl fmt::Debug for BoundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundAction").field("call", &self.call).finish()
    }
}

impl BoundAction {
    pub fn call(&self) -> &SerializedCall {
        &self.call
    }

    /// Runs the callback. A panic inside it is reported as `ActionError::Failed`.
    pub fn invoke(&self) -> Result<Option<ArgValue>, ActionError> {
        let args = CallArgs::new(&self.call.args);
        match panic::catch_unwind(AssertUnwindSafe(|| (self.callable)(args))) {
            Ok(result) => result,
            Err(payload) => Err(ActionError::Failed(panic_message(payload.as_ref()))),
        }
    }
}

/// A predicate call bound to its callback.
#[derive(Clone)]
pub struct BoundPredicate {
    call: SerializedCall,
    callable: Arc<PredicateFn>,
}

impl fmt::Debug for BoundPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundPredicate").field("call", &self.call).finish()
    }
}

impl BoundPredicate {
    pub fn call(&self) -> &SerializedCall {
        &self.call
    }

    pub fn evaluate(&self) -> Result<bool, ActionError> {
        let args = CallArgs::new(&self.call.args);
        match panic::catch_unwind(AssertUnwindSafe(|| (self.callable)(args))) {
            Ok(result) => result,
            Err(payload) => Err(ActionError::Failed(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("callback panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("callback panicked: {}", msg)
    } else {
        "callback panicked".to_string()
    }
}

impl SerializedCall {
    /// Bind this call to a registered action.
    pub fn resolve_action(&self, registry: &ActionRegistry) -> Result<BoundAction, CallError> {
        self.check_named(CallKind::Action)?;
        let Some(entry) = registry.action(&self.name) else {
            self.report_unresolved(CallKind::Action, registry.action_identifiers());
            return Err(CallError::Unresolved {
                kind: CallKind::Action,
                name: self.name.clone(),
            });
        };
        let mut call = self.clone();
        call.conform(&entry.signature.params);
        Ok(BoundAction {
            call,
            callable: Arc::clone(&entry.callable),
        })
    }

    /// Bind this call to a registered predicate.
    pub fn resolve_predicate(
        &self,
        registry: &ActionRegistry,
    ) -> Result<BoundPredicate, CallError> {
        self.check_named(CallKind::Predicate)?;
        let Some(entry) = registry.predicate(&self.name) else {
            self.report_unresolved(CallKind::Predicate, registry.predicate_identifiers());
            return Err(CallError::Unresolved {
                kind: CallKind::Predicate,
                name: self.name.clone(),
            });
        };
        let mut call = self.clone();
        call.conform(&entry.signature.params);
        Ok(BoundPredicate {
            call,
            callable: Arc::clone(&entry.callable),
        })
    }

    /// Resolve and evaluate as a predicate. Unresolved predicates and
    /// predicates that fail count as `false`.
    pub fn evaluate(&self, registry: &ActionRegistry) -> bool {
        let Ok(bound) = self.resolve_predicate(registry) else {
            return false;
        };
        match bound.evaluate() {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    target: "text_events::call",
                    call = %self.name,
                    args = %self.describe_args(),
                    error = %e,
                    "predicate failed; treating as false"
                );
                false
            }
        }
    }

    /// Resolve and invoke as an action. Returns `None` when the call is
    /// unresolved or the callback fails; `Some(return_value)` otherwise.
    pub fn invoke(&self, registry: &ActionRegistry) -> Option<Option<ArgValue>> {
        let bound = self.resolve_action(registry).ok()?;
        match bound.invoke() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    target: "text_events::call",
                    call = %self.name,
                    args = %self.describe_args(),
                    error = %e,
                    "action failed"
                );
                None
            }
        }
    }

    /// Rebuild the stored arguments to fit `params`.
    ///
    /// Values whose type still matches are kept by position; new or
    /// mismatched slots take the parameter's default (or zero value); extra
    /// values are dropped. Enumeration values that are no longer members
    /// fall back to the first declared member. Returns true if anything
    /// changed.
    pub fn conform(&mut self, params: &[ParamSpec]) -> bool {
        let mut changed = self.args.len() != params.len();
        if changed {
            debug!(
                target: "text_events::call",
                call = %self.name,
                stored = self.args.len(),
                declared = params.len(),
                "argument count differs from signature; rebuilding"
            );
        }

        let mut rebuilt = Vec::with_capacity(params.len());
        for (index, spec) in params.iter().enumerate() {
            let value = match self.args.get(index) {
                Some(stored) if spec.ty.accepts(stored) => {
                    match self.conform_enum(stored, spec) {
                        Some(fallback) => {
                            changed = true;
                            fallback
                        }
                        None => stored.clone(),
                    }
                }
                Some(stored) => {
                    warn!(
                        target: "text_events::call",
                        call = %self.name,
                        param = %spec.name,
                        expected = %spec.ty.type_name(),
                        found = %stored.type_name(),
                        "stored argument has the wrong type; using the parameter default"
                    );
                    changed = true;
                    spec.initial_value()
                }
                None => spec.initial_value(),
            };
            rebuilt.push(value);
        }
        self.args = rebuilt;
        changed
    }

    fn conform_enum(&self, stored: &ArgValue, spec: &ParamSpec) -> Option<ArgValue> {
        let (ParamType::Enum { name, members }, ArgValue::Enum { value, .. }) = (&spec.ty, stored)
        else {
            return None;
        };
        if members.contains(value) {
            return None;
        }
        let first = members.first().cloned().unwrap_or_default();
        warn!(
            target: "text_events::call",
            call = %self.name,
            param = %spec.name,
            enumeration = %name,
            stored = %value,
            fallback = %first,
            "enum value is not a declared member; falling back to the first member"
        );
        Some(ArgValue::Enum {
            name: name.clone(),
            value: first,
        })
    }

    fn check_named(&self, kind: CallKind) -> Result<(), CallError> {
        if self.is_valid() {
            return Ok(());
        }
        warn!(target: "text_events::call", %kind, "call has no callback name");
        Err(CallError::Empty)
    }

    fn report_unresolved(&self, kind: CallKind, available: &[String]) {
        warn!(
            target: "text_events::call",
            %kind,
            call = %self.name,
            args = %self.describe_args(),
            arg_types = %self.describe_arg_types(),
            available = %available.join(", "),
            "call could not be resolved; treating it as inert"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn mood() -> ParamType {
        ParamType::enumeration("Mood", &["calm", "angry", "sad"])
    }

    fn registry(counter: Arc<AtomicUsize>) -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        registry
            .register_action(
                "give_gold",
                "Give gold",
                vec![
                    ParamSpec::new("amount", ParamType::Int).with_default(ArgValue::Int(5)),
                    ParamSpec::new("announce", ParamType::Bool),
                ],
                move |args| {
                    counter.fetch_add(args.int(0)? as usize, Ordering::SeqCst);
                    Ok(Some(ArgValue::Int(args.int(0)?)))
                },
            )
            .unwrap();
        registry
            .register_action("explode", "", vec![], |_| panic!("boom"))
            .unwrap();
        registry
            .register_predicate(
                "mood_is",
                "",
                vec![ParamSpec::new("mood", mood())],
                |args| Ok(args.enumeration(0)? == "angry"),
            )
            .unwrap();
        registry
    }

    #[test]
    fn resolve_and_invoke() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = registry(Arc::clone(&counter));
        let call = SerializedCall::new(
            "give_gold",
            vec![ArgValue::Int(7), ArgValue::Bool(true)],
        );
        assert_eq!(call.invoke(&registry), Some(Some(ArgValue::Int(7))));
        assert_eq!(counter.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn unresolved_is_inert() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        let call = SerializedCall::new("summon_dragon", vec![ArgValue::Int(1)]);
        assert_eq!(
            call.resolve_action(&registry).unwrap_err(),
            CallError::Unresolved {
                kind: CallKind::Action,
                name: "summon_dragon".to_string()
            }
        );
        assert_eq!(call.invoke(&registry), None);
        assert!(!call.evaluate(&registry));
    }

    #[test]
    fn nameless_call_is_rejected() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        assert_eq!(
            SerializedCall::default().resolve_predicate(&registry).unwrap_err(),
            CallError::Empty
        );
    }

    #[test]
    fn panic_becomes_action_error() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        let bound = SerializedCall::new("explode", vec![])
            .resolve_action(&registry)
            .unwrap();
        let err = bound.invoke().unwrap_err();
        assert_eq!(err, ActionError::Failed("callback panicked: boom".to_string()));
    }

    #[test]
    fn conform_grows_with_defaults() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        let bound = SerializedCall::new("give_gold", vec![])
            .resolve_action(&registry)
            .unwrap();
        assert_eq!(bound.call().args, vec![ArgValue::Int(5), ArgValue::Bool(false)]);
    }

    #[test]
    fn conform_keeps_matching_and_truncates() {
        let params = vec![ParamSpec::new("amount", ParamType::Int)];
        let mut call = SerializedCall::new(
            "give_gold",
            vec![ArgValue::Int(9), ArgValue::String("extra".to_string())],
        );
        assert!(call.conform(&params));
        assert_eq!(call.args, vec![ArgValue::Int(9)]);
        assert!(!call.conform(&params));
    }

    #[test]
    fn conform_replaces_mismatched_type() {
        let params = vec![ParamSpec::new("amount", ParamType::Int).with_default(ArgValue::Int(2))];
        let mut call = SerializedCall::new("give_gold", vec![ArgValue::String("9".to_string())]);
        assert!(call.conform(&params));
        assert_eq!(call.args, vec![ArgValue::Int(2)]);
    }

    #[test]
    fn unknown_enum_member_falls_back_to_first() {
        let mut call = SerializedCall::new(
            "mood_is",
            vec![ArgValue::Enum {
                name: "Mood".to_string(),
                value: "ecstatic".to_string(),
            }],
        );
        assert!(call.conform(&[ParamSpec::new("mood", mood())]));
        assert_eq!(
            call.args[0],
            ArgValue::Enum {
                name: "Mood".to_string(),
                value: "calm".to_string()
            }
        );
    }

    #[test]
    fn predicate_evaluation() {
        let registry = registry(Arc::new(AtomicUsize::new(0)));
        let angry = SerializedCall::new(
            "mood_is",
            vec![ArgValue::Enum {
                name: "Mood".to_string(),
                value: "angry".to_string(),
            }],
        );
        assert!(angry.evaluate(&registry));
        let calm = SerializedCall::new(
            "mood_is",
            vec![ArgValue::Enum {
                name: "Mood".to_string(),
                value: "calm".to_string(),
            }],
        );
        assert!(!calm.evaluate(&registry));
    }
}

//! Authoring checks run before content is saved or linted.

use rustc_hash::FxHashSet;
use std::fmt;

use crate::core::content::ContentLibrary;
use crate::core::registry::{ActionRegistry, Signature};
use crate::schema::call::SerializedCall;
use crate::schema::event::{ChoiceDef, EventDef, EventId, OutcomeDef};
use crate::schema::value::{ArgValue, ParamType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub event: EventId,
    /// Location inside the event, e.g. "choice 1 result 0 action 2".
    pub path: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}: event {}: {}", self.severity, self.event, self.message)
        } else {
            write!(
                f,
                "{}: event {} ({}): {}",
                self.severity, self.event, self.path, self.message
            )
        }
    }
}

pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(|d| d.severity == Severity::Error)
}

/// Validate every event plus id uniqueness.
pub fn validate_library(
    library: &ContentLibrary,
    registry: Option<&ActionRegistry>,
) -> Vec<Diagnostic> {
    validate_events(library.events(), registry)
}

pub fn validate_events(events: &[EventDef], registry: Option<&ActionRegistry>) -> Vec<Diagnostic> {
    let mut seen = FxHashSet::default();
    let mut diagnostics = Vec::new();
    for def in events {
        if !seen.insert(def.id) {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                event: def.id,
                path: String::new(),
                message: "duplicate event id".to_string(),
            });
        }
        diagnostics.extend(validate_event(def, registry));
    }
    diagnostics
}

/// Check one event. Without a registry only structural checks run.
pub fn validate_event(def: &EventDef, registry: Option<&ActionRegistry>) -> Vec<Diagnostic> {
    let mut checker = Checker {
        event: def.id,
        registry,
        out: Vec::new(),
    };
    if def.title.trim().is_empty() {
        checker.push(Severity::Error, "", "title is empty");
    }
    if let Some(entry) = &def.entry_outcome {
        checker.outcome(entry, "entry outcome");
    }
    checker.choices(&def.choices, "");
    checker.out
}

struct Checker<'a> {
    event: EventId,
    registry: Option<&'a ActionRegistry>,
    out: Vec<Diagnostic>,
}

impl Checker<'_> {
    fn push(&mut self, severity: Severity, path: &str, message: impl Into<String>) {
        self.out.push(Diagnostic {
            severity,
            event: self.event,
            path: path.to_string(),
            message: message.into(),
        });
    }

    fn choices(&mut self, choices: &[ChoiceDef], prefix: &str) {
        for (index, choice) in choices.iter().enumerate() {
            let path = format!("{}choice {}", prefix, index);
            self.choice(choice, &path);
        }
    }

    fn choice(&mut self, choice: &ChoiceDef, path: &str) {
        if choice.results.is_empty() {
            self.push(Severity::Error, path, "choice has no results");
        }
        if let Some(condition) = &choice.condition {
            if condition.is_valid() {
                let signature = self
                    .registry
                    .map(|r| r.predicate(&condition.name).map(|e| &e.signature));
                self.call(condition, signature, &format!("{} condition", path), "predicate");
            } else {
                self.push(
                    Severity::Warning,
                    path,
                    "condition has no predicate name and is ignored",
                );
            }
        }
        let weights: Vec<f32> = choice.results.iter().map(|r| r.weight).collect();
        if weights.len() > 1 && weights.iter().all(|w| *w == 0.0) {
            self.push(
                Severity::Warning,
                path,
                "every result has weight 0; the first one is always chosen",
            );
        }
        for (index, result) in choice.results.iter().enumerate() {
            self.outcome(result, &format!("{} result {}", path, index));
        }
    }

    fn outcome(&mut self, outcome: &OutcomeDef, path: &str) {
        if !outcome.weight.is_finite() || outcome.weight < 0.0 {
            self.push(
                Severity::Error,
                path,
                format!("weight {} must be a non-negative number", outcome.weight),
            );
        }
        for (index, action) in outcome.actions.iter().enumerate() {
            let action_path = format!("{} action {}", path, index);
            if !action.is_valid() {
                self.push(Severity::Error, &action_path, "action has no callback name");
                continue;
            }
            let signature = self
                .registry
                .map(|r| r.action(&action.name).map(|e| &e.signature));
            self.call(action, signature, &action_path, "action");
        }
        self.choices(&outcome.choices, &format!("{} / ", path));
    }

    /// `signature` is `None` without a registry, `Some(None)` when the
    /// name is not registered.
    fn call(
        &mut self,
        call: &SerializedCall,
        signature: Option<Option<&Signature>>,
        path: &str,
        kind: &str,
    ) {
        let Some(signature) = signature else {
            return;
        };
        let Some(signature) = signature else {
            self.push(
                Severity::Error,
                path,
                format!("unknown {} '{}'", kind, call.name),
            );
            return;
        };
        if call.args.len() != signature.params.len() {
            self.push(
                Severity::Warning,
                path,
                format!(
                    "'{}' stores {} argument(s) but takes {}",
                    call.name,
                    call.args.len(),
                    signature.params.len()
                ),
            );
        }
        for (index, (value, spec)) in call.args.iter().zip(&signature.params).enumerate() {
            if !spec.ty.accepts(value) {
                self.push(
                    Severity::Error,
                    path,
                    format!(
                        "argument {} ('{}') is {}, expected {}",
                        index,
                        spec.name,
                        value.type_name(),
                        spec.ty.type_name()
                    ),
                );
                continue;
            }
            if let (ParamType::Enum { members, .. }, ArgValue::Enum { value, .. }) = (&spec.ty, value)
            {
                if !members.contains(value) {
                    self.push(
                        Severity::Warning,
                        path,
                        format!(
                            "argument {} ('{}') has unknown member '{}'",
                            index, spec.name, value
                        ),
                    );
                }
            }
        }
    }
}

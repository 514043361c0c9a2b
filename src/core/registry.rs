//! Action registry — callbacks that authored content can reference by name.
//!
//! Host code registers actions (side effects, optional return value) and
//! predicates (boolean gates) explicitly, usually by handing a set of
//! `ActionModule`s to `ActionRegistry::scan` at startup. The registry is
//! read-only once built; rebuilding it is only safe while no dialogue is
//! resolving.

use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::schema::value::{ArgValue, AssetRef, ParamSpec, ParamType};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("callback identifier must not be empty")]
    EmptyIdentifier,
    #[error("parameter '{param}' of '{identifier}' is an enumeration without members")]
    EmptyEnumeration { identifier: String, param: String },
    #[error("default of parameter '{param}' of '{identifier}' does not fit type {expected}")]
    DefaultTypeMismatch {
        identifier: String,
        param: String,
        expected: String,
    },
    #[error("module '{module}' failed to register: {reason}")]
    Module { module: String, reason: String },
}

/// Failure raised by a callback while it runs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ActionError {
    #[error("missing argument {index}")]
    MissingArgument { index: usize },
    #[error("argument {index} should be {expected}, got {found}")]
    ArgumentType {
        index: usize,
        expected: &'static str,
        found: String,
    },
    #[error("{0}")]
    Failed(String),
}

impl ActionError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Borrowed view of the arguments handed to a callback, with typed accessors.
#[derive(Debug, Clone, Copy)]
pub struct CallArgs<'a> {
    args: &'a [ArgValue],
}

impl<'a> CallArgs<'a> {
    pub fn new(args: &'a [ArgValue]) -> Self {
        Self { args }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn as_slice(&self) -> &'a [ArgValue] {
        self.args
    }

    pub fn get(&self, index: usize) -> Result<&'a ArgValue, ActionError> {
        self.args
            .get(index)
            .ok_or(ActionError::MissingArgument { index })
    }

    fn typed<T>(
        &self,
        index: usize,
        expected: &'static str,
        extract: impl FnOnce(&'a ArgValue) -> Option<T>,
    ) -> Result<T, ActionError> {
        let value = self.get(index)?;
        extract(value).ok_or_else(|| ActionError::ArgumentType {
            index,
            expected,
            found: value.type_name(),
        })
    }

    pub fn int(&self, index: usize) -> Result<i64, ActionError> {
        self.typed(index, "int", ArgValue::as_int)
    }

    pub fn float(&self, index: usize) -> Result<f64, ActionError> {
        self.typed(index, "float", ArgValue::as_float)
    }

    pub fn bool(&self, index: usize) -> Result<bool, ActionError> {
        self.typed(index, "bool", ArgValue::as_bool)
    }

    pub fn string(&self, index: usize) -> Result<&'a str, ActionError> {
        self.typed(index, "string", ArgValue::as_str)
    }

    /// Member name of an enumeration argument.
    pub fn enumeration(&self, index: usize) -> Result<&'a str, ActionError> {
        self.typed(index, "enum", ArgValue::as_enum)
    }

    pub fn asset(&self, index: usize) -> Result<&'a AssetRef, ActionError> {
        self.typed(index, "asset", ArgValue::as_asset)
    }
}

pub type ActionFn =
    dyn Fn(CallArgs<'_>) -> Result<Option<ArgValue>, ActionError> + Send + Sync;
pub type PredicateFn = dyn Fn(CallArgs<'_>) -> Result<bool, ActionError> + Send + Sync;

/// What the authoring side sees of a registered callback.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub identifier: String,
    pub display_name: String,
    pub params: Vec<ParamSpec>,
    /// Name of the module that registered it.
    pub module: String,
}

#[derive(Clone)]
pub struct ActionEntry {
    pub signature: Signature,
    pub(crate) callable: Arc<ActionFn>,
}

#[derive(Clone)]
pub struct PredicateEntry {
    pub signature: Signature,
    pub(crate) callable: Arc<PredicateFn>,
}

/// A bundle of callbacks registered together, e.g. one per game system.
pub trait ActionModule {
    fn name(&self) -> &str;
    fn register(&self, registry: &mut ActionRegistry) -> Result<(), RegistryError>;
}

/// Ordered index of registered actions and predicates.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: FxHashMap<String, ActionEntry>,
    predicates: FxHashMap<String, PredicateEntry>,
    action_order: Vec<String>,
    predicate_order: Vec<String>,
    current_module: String,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.action_order)
            .field("predicates", &self.predicate_order)
            .finish()
    }
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a set of modules.
    ///
    /// `action_module` / `predicate_module` restrict actions or predicates
    /// to the named module; `None` keeps every module's callbacks. When two
    /// modules register the same identifier the later one wins.
    pub fn scan(
        modules: &[&dyn ActionModule],
        action_module: Option<&str>,
        predicate_module: Option<&str>,
    ) -> Result<ActionRegistry, RegistryError> {
        let mut registry = ActionRegistry::new();
        for module in modules {
            registry.current_module = module.name().to_string();
            module.register(&mut registry)?;
        }
        registry.current_module.clear();

        for (kind, filter) in [("action", action_module), ("predicate", predicate_module)] {
            if let Some(name) = filter {
                if !modules.iter().any(|m| m.name() == name) {
                    warn!(
                        target: "text_events::registry",
                        module = name,
                        "{} module override names a module that was not scanned",
                        kind
                    );
                }
            }
        }
        if let Some(name) = action_module {
            registry.actions.retain(|_, e| e.signature.module == name);
            let actions = &registry.actions;
            registry.action_order.retain(|id| actions.contains_key(id));
        }
        if let Some(name) = predicate_module {
            registry.predicates.retain(|_, e| e.signature.module == name);
            let predicates = &registry.predicates;
            registry.predicate_order.retain(|id| predicates.contains_key(id));
        }

        debug!(
            target: "text_events::registry",
            actions = registry.action_order.len(),
            predicates = registry.predicate_order.len(),
            "registry scan complete"
        );
        Ok(registry)
    }

    pub fn register_action<F>(
        &mut self,
        identifier: &str,
        display_name: &str,
        params: Vec<ParamSpec>,
        action: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(CallArgs<'_>) -> Result<Option<ArgValue>, ActionError> + Send + Sync + 'static,
    {
        let signature = self.signature(identifier, display_name, params)?;
        let entry = ActionEntry {
            signature,
            callable: Arc::new(action),
        };
        if self.actions.insert(identifier.to_string(), entry).is_some() {
            warn!(
                target: "text_events::registry",
                identifier,
                "action registered twice; the later registration wins"
            );
        } else {
            self.action_order.push(identifier.to_string());
        }
        Ok(())
    }

    pub fn register_predicate<F>(
        &mut self,
        identifier: &str,
        display_name: &str,
        params: Vec<ParamSpec>,
        predicate: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(CallArgs<'_>) -> Result<bool, ActionError> + Send + Sync + 'static,
    {
        let signature = self.signature(identifier, display_name, params)?;
        let entry = PredicateEntry {
            signature,
            callable: Arc::new(predicate),
        };
        if self.predicates.insert(identifier.to_string(), entry).is_some() {
            warn!(
                target: "text_events::registry",
                identifier,
                "predicate registered twice; the later registration wins"
            );
        } else {
            self.predicate_order.push(identifier.to_string());
        }
        Ok(())
    }

    fn signature(
        &self,
        identifier: &str,
        display_name: &str,
        params: Vec<ParamSpec>,
    ) -> Result<Signature, RegistryError> {
        if identifier.is_empty() {
            return Err(RegistryError::EmptyIdentifier);
        }
        for param in &params {
            if let ParamType::Enum { members, .. } = &param.ty {
                if members.is_empty() {
                    return Err(RegistryError::EmptyEnumeration {
                        identifier: identifier.to_string(),
                        param: param.name.clone(),
                    });
                }
            }
            if let Some(default) = &param.default {
                let in_members = match (&param.ty, default) {
                    (ParamType::Enum { members, .. }, ArgValue::Enum { value, .. }) => {
                        members.contains(value)
                    }
                    _ => true,
                };
                if !param.ty.accepts(default) || !in_members {
                    return Err(RegistryError::DefaultTypeMismatch {
                        identifier: identifier.to_string(),
                        param: param.name.clone(),
                        expected: param.ty.type_name(),
                    });
                }
            }
        }
        Ok(Signature {
            identifier: identifier.to_string(),
            display_name: if display_name.is_empty() {
                identifier.to_string()
            } else {
                display_name.to_string()
            },
            params,
            module: self.current_module.clone(),
        })
    }

    pub fn action(&self, identifier: &str) -> Option<&ActionEntry> {
        self.actions.get(identifier)
    }

    pub fn predicate(&self, identifier: &str) -> Option<&PredicateEntry> {
        self.predicates.get(identifier)
    }

    /// Registered actions in registration order.
    pub fn enumerate_actions(&self) -> Vec<&Signature> {
        self.action_order
            .iter()
            .filter_map(|id| self.actions.get(id))
            .map(|e| &e.signature)
            .collect()
    }

    /// Registered predicates in registration order.
    pub fn enumerate_predicates(&self) -> Vec<&Signature> {
        self.predicate_order
            .iter()
            .filter_map(|id| self.predicates.get(id))
            .map(|e| &e.signature)
            .collect()
    }

    pub fn action_identifiers(&self) -> &[String] {
        &self.action_order
    }

    pub fn predicate_identifiers(&self) -> &[String] {
        &self.predicate_order
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.predicates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Weather;

    impl ActionModule for Weather {
        fn name(&self) -> &str {
            "weather"
        }

        fn register(&self, registry: &mut ActionRegistry) -> Result<(), RegistryError> {
            registry.register_action(
                "make_rain",
                "Make it rain",
                vec![ParamSpec::new("hours", ParamType::Int).with_default(ArgValue::Int(2))],
                |args| Ok(Some(ArgValue::Int(args.int(0)? * 10))),
            )?;
            registry.register_predicate("is_raining", "", vec![], |_| Ok(true))
        }
    }

    struct Market;

    impl ActionModule for Market {
        fn name(&self) -> &str {
            "market"
        }

        fn register(&self, registry: &mut ActionRegistry) -> Result<(), RegistryError> {
            registry.register_action("make_rain", "Sell umbrellas", vec![], |_| Ok(None))?;
            registry.register_action("haggle", "Haggle", vec![], |_| Ok(None))?;
            registry.register_predicate("has_coin", "Has coin", vec![], |_| Ok(false))
        }
    }

    #[test]
    fn empty_scan_is_valid() {
        let registry = ActionRegistry::scan(&[], None, None).unwrap();
        assert!(registry.is_empty());
        assert!(registry.enumerate_actions().is_empty());
    }

    #[test]
    fn scan_records_modules_and_order() {
        let registry = ActionRegistry::scan(&[&Weather], None, None).unwrap();
        let actions = registry.enumerate_actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].identifier, "make_rain");
        assert_eq!(actions[0].module, "weather");
        assert_eq!(actions[0].params[0].name, "hours");

        let predicates = registry.enumerate_predicates();
        assert_eq!(predicates[0].display_name, "is_raining");
    }

    #[test]
    fn later_registration_wins() {
        let registry = ActionRegistry::scan(&[&Weather, &Market], None, None).unwrap();
        assert_eq!(registry.action_identifiers(), ["make_rain", "haggle"]);
        let entry = registry.action("make_rain").unwrap();
        assert_eq!(entry.signature.display_name, "Sell umbrellas");
        assert_eq!(entry.signature.module, "market");
    }

    #[test]
    fn rescan_is_idempotent() {
        let first = ActionRegistry::scan(&[&Weather, &Market], None, None).unwrap();
        let second = ActionRegistry::scan(&[&Weather, &Market], None, None).unwrap();
        assert_eq!(first.action_identifiers(), second.action_identifiers());
        assert_eq!(first.predicate_identifiers(), second.predicate_identifiers());
    }

    #[test]
    fn module_overrides_filter_by_kind() {
        let registry =
            ActionRegistry::scan(&[&Weather, &Market], Some("market"), Some("weather")).unwrap();
        assert_eq!(registry.action_identifiers(), ["make_rain", "haggle"]);
        assert_eq!(registry.predicate_identifiers(), ["is_raining"]);
        assert!(registry.predicate("has_coin").is_none());
    }

    #[test]
    fn rejects_empty_enumeration() {
        let mut registry = ActionRegistry::new();
        let err = registry
            .register_action(
                "set_mood",
                "",
                vec![ParamSpec::new("mood", ParamType::enumeration("Mood", &[]))],
                |_| Ok(None),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::EmptyEnumeration { .. }));
    }

    #[test]
    fn rejects_mismatched_default() {
        let mut registry = ActionRegistry::new();
        let err = registry
            .register_action(
                "give_gold",
                "",
                vec![ParamSpec::new("amount", ParamType::Int).with_default(ArgValue::Bool(true))],
                |_| Ok(None),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::DefaultTypeMismatch { .. }));

        let err = registry
            .register_action(
                "set_mood",
                "",
                vec![ParamSpec::new("mood", ParamType::enumeration("Mood", &["calm"]))
                    .with_default(ArgValue::Enum {
                        name: "Mood".to_string(),
                        value: "furious".to_string(),
                    })],
                |_| Ok(None),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::DefaultTypeMismatch { .. }));
    }

    #[test]
    fn rejects_empty_identifier() {
        let mut registry = ActionRegistry::new();
        assert_eq!(
            registry.register_predicate("", "", vec![], |_| Ok(true)),
            Err(RegistryError::EmptyIdentifier)
        );
    }

    #[test]
    fn call_args_accessors() {
        let values = [
            ArgValue::Int(4),
            ArgValue::String("rope".to_string()),
            ArgValue::Enum {
                name: "Mood".to_string(),
                value: "calm".to_string(),
            },
        ];
        let args = CallArgs::new(&values);
        assert_eq!(args.int(0), Ok(4));
        assert_eq!(args.string(1), Ok("rope"));
        assert_eq!(args.enumeration(2), Ok("calm"));
        assert_eq!(args.bool(3), Err(ActionError::MissingArgument { index: 3 }));
        assert!(matches!(
            args.float(0),
            Err(ActionError::ArgumentType { index: 0, .. })
        ));
    }
}

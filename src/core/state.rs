//! A small built-in action module: named flags, integer counters and a
//! message log. Enough game state to drive content in tools, demos and
//! tests without a host game.

use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::registry::{ActionError, ActionModule, ActionRegistry, RegistryError};
use crate::schema::value::{ArgValue, ParamSpec, ParamType};

#[derive(Debug, Default)]
struct Store {
    flags: FxHashSet<String>,
    counters: FxHashMap<String, i64>,
    messages: Vec<String>,
}

/// Cheap to clone; clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct StateModule {
    store: Arc<Mutex<Store>>,
}

fn lock(store: &Mutex<Store>) -> Result<MutexGuard<'_, Store>, ActionError> {
    store
        .lock()
        .map_err(|_| ActionError::failed("state store is poisoned"))
}

impl StateModule {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn flag(&self, name: &str) -> bool {
        self.read().flags.contains(name)
    }

    pub fn set_flag(&self, name: &str, on: bool) {
        let mut store = self.read();
        if on {
            store.flags.insert(name.to_string());
        } else {
            store.flags.remove(name);
        }
    }

    pub fn counter(&self, name: &str) -> i64 {
        self.read().counters.get(name).copied().unwrap_or(0)
    }

    pub fn set_counter(&self, name: &str, value: i64) {
        self.read().counters.insert(name.to_string(), value);
    }

    /// Drain messages produced by `say` actions.
    pub fn take_messages(&self) -> Vec<String> {
        std::mem::take(&mut self.read().messages)
    }
}

impl ActionModule for StateModule {
    fn name(&self) -> &str {
        "state"
    }

    fn register(&self, registry: &mut ActionRegistry) -> Result<(), RegistryError> {
        let name = || ParamSpec::new("name", ParamType::String);

        let store = Arc::clone(&self.store);
        registry.register_action("set_flag", "Set flag", vec![name()], move |args| {
            lock(&store)?.flags.insert(args.string(0)?.to_string());
            Ok(None)
        })?;

        let store = Arc::clone(&self.store);
        registry.register_action("clear_flag", "Clear flag", vec![name()], move |args| {
            lock(&store)?.flags.remove(args.string(0)?);
            Ok(None)
        })?;

        let store = Arc::clone(&self.store);
        registry.register_action(
            "add",
            "Add to counter",
            vec![
                name(),
                ParamSpec::new("amount", ParamType::Int).with_default(ArgValue::Int(1)),
            ],
            move |args| {
                let key = args.string(0)?;
                let amount = args.int(1)?;
                let mut store = lock(&store)?;
                let value = store.counters.entry(key.to_string()).or_insert(0);
                *value += amount;
                Ok(Some(ArgValue::Int(*value)))
            },
        )?;

        let store = Arc::clone(&self.store);
        registry.register_action(
            "say",
            "Say",
            vec![ParamSpec::new("text", ParamType::String)],
            move |args| {
                lock(&store)?.messages.push(args.string(0)?.to_string());
                Ok(None)
            },
        )?;

        let store = Arc::clone(&self.store);
        registry.register_predicate("flag", "Flag is set", vec![name()], move |args| {
            Ok(lock(&store)?.flags.contains(args.string(0)?))
        })?;

        let store = Arc::clone(&self.store);
        registry.register_predicate(
            "at_least",
            "Counter at least",
            vec![name(), ParamSpec::new("amount", ParamType::Int)],
            move |args| {
                let key = args.string(0)?;
                let amount = args.int(1)?;
                Ok(lock(&store)?.counters.get(key).copied().unwrap_or(0) >= amount)
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::call::SerializedCall;

    fn string(s: &str) -> ArgValue {
        ArgValue::String(s.to_string())
    }

    #[test]
    fn actions_update_shared_store() {
        let state = StateModule::new();
        let registry = ActionRegistry::scan(&[&state], None, None).unwrap();

        SerializedCall::new("set_flag", vec![string("met_ferryman")]).invoke(&registry);
        assert!(state.flag("met_ferryman"));

        let total = SerializedCall::new("add", vec![string("gold"), ArgValue::Int(5)])
            .invoke(&registry);
        assert_eq!(total, Some(Some(ArgValue::Int(5))));
        SerializedCall::new("add", vec![string("gold")]).invoke(&registry);
        assert_eq!(state.counter("gold"), 6);

        SerializedCall::new("say", vec![string("Hello")]).invoke(&registry);
        assert_eq!(state.take_messages(), vec!["Hello"]);
        assert!(state.take_messages().is_empty());
    }

    #[test]
    fn predicates_read_store() {
        let state = StateModule::new();
        let registry = ActionRegistry::scan(&[&state], None, None).unwrap();
        let rich = SerializedCall::new("at_least", vec![string("gold"), ArgValue::Int(3)]);
        assert!(!rich.evaluate(&registry));
        state.set_counter("gold", 3);
        assert!(rich.evaluate(&registry));

        let flagged = SerializedCall::new("flag", vec![string("night")]);
        assert!(!flagged.evaluate(&registry));
        state.set_flag("night", true);
        assert!(flagged.evaluate(&registry));
    }
}

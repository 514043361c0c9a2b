use serde::{Deserialize, Serialize};
use std::fmt;

use super::value::ArgValue;

/// A persisted reference to a registered action or predicate together with
/// the concrete arguments authored for it.
///
/// Binding against the registry happens later, in `core::call`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SerializedCall {
    pub name: String,
    #[serde(default)]
    pub args: Vec<ArgValue>,
}

impl SerializedCall {
    pub fn new(name: impl Into<String>, args: Vec<ArgValue>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// A call is valid once it names a callback.
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty()
    }

    /// Comma-separated stored argument values, for diagnostics.
    pub fn describe_args(&self) -> String {
        self.args
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Comma-separated stored argument type names, for diagnostics.
    pub fn describe_arg_types(&self) -> String {
        self.args
            .iter()
            .map(|a| a.type_name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for SerializedCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.describe_args())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_requires_name() {
        assert!(!SerializedCall::default().is_valid());
        assert!(SerializedCall::new("give_gold", vec![]).is_valid());
    }

    #[test]
    fn display_lists_args() {
        let call = SerializedCall::new(
            "give_gold",
            vec![ArgValue::Int(5), ArgValue::String("purse".to_string())],
        );
        assert_eq!(call.to_string(), "give_gold(5, \"purse\")");
        assert_eq!(call.describe_arg_types(), "int, string");
    }

    #[test]
    fn missing_args_field_defaults_to_empty() {
        let call: SerializedCall = ron::from_str(r#"(name: "rest")"#).unwrap();
        assert_eq!(call.name, "rest");
        assert!(call.args.is_empty());
    }
}

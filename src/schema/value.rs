use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to a host asset (portrait, sound cue, item definition).
///
/// The engine never dereferences it; it is stored and handed back to callbacks
/// and views unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AssetRef(pub String);

impl AssetRef {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A typed argument value stored inside a serialized call.
///
/// The variant is the type tag, so `Int(0)`, `Bool(false)` and `String("0")`
/// stay distinct through a save/load cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    /// A member of a named enumeration.
    Enum { name: String, value: String },
    AssetRef(AssetRef),
}

impl ArgValue {
    /// Short tag describing the stored type (e.g., "int", "enum:Mood").
    pub fn type_name(&self) -> String {
        match self {
            Self::Int(_) => "int".to_string(),
            Self::Float(_) => "float".to_string(),
            Self::Bool(_) => "bool".to_string(),
            Self::String(_) => "string".to_string(),
            Self::Enum { name, .. } => format!("enum:{}", name),
            Self::AssetRef(_) => "asset".to_string(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// The member name of an enumeration value.
    pub fn as_enum(&self) -> Option<&str> {
        match self {
            Self::Enum { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn as_asset(&self) -> Option<&AssetRef> {
        match self {
            Self::AssetRef(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Bool(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{:?}", v),
            Self::Enum { name, value } => write!(f, "{}::{}", name, value),
            Self::AssetRef(v) => write!(f, "asset({})", v),
        }
    }
}

/// Declared type of a callback parameter. Only these types have an
/// authoring widget, so only these can be registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    Int,
    Float,
    Bool,
    String,
    /// An enumeration with its declared members, in declaration order.
    Enum { name: String, members: Vec<String> },
    AssetRef,
}

impl ParamType {
    pub fn enumeration(name: impl Into<String>, members: &[&str]) -> Self {
        Self::Enum {
            name: name.into(),
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            Self::Int => "int".to_string(),
            Self::Float => "float".to_string(),
            Self::Bool => "bool".to_string(),
            Self::String => "string".to_string(),
            Self::Enum { name, .. } => format!("enum:{}", name),
            Self::AssetRef => "asset".to_string(),
        }
    }

    /// Zero-value equivalent used when a parameter has no declared default.
    /// An enumeration yields its first declared member.
    pub fn zero_value(&self) -> ArgValue {
        match self {
            Self::Int => ArgValue::Int(0),
            Self::Float => ArgValue::Float(0.0),
            Self::Bool => ArgValue::Bool(false),
            Self::String => ArgValue::String(String::new()),
            Self::Enum { name, members } => ArgValue::Enum {
                name: name.clone(),
                value: members.first().cloned().unwrap_or_default(),
            },
            Self::AssetRef => ArgValue::AssetRef(AssetRef::default()),
        }
    }

    /// Returns true if `value` carries this type's tag. Enumeration values
    /// match on the enumeration name only; membership is checked separately.
    pub fn accepts(&self, value: &ArgValue) -> bool {
        match (self, value) {
            (Self::Int, ArgValue::Int(_))
            | (Self::Float, ArgValue::Float(_))
            | (Self::Bool, ArgValue::Bool(_))
            | (Self::String, ArgValue::String(_))
            | (Self::AssetRef, ArgValue::AssetRef(_)) => true,
            (Self::Enum { name, .. }, ArgValue::Enum { name: value_name, .. }) => {
                name == value_name
            }
            _ => false,
        }
    }
}

/// One declared parameter of a registered callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    #[serde(default)]
    pub default: Option<ArgValue>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
        }
    }

    pub fn with_default(mut self, default: ArgValue) -> Self {
        self.default = Some(default);
        self
    }

    /// The value a freshly added argument slot receives: the declared
    /// default, or the type's zero value.
    pub fn initial_value(&self) -> ArgValue {
        self.default.clone().unwrap_or_else(|| self.ty.zero_value())
    }
}

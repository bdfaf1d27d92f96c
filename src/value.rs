use std::fmt::{Display, Formatter};

/// Represents the typed value a feature flag can resolve to.
///
/// # Examples
///
/// ```rust
/// use flagstream::FlagValue;
///
/// let bool_val = FlagValue::Bool(true);
/// let int_val = FlagValue::Int(42);
/// ```
#[derive(PartialEq, Debug, Clone)]
pub enum FlagValue {
    /// A boolean flag's value.
    Bool(bool),
    /// A whole number flag's value.
    Int(i64),
    /// A decimal number flag's value.
    Float(f64),
    /// A text flag's value.
    String(String),
    /// A JSON flag's value.
    Json(serde_json::Value),
}

impl FlagValue {
    /// Reads the value as `bool`. Returns [`None`] if it's not a [`FlagValue::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        if let FlagValue::Bool(val) = self {
            return Some(*val);
        }
        None
    }

    /// Reads the value as `i64`. Returns [`None`] if it's not a [`FlagValue::Int`].
    pub fn as_int(&self) -> Option<i64> {
        if let FlagValue::Int(val) = self {
            return Some(*val);
        }
        None
    }

    /// Reads the value as `f64`. Returns [`None`] if it's not a [`FlagValue::Float`].
    pub fn as_float(&self) -> Option<f64> {
        if let FlagValue::Float(val) = self {
            return Some(*val);
        }
        None
    }

    /// Reads the value as [`String`]. Returns [`None`] if it's not a [`FlagValue::String`].
    pub fn as_str(&self) -> Option<String> {
        if let FlagValue::String(val) = self {
            return Some(val.clone());
        }
        None
    }

    /// Reads the value as [`serde_json::Value`]. Returns [`None`] if it's not a [`FlagValue::Json`].
    pub fn as_json(&self) -> Option<serde_json::Value> {
        if let FlagValue::Json(val) = self {
            return Some(val.clone());
        }
        None
    }
}

impl Display for FlagValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FlagValue::Bool(val) => write!(f, "{val}"),
            FlagValue::Int(val) => write!(f, "{val}"),
            FlagValue::Float(val) => write!(f, "{val}"),
            FlagValue::String(val) => f.write_str(val),
            FlagValue::Json(val) => write!(f, "{val}"),
        }
    }
}

/// Represents a primitive type that can describe the value of a feature flag.
pub trait ValuePrimitive: Into<FlagValue> {
    /// Reads the primitive value from a [`FlagValue`].
    fn from_value(value: &FlagValue) -> Option<Self>;
}

macro_rules! primitive_impl {
    ($ob:ident $to:ident $as_m:ident $t:ty) => (
        from_val_to_enum!($ob $to $t);

        impl ValuePrimitive for $t {
            fn from_value(value: &FlagValue) -> Option<Self> {
                value.$as_m()
            }
        }
    )
}

primitive_impl!(FlagValue String as_str String);
primitive_impl!(FlagValue Float as_float f64);
primitive_impl!(FlagValue Int as_int i64);
primitive_impl!(FlagValue Bool as_bool bool);
primitive_impl!(FlagValue Json as_json serde_json::Value);
from_val_to_enum_into!(FlagValue String &str);

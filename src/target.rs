use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::Serialize;

pub const IDENTIFIER: &str = "identifier";
pub const NAME: &str = "name";

/// Supported target attribute value types.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Boolean target attribute value.
    Bool(bool),
    /// Signed integer target attribute value.
    Int(i64),
    /// Float target attribute value.
    Float(f64),
    /// String target attribute value.
    String(String),
    /// Nested JSON target attribute value.
    Json(serde_json::Value),
}

impl Display for AttributeValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Bool(val) => write!(f, "{val}"),
            AttributeValue::Int(val) => write!(f, "{val}"),
            AttributeValue::Float(val) => write!(f, "{val}"),
            AttributeValue::String(val) => f.write_str(val),
            AttributeValue::Json(val) => write!(f, "{val}"),
        }
    }
}

impl Serialize for AttributeValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            AttributeValue::Bool(val) => serializer.serialize_bool(*val),
            AttributeValue::Int(val) => serializer.serialize_i64(*val),
            AttributeValue::Float(val) => serializer.serialize_f64(*val),
            AttributeValue::String(val) => serializer.serialize_str(val),
            AttributeValue::Json(val) => val.serialize(serializer),
        }
    }
}

/// Describes the identity a flag is evaluated against. Contains the attributes
/// which are used for evaluating targeting rules and percentage distributions.
///
/// # Examples:
///
/// ```rust
/// use flagstream::Target;
///
/// let target = Target::new("john")
///     .name("John Doe")
///     .attribute("email", "john@doe.com")
///     .attribute("beta_opt_in", true);
/// ```
#[derive(Serialize, Clone, Debug)]
pub struct Target {
    identifier: String,
    name: Option<String>,
    anonymous: bool,
    attributes: HashMap<String, AttributeValue>,
}

impl Target {
    /// Initializes a new [`Target`] with the given unique identifier.
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.to_owned(),
            name: None,
            anonymous: false,
            attributes: HashMap::default(),
        }
    }

    /// Human readable name of the target.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    /// Marks the target as anonymous. Anonymous targets are evaluated normally
    /// but their metadata is excluded from telemetry uploads.
    pub fn anonymous(mut self, anonymous: bool) -> Self {
        self.anonymous = anonymous;
        self
    }

    /// Custom attribute of the target for targeting rule definitions
    /// (e.g. email, subscription plan, etc.)
    ///
    /// # Examples:
    ///
    /// ```rust
    /// use flagstream::Target;
    ///
    /// let target = Target::new("john")
    ///     .attribute("email", "john@doe.com")
    ///     .attribute("rating", 4.5);
    /// ```
    pub fn attribute<T: Into<AttributeValue>>(mut self, key: &str, value: T) -> Self {
        self.attributes.insert(key.to_owned(), value.into());
        self
    }

    /// The target's unique identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The target's optional display name.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// True when the target was marked anonymous.
    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    /// All custom attributes of the target.
    pub fn attributes(&self) -> &HashMap<String, AttributeValue> {
        &self.attributes
    }

    /// Resolves an attribute by name. The `identifier` and `name` attributes fall
    /// back to the target's own fields when no custom attribute shadows them.
    pub(crate) fn get(&self, key: &str) -> Option<Cow<'_, AttributeValue>> {
        if let Some(attr) = self.attributes.get(key) {
            return Some(Cow::Borrowed(attr));
        }
        match key {
            IDENTIFIER => Some(Cow::Owned(AttributeValue::String(self.identifier.clone()))),
            NAME => self
                .name
                .as_ref()
                .map(|n| Cow::Owned(AttributeValue::String(n.clone()))),
            _ => None,
        }
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(str) => write!(f, "{str}"),
            Err(_) => f.write_str("<invalid target>"),
        }
    }
}

from_val_to_enum!(AttributeValue String String);
from_val_to_enum!(AttributeValue Bool bool);
from_val_to_enum!(AttributeValue Json serde_json::Value);
from_val_to_enum_into!(AttributeValue Float f64 f32);
from_val_to_enum_into!(AttributeValue Int i8 i16 i32 i64);
from_val_to_enum_into!(AttributeValue String &str);

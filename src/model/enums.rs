use serde::Deserialize;
use std::fmt::{Display, Formatter};

/// The result type of a feature flag.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum FlagKind {
    /// The on/off type (boolean flag).
    #[serde(rename = "boolean")]
    Bool,
    /// The whole number flag type.
    #[serde(rename = "int")]
    Int,
    /// The decimal number flag type.
    #[serde(rename = "number")]
    Number,
    /// The text flag type.
    #[serde(rename = "string")]
    String,
    /// The JSON flag type.
    #[serde(rename = "json")]
    Json,
}

impl Display for FlagKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FlagKind::Bool => f.write_str("boolean"),
            FlagKind::Int => f.write_str("int"),
            FlagKind::Number => f.write_str("number"),
            FlagKind::String => f.write_str("string"),
            FlagKind::Json => f.write_str("json"),
        }
    }
}

/// The state of a feature flag.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum FlagState {
    /// The flag serves its rules and default distribution.
    #[serde(rename = "on")]
    On,
    /// The flag serves its off variation unconditionally.
    #[serde(rename = "off")]
    Off,
}

/// Clause comparison operator used during the evaluation process.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum Operator {
    /// Checks whether the attribute is equal to any of the comparison values.
    #[serde(rename = "in")]
    In,
    /// Checks whether the attribute is equal to the comparison value
    /// (case-insensitive for strings).
    #[serde(rename = "equal")]
    Equal,
    /// Checks whether the attribute is equal to the comparison value,
    /// honoring case. Strings only.
    #[serde(rename = "equal_sensitive")]
    EqualSensitive,
    /// Checks whether the attribute is greater than the comparison value.
    #[serde(rename = "gt")]
    GreaterThan,
    /// Checks whether the attribute is greater than or equal to the comparison value.
    #[serde(rename = "gte")]
    GreaterThanOrEqual,
    /// Checks whether the attribute is less than the comparison value.
    #[serde(rename = "lt")]
    LessThan,
    /// Checks whether the attribute is less than or equal to the comparison value.
    #[serde(rename = "lte")]
    LessThanOrEqual,
    /// Checks whether the attribute starts with the comparison value. Strings only.
    #[serde(rename = "starts_with")]
    StartsWith,
    /// Checks whether the attribute ends with the comparison value. Strings only.
    #[serde(rename = "ends_with")]
    EndsWith,
    /// Checks whether the attribute contains the comparison value as a substring.
    /// Strings only.
    #[serde(rename = "contains")]
    Contains,
    /// Checks whether the attribute matches the comparison value interpreted as a
    /// regular expression. Strings only.
    #[serde(rename = "match")]
    Match,
    /// Checks whether the target is a member of any of the named segments.
    /// Bypasses attribute type dispatch.
    #[serde(rename = "segment_match", alias = "segmentMatch")]
    SegmentMatch,
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::In => f.write_str("IN"),
            Operator::Equal => f.write_str("EQUALS"),
            Operator::EqualSensitive => f.write_str("EQUALS (case sensitive)"),
            Operator::GreaterThan => f.write_str(">"),
            Operator::GreaterThanOrEqual => f.write_str(">="),
            Operator::LessThan => f.write_str("<"),
            Operator::LessThanOrEqual => f.write_str("<="),
            Operator::StartsWith => f.write_str("STARTS WITH"),
            Operator::EndsWith => f.write_str("ENDS WITH"),
            Operator::Contains => f.write_str("CONTAINS"),
            Operator::Match => f.write_str("MATCHES"),
            Operator::SegmentMatch => f.write_str("IS IN SEGMENT"),
        }
    }
}

/// The entity domain a stream change notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub enum Domain {
    /// A feature flag changed.
    #[serde(rename = "flag")]
    Flag,
    /// A target segment changed.
    #[serde(rename = "target-segment")]
    Segment,
}

/// The change event carried by a stream notification.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub enum Event {
    /// The entity was created; the client re-fetches it by identifier.
    #[serde(rename = "create")]
    Create,
    /// The entity was modified; the client re-fetches it by identifier.
    #[serde(rename = "patch")]
    Patch,
    /// The entity was removed.
    #[serde(rename = "delete")]
    Delete,
}

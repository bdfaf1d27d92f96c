use crate::model::enums::Operator;
use crate::target::AttributeValue;
use regex::Regex;
use std::io::Cursor;

/// A target attribute classified into exactly one operator-capable type.
///
/// Classification happens once per clause evaluation; a clause whose attribute
/// cannot be classified fails.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TypedValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Json(serde_json::Value),
}

impl TypedValue {
    /// Classifies a raw attribute value. Adapters are tried in a fixed order:
    /// boolean, integer, float, string, JSON object.
    pub(crate) fn classify(attr: &AttributeValue) -> Option<TypedValue> {
        match attr {
            AttributeValue::Bool(v) => Some(TypedValue::Bool(*v)),
            AttributeValue::Int(v) => Some(TypedValue::Int(*v)),
            AttributeValue::Float(v) => Some(TypedValue::Float(*v)),
            AttributeValue::String(v) => Some(TypedValue::Str(v.clone())),
            AttributeValue::Json(v) if v.is_object() => Some(TypedValue::Json(v.clone())),
            AttributeValue::Json(_) => None,
        }
    }

    /// Applies an operator against the clause operand list. Unsupported
    /// operator/type combinations evaluate to false.
    pub(crate) fn apply(&self, op: &Operator, operands: &[String]) -> bool {
        let first = match operands.first() {
            Some(first) => first,
            None => return false,
        };
        match self {
            TypedValue::Bool(val) => match op {
                Operator::In => operands.iter().any(|o| parse_bool(o) == Some(*val)),
                Operator::Equal => parse_bool(first) == Some(*val),
                _ => false,
            },
            TypedValue::Int(val) => match op {
                Operator::In => operands.iter().any(|o| parse_int(o) == Some(*val)),
                Operator::Equal => parse_int(first) == Some(*val),
                Operator::GreaterThan => parse_int(first).is_some_and(|o| *val > o),
                Operator::GreaterThanOrEqual => parse_int(first).is_some_and(|o| *val >= o),
                Operator::LessThan => parse_int(first).is_some_and(|o| *val < o),
                Operator::LessThanOrEqual => parse_int(first).is_some_and(|o| *val <= o),
                _ => false,
            },
            TypedValue::Float(val) => match op {
                Operator::In => operands.iter().any(|o| parse_float(o) == Some(*val)),
                Operator::Equal => parse_float(first) == Some(*val),
                Operator::GreaterThan => parse_float(first).is_some_and(|o| *val > o),
                Operator::GreaterThanOrEqual => parse_float(first).is_some_and(|o| *val >= o),
                Operator::LessThan => parse_float(first).is_some_and(|o| *val < o),
                Operator::LessThanOrEqual => parse_float(first).is_some_and(|o| *val <= o),
                _ => false,
            },
            TypedValue::Str(val) => {
                let lowered = val.to_lowercase();
                match op {
                    Operator::In => operands.iter().any(|o| o == val),
                    Operator::Equal => lowered == first.to_lowercase(),
                    Operator::EqualSensitive => val == first,
                    Operator::GreaterThan => lowered > first.to_lowercase(),
                    Operator::GreaterThanOrEqual => lowered >= first.to_lowercase(),
                    Operator::LessThan => lowered < first.to_lowercase(),
                    Operator::LessThanOrEqual => lowered <= first.to_lowercase(),
                    Operator::StartsWith => val.starts_with(first.as_str()),
                    Operator::EndsWith => val.ends_with(first.as_str()),
                    Operator::Contains => val.contains(first.as_str()),
                    Operator::Match => match Regex::new(first) {
                        Ok(re) => re.is_match(val),
                        Err(_) => false,
                    },
                    _ => false,
                }
            }
            TypedValue::Json(val) => match op {
                Operator::In => operands
                    .iter()
                    .any(|o| serde_json::from_str::<serde_json::Value>(o).is_ok_and(|v| v == *val)),
                Operator::Equal => {
                    serde_json::from_str::<serde_json::Value>(first).is_ok_and(|v| v == *val)
                }
                _ => false,
            },
        }
    }
}

fn parse_bool(operand: &str) -> Option<bool> {
    match operand.to_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn parse_int(operand: &str) -> Option<i64> {
    operand.trim().parse().ok()
}

fn parse_float(operand: &str) -> Option<f64> {
    operand.trim().parse().ok()
}

/// Computes the rollout bucket for a bucket-by attribute value and a
/// flag/segment discriminator: `murmur3_32(discriminator + ":" + value) % 100 + 1`.
///
/// MurmurHash3 x86-32 keeps buckets wire-compatible with other SDKs serving the
/// same flags, so repeated evaluation lands in the same bucket across processes.
pub(crate) fn bucket(discriminator: &str, attr_value: &str) -> u32 {
    let mut payload = Cursor::new(format!("{discriminator}:{attr_value}"));
    // Cursor reads cannot fail; the fallback keeps the signature total.
    let hash = murmur3::murmur3_32(&mut payload, 0).unwrap_or_default();
    hash % 100 + 1
}

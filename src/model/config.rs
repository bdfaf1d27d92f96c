use crate::model::enums::{FlagKind, FlagState, Operator};
use crate::value::FlagValue;
use serde::Deserialize;
use std::fmt::{Display, Formatter};

/// Describes one possible typed value a flag can resolve to.
///
/// The raw `value` is string-encoded on the wire and lazily interpreted by the
/// requested result type at the call site.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    /// The variation's unique identifier within its flag.
    pub identifier: String,
    /// The string-encoded value of the variation.
    pub value: String,
    /// Display name of the variation.
    #[serde(default)]
    pub name: Option<String>,
    /// Description of the variation.
    #[serde(default)]
    pub description: Option<String>,
}

impl Variation {
    /// The sentinel returned when a flag, variation, or target cannot be resolved.
    /// Typed accessors substitute the caller-supplied default for it.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True for the sentinel produced by [`Variation::empty`].
    pub fn is_empty(&self) -> bool {
        self.identifier.is_empty()
    }

    /// Interprets the raw value by the given flag kind. Returns [`None`] when the
    /// encoding cannot be parsed as the requested type.
    pub fn typed_value(&self, kind: &FlagKind) -> Option<FlagValue> {
        match kind {
            FlagKind::Bool => match self.value.to_lowercase().as_str() {
                "true" => Some(FlagValue::Bool(true)),
                "false" => Some(FlagValue::Bool(false)),
                _ => None,
            },
            FlagKind::Int => self.value.trim().parse::<i64>().ok().map(FlagValue::Int),
            FlagKind::Number => self.value.trim().parse::<f64>().ok().map(FlagValue::Float),
            FlagKind::String => Some(FlagValue::String(self.value.clone())),
            FlagKind::Json => serde_json::from_str(&self.value).ok().map(FlagValue::Json),
        }
    }
}

/// A reference to a target inside a segment's inclusion/exclusion list or a
/// flag's direct variation override map.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    /// The referenced target's unique identifier.
    pub identifier: String,
    /// The referenced target's display name.
    #[serde(default)]
    pub name: Option<String>,
}

/// A single comparison gating a serving rule or segment membership.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Clause {
    /// Stable identifier of the clause.
    #[serde(default)]
    pub id: Option<String>,
    /// The target attribute the clause compares.
    pub attribute: String,
    /// The comparison operator.
    pub op: Operator,
    /// Negates the operator result when set.
    #[serde(default)]
    pub negate: bool,
    /// The comparison operand list.
    pub values: Vec<String>,
}

impl Display for Clause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let not = if self.negate { "NOT " } else { "" };
        write!(
            f,
            "target.{} {not}{} {:?}",
            self.attribute, self.op, self.values
        )
    }
}

/// One entry of a percentage rollout, carrying a cumulative integer weight.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WeightedVariation {
    /// The variation identifier served to targets bucketed into this entry.
    pub variation: String,
    /// Weight between 0 and 100. Weights are cumulative in list order.
    pub weight: u32,
}

/// A weighted percentage rollout across variations, bucketed by a hashed attribute.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    /// The target attribute whose value selects the bucket.
    pub bucket_by: String,
    /// The ordered, cumulatively weighted entries.
    pub variations: Vec<WeightedVariation>,
}

/// Either a fixed variation identifier or a percentage [`Distribution`].
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Serve {
    /// The fixed variation identifier, when no distribution applies.
    #[serde(default)]
    pub variation: Option<String>,
    /// The percentage distribution, when no fixed variation applies.
    #[serde(default)]
    pub distribution: Option<Distribution>,
}

/// A prioritized, clause-gated directive producing a variation or distribution.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ServingRule {
    /// Stable identifier of the rule.
    #[serde(default)]
    pub rule_id: Option<String>,
    /// Lower value means higher precedence.
    pub priority: i64,
    /// Clause list combined with logical AND.
    pub clauses: Vec<Clause>,
    /// What to serve when every clause matches.
    pub serve: Serve,
}

/// A dependency requiring another flag to resolve to an allowed variation set.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Prerequisite {
    /// Identifier of the required flag.
    pub feature: String,
    /// The variation identifiers on the required flag that satisfy the prerequisite.
    pub variations: Vec<String>,
}

/// A direct variation override mapping specific targets or segments to a variation,
/// evaluated before serving rules.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VariationMap {
    /// The variation identifier to serve.
    pub variation: String,
    /// Targets matched by identifier.
    #[serde(default)]
    pub targets: Option<Vec<TargetRef>>,
    /// Segments matched by membership.
    #[serde(default)]
    pub target_segments: Option<Vec<String>>,
}

/// A named, reusable set/rule-based membership test over targets ("target group").
///
/// Owned by the repository; replaced wholesale on each sync update.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// The segment's unique identifier.
    pub identifier: String,
    /// The segment's display name.
    pub name: String,
    /// Environment the segment is scoped to.
    #[serde(default)]
    pub environment: Option<String>,
    /// Targets that are members regardless of rules.
    #[serde(default)]
    pub included: Option<Vec<TargetRef>>,
    /// Targets that are never members regardless of rules.
    #[serde(default)]
    pub excluded: Option<Vec<TargetRef>>,
    /// Rule-based membership clauses; any match grants membership.
    #[serde(default)]
    pub rules: Option<Vec<Clause>>,
    /// Monotonically increasing version, gating repository writes.
    #[serde(default)]
    pub version: i64,
}

/// Describes a feature flag.
///
/// Owned by the repository; replaced wholesale on update, subject to the
/// version-gated write described at [`crate::repository::Repository::set_flag`].
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FeatureConfig {
    /// Project the flag belongs to.
    pub project: String,
    /// Environment the flag is scoped to.
    pub environment: String,
    /// The flag's unique identifier.
    pub feature: String,
    /// On/off state. Off flags serve the off variation unconditionally.
    pub state: FlagState,
    /// The flag's result type.
    pub kind: FlagKind,
    /// All variations the flag can resolve to.
    pub variations: Vec<Variation>,
    /// Variation identifier served while the flag is off or a prerequisite fails.
    pub off_variation: String,
    /// What to serve when no rule or override matches.
    pub default_serve: Serve,
    /// Targeting rules, evaluated in ascending priority order.
    #[serde(default)]
    pub rules: Option<Vec<ServingRule>>,
    /// Prerequisite flags that must resolve to allowed variations.
    #[serde(default)]
    pub prerequisites: Option<Vec<Prerequisite>>,
    /// Direct variation overrides for specific targets or segments.
    #[serde(default)]
    pub variation_to_target_map: Option<Vec<VariationMap>>,
    /// Monotonically increasing version, gating repository writes.
    #[serde(default)]
    pub version: i64,
}

impl FeatureConfig {
    /// Resolves a variation identifier against the flag's variation list.
    pub fn variation(&self, identifier: &str) -> Option<&Variation> {
        self.variations.iter().find(|v| v.identifier == identifier)
    }
}

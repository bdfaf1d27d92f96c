use crate::eval::operators::{bucket, TypedValue};
use crate::model::config::{Clause, Distribution, FeatureConfig, Segment, Serve, ServingRule, Variation};
use crate::model::enums::{FlagState, Operator};
use crate::repository::Repository;
use crate::target::Target;
use log::{debug, warn};
use std::sync::Arc;

/// The rule evaluation engine.
///
/// Reads the repository's current snapshot only; never touches the network and
/// never fails. Absence of a flag, variation, or matching rule degrades to the
/// empty variation, which typed accessors replace with the caller's default.
pub struct Evaluator {
    repository: Arc<Repository>,
}

impl Evaluator {
    pub(crate) fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }

    /// Evaluates a flag for the given target.
    ///
    /// Returns [`Variation::empty`] when the flag is unknown or its serve
    /// directives cannot be resolved to an existing variation.
    pub fn evaluate(&self, flag_identifier: &str, target: &Target) -> Variation {
        let mut visited = Vec::new();
        self.evaluate_flag(flag_identifier, target, &mut visited)
    }

    fn evaluate_flag(
        &self,
        flag_identifier: &str,
        target: &Target,
        visited: &mut Vec<String>,
    ) -> Variation {
        let flag = match self.repository.get_flag(flag_identifier) {
            Some(flag) => flag,
            None => {
                debug!("Flag '{flag_identifier}' not found in the local replica");
                return Variation::empty();
            }
        };

        if !self.prerequisites_satisfied(&flag, target, visited) {
            return self.off_variation(&flag);
        }

        if flag.state == FlagState::Off {
            return self.off_variation(&flag);
        }

        let served = self
            .evaluate_variation_map(&flag, target)
            .or_else(|| self.evaluate_rules(&flag, target))
            .or_else(|| self.resolve_serve(&flag.default_serve, target, &flag.feature));

        match served {
            Some(identifier) => self.resolve_variation(&flag, &identifier),
            None => Variation::empty(),
        }
    }

    fn prerequisites_satisfied(
        &self,
        flag: &FeatureConfig,
        target: &Target,
        visited: &mut Vec<String>,
    ) -> bool {
        let prerequisites = match flag.prerequisites.as_ref() {
            Some(prerequisites) if !prerequisites.is_empty() => prerequisites,
            _ => return true,
        };
        visited.push(flag.feature.clone());
        let mut satisfied = true;
        for prerequisite in prerequisites {
            // A repeated identifier means a prerequisite cycle; fail closed
            // instead of recursing forever.
            if visited.contains(&prerequisite.feature) {
                warn!(
                    "Prerequisite cycle detected while evaluating flag '{}': '{}' was already visited",
                    flag.feature, prerequisite.feature
                );
                satisfied = false;
                break;
            }
            let result = self.evaluate_flag(&prerequisite.feature, target, visited);
            if !prerequisite.variations.contains(&result.identifier) {
                satisfied = false;
                break;
            }
        }
        visited.pop();
        satisfied
    }

    fn evaluate_variation_map(&self, flag: &FeatureConfig, target: &Target) -> Option<String> {
        for map in flag.variation_to_target_map.iter().flatten() {
            let by_identifier = map
                .targets
                .iter()
                .flatten()
                .any(|t| t.identifier == target.identifier());
            if by_identifier {
                return Some(map.variation.clone());
            }
            if let Some(segments) = map.target_segments.as_ref() {
                if self.any_segment_matches(segments, target) {
                    return Some(map.variation.clone());
                }
            }
        }
        None
    }

    fn evaluate_rules(&self, flag: &FeatureConfig, target: &Target) -> Option<String> {
        let rules = flag.rules.as_ref()?;
        let mut ordered: Vec<&ServingRule> = rules.iter().collect();
        ordered.sort_by_key(|rule| rule.priority);
        for rule in ordered {
            // Clauses within a rule are AND-combined; rules themselves are
            // OR-combined by taking the first match in priority order.
            let matched = rule
                .clauses
                .iter()
                .all(|clause| self.evaluate_clause(clause, target, true));
            if !matched {
                continue;
            }
            if let Some(identifier) = self.resolve_serve(&rule.serve, target, &flag.feature) {
                return Some(identifier);
            }
        }
        None
    }

    fn resolve_serve(&self, serve: &Serve, target: &Target, flag_identifier: &str) -> Option<String> {
        if let Some(variation) = serve.variation.as_ref() {
            return Some(variation.clone());
        }
        if let Some(distribution) = serve.distribution.as_ref() {
            return self.evaluate_distribution(distribution, target, flag_identifier);
        }
        warn!("Serve directive of flag '{flag_identifier}' has neither a variation nor a distribution");
        None
    }

    fn evaluate_distribution(
        &self,
        distribution: &Distribution,
        target: &Target,
        flag_identifier: &str,
    ) -> Option<String> {
        let attr = target.get(&distribution.bucket_by)?;
        let attr_value = attr.to_string();
        // A missing or empty bucket-by value never lands in a default bucket.
        if attr_value.is_empty() {
            debug!(
                "Bucket-by attribute '{}' of flag '{flag_identifier}' is empty for target '{}'",
                distribution.bucket_by,
                target.identifier()
            );
            return None;
        }
        let bucket_value = bucket(&distribution.bucket_by, &attr_value);
        let mut total = 0;
        for weighted in &distribution.variations {
            total += weighted.weight;
            if bucket_value <= total {
                return Some(weighted.variation.clone());
            }
        }
        distribution
            .variations
            .last()
            .map(|weighted| weighted.variation.clone())
    }

    fn evaluate_clause(&self, clause: &Clause, target: &Target, allow_segments: bool) -> bool {
        if clause.op == Operator::SegmentMatch {
            // Segment rules themselves must not reference segments.
            if !allow_segments {
                return false;
            }
            let member = self.any_segment_matches(&clause.values, target);
            return member != clause.negate;
        }
        let attr = match target.get(&clause.attribute) {
            Some(attr) => attr,
            None => return false,
        };
        let typed = match TypedValue::classify(&attr) {
            Some(typed) => typed,
            None => return false,
        };
        typed.apply(&clause.op, &clause.values) != clause.negate
    }

    fn any_segment_matches(&self, identifiers: &[String], target: &Target) -> bool {
        identifiers.iter().any(|identifier| {
            match self.repository.get_segment(identifier) {
                Some(segment) => self.segment_matches(&segment, target),
                None => {
                    debug!("Segment '{identifier}' not found in the local replica");
                    false
                }
            }
        })
    }

    fn segment_matches(&self, segment: &Segment, target: &Target) -> bool {
        // Explicit exclusion wins over inclusion and rules.
        let excluded = segment
            .excluded
            .iter()
            .flatten()
            .any(|t| t.identifier == target.identifier());
        if excluded {
            return false;
        }
        let included = segment
            .included
            .iter()
            .flatten()
            .any(|t| t.identifier == target.identifier());
        if included {
            return true;
        }
        segment
            .rules
            .iter()
            .flatten()
            .any(|clause| self.evaluate_clause(clause, target, false))
    }

    fn off_variation(&self, flag: &FeatureConfig) -> Variation {
        self.resolve_variation(flag, &flag.off_variation)
    }

    fn resolve_variation(&self, flag: &FeatureConfig, identifier: &str) -> Variation {
        match flag.variation(identifier) {
            Some(variation) => variation.clone(),
            None => {
                warn!(
                    "Variation '{identifier}' is not defined on flag '{}'",
                    flag.feature
                );
                Variation::empty()
            }
        }
    }
}

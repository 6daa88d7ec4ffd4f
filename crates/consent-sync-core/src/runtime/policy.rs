// crates/consent-sync-core/src/runtime/policy.rs
// ============================================================================
// Module: Consent Sync Policy Resolver
// Description: Region and segment lookup of checkout presentation policy.
// Purpose: Map (region, segment) to a presentation mode and opt-in strength.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! Policy rows are keyed by region code or region name plus an optional
//! customer segment. Resolution is ordered:
//!
//! 1. region code with the exact segment, then the code's segment wildcard;
//! 2. region name (case-insensitive) with the exact segment, then its wildcard;
//! 3. the fixed default (`GB`, opt-out, single opt-in).
//!
//! A segment-specific row always beats a wildcard row for the same region.
//! When the segment is unknown only wildcard rows match. Resolution is pure and
//! the table is read-only after construction, so a resolver may be shared
//! freely across threads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::ConfirmationStrength;
use crate::core::CustomerSegment;
use crate::core::PresentationMode;
use crate::core::RegionCode;

// ============================================================================
// SECTION: Policy Rows
// ============================================================================

/// Region code used by the fixed default policy.
pub const DEFAULT_POLICY_REGION: &str = "GB";

/// One validated policy row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Region code key.
    pub region_code: Option<RegionCode>,
    /// Region name key.
    pub region_name: Option<String>,
    /// Segment this row applies to; `None` matches any segment.
    pub segment: Option<CustomerSegment>,
    /// Presentation mode.
    pub presentation: PresentationMode,
    /// Opt-in strength.
    pub confirmation: ConfirmationStrength,
}

/// Which lookup step produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMatch {
    /// Matched by region code.
    RegionCode,
    /// Matched by region name.
    RegionName,
    /// No row matched; the fixed default applied.
    Default,
}

impl PolicyMatch {
    /// Returns the canonical label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RegionCode => "region_code",
            Self::RegionName => "region_name",
            Self::Default => "default",
        }
    }
}

/// Resolved checkout policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// Presentation mode to show.
    pub presentation: PresentationMode,
    /// Opt-in strength to require.
    pub confirmation: ConfirmationStrength,
    /// Region the decision applies to.
    pub region: Option<RegionCode>,
    /// Lookup step that matched.
    pub matched: PolicyMatch,
}

/// Rows for one region key, split by segment.
#[derive(Debug, Clone, Default)]
struct RegionRules {
    /// Row applying to any segment.
    wildcard: Option<PolicyRule>,
    /// Row for first-time customers.
    first_time: Option<PolicyRule>,
    /// Row for returning customers.
    returning: Option<PolicyRule>,
}

impl RegionRules {
    /// Stores a row in its segment slot; the first row for a slot wins.
    fn insert(&mut self, rule: PolicyRule) {
        let slot = match rule.segment {
            None => &mut self.wildcard,
            Some(CustomerSegment::FirstTime) => &mut self.first_time,
            Some(CustomerSegment::Returning) => &mut self.returning,
        };
        if slot.is_none() {
            *slot = Some(rule);
        }
    }

    /// Picks the segment-specific row, falling back to the wildcard.
    fn pick(&self, segment: Option<CustomerSegment>) -> Option<&PolicyRule> {
        let specific = match segment {
            Some(CustomerSegment::FirstTime) => self.first_time.as_ref(),
            Some(CustomerSegment::Returning) => self.returning.as_ref(),
            None => None,
        };
        specific.or(self.wildcard.as_ref())
    }
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Read-only policy table.
#[derive(Debug, Clone, Default)]
pub struct PolicyResolver {
    /// Rows keyed by uppercase region code.
    by_code: BTreeMap<String, RegionRules>,
    /// Rows keyed by lowercase region name.
    by_name: BTreeMap<String, RegionRules>,
}

impl PolicyResolver {
    /// Builds a resolver from validated rows. Rows with neither key are ignored.
    #[must_use]
    pub fn from_rules(rules: impl IntoIterator<Item = PolicyRule>) -> Self {
        let mut resolver = Self::default();
        for rule in rules {
            if let Some(code) = &rule.region_code {
                resolver.by_code.entry(code.as_str().to_string()).or_default().insert(rule.clone());
            }
            if let Some(name) = rule.region_name.as_deref().map(normalize_name)
                && !name.is_empty()
            {
                resolver.by_name.entry(name).or_default().insert(rule);
            }
        }
        resolver
    }

    /// Returns a resolver with no rows; every lookup yields the default.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the number of distinct region keys loaded.
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.by_code.len() + self.by_name.len()
    }

    /// Resolves the policy for a region and segment.
    #[must_use]
    pub fn resolve(
        &self,
        region: Option<&RegionCode>,
        region_name: Option<&str>,
        segment: Option<CustomerSegment>,
    ) -> PolicyDecision {
        if let Some(code) = region
            && let Some(rule) = self.by_code.get(code.as_str()).and_then(|rows| rows.pick(segment))
        {
            return decision(rule, Some(code.clone()), PolicyMatch::RegionCode);
        }
        if let Some(name) = region_name.map(normalize_name)
            && let Some(rule) = self.by_name.get(&name).and_then(|rows| rows.pick(segment))
        {
            let code = rule.region_code.clone().or_else(|| region.cloned());
            return decision(rule, code, PolicyMatch::RegionName);
        }
        PolicyDecision {
            presentation: PresentationMode::OptOut,
            confirmation: ConfirmationStrength::Single,
            region: RegionCode::parse(DEFAULT_POLICY_REGION),
            matched: PolicyMatch::Default,
        }
    }
}

/// Builds a decision from a matched row.
fn decision(rule: &PolicyRule, region: Option<RegionCode>, matched: PolicyMatch) -> PolicyDecision {
    PolicyDecision {
        presentation: rule.presentation,
        confirmation: rule.confirmation,
        region,
        matched,
    }
}

/// Normalizes a region name for lookup.
fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::PolicyMatch;
    use super::PolicyResolver;
    use super::PolicyRule;
    use crate::core::ConfirmationStrength;
    use crate::core::CustomerSegment;
    use crate::core::PresentationMode;
    use crate::core::RegionCode;

    fn rule(
        code: Option<&str>,
        name: Option<&str>,
        segment: Option<CustomerSegment>,
        presentation: PresentationMode,
    ) -> PolicyRule {
        PolicyRule {
            region_code: code.and_then(RegionCode::parse),
            region_name: name.map(ToString::to_string),
            segment,
            presentation,
            confirmation: ConfirmationStrength::Single,
        }
    }

    fn resolver() -> PolicyResolver {
        PolicyResolver::from_rules([
            rule(Some("DE"), None, None, PresentationMode::OptIn),
            rule(Some("DE"), None, Some(CustomerSegment::Returning), PresentationMode::OptOut),
            rule(Some("US"), Some("United States"), None, PresentationMode::NoCheckbox),
            rule(None, Some("Gondor"), Some(CustomerSegment::FirstTime), PresentationMode::OptIn),
        ])
    }

    #[test]
    fn segment_row_beats_wildcard() {
        let de = RegionCode::parse("de");
        let decision = resolver().resolve(de.as_ref(), None, Some(CustomerSegment::Returning));
        assert_eq!(decision.presentation, PresentationMode::OptOut);
        let decision = resolver().resolve(de.as_ref(), None, Some(CustomerSegment::FirstTime));
        assert_eq!(decision.presentation, PresentationMode::OptIn);
        let decision = resolver().resolve(de.as_ref(), None, None);
        assert_eq!(decision.presentation, PresentationMode::OptIn);
    }

    #[test]
    fn name_lookup_is_case_insensitive() {
        let decision = resolver().resolve(None, Some("  united STATES "), None);
        assert_eq!(decision.presentation, PresentationMode::NoCheckbox);
        assert_eq!(decision.matched, PolicyMatch::RegionName);
        assert_eq!(decision.region, RegionCode::parse("US"));
    }

    #[test]
    fn unknown_segment_skips_segment_only_rows() {
        let decision = resolver().resolve(None, Some("Gondor"), None);
        assert_eq!(decision.matched, PolicyMatch::Default);
        let decision = resolver().resolve(None, Some("Gondor"), Some(CustomerSegment::FirstTime));
        assert_eq!(decision.presentation, PresentationMode::OptIn);
    }

    #[test]
    fn missing_region_uses_fixed_default() {
        let decision = PolicyResolver::empty().resolve(None, None, None);
        assert_eq!(decision.presentation, PresentationMode::OptOut);
        assert_eq!(decision.confirmation, ConfirmationStrength::Single);
        assert_eq!(decision.region, RegionCode::parse("GB"));
        assert_eq!(decision.matched, PolicyMatch::Default);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User-supplied constraints for one generation session. Immutable per attempt;
/// `complexity` and `timeframe` must be echoed verbatim by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectConstraints {
    pub app_type: String,
    pub project_kind: Option<String>,
    pub complexity: String,
    pub tech_stack: Vec<String>,
    pub database: Option<String>,
    pub goal: String,
    pub timeframe: String,
    pub idea_description: Option<String>,
}

impl ProjectConstraints {
    pub fn valid_complexity(&self) -> bool {
        matches!(
            self.complexity.as_str(),
            "beginner" | "intermediate" | "advanced"
        )
    }
}

/// Decoded provider output. Field names are the wire contract; any unknown
/// field or missing field fails the whole decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratedIdea {
    pub project: IdeaProject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdeaProject {
    pub name: String,
    pub tagline: String,
    pub description: IdeaDescription,
    pub problem_statement: IdeaProblem,
    pub target_users: IdeaTargetUsers,
    pub value_proposition: IdeaValueProp,
    pub mvp: IdeaMvp,
    pub recommended_tech_stack: IdeaTechStack,
    pub complexity: String,
    pub estimated_duration: IdeaDuration,
    pub future_extensions: Vec<String>,
    pub learning_outcomes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdeaDescription {
    pub summary: String,
    pub detailed_explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdeaProblem {
    pub problem: String,
    pub why_it_matters: String,
    pub current_solutions_and_gaps: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdeaTargetUsers {
    pub primary: Vec<String>,
    pub secondary: Vec<String>,
    pub use_cases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdeaValueProp {
    pub key_benefits: Vec<String>,
    pub why_this_project_is_interesting: String,
    pub portfolio_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdeaMvp {
    pub goal: String,
    pub must_have_features: Vec<String>,
    pub nice_to_have_features: Vec<String>,
    pub out_of_scope: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdeaTechStack {
    pub backend: String,
    pub frontend: String,
    pub database: String,
    pub infra: String,
    pub justification: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdeaDuration {
    pub range: String,
    pub assumptions: String,
}

impl IdeaProject {
    /// `name — tagline — summary` line used in snapshots and the fingerprint.
    pub fn overview(&self) -> String {
        let mut parts = vec![self.name.trim().to_string()];
        if !self.tagline.trim().is_empty() {
            parts.push(self.tagline.trim().to_string());
        }
        if !self.description.summary.trim().is_empty() {
            parts.push(self.description.summary.trim().to_string());
        }
        parts.join(" — ")
    }

    /// Non-empty tech stack fields, in schema order.
    pub fn flat_tech_stack(&self) -> Vec<String> {
        [
            &self.recommended_tech_stack.backend,
            &self.recommended_tech_stack.frontend,
            &self.recommended_tech_stack.database,
            &self.recommended_tech_stack.infra,
        ]
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
    }
}

/// Provenance of one provider call. Never altered after creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    pub provider_used: String,
    pub fallback_used: bool,
    pub provider_error: Option<String>,
    pub latency_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryReason {
    #[serde(rename = "SIMILARITY_TOO_HIGH")]
    SimilarityTooHigh,
    #[serde(rename = "DUPLICATE_DNA")]
    DuplicateDna,
    #[serde(rename = "USER_REJECTED")]
    UserRejected,
    #[serde(rename = "QUALITY_TOO_GENERIC")]
    QualityTooGeneric,
}

impl RetryReason {
    pub fn wire_name(&self) -> &'static str {
        match self {
            RetryReason::SimilarityTooHigh => "SIMILARITY_TOO_HIGH",
            RetryReason::DuplicateDna => "DUPLICATE_DNA",
            RetryReason::UserRejected => "USER_REJECTED",
            RetryReason::QualityTooGeneric => "QUALITY_TOO_GENERIC",
        }
    }

    /// Default strategy for a reason; quality rejections rotate instead.
    pub fn default_strategy(&self) -> PivotStrategy {
        match self {
            RetryReason::SimilarityTooHigh => PivotStrategy::ChangeTargetUser,
            RetryReason::DuplicateDna => PivotStrategy::ContextShift,
            RetryReason::UserRejected => PivotStrategy::FeatureReplacement,
            RetryReason::QualityTooGeneric => PivotStrategy::FeatureReplacement,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PivotStrategy {
    #[serde(rename = "CHANGE_TARGET_USER")]
    ChangeTargetUser,
    #[serde(rename = "FEATURE_REPLACEMENT")]
    FeatureReplacement,
    #[serde(rename = "CONTEXT_SHIFT")]
    ContextShift,
    #[serde(rename = "REFINE_DEPTH")]
    RefineDepth,
}

impl PivotStrategy {
    pub fn wire_name(&self) -> &'static str {
        match self {
            PivotStrategy::ChangeTargetUser => "CHANGE_TARGET_USER",
            PivotStrategy::FeatureReplacement => "FEATURE_REPLACEMENT",
            PivotStrategy::ContextShift => "CONTEXT_SHIFT",
            PivotStrategy::RefineDepth => "REFINE_DEPTH",
        }
    }

    /// Deterministic rotation across repeated quality failures.
    pub fn rotate(attempt: u32) -> PivotStrategy {
        match attempt % 3 {
            1 => PivotStrategy::ChangeTargetUser,
            2 => PivotStrategy::ContextShift,
            _ => PivotStrategy::FeatureReplacement,
        }
    }
}

/// Retry state threaded through the orchestrator. A value, not shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    pub reason: RetryReason,
    pub strategy: PivotStrategy,
    pub attempt: u32,
}

/// Persisted idea record: canonical snapshot fields plus provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredIdea {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub overview: String,
    pub mvp_scope: Vec<String>,
    pub tech_stack: Vec<String>,
    pub complexity: String,
    pub duration: String,
    pub app_type: String,
    pub goal: String,
    pub fingerprint: String,
    pub provider_used: String,
    pub fallback_used: bool,
    pub provider_error: Option<String>,
    pub latency_ms: i64,
    pub retry_reason: Option<RetryReason>,
    pub raw_json: String,
}

/// Next-phase evolution of a stored idea. Same strict wire discipline as
/// `GeneratedIdea`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectEvolution {
    pub evolution_overview: String,
    pub product_rationale: String,
    pub technical_rationale: String,
    pub proposed_enhancements: Vec<String>,
    pub risk_considerations: Vec<String>,
}

/// Persisted evolution record, tied to the idea it evolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvolution {
    pub id: Uuid,
    pub project_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub provider_used: String,
    pub fallback_used: bool,
    pub provider_error: Option<String>,
    pub latency_ms: i64,
    pub raw_json: String,
}


#[cfg(test)]
mod tests {
    use super::fixtures::sample_idea;
    use super::*;

    #[test]
    fn test_overview_joins_nonempty_parts() {
        let idea = sample_idea();
        let overview = idea.project.overview();
        assert!(overview.starts_with("Ledgerline — "));
        assert!(overview.contains(&idea.project.tagline));
    }

    #[test]
    fn test_overview_skips_blank_tagline() {
        let mut idea = sample_idea();
        idea.project.tagline = "   ".into();
        let overview = idea.project.overview();
        assert!(overview.starts_with("Ledgerline — An append-only"));
    }

    #[test]
    fn test_flat_tech_stack_drops_empty_fields() {
        let mut idea = sample_idea();
        idea.project.recommended_tech_stack.frontend = "".into();
        let stack = idea.project.flat_tech_stack();
        assert_eq!(stack.len(), 3);
        assert_eq!(stack[0], "Go (net/http)");
    }

    #[test]
    fn test_retry_reason_wire_names() {
        assert_eq!(
            RetryReason::SimilarityTooHigh.wire_name(),
            "SIMILARITY_TOO_HIGH"
        );
        assert_eq!(RetryReason::DuplicateDna.wire_name(), "DUPLICATE_DNA");
        assert_eq!(
            RetryReason::QualityTooGeneric.wire_name(),
            "QUALITY_TOO_GENERIC"
        );
    }

    #[test]
    fn test_default_strategy_mapping() {
        assert_eq!(
            RetryReason::SimilarityTooHigh.default_strategy(),
            PivotStrategy::ChangeTargetUser
        );
        assert_eq!(
            RetryReason::DuplicateDna.default_strategy(),
            PivotStrategy::ContextShift
        );
        assert_eq!(
            RetryReason::UserRejected.default_strategy(),
            PivotStrategy::FeatureReplacement
        );
    }

    #[test]
    fn test_strategy_rotation_is_deterministic() {
        assert_eq!(PivotStrategy::rotate(0), PivotStrategy::FeatureReplacement);
        assert_eq!(PivotStrategy::rotate(1), PivotStrategy::ChangeTargetUser);
        assert_eq!(PivotStrategy::rotate(2), PivotStrategy::ContextShift);
        assert_eq!(PivotStrategy::rotate(3), PivotStrategy::FeatureReplacement);
    }

    #[test]
    fn test_idea_json_roundtrip() {
        let idea = sample_idea();
        let json = serde_json::to_string(&idea).unwrap();
        let parsed: GeneratedIdea = serde_json::from_str(&json).unwrap();
        assert_eq!(idea, parsed);
    }
}

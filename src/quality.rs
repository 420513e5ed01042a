use crate::data::GeneratedIdea;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityDecision {
    Accept,
    Refine,
    Pivot,
    Regenerate,
}

#[derive(Debug, Clone)]
pub struct QualityVerdict {
    pub decision: QualityDecision,
    pub hard_fail: bool,
    pub reasons: Vec<String>,
}

impl QualityVerdict {
    pub fn ok(&self) -> bool {
        !self.hard_fail && self.decision == QualityDecision::Accept
    }

    pub fn summary(&self) -> String {
        if self.reasons.is_empty() {
            return "ok".into();
        }
        format!("{:?}: {}", self.decision, self.reasons.join("; "))
    }
}

/// Keyword membership tests behind the quality gate. Swappable so the lists
/// can evolve without touching the gate or the orchestrator.
pub trait Classifier {
    fn looks_cliche(&self, text: &str) -> bool;
    fn has_extreme_twist(&self, text: &str) -> bool;
    fn looks_like_clone(&self, text: &str) -> bool;
    fn looks_like_crud(&self, text: &str) -> bool;
    fn has_technical_depth(&self, text: &str) -> bool;
    fn has_differentiation(&self, text: &str) -> bool;
    fn has_constraint_signals(&self, text: &str) -> bool;
    fn has_tradeoff_signals(&self, text: &str) -> bool;
    fn has_interview_signals(&self, text: &str) -> bool;
    fn big_rock_count(&self, text: &str) -> usize;
    fn is_placeholder_scope(&self, items: &[String]) -> bool;
}

/// Hand-tuned keyword lists. Treated as configuration, not invariants.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordClassifier;

const CLICHE: &[&str] = &[
    "todo",
    "to-do",
    "habit tracker",
    "weather app",
    "url shortener",
    "shorten url",
    "blog platform",
    "e-commerce",
    "ecommerce",
    "shopping cart",
    "chat app",
    "expense tracker",
    "personal finance",
    "pomodoro",
    "notes app",
    "note-taking",
    "recipe app",
    "movie tracker",
];

const EXTREME_TWIST: &[&str] = &[
    "end-to-end encryption",
    "e2ee",
    "zero-knowledge",
    "differential privacy",
    "privacy budget",
    "crdt",
    "offline-first",
    "local-first",
    "conflict-free",
    "federated",
    "matrix protocol",
    "activitypub",
    "formal verification",
    "model checking",
    "deterministic replay",
    "tamper-evident",
    "append-only log",
    "real-time",
    "backpressure",
    "streaming",
];

const CLONE: &[&str] = &[
    " clone",
    "clone of",
    "like trello",
    "like notion",
    "like spotify",
    "like netflix",
    "like uber",
    "like airbnb",
    "like twitter",
    "like instagram",
];

const CRUDISH: &[&str] = &[
    "crud",
    "create read update delete",
    "create, read, update, delete",
    "add/edit/delete",
    "add, edit, delete",
    "manage users",
    "manage items",
    "admin panel",
    "admin dashboard",
    "login",
    "sign in",
    "sign-up",
    "register",
    "authentication",
    "dashboard",
    "profile page",
    "settings page",
];

const TECH_DEPTH: &[&str] = &[
    "event-driven",
    "queue",
    "job queue",
    "streaming",
    "pub/sub",
    "idempotency",
    "dedup",
    "outbox",
    "saga",
    "rate limit",
    "backpressure",
    "observability",
    "tracing",
    "opentelemetry",
    "slo",
    "multi-tenant",
    "rbac",
    "abac",
    "audit log",
    "encryption",
    "key management",
    "kms",
    "indexing",
    "inverted index",
    "search ranking",
    "caching",
    "cache invalidation",
    "consistency",
    "distributed",
    "replication",
    "crdt",
    "offline-first",
    "local-first",
    "vector",
    "embedding",
    "retrieval",
    "rag",
];

const DIFFERENTIATION: &[&str] = &[
    "tamper-evident",
    "append-only log",
    "merkle",
    "deterministic replay",
    "threat model",
    "policy engine",
    "rego",
    "opa",
    "crdt",
    "local-first",
    "offline-first",
    "zero-knowledge",
    "zk",
    "end-to-end encryption",
    "e2ee",
    "differential privacy",
    "privacy budget",
    "backpressure",
    "outbox",
    "saga",
    "idempotency",
    "vector index",
    "inverted index",
];

const CONSTRAINTS: &[&str] = &[
    "performance",
    "latency",
    "throughput",
    "p99",
    "privacy",
    "pii",
    "gdpr",
    "hipaa",
    "reliability",
    "resilience",
    "fault",
    "retry",
    "circuit breaker",
    "offline",
    "low bandwidth",
    "security",
    "threat model",
    "abuse",
    "rate limiting",
    "developer experience",
    "schema enforcement",
];

const TRADEOFFS: &[&str] = &[
    "trade-off",
    "tradeoff",
    "vs.",
    " vs ",
    "latency vs",
    "cost vs",
    "consistency vs",
    "availability vs",
    "privacy vs",
    "accuracy vs",
    "throughput vs",
    "choose",
    "we choose",
    "we decided",
];

const INTERVIEW: &[&str] = &[
    "architecture",
    "system design",
    "data model",
    "consistency",
    "availability",
    "idempotency",
    "queue",
    "caching",
    "observability",
    "slo",
];

const BIG_ROCKS: &[&str] = &[
    "payments",
    "subscription",
    "billing",
    "marketplace",
    "recommendation",
    "ranking",
    "real-time chat",
    "messaging",
    "social feed",
    "multi-tenant",
    "admin dashboard",
    "admin panel",
    "ml training",
    "train model",
];

const SCOPE_FLUFF: &[&str] = &["etc", "more features", "improvements", "enhancements", "tbd"];

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

impl Classifier for KeywordClassifier {
    fn looks_cliche(&self, text: &str) -> bool {
        contains_any(text, CLICHE)
    }

    fn has_extreme_twist(&self, text: &str) -> bool {
        contains_any(text, EXTREME_TWIST)
    }

    fn looks_like_clone(&self, text: &str) -> bool {
        contains_any(text, CLONE)
    }

    fn looks_like_crud(&self, text: &str) -> bool {
        contains_any(text, CRUDISH)
            && !self.has_technical_depth(text)
            && !self.has_constraint_signals(text)
    }

    fn has_technical_depth(&self, text: &str) -> bool {
        contains_any(text, TECH_DEPTH)
    }

    fn has_differentiation(&self, text: &str) -> bool {
        self.has_extreme_twist(text) || contains_any(text, DIFFERENTIATION)
    }

    fn has_constraint_signals(&self, text: &str) -> bool {
        contains_any(text, CONSTRAINTS)
    }

    fn has_tradeoff_signals(&self, text: &str) -> bool {
        contains_any(text, TRADEOFFS)
    }

    fn has_interview_signals(&self, text: &str) -> bool {
        contains_any(text, INTERVIEW)
    }

    fn big_rock_count(&self, text: &str) -> usize {
        BIG_ROCKS.iter().filter(|k| text.contains(*k)).count()
    }

    fn is_placeholder_scope(&self, items: &[String]) -> bool {
        if items.is_empty() {
            return true;
        }
        let joined = items.join(" | ").to_lowercase();
        contains_any(&joined, SCOPE_FLUFF) && items.len() <= 2
    }
}

/// Ordered heuristic evaluation: hard structural failures first, softer
/// refinement issues after. The first violated check decides.
pub fn evaluate_idea<C: Classifier>(classifier: &C, idea: &GeneratedIdea) -> QualityVerdict {
    let all = full_corpus(idea);
    let interesting = differentiation_corpus(idea);

    if classifier.looks_cliche(&all) && !classifier.has_extreme_twist(&all) {
        return hard(
            QualityDecision::Regenerate,
            "anti-generic FAIL: cliché category without an extreme technical twist",
        );
    }
    if classifier.looks_like_clone(&all) {
        return hard(
            QualityDecision::Regenerate,
            "anti-generic FAIL: clone framing (\"X clone\" / \"like X\")",
        );
    }
    if classifier.looks_like_crud(&all) && !classifier.has_extreme_twist(&all) {
        return hard(
            QualityDecision::Regenerate,
            "anti-generic FAIL: CRUD-y scope with no depth/constraints/twist",
        );
    }

    let technical_depth = classifier.has_technical_depth(&all) || classifier.has_extreme_twist(&all);
    if !technical_depth {
        return hard(
            QualityDecision::Regenerate,
            "technical depth FAIL: no concrete engineering depth signals",
        );
    }

    let differentiated = classifier.has_differentiation(&interesting)
        || (classifier.has_extreme_twist(&all) && classifier.has_technical_depth(&all));
    if !differentiated {
        return soft(
            QualityDecision::Pivot,
            "differentiation FAIL: no clear unique core differentiator".into(),
        );
    }

    if let Some(reason) = scope_realism_failure(classifier, idea) {
        return soft(
            QualityDecision::Refine,
            format!("scope/realism FAIL: {reason}"),
        );
    }

    if !classifier.has_interview_signals(&all) {
        return soft(
            QualityDecision::Refine,
            "portfolio worthiness FAIL: missing architecture/system-design cues".into(),
        );
    }

    let nontrivial_constraint =
        classifier.has_constraint_signals(&all) || classifier.has_extreme_twist(&all);
    let tradeoffs = classifier.has_tradeoff_signals(&all);
    if !nontrivial_constraint || !tradeoffs {
        let mut missing = Vec::new();
        if !nontrivial_constraint {
            missing.push("non-trivial constraint");
        }
        if !tradeoffs {
            missing.push("explicit trade-off");
        }
        return soft(
            QualityDecision::Refine,
            format!("technical depth incomplete: missing {}", missing.join(" + ")),
        );
    }

    QualityVerdict {
        decision: QualityDecision::Accept,
        hard_fail: false,
        reasons: Vec::new(),
    }
}

fn hard(decision: QualityDecision, reason: &str) -> QualityVerdict {
    QualityVerdict {
        decision,
        hard_fail: true,
        reasons: vec![reason.into()],
    }
}

fn soft(decision: QualityDecision, reason: String) -> QualityVerdict {
    QualityVerdict {
        decision,
        hard_fail: false,
        reasons: vec![reason],
    }
}

fn scope_realism_failure<C: Classifier>(classifier: &C, idea: &GeneratedIdea) -> Option<String> {
    let mvp = &idea.project.mvp;
    if mvp.must_have_features.len() >= 8 {
        return Some("MVP must-have list is too large (>=8) for a solo MVP".into());
    }
    let must = mvp.must_have_features.join(" | ").to_lowercase();
    if classifier.big_rock_count(&must) >= 3 {
        return Some("too many big-scope features packed into the MVP".into());
    }
    if classifier.is_placeholder_scope(&mvp.nice_to_have_features)
        || classifier.is_placeholder_scope(&mvp.out_of_scope)
    {
        return Some("scope lists are too vague (placeholder nice-to-have/out-of-scope)".into());
    }
    None
}

fn full_corpus(idea: &GeneratedIdea) -> String {
    let p = &idea.project;
    [
        p.name.clone(),
        p.tagline.clone(),
        p.description.summary.clone(),
        p.description.detailed_explanation.clone(),
        p.problem_statement.problem.clone(),
        p.problem_statement.why_it_matters.clone(),
        p.problem_statement.current_solutions_and_gaps.clone(),
        p.value_proposition.key_benefits.join(" "),
        p.value_proposition.why_this_project_is_interesting.clone(),
        p.value_proposition.portfolio_value.clone(),
        p.mvp.goal.clone(),
        p.mvp.must_have_features.join(" "),
        p.mvp.nice_to_have_features.join(" "),
        p.mvp.out_of_scope.join(" "),
        p.recommended_tech_stack.justification.clone(),
        p.future_extensions.join(" "),
        p.learning_outcomes.join(" "),
    ]
    .join(" | ")
    .to_lowercase()
}

fn differentiation_corpus(idea: &GeneratedIdea) -> String {
    let p = &idea.project;
    [
        p.value_proposition.why_this_project_is_interesting.clone(),
        p.value_proposition.portfolio_value.clone(),
        p.tagline.clone(),
        p.description.summary.clone(),
        p.recommended_tech_stack.justification.clone(),
    ]
    .join(" | ")
    .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::sample_idea;

    fn evaluate(idea: &GeneratedIdea) -> QualityVerdict {
        evaluate_idea(&KeywordClassifier, idea)
    }

    #[test]
    fn test_sample_idea_accepts() {
        let verdict = evaluate(&sample_idea());
        assert!(verdict.ok(), "reasons: {:?}", verdict.reasons);
    }

    #[test]
    fn test_cliche_without_twist_regenerates() {
        let mut idea = sample_idea();
        idea.project.name = "Habit Tracker Plus".into();
        // Strip the twist vocabulary so the cliché cannot be rescued.
        idea.project.tagline = "track your habits daily".into();
        strip_depth(&mut idea);
        let verdict = evaluate(&idea);
        assert!(verdict.hard_fail);
        assert_eq!(verdict.decision, QualityDecision::Regenerate);
        assert!(verdict.reasons[0].contains("cliché"));
    }

    #[test]
    fn test_cliche_reported_before_depth_failure() {
        // Matches both the cliché detector and the depth check; detector
        // order means the cliché reason must win.
        let mut idea = sample_idea();
        idea.project.name = "Expense Tracker".into();
        strip_depth(&mut idea);
        let verdict = evaluate(&idea);
        assert!(verdict.hard_fail);
        assert!(verdict.reasons[0].contains("cliché"));
        assert!(!verdict.reasons[0].contains("technical depth"));
    }

    #[test]
    fn test_cliche_with_extreme_twist_passes_detector() {
        let mut idea = sample_idea();
        idea.project.name = "Habit Tracker".into();
        // The sample carries tamper-evident / append-only twist vocabulary.
        let verdict = evaluate(&idea);
        assert!(verdict.ok(), "reasons: {:?}", verdict.reasons);
    }

    #[test]
    fn test_clone_framing_regenerates() {
        let mut idea = sample_idea();
        idea.project.description.summary =
            "A tool like notion for compliance teams with audit features built in.".into();
        let verdict = evaluate(&idea);
        assert!(verdict.hard_fail);
        assert!(verdict.reasons[0].contains("clone"));
    }

    #[test]
    fn test_missing_depth_regenerates() {
        let mut idea = sample_idea();
        strip_depth(&mut idea);
        strip_cliche(&mut idea);
        let verdict = evaluate(&idea);
        assert!(verdict.hard_fail);
        assert_eq!(verdict.decision, QualityDecision::Regenerate);
        assert!(verdict.reasons[0].contains("technical depth"));
    }

    #[test]
    fn test_missing_differentiation_pivots() {
        let mut idea = sample_idea();
        // Depth stays (caching/queue words) but nothing differentiating in
        // the interesting sub-corpus.
        strip_depth_keep(&mut idea, "caching with a job queue and consistency checks");
        idea.project.tagline = "team workflow helper".into();
        idea.project.description.summary =
            "A service that uses caching and a job queue to process team workflow tasks faster.".into();
        idea.project.value_proposition.why_this_project_is_interesting =
            "It helps teams finish workflow tasks faster than email threads would allow today.".into();
        idea.project.value_proposition.portfolio_value =
            "Shows you can ship a complete service with tests and deployment automation.".into();
        idea.project.recommended_tech_stack.justification =
            "A relational store fits the workload well and keeps operations simple for a single node.".into();
        let verdict = evaluate(&idea);
        assert!(!verdict.hard_fail);
        assert_eq!(verdict.decision, QualityDecision::Pivot);
    }

    #[test]
    fn test_oversized_mvp_refines() {
        let mut idea = sample_idea();
        idea.project.mvp.must_have_features =
            (0..8).map(|i| format!("feature number {i}")).collect();
        let verdict = evaluate(&idea);
        assert_eq!(verdict.decision, QualityDecision::Refine);
        assert!(verdict.reasons[0].contains("scope/realism"));
    }

    #[test]
    fn test_big_rock_pileup_refines() {
        let mut idea = sample_idea();
        idea.project.mvp.must_have_features = vec![
            "payments and billing".into(),
            "real-time chat between users".into(),
            "recommendation engine".into(),
        ];
        let verdict = evaluate(&idea);
        assert_eq!(verdict.decision, QualityDecision::Refine);
    }

    #[test]
    fn test_placeholder_scope_refines() {
        let mut idea = sample_idea();
        idea.project.mvp.out_of_scope = vec!["etc".into()];
        let verdict = evaluate(&idea);
        assert_eq!(verdict.decision, QualityDecision::Refine);
        assert!(verdict.reasons[0].contains("vague"));
    }

    #[test]
    fn test_missing_tradeoff_refines() {
        let mut idea = sample_idea();
        idea.project.value_proposition.portfolio_value =
            "Demonstrates data modeling and integrity guarantees for compliance-grade systems.".into();
        let verdict = evaluate(&idea);
        assert_eq!(verdict.decision, QualityDecision::Refine);
        assert!(verdict.reasons[0].contains("trade-off"));
    }

    fn strip_depth(idea: &mut GeneratedIdea) {
        strip_depth_keep(idea, "simple pages for everyday work");
    }

    fn strip_depth_keep(idea: &mut GeneratedIdea, filler: &str) {
        let p = &mut idea.project;
        p.description.detailed_explanation = format!(
            "A small tool that stores entries and shows them back to the user. {filler}."
        );
        p.problem_statement.problem = "People forget things they meant to write down for later review.".into();
        p.problem_statement.why_it_matters =
            "Forgetting items costs people time and causes avoidable mistakes at work.".into();
        p.problem_statement.current_solutions_and_gaps =
            "Paper lists get lost and generic apps are not tailored to this niche.".into();
        p.mvp.goal = "Let one user store and review their entries.".into();
        p.mvp.must_have_features = vec![
            "entry creation".into(),
            "entry list view".into(),
            "entry archive".into(),
        ];
        p.mvp.nice_to_have_features = vec!["dark color theme".into()];
        p.mvp.out_of_scope = vec!["mobile clients".into()];
        p.recommended_tech_stack.justification =
            "A relational database fits the simple workload and keeps hosting costs predictably low.".into();
        p.future_extensions = vec!["sharing".into(), "reminders".into()];
        p.learning_outcomes = vec![
            "basic web development".into(),
            "database usage".into(),
            "deployment".into(),
        ];
        p.value_proposition.key_benefits = vec!["saves time".into(), "easy to use".into()];
        p.value_proposition.why_this_project_is_interesting =
            "It is a compact project that can be finished quickly by one person.".into();
        p.value_proposition.portfolio_value =
            "Shows you can ship a complete small product end to end on your own.".into();
        p.tagline = "remember what matters".into();
        p.description.summary =
            "A small personal tool for storing entries and reviewing them later on.".into();
    }

    fn strip_cliche(idea: &mut GeneratedIdea) {
        idea.project.name = "Fieldmark".into();
    }
}

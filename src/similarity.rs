use std::collections::BTreeSet;

use crate::config::SimilarityConfig;
use crate::data::{GeneratedIdea, ProjectConstraints, StoredIdea};

/// Flattened, canonicalized view of an idea used for similarity scoring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub overview: String,
    pub mvp_scope: Vec<String>,
    pub tech_stack: Vec<String>,
    pub complexity: String,
    pub duration: String,
    pub app_type: String,
    pub goal: String,
}

impl Snapshot {
    pub fn from_idea(idea: &GeneratedIdea, constraints: &ProjectConstraints) -> Snapshot {
        Snapshot {
            overview: idea.project.overview(),
            mvp_scope: idea.project.mvp.must_have_features.clone(),
            tech_stack: idea.project.flat_tech_stack(),
            complexity: idea.project.complexity.clone(),
            duration: idea.project.estimated_duration.range.clone(),
            app_type: constraints.app_type.clone(),
            goal: constraints.goal.clone(),
        }
    }

    pub fn from_stored(stored: &StoredIdea) -> Snapshot {
        Snapshot {
            overview: stored.overview.clone(),
            mvp_scope: stored.mvp_scope.clone(),
            tech_stack: stored.tech_stack.clone(),
            complexity: stored.complexity.clone(),
            duration: stored.duration.clone(),
            app_type: stored.app_type.clone(),
            goal: stored.goal.clone(),
        }
    }

    fn token_set(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut add = |v: &str| {
            for tok in tokenize(v) {
                out.insert(tok);
            }
        };
        add(&self.overview);
        for v in &self.mvp_scope {
            add(v);
        }
        for v in &self.tech_stack {
            add(v);
        }
        add(&self.complexity);
        add(&self.duration);
        add(&self.app_type);
        add(&self.goal);
        out
    }
}

/// Case-folded alphanumeric tokens.
fn tokenize(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    for c in s.to_lowercase().chars() {
        if c.is_alphanumeric() {
            cur.push(c);
        } else if !cur.is_empty() {
            out.push(std::mem::take(&mut cur));
        }
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

/// Token-set Jaccard over two snapshots, in [0,1]. Two empty snapshots
/// score 0, not 1.
pub fn jaccard_similarity(a: &Snapshot, b: &Snapshot) -> f64 {
    let sa = a.token_set();
    let sb = b.token_set();
    if sa.is_empty() && sb.is_empty() {
        return 0.0;
    }
    let inter = sa.intersection(&sb).count();
    let union = sa.len() + sb.len() - inter;
    if union == 0 {
        return 0.0;
    }
    inter as f64 / union as f64
}

/// Maximum similarity of `current` against the corpus.
pub fn best_similarity(current: &Snapshot, corpus: &[Snapshot]) -> f64 {
    corpus
        .iter()
        .map(|prev| jaccard_similarity(current, prev))
        .fold(0.0, f64::max)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimilarityDecision {
    Ok,
    Regenerate,
    Block,
}

/// Threshold boundaries are inclusive: score == block_threshold blocks.
pub fn decide_similarity(score: f64, cfg: &SimilarityConfig) -> SimilarityDecision {
    if score >= cfg.block_threshold {
        SimilarityDecision::Block
    } else if score >= cfg.regenerate_threshold {
        SimilarityDecision::Regenerate
    } else {
        SimilarityDecision::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::{sample_constraints, sample_idea};

    fn snapshot(overview: &str, tech: &[&str]) -> Snapshot {
        Snapshot {
            overview: overview.into(),
            tech_stack: tech.iter().map(|s| s.to_string()).collect(),
            ..Snapshot::default()
        }
    }

    #[test]
    fn test_jaccard_bounds() {
        let a = snapshot("an audit log service", &["go", "postgresql"]);
        let b = snapshot("a fitness tracker app", &["kotlin"]);
        let score = jaccard_similarity(&a, &b);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_jaccard_self_is_one() {
        let a = snapshot("an audit log service", &["go"]);
        assert_eq!(jaccard_similarity(&a, &a), 1.0);
    }

    #[test]
    fn test_jaccard_empty_is_zero() {
        let a = Snapshot::default();
        assert_eq!(jaccard_similarity(&a, &a), 0.0);
    }

    #[test]
    fn test_tokenize_case_and_punctuation_folded() {
        assert_eq!(tokenize("Go (net/http), PostgreSQL!"), vec![
            "go", "net", "http", "postgresql"
        ]);
    }

    #[test]
    fn test_best_similarity_takes_corpus_max() {
        let current = snapshot("audit log service", &["go"]);
        let corpus = vec![
            snapshot("fitness tracker", &["kotlin"]),
            snapshot("audit log service", &["go"]),
        ];
        assert_eq!(best_similarity(&current, &corpus), 1.0);
    }

    #[test]
    fn test_best_similarity_empty_corpus_is_zero() {
        let current = snapshot("audit log service", &["go"]);
        assert_eq!(best_similarity(&current, &[]), 0.0);
    }

    #[test]
    fn test_decision_boundaries_exact() {
        let cfg = SimilarityConfig::default();
        assert_eq!(decide_similarity(0.549, &cfg), SimilarityDecision::Ok);
        assert_eq!(
            decide_similarity(0.55, &cfg),
            SimilarityDecision::Regenerate
        );
        assert_eq!(
            decide_similarity(0.749, &cfg),
            SimilarityDecision::Regenerate
        );
        assert_eq!(decide_similarity(0.75, &cfg), SimilarityDecision::Block);
    }

    #[test]
    fn test_decision_monotonic_in_score() {
        let cfg = SimilarityConfig::default();
        let severity = |d: SimilarityDecision| match d {
            SimilarityDecision::Ok => 0,
            SimilarityDecision::Regenerate => 1,
            SimilarityDecision::Block => 2,
        };
        let mut last = 0;
        for i in 0..=100 {
            let s = severity(decide_similarity(i as f64 / 100.0, &cfg));
            assert!(s >= last);
            last = s;
        }
    }

    #[test]
    fn test_snapshot_from_idea_uses_constraint_context() {
        let idea = sample_idea();
        let constraints = sample_constraints();
        let snap = Snapshot::from_idea(&idea, &constraints);
        assert_eq!(snap.app_type, "backend-api");
        assert_eq!(snap.goal, "portfolio project");
        assert_eq!(snap.complexity, "intermediate");
        assert_eq!(snap.mvp_scope.len(), 3);
    }
}

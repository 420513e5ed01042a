use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SimilarityConfig;
use crate::contract::{
    build_evolution_prompt, build_idea_prompt, build_pivot_prompt, canonicalize_response,
    decode_evolution, decode_idea,
};
use crate::data::{
    GeneratedIdea, GenerationResult, PivotStrategy, ProjectConstraints, ProjectEvolution,
    RetryContext, RetryReason, StoredEvolution, StoredIdea,
};
use crate::dna::hash_content;
use crate::provider::{ProviderManager, ProviderOutcome};
use crate::quality::{evaluate_idea, KeywordClassifier, QualityDecision};
use crate::repository::{IdeaRepository, SaveError};
use crate::similarity::{best_similarity, decide_similarity, SimilarityDecision, Snapshot};

/// Attempts across the quality + similarity loop, including the first one.
pub const MAX_ATTEMPTS: u32 = 4;
/// Contract-decode retries within one attempt, always with the same prompt.
pub const DECODE_RETRIES: u32 = 3;

/// Cooperative cancellation flag, checked between pipeline states. A
/// cancelled session never persists anything.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub enum SessionOutcome {
    Accepted {
        id: Uuid,
        idea: Box<GeneratedIdea>,
        provenance: GenerationResult,
    },
    Blocked {
        score: f64,
    },
    Failed {
        reasons: Vec<String>,
    },
    Cancelled,
}

#[derive(Debug)]
pub enum EvolutionOutcome {
    Accepted {
        id: Uuid,
        evolution: ProjectEvolution,
        provenance: GenerationResult,
    },
    Cancelled,
}

/// Drives one generation session: prompt, decode, quality gate, similarity
/// gate, persist. All retry state lives in an explicit `RetryContext` value.
pub struct Orchestrator<'a> {
    providers: &'a ProviderManager,
    repository: &'a dyn IdeaRepository,
    similarity: SimilarityConfig,
    classifier: KeywordClassifier,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        providers: &'a ProviderManager,
        repository: &'a dyn IdeaRepository,
        similarity: SimilarityConfig,
    ) -> Self {
        Self {
            providers,
            repository,
            similarity,
            classifier: KeywordClassifier,
        }
    }

    pub fn run(
        &self,
        constraints: &ProjectConstraints,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome> {
        self.run_with_seed(constraints, None, cancel)
    }

    /// Rerun after the user rejected the previous idea: the first prompt is
    /// already a pivot prompt.
    pub fn run_rejected(
        &self,
        constraints: &ProjectConstraints,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome> {
        let seed = RetryContext {
            reason: RetryReason::UserRejected,
            strategy: PivotStrategy::FeatureReplacement,
            attempt: 0,
        };
        self.run_with_seed(constraints, Some(seed), cancel)
    }

    /// Generates and persists the next development phase of a stored idea.
    /// The core idea stays fixed; decode failures surface as errors rather
    /// than spending the generation retry budget.
    pub fn evolve(
        &self,
        project_id: &Uuid,
        cancel: &CancellationToken,
    ) -> Result<EvolutionOutcome> {
        if cancel.is_cancelled() {
            return Ok(EvolutionOutcome::Cancelled);
        }
        let stored = self.repository.load(project_id)?;
        let prompt = build_evolution_prompt(&stored);
        let outcome = self.providers.generate(&prompt)?;
        let canonical = canonicalize_response(&outcome.text);
        let evolution = decode_evolution(&canonical)?;
        if cancel.is_cancelled() {
            return Ok(EvolutionOutcome::Cancelled);
        }

        let record = StoredEvolution {
            id: Uuid::new_v4(),
            project_id: *project_id,
            created_at: Utc::now(),
            provider_used: outcome.provider_name.to_string(),
            fallback_used: outcome.fallback_used,
            provider_error: outcome.primary_error.clone(),
            latency_ms: outcome.latency_ms as i64,
            raw_json: canonical,
        };
        let id = self.repository.save_evolution(&record)?;
        info!(%id, %project_id, provider = outcome.provider_name, "evolution accepted");
        Ok(EvolutionOutcome::Accepted {
            id,
            evolution,
            provenance: provenance(&outcome),
        })
    }

    fn run_with_seed(
        &self,
        constraints: &ProjectConstraints,
        seed: Option<RetryContext>,
        cancel: &CancellationToken,
    ) -> Result<SessionOutcome> {
        let mut retry = seed;
        let mut last_reasons: Vec<String> = Vec::new();

        for attempt in 0..MAX_ATTEMPTS {
            if cancel.is_cancelled() {
                return Ok(SessionOutcome::Cancelled);
            }

            let prompt = match &retry {
                Some(ctx) => build_pivot_prompt(constraints, ctx),
                None => build_idea_prompt(constraints),
            };

            let Some((idea, outcome)) = self.generate_idea(constraints, &prompt, attempt)? else {
                // Decode exhaustion costs the attempt, not the session.
                last_reasons = vec![format!(
                    "response failed contract validation {DECODE_RETRIES} times"
                )];
                retry = Some(quality_retry(QualityDecision::Regenerate, attempt + 1));
                continue;
            };
            if cancel.is_cancelled() {
                return Ok(SessionOutcome::Cancelled);
            }

            let verdict = evaluate_idea(&self.classifier, &idea);
            if !verdict.ok() {
                info!(attempt, verdict = %verdict.summary(), "quality gate rejected idea");
                last_reasons = verdict.reasons.clone();
                retry = Some(quality_retry(verdict.decision, attempt + 1));
                continue;
            }
            if cancel.is_cancelled() {
                return Ok(SessionOutcome::Cancelled);
            }

            let corpus: Vec<Snapshot> = self
                .repository
                .list_recent(self.similarity.lookback)?
                .iter()
                .map(Snapshot::from_stored)
                .collect();
            let snapshot = Snapshot::from_idea(&idea, constraints);
            let score = best_similarity(&snapshot, &corpus);
            match decide_similarity(score, &self.similarity) {
                SimilarityDecision::Block => {
                    info!(attempt, score, "idea blocked as near-duplicate");
                    return Ok(SessionOutcome::Blocked { score });
                }
                SimilarityDecision::Regenerate => {
                    info!(attempt, score, "idea too similar, pivoting");
                    last_reasons = vec![format!("too similar to a recent idea (score {score:.3})")];
                    retry = Some(RetryContext {
                        reason: RetryReason::SimilarityTooHigh,
                        strategy: RetryReason::SimilarityTooHigh.default_strategy(),
                        attempt: attempt + 1,
                    });
                    continue;
                }
                SimilarityDecision::Ok => {}
            }
            if cancel.is_cancelled() {
                return Ok(SessionOutcome::Cancelled);
            }

            let record = self.stored_record(&idea, constraints, &outcome, retry.map(|r| r.reason));
            match self.repository.save(&record) {
                Ok(id) => {
                    info!(%id, attempt, provider = outcome.provider_name, "idea accepted");
                    return Ok(SessionOutcome::Accepted {
                        id,
                        idea: Box::new(idea),
                        provenance: provenance(&outcome),
                    });
                }
                Err(SaveError::DuplicateFingerprint) => {
                    info!(attempt, "fingerprint collision with a stored idea, pivoting");
                    last_reasons = vec!["exact duplicate of a stored idea".into()];
                    retry = Some(RetryContext {
                        reason: RetryReason::DuplicateDna,
                        strategy: RetryReason::DuplicateDna.default_strategy(),
                        attempt: attempt + 1,
                    });
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(SessionOutcome::Failed {
            reasons: last_reasons,
        })
    }

    /// One attempt's provider + decode phase. Decode failures retry with the
    /// same prompt; provider dual failures abort the session.
    fn generate_idea(
        &self,
        constraints: &ProjectConstraints,
        prompt: &str,
        attempt: u32,
    ) -> Result<Option<(GeneratedIdea, ProviderOutcome)>> {
        for decode_try in 0..DECODE_RETRIES {
            let outcome = self.providers.generate(prompt)?;
            debug!(
                attempt,
                decode_try,
                provider = outcome.provider_name,
                latency_ms = outcome.latency_ms,
                "provider responded"
            );
            let canonical = canonicalize_response(&outcome.text);
            match decode_idea(&canonical, constraints) {
                // Persisted provenance carries the canonicalized text, same
                // as the evolution path.
                Ok(idea) => {
                    return Ok(Some((
                        idea,
                        ProviderOutcome {
                            text: canonical,
                            ..outcome
                        },
                    )))
                }
                Err(e) => {
                    warn!(attempt, decode_try, error = %e, "response failed the contract");
                }
            }
        }
        Ok(None)
    }

    fn stored_record(
        &self,
        idea: &GeneratedIdea,
        constraints: &ProjectConstraints,
        outcome: &ProviderOutcome,
        retry_reason: Option<RetryReason>,
    ) -> StoredIdea {
        let p = &idea.project;
        let tech_stack = p.flat_tech_stack();
        let fingerprint = hash_content(
            &p.overview(),
            &p.mvp.must_have_features,
            &tech_stack,
            &p.complexity,
            &p.estimated_duration.range,
        );
        StoredIdea {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            overview: p.overview(),
            mvp_scope: p.mvp.must_have_features.clone(),
            tech_stack,
            complexity: p.complexity.clone(),
            duration: p.estimated_duration.range.clone(),
            app_type: constraints.app_type.clone(),
            goal: constraints.goal.clone(),
            fingerprint,
            provider_used: outcome.provider_name.to_string(),
            fallback_used: outcome.fallback_used,
            provider_error: outcome.primary_error.clone(),
            latency_ms: outcome.latency_ms as i64,
            retry_reason,
            raw_json: outcome.text.clone(),
        }
    }
}

fn provenance(outcome: &ProviderOutcome) -> GenerationResult {
    GenerationResult {
        text: outcome.text.clone(),
        provider_used: outcome.provider_name.to_string(),
        fallback_used: outcome.fallback_used,
        provider_error: outcome.primary_error.clone(),
        latency_ms: outcome.latency_ms as i64,
    }
}

/// Maps a quality verdict to the retry context for the next attempt.
fn quality_retry(decision: QualityDecision, next_attempt: u32) -> RetryContext {
    let strategy = match decision {
        QualityDecision::Refine => PivotStrategy::RefineDepth,
        QualityDecision::Pivot => PivotStrategy::ContextShift,
        _ => PivotStrategy::rotate(next_attempt),
    };
    RetryContext {
        reason: RetryReason::QualityTooGeneric,
        strategy,
        attempt: next_attempt,
    }
}

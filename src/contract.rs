use serde_json::Value;
use thiserror::Error;

use crate::data::{GeneratedIdea, ProjectConstraints, ProjectEvolution, RetryContext, StoredIdea};

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("invalid JSON: {0} is required")]
    MissingField(&'static str),
    #[error("invalid JSON: {field} is too short (min {min})")]
    TooShort { field: &'static str, min: usize },
    #[error("invalid JSON: {field} needs at least {min} entries")]
    MissingEntries { field: &'static str, min: usize },
    #[error("invalid JSON: complexity must match input")]
    ComplexityMismatch,
    #[error("invalid JSON: estimated_duration.range must match input")]
    DurationMismatch,
    #[error("invalid JSON: recommended_tech_stack must respect input tech_stack")]
    TechStackMismatch,
}

/// Builds the base prompt: constraints as literal key-value lines, the rule
/// block, and the complete schema. The prompt text is the provider contract.
pub fn build_idea_prompt(c: &ProjectConstraints) -> String {
    let tech_json = serde_json::to_string(&c.tech_stack).unwrap_or_else(|_| "[]".into());

    let mut input_lines = String::new();
    input_lines.push_str(&format!("- app_type: {}\n", c.app_type));
    let project_kind = c
        .project_kind
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(kind) = project_kind {
        input_lines.push_str(&format!("- project_kind: {kind}\n"));
    }
    if let Some(db) = c.database.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        if db.eq_ignore_ascii_case("none") {
            input_lines.push_str("- database_preference: none\n");
        } else {
            input_lines.push_str(&format!("- database_preference: {db}\n"));
        }
    }
    input_lines.push_str(&format!("- complexity: {}\n", c.complexity));
    input_lines.push_str(&format!("- tech_stack: {tech_json}\n"));
    input_lines.push_str(&format!("- goal: {}\n", c.goal));
    input_lines.push_str(&format!("- estimated_duration: {}\n", c.timeframe));
    if let Some(seed) = c
        .idea_description
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        input_lines.push_str(&format!("- idea_description: {seed}\n"));
    }

    let kind_rule = if project_kind.is_none() {
        "- If project_kind is not provided, you MUST infer a suitable software category based on tech_stack and typical real-world use.\n"
    } else {
        ""
    };

    format!(
        "Return ONLY valid JSON. Do not include explanation, formatting, markdown, or extra text.\n\
         You MUST return exactly one JSON object and nothing else.\n\n\
         User Input (use these as constraints):\n\
         {input_lines}\n\
         Rules:\n\
         {kind_rule}\
         - complexity must match input exactly (beginner|intermediate|advanced).\n\
         - estimated_duration.range must match input exactly.\n\
         - recommended_tech_stack must respect tech_stack constraints (no unrelated additions).\n\
         - Provide concrete, professional, portfolio-ready content (no marketing fluff).\n\
         - MVP must be truly minimal and focused.\n\
         - Provide explicit product and technical reasoning.\n\
         - Fill EVERY field in the schema.\n\
         - Do NOT add, remove, or rename any fields.\n\n\
         Schema (must include ALL fields):\n\
         {SCHEMA}"
    )
}

/// Base prompt plus the regeneration block carrying reason and strategy.
pub fn build_pivot_prompt(c: &ProjectConstraints, retry: &RetryContext) -> String {
    format!(
        "{}\n\
         Regeneration:\n\
         - retry_reason: {}\n\
         - pivot_strategy: {}\n\n\
         Pivot Strategy Instructions:\n\
         {}\n\
         Rules:\n\
         - You MUST follow the pivot strategy.\n\
         - The new idea must be meaningfully different from the previous attempt.\n",
        build_idea_prompt(c),
        retry.reason.wire_name(),
        retry.strategy.wire_name(),
        strategy_instruction(retry.strategy),
    )
}

fn strategy_instruction(strategy: crate::data::PivotStrategy) -> &'static str {
    use crate::data::PivotStrategy::*;
    match strategy {
        ChangeTargetUser => {
            "- Change the target user segment and adjust the value proposition to fit the new audience."
        }
        FeatureReplacement => {
            "- Replace 2-3 key MVP items with different capabilities and adjust the main workflow."
        }
        ContextShift => {
            "- Shift the domain context or problem framing while keeping the input constraints."
        }
        RefineDepth => {
            "- Keep the same core idea but add concrete technical depth, constraints, and explicit trade-offs."
        }
    }
}

const SCHEMA: &str = "{\n\
  \"project\": {\n\
    \"name\": string,\n\
    \"tagline\": string,\n\
    \"description\": {\n\
      \"summary\": string,\n\
      \"detailed_explanation\": string\n\
    },\n\
    \"problem_statement\": {\n\
      \"problem\": string,\n\
      \"why_it_matters\": string,\n\
      \"current_solutions_and_gaps\": string\n\
    },\n\
    \"target_users\": {\n\
      \"primary\": string[],\n\
      \"secondary\": string[],\n\
      \"use_cases\": string[]\n\
    },\n\
    \"value_proposition\": {\n\
      \"key_benefits\": string[],\n\
      \"why_this_project_is_interesting\": string,\n\
      \"portfolio_value\": string\n\
    },\n\
    \"mvp\": {\n\
      \"goal\": string,\n\
      \"must_have_features\": string[],\n\
      \"nice_to_have_features\": string[],\n\
      \"out_of_scope\": string[]\n\
    },\n\
    \"recommended_tech_stack\": {\n\
      \"backend\": string,\n\
      \"frontend\": string,\n\
      \"database\": string,\n\
      \"infra\": string,\n\
      \"justification\": string\n\
    },\n\
    \"complexity\": \"beginner\" | \"intermediate\" | \"advanced\",\n\
    \"estimated_duration\": {\n\
      \"range\": string,\n\
      \"assumptions\": string\n\
    },\n\
    \"future_extensions\": string[],\n\
    \"learning_outcomes\": string[]\n\
  }\n\
}\n";

/// Prompt for evolving a stored idea into its next development phase. The
/// stored snapshot fields are the context; the core idea must not change.
pub fn build_evolution_prompt(stored: &StoredIdea) -> String {
    let mvp_json = serde_json::to_string(&stored.mvp_scope).unwrap_or_else(|_| "[]".into());
    let tech_json = serde_json::to_string(&stored.tech_stack).unwrap_or_else(|_| "[]".into());
    format!(
        "Return ONLY valid JSON. Do not include explanation, formatting, markdown, or extra text.\n\
         You MUST return exactly one JSON object and nothing else.\n\n\
         Project Context (do not change core idea):\n\
         - project_overview: {}\n\
         - mvp_scope: {mvp_json}\n\
         - tech_stack: {tech_json}\n\
         - complexity: {}\n\
         - estimated_duration: {}\n\
         - app_type: {}\n\
         - goal: {}\n\n\
         Rules:\n\
         - Do NOT change the core idea or reframe the product.\n\
         - Focus on next-step evolution and advanced development.\n\
         - Provide clear product rationale and technical rationale.\n\
         - Fill EVERY field in the schema.\n\
         - Do NOT add, remove, or rename any fields.\n\n\
         Schema (must include ALL fields):\n\
         {EVOLUTION_SCHEMA}",
        stored.overview, stored.complexity, stored.duration, stored.app_type, stored.goal,
    )
}

const EVOLUTION_SCHEMA: &str = "{\n\
  \"evolution_overview\": string,\n\
  \"product_rationale\": string,\n\
  \"technical_rationale\": string,\n\
  \"proposed_enhancements\": string[],\n\
  \"risk_considerations\": string[]\n\
}\n";

pub fn decode_evolution(raw: &str) -> Result<ProjectEvolution, ContractError> {
    let evolution: ProjectEvolution =
        serde_json::from_str(raw).map_err(|e| ContractError::InvalidJson(e.to_string()))?;
    if evolution.evolution_overview.trim().is_empty() {
        return Err(ContractError::MissingField("evolution_overview"));
    }
    if evolution.product_rationale.trim().is_empty() {
        return Err(ContractError::MissingField("product_rationale"));
    }
    if evolution.technical_rationale.trim().is_empty() {
        return Err(ContractError::MissingField("technical_rationale"));
    }
    if !evolution
        .proposed_enhancements
        .iter()
        .any(|v| !v.trim().is_empty())
    {
        return Err(ContractError::MissingField("proposed_enhancements"));
    }
    Ok(evolution)
}

/// Keys the canonicalization pass may rewrite onto. Variant spellings
/// (case, separators) are folded onto these; anything else is left alone so
/// the strict decode rejects it.
const KNOWN_KEYS: &[&str] = &[
    "project",
    "name",
    "tagline",
    "description",
    "summary",
    "detailed_explanation",
    "problem_statement",
    "problem",
    "why_it_matters",
    "current_solutions_and_gaps",
    "target_users",
    "primary",
    "secondary",
    "use_cases",
    "value_proposition",
    "key_benefits",
    "why_this_project_is_interesting",
    "portfolio_value",
    "mvp",
    "goal",
    "must_have_features",
    "nice_to_have_features",
    "out_of_scope",
    "recommended_tech_stack",
    "backend",
    "frontend",
    "database",
    "infra",
    "justification",
    "complexity",
    "estimated_duration",
    "range",
    "assumptions",
    "future_extensions",
    "learning_outcomes",
    "evolution_overview",
    "product_rationale",
    "technical_rationale",
    "proposed_enhancements",
    "risk_considerations",
];

/// Repairs response-wrapping noise only: key spellings are canonicalized
/// against the allow-list, values are never touched. Unparsable input is
/// returned unchanged so the strict decode reports the real error.
pub fn canonicalize_response(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return trimmed.to_string();
    }
    let Ok(mut value) = serde_json::from_str::<Value>(trimmed) else {
        return trimmed.to_string();
    };
    canonicalize_keys(&mut value);
    serde_json::to_string(&value).unwrap_or_else(|_| trimmed.to_string())
}

fn canonicalize_keys(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let entries: Vec<(String, Value)> = std::mem::take(map).into_iter().collect();
            for (key, mut val) in entries {
                canonicalize_keys(&mut val);
                map.insert(canonical_key(&key), val);
            }
        }
        Value::Array(items) => {
            for item in items {
                canonicalize_keys(item);
            }
        }
        _ => {}
    }
}

fn canonical_key(key: &str) -> String {
    let mut folded = key
        .trim()
        .to_lowercase()
        .replace(['-', ' ', '.'], "_");
    while folded.contains("__") {
        folded = folded.replace("__", "_");
    }
    let folded = folded.trim_matches('_');
    if KNOWN_KEYS.contains(&folded) {
        folded.to_string()
    } else {
        key.to_string()
    }
}

/// Strict decode plus field validation. No partial acceptance, no value
/// repair: an idea that swaps a required technology is rejected outright.
pub fn decode_idea(raw: &str, c: &ProjectConstraints) -> Result<GeneratedIdea, ContractError> {
    let idea: GeneratedIdea =
        serde_json::from_str(raw).map_err(|e| ContractError::InvalidJson(e.to_string()))?;
    validate_idea(&idea, c)?;
    Ok(idea)
}

fn validate_idea(idea: &GeneratedIdea, c: &ProjectConstraints) -> Result<(), ContractError> {
    let p = &idea.project;

    check_len("name", &p.name, 5)?;
    check_len("tagline", &p.tagline, 8)?;
    check_len("description.summary", &p.description.summary, 40)?;
    check_len(
        "description.detailed_explanation",
        &p.description.detailed_explanation,
        120,
    )?;
    check_len("problem_statement.problem", &p.problem_statement.problem, 40)?;
    check_len(
        "problem_statement.why_it_matters",
        &p.problem_statement.why_it_matters,
        40,
    )?;
    check_len(
        "problem_statement.current_solutions_and_gaps",
        &p.problem_statement.current_solutions_and_gaps,
        40,
    )?;
    check_count("target_users.primary", &p.target_users.primary, 1)?;
    check_count("target_users.use_cases", &p.target_users.use_cases, 1)?;
    check_count(
        "value_proposition.key_benefits",
        &p.value_proposition.key_benefits,
        2,
    )?;
    check_len(
        "value_proposition.why_this_project_is_interesting",
        &p.value_proposition.why_this_project_is_interesting,
        40,
    )?;
    check_len(
        "value_proposition.portfolio_value",
        &p.value_proposition.portfolio_value,
        40,
    )?;
    check_len("mvp.goal", &p.mvp.goal, 30)?;
    check_count("mvp.must_have_features", &p.mvp.must_have_features, 3)?;
    check_count("mvp.nice_to_have_features", &p.mvp.nice_to_have_features, 1)?;
    check_count("mvp.out_of_scope", &p.mvp.out_of_scope, 1)?;
    let stack = &p.recommended_tech_stack;
    check_len("recommended_tech_stack.backend", &stack.backend, 2)?;
    check_len("recommended_tech_stack.frontend", &stack.frontend, 2)?;
    check_len("recommended_tech_stack.database", &stack.database, 2)?;
    check_len("recommended_tech_stack.infra", &stack.infra, 2)?;
    check_len(
        "recommended_tech_stack.justification",
        &stack.justification,
        60,
    )?;
    check_count("future_extensions", &p.future_extensions, 2)?;
    check_count("learning_outcomes", &p.learning_outcomes, 3)?;

    if p.complexity.trim() != c.complexity {
        return Err(ContractError::ComplexityMismatch);
    }
    if p.estimated_duration.range.trim() != c.timeframe {
        return Err(ContractError::DurationMismatch);
    }
    if !matches_input_tech_stack(idea, &c.tech_stack) {
        return Err(ContractError::TechStackMismatch);
    }
    Ok(())
}

fn check_len(field: &'static str, value: &str, min: usize) -> Result<(), ContractError> {
    if value.trim().len() < min {
        return Err(ContractError::TooShort { field, min });
    }
    Ok(())
}

fn check_count(field: &'static str, items: &[String], min: usize) -> Result<(), ContractError> {
    let n = items.iter().filter(|v| !v.trim().is_empty()).count();
    if n < min {
        return Err(ContractError::MissingEntries { field, min });
    }
    Ok(())
}

/// Every input technology token must be discoverable in the recommended
/// stack text, case and punctuation insensitively. Generic descriptor words
/// carry no requirement of their own.
fn matches_input_tech_stack(idea: &GeneratedIdea, input: &[String]) -> bool {
    if input.is_empty() {
        return true;
    }
    let stack = &idea.project.recommended_tech_stack;
    let haystack = squash_alnum(&format!(
        "{} {} {} {} {}",
        stack.backend, stack.frontend, stack.database, stack.infra, stack.justification
    ));

    for entry in input {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let required = required_tech_tokens(entry);
        if required.is_empty() {
            return false;
        }
        if required.iter().any(|t| !haystack.contains(t.as_str())) {
            return false;
        }
    }
    true
}

fn required_tech_tokens(entry: &str) -> Vec<String> {
    let tokens: Vec<String> = split_alnum(entry)
        .into_iter()
        .filter(|t| !is_tech_descriptor(t))
        .collect();
    if !tokens.is_empty() {
        return tokens;
    }
    let fallback = squash_alnum(entry);
    if !fallback.is_empty() && !is_tech_descriptor(&fallback) {
        return vec![fallback];
    }
    Vec::new()
}

fn is_tech_descriptor(token: &str) -> bool {
    matches!(
        token,
        "frontend" | "backend" | "api" | "mvc" | "fullstack" | "monolith" | "service"
    )
}

fn squash_alnum(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

fn split_alnum(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    for c in s.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
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

use sha2::{Digest, Sha256};

/// Canonical, order-independent representation of an idea's core content.
/// Used for the weighted similarity comparison and the exact-duplicate hash.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectDna {
    pub app_type: String,
    pub primary_domain: String,
    pub core_tech_stack: Vec<String>,
    pub architectural_style: String,
    pub complexity_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DnaWeights {
    pub app_type: f64,
    pub primary_domain: f64,
    pub core_tech_stack: f64,
    pub architectural_style: f64,
    pub complexity_level: f64,
}

impl Default for DnaWeights {
    fn default() -> Self {
        Self {
            app_type: 0.20,
            primary_domain: 0.30,
            core_tech_stack: 0.25,
            architectural_style: 0.15,
            complexity_level: 0.10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DnaSimilarityBreakdown {
    pub app_type: f64,
    pub primary_domain: f64,
    pub core_tech_stack: f64,
    pub architectural_style: f64,
    pub complexity_match: f64,
    pub total: f64,
}

impl ProjectDna {
    /// Canonicalization is idempotent: lower-case, collapse whitespace,
    /// dedupe and sort the tech list.
    pub fn canonical(&self) -> ProjectDna {
        ProjectDna {
            app_type: normalize_scalar(&self.app_type),
            primary_domain: normalize_scalar(&self.primary_domain),
            core_tech_stack: normalize_list(&self.core_tech_stack),
            architectural_style: normalize_scalar(&self.architectural_style),
            complexity_level: normalize_scalar(&self.complexity_level),
        }
    }

    pub fn fingerprint_string(&self) -> String {
        let c = self.canonical();
        [
            format!("app_type={}", c.app_type),
            format!("primary_domain={}", c.primary_domain),
            format!("core_tech_stack={}", c.core_tech_stack.join(",")),
            format!("architectural_style={}", c.architectural_style),
            format!("complexity_level={}", c.complexity_level),
        ]
        .join("|")
    }

    pub fn fingerprint_hash(&self) -> String {
        hex_sha256(self.fingerprint_string().as_bytes())
    }
}

/// Weighted five-dimension similarity, clamped to [0,1].
pub fn score_dna_similarity(a: &ProjectDna, b: &ProjectDna) -> DnaSimilarityBreakdown {
    score_dna_similarity_with(a, b, DnaWeights::default())
}

pub fn score_dna_similarity_with(
    a: &ProjectDna,
    b: &ProjectDna,
    w: DnaWeights,
) -> DnaSimilarityBreakdown {
    let ca = a.canonical();
    let cb = b.canonical();

    let app_type = scalar_similarity(&ca.app_type, &cb.app_type);
    let domain = scalar_similarity(&ca.primary_domain, &cb.primary_domain);
    let arch = scalar_similarity(&ca.architectural_style, &cb.architectural_style);
    let tech = jaccard_sorted(&ca.core_tech_stack, &cb.core_tech_stack);
    let complexity = if !ca.complexity_level.is_empty() && ca.complexity_level == cb.complexity_level
    {
        1.0
    } else {
        0.0
    };

    let total = app_type * w.app_type
        + domain * w.primary_domain
        + tech * w.core_tech_stack
        + arch * w.architectural_style
        + complexity * w.complexity_level;

    DnaSimilarityBreakdown {
        app_type: clamp01(app_type),
        primary_domain: clamp01(domain),
        core_tech_stack: clamp01(tech),
        architectural_style: clamp01(arch),
        complexity_match: clamp01(complexity),
        total: clamp01(total),
    }
}

/// Content fingerprint over the persisted snapshot fields. List order does
/// not affect the hash.
pub fn hash_content(
    overview: &str,
    mvp_scope: &[String],
    tech_stack: &[String],
    complexity: &str,
    duration: &str,
) -> String {
    let mut mvp: Vec<String> = mvp_scope
        .iter()
        .map(|v| normalize_scalar(v))
        .filter(|v| !v.is_empty())
        .collect();
    mvp.sort();
    let mut tech: Vec<String> = tech_stack
        .iter()
        .map(|v| normalize_scalar(v))
        .filter(|v| !v.is_empty())
        .collect();
    tech.sort();

    let parts = [
        normalize_scalar(overview),
        mvp.join(","),
        tech.join(","),
        normalize_scalar(complexity),
        normalize_scalar(duration),
    ];
    hex_sha256(parts.join("|").as_bytes())
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

pub(crate) fn normalize_scalar(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn normalize_list(items: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for v in items {
        let v = normalize_scalar(v);
        if v.is_empty() || out.contains(&v) {
            continue;
        }
        out.push(v);
    }
    out.sort();
    out
}

fn scalar_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let sa = token_set(a);
    let sb = token_set(b);
    jaccard_sets(&sa, &sb)
}

fn token_set(s: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut cur = String::new();
    for c in s.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            cur.push(c);
        } else if !cur.is_empty() {
            if !out.contains(&cur) {
                out.push(std::mem::take(&mut cur));
            } else {
                cur.clear();
            }
        }
    }
    if !cur.is_empty() && !out.contains(&cur) {
        out.push(cur);
    }
    out
}

fn jaccard_sets(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let inter = a.iter().filter(|t| b.contains(t)).count();
    let union = a.len() + b.len() - inter;
    if union == 0 {
        return 0.0;
    }
    inter as f64 / union as f64
}

fn jaccard_sorted(a: &[String], b: &[String]) -> f64 {
    // Inputs are canonical: deduplicated and sorted.
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let (mut i, mut j) = (0usize, 0usize);
    let mut inter = 0usize;
    let mut union = 0usize;
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Equal => {
                inter += 1;
                union += 1;
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => {
                union += 1;
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                union += 1;
                j += 1;
            }
        }
    }
    union += (a.len() - i) + (b.len() - j);
    if union == 0 {
        return 0.0;
    }
    inter as f64 / union as f64
}

fn clamp01(v: f64) -> f64 {
    if v.is_nan() {
        return 0.0;
    }
    v.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_dna() -> ProjectDna {
        ProjectDna {
            app_type: "  Backend-API ".into(),
            primary_domain: "Compliance  Tooling".into(),
            core_tech_stack: vec!["PostgreSQL".into(), "go".into(), "Go".into(), "".into()],
            architectural_style: "event-driven".into(),
            complexity_level: "Intermediate".into(),
        }
    }

    #[test]
    fn test_canonical_is_idempotent() {
        let dna = sample_dna();
        let once = dna.canonical();
        let twice = once.canonical();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_canonical_sorts_and_dedupes_stack() {
        let dna = sample_dna().canonical();
        assert_eq!(dna.core_tech_stack, vec!["go", "postgresql"]);
        assert_eq!(dna.app_type, "backend-api");
        assert_eq!(dna.primary_domain, "compliance tooling");
    }

    #[test]
    fn test_fingerprint_independent_of_list_order() {
        let a = ProjectDna {
            core_tech_stack: vec!["go".into(), "postgresql".into()],
            ..sample_dna()
        };
        let b = ProjectDna {
            core_tech_stack: vec!["PostgreSQL".into(), "Go".into()],
            ..sample_dna()
        };
        assert_eq!(a.fingerprint_hash(), b.fingerprint_hash());
        assert_eq!(a.fingerprint_hash().len(), 64);
    }

    #[test]
    fn test_identical_dna_scores_one() {
        let dna = sample_dna();
        let b = score_dna_similarity(&dna, &dna);
        assert!((b.total - 1.0).abs() < 1e-9);
        assert_eq!(b.complexity_match, 1.0);
    }

    #[test]
    fn test_disjoint_dna_scores_zero() {
        let a = sample_dna();
        let b = ProjectDna {
            app_type: "mobile".into(),
            primary_domain: "fitness".into(),
            core_tech_stack: vec!["kotlin".into()],
            architectural_style: "client only".into(),
            complexity_level: "beginner".into(),
        };
        let score = score_dna_similarity(&a, &b);
        assert_eq!(score.total, 0.0);
    }

    #[test]
    fn test_weighted_total_clamped() {
        let dna = sample_dna();
        let w = DnaWeights {
            app_type: 2.0,
            primary_domain: 2.0,
            core_tech_stack: 2.0,
            architectural_style: 2.0,
            complexity_level: 2.0,
        };
        let b = score_dna_similarity_with(&dna, &dna, w);
        assert_eq!(b.total, 1.0);
    }

    #[test]
    fn test_hash_content_order_independent() {
        let a = hash_content(
            "overview",
            &["b".into(), "a".into()],
            &["go".into(), "postgres".into()],
            "intermediate",
            "2-4 weeks",
        );
        let b = hash_content(
            "Overview",
            &["a".into(), "b".into()],
            &["Postgres".into(), "Go".into()],
            "Intermediate",
            "2-4 Weeks",
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_content_sensitive_to_content() {
        let a = hash_content("overview", &[], &[], "intermediate", "2-4 weeks");
        let b = hash_content("overview", &[], &[], "advanced", "2-4 weeks");
        assert_ne!(a, b);
    }
}

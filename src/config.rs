use std::fs;
use std::path::Path;

/// Similarity tuning, read once per session. Values come from the
/// environment; anything unparsable falls back to the defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityConfig {
    pub lookback: usize,
    pub regenerate_threshold: f64,
    pub block_threshold: f64,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            lookback: 50,
            regenerate_threshold: 0.55,
            block_threshold: 0.75,
        }
    }
}

impl SimilarityConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(n) = parse_env::<usize>("SIMILARITY_LOOKBACK_N") {
            if n > 0 {
                cfg.lookback = n;
            }
        }
        if let Some(v) = parse_env::<f64>("SIMILARITY_ACCEPTABLE_MAX") {
            if (0.0..=1.0).contains(&v) {
                cfg.regenerate_threshold = v;
            }
        }
        if let Some(v) = parse_env::<f64>("SIMILARITY_TOO_SIMILAR_MAX") {
            if (0.0..=1.0).contains(&v) {
                cfg.block_threshold = v;
            }
        }
        cfg
    }
}

/// Provider credentials. Either key may be absent; the provider manager
/// reports the missing variable when the provider is actually called.
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub gemini_api_key: Option<String>,
    pub hf_token: Option<String>,
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let _ = load_dotenv(Path::new(".env"));
        Self {
            gemini_api_key: nonempty_env("GEMINI_API_KEY"),
            hf_token: nonempty_env("HF_TOKEN"),
        }
    }
}

fn nonempty_env(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

/// Minimal `.env` loader: `KEY=value` lines, `#` comments, quotes stripped.
/// Existing environment variables always win.
pub fn load_dotenv(path: &Path) -> std::io::Result<()> {
    let content = fs::read_to_string(path)?;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
        if std::env::var_os(key).is_none() {
            std::env::set_var(key, value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_similarity_defaults() {
        let cfg = SimilarityConfig::default();
        assert_eq!(cfg.lookback, 50);
        assert_eq!(cfg.regenerate_threshold, 0.55);
        assert_eq!(cfg.block_threshold, 0.75);
    }

    #[test]
    fn test_env_overrides_applied() {
        std::env::set_var("SIMILARITY_LOOKBACK_N", "10");
        std::env::set_var("SIMILARITY_TOO_SIMILAR_MAX", "0.9");
        let cfg = SimilarityConfig::from_env();
        std::env::remove_var("SIMILARITY_LOOKBACK_N");
        std::env::remove_var("SIMILARITY_TOO_SIMILAR_MAX");
        assert_eq!(cfg.lookback, 10);
        assert_eq!(cfg.block_threshold, 0.9);
        assert_eq!(cfg.regenerate_threshold, 0.55);
    }

    #[test]
    fn test_invalid_env_values_fall_back() {
        std::env::set_var("SIMILARITY_ACCEPTABLE_MAX", "not-a-number");
        let cfg = SimilarityConfig::from_env();
        std::env::remove_var("SIMILARITY_ACCEPTABLE_MAX");
        assert_eq!(cfg.regenerate_threshold, 0.55);
    }

    #[test]
    fn test_dotenv_does_not_override_existing() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".env");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "# comment").unwrap();
        writeln!(f, "IDEAFORGE_TEST_EXISTING=from_file").unwrap();
        writeln!(f, "IDEAFORGE_TEST_FRESH=\"quoted\"").unwrap();

        std::env::set_var("IDEAFORGE_TEST_EXISTING", "from_env");
        load_dotenv(&path).unwrap();

        assert_eq!(
            std::env::var("IDEAFORGE_TEST_EXISTING").unwrap(),
            "from_env"
        );
        assert_eq!(std::env::var("IDEAFORGE_TEST_FRESH").unwrap(), "quoted");
        std::env::remove_var("IDEAFORGE_TEST_EXISTING");
        std::env::remove_var("IDEAFORGE_TEST_FRESH");
    }
}

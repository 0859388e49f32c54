use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Rule bundles passed to the analyzer when a request does not override
/// them.
pub const DEFAULT_RULES: &[&str] = &[
    "p/owasp-top-ten",
    "p/secrets",
    "p/sql-injection",
    "p/xss",
    "p/python",
    "p/javascript",
    "p/typescript",
    "p/php",
    "p/go",
    "p/java",
    "p/c",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Deadline for one analyzer run, in seconds. A small grace period is
    /// added on top for subprocess teardown.
    #[serde(default = "default_analyzer_timeout_secs")]
    pub analyzer_timeout_secs: u64,

    #[serde(default = "default_clone_timeout_secs")]
    pub clone_timeout_secs: u64,

    /// Budget for the full-clone retry after a shallow-clone rejection.
    #[serde(default = "default_full_clone_timeout_secs")]
    pub full_clone_timeout_secs: u64,

    #[serde(default = "default_rules")]
    pub default_rules: Vec<String>,

    #[serde(default = "default_max_repo_size_mb")]
    pub max_repo_size_mb: u64,

    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,

    /// Capacity of the terminal-job cache. Active jobs are never evicted.
    #[serde(default = "default_max_tracked_jobs")]
    pub max_tracked_jobs: usize,

    #[serde(default)]
    pub enrichment: EnrichmentSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSettings {
    #[serde(default = "default_enrichment_enabled")]
    pub enabled: bool,

    /// If not provided, the OPENAI_API_KEY env var is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// For OpenAI-compatible endpoints other than the default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_enrichment_model")]
    pub model: String,

    #[serde(default = "default_enrichment_timeout_secs")]
    pub timeout_secs: u64,

    /// Upper bound on findings sent to the provider per scan.
    #[serde(default = "default_max_findings_enriched")]
    pub max_findings_enriched: usize,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

fn default_analyzer_timeout_secs() -> u64 {
    300
}
fn default_clone_timeout_secs() -> u64 {
    120
}
fn default_full_clone_timeout_secs() -> u64 {
    300
}
fn default_rules() -> Vec<String> {
    DEFAULT_RULES.iter().map(|r| r.to_string()).collect()
}
fn default_max_repo_size_mb() -> u64 {
    100
}
fn default_max_file_size_mb() -> u64 {
    10
}
fn default_max_tracked_jobs() -> usize {
    256
}
fn default_enrichment_enabled() -> bool {
    true
}
fn default_enrichment_model() -> String {
    "gpt-4o".to_string()
}
fn default_enrichment_timeout_secs() -> u64 {
    30
}
fn default_max_findings_enriched() -> usize {
    20
}
fn default_cache_dir() -> PathBuf {
    std::env::temp_dir().join("codesweep_enrichment_cache")
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            analyzer_timeout_secs: default_analyzer_timeout_secs(),
            clone_timeout_secs: default_clone_timeout_secs(),
            full_clone_timeout_secs: default_full_clone_timeout_secs(),
            default_rules: default_rules(),
            max_repo_size_mb: default_max_repo_size_mb(),
            max_file_size_mb: default_max_file_size_mb(),
            max_tracked_jobs: default_max_tracked_jobs(),
            enrichment: EnrichmentSettings::default(),
        }
    }
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            enabled: default_enrichment_enabled(),
            api_key: None,
            base_url: None,
            model: default_enrichment_model(),
            timeout_secs: default_enrichment_timeout_secs(),
            max_findings_enriched: default_max_findings_enriched(),
            cache_dir: default_cache_dir(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Build from environment variables, falling back to defaults for
    /// anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(timeout) = std::env::var("CODESWEEP_ANALYZER_TIMEOUT") {
            if let Ok(t) = timeout.parse::<u64>() {
                config.analyzer_timeout_secs = t;
            }
        }

        if let Ok(rules) = std::env::var("CODESWEEP_RULES") {
            let rules: Vec<String> = rules
                .split(',')
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect();
            if !rules.is_empty() {
                config.default_rules = rules;
            }
        }

        if let Ok(size) = std::env::var("CODESWEEP_MAX_REPO_SIZE_MB") {
            if let Ok(s) = size.parse::<u64>() {
                config.max_repo_size_mb = s;
            }
        }

        if let Ok(size) = std::env::var("CODESWEEP_MAX_FILE_SIZE_MB") {
            if let Ok(s) = size.parse::<u64>() {
                config.max_file_size_mb = s;
            }
        }

        if let Ok(dir) = std::env::var("CODESWEEP_ENRICHMENT_CACHE_DIR") {
            config.enrichment.cache_dir = PathBuf::from(dir);
        }

        if let Ok(max) = std::env::var("CODESWEEP_MAX_FINDINGS_ENRICHED") {
            if let Ok(m) = max.parse::<usize>() {
                config.enrichment.max_findings_enriched = m;
            }
        }

        if let Ok(model) = std::env::var("CODESWEEP_ENRICHMENT_MODEL") {
            config.enrichment.model = model;
        }

        if let Ok(base_url) = std::env::var("CODESWEEP_ENRICHMENT_BASE_URL") {
            config.enrichment.base_url = Some(base_url);
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.enrichment.api_key = Some(key);
        } else {
            config.enrichment.enabled = false;
        }

        Ok(config)
    }

    pub fn save_yaml(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

pub const EXAMPLE_CONFIG: &str = r#"
# CodeSweep orchestrator configuration

analyzer_timeout_secs: 300
clone_timeout_secs: 120
full_clone_timeout_secs: 300
max_repo_size_mb: 100
max_file_size_mb: 10
max_tracked_jobs: 256

default_rules:
  - p/owasp-top-ten
  - p/secrets
  - p/sql-injection

enrichment:
  enabled: true
  model: gpt-4o
  # api_key: sk-...  # Optional, defaults to OPENAI_API_KEY env var
  timeout_secs: 30
  max_findings_enriched: 20
  cache_dir: /var/cache/codesweep/enrichment
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.analyzer_timeout_secs, 300);
        assert_eq!(config.max_repo_size_mb, 100);
        assert_eq!(config.max_file_size_mb, 10);
        assert_eq!(config.enrichment.max_findings_enriched, 20);
        assert!(config.default_rules.contains(&"p/owasp-top-ten".to_string()));
    }

    #[test]
    fn test_config_yaml_round_trip() {
        let config = OrchestratorConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: OrchestratorConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.default_rules, parsed.default_rules);
        assert_eq!(config.max_tracked_jobs, parsed.max_tracked_jobs);
    }

    #[test]
    fn test_example_config_parses() {
        let parsed: OrchestratorConfig = serde_yaml::from_str(EXAMPLE_CONFIG).unwrap();
        assert_eq!(parsed.enrichment.model, "gpt-4o");
        assert_eq!(parsed.default_rules.len(), 3);
    }
}

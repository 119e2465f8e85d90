//! Pulp configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Main Pulp configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Extraction pipeline and generation limits
    pub pipeline: PipelineConfig,

    /// Document converter configuration
    pub converter: ConverterConfig,

    /// Skill catalog configuration
    pub skills: SkillsConfig,

    /// Directory of user prompt overrides
    #[serde(rename = "prompts-dir")]
    pub prompts_dir: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        debug!(?config_path, "Config::load: called");
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .pulp.yml
        let local_config = PathBuf::from(".pulp.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/pulp/pulp.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("pulp").join("pulp.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Prompt override directory with `~/` expanded
    pub fn prompts_path(&self) -> PathBuf {
        expand_home(&self.prompts_dir)
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// Supported provider names
pub const PROVIDERS: &[&str] = &["anthropic", "openai", "groq", "openrouter", "custom", "ollama"];

/// LLM provider configuration
///
/// Empty strings mean "use the provider default" - see [`LlmConfig::resolve`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: anthropic, openai, groq, openrouter, custom or ollama
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Inline API key (takes priority over the environment variable)
    #[serde(rename = "api-key")]
    pub api_key: Option<String>,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// HTTP request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: String::new(),
            api_key_env: String::new(),
            api_key: None,
            base_url: String::new(),
            max_tokens: 4096,
            timeout_ms: 300_000,
        }
    }
}

impl LlmConfig {
    /// Fill in per-provider defaults for anything left unset
    pub fn resolve(&self) -> Result<ResolvedLlmConfig> {
        debug!(provider = %self.provider, "LlmConfig::resolve: called");
        let (base_url, api_key_env, model) = match self.provider.as_str() {
            "anthropic" => ("https://api.anthropic.com", "ANTHROPIC_API_KEY", "claude-sonnet-4-20250514"),
            "openai" => ("https://api.openai.com", "OPENAI_API_KEY", "gpt-4o-mini"),
            "groq" => ("https://api.groq.com/openai", "GROQ_API_KEY", "llama-3.1-70b-versatile"),
            "openrouter" => ("https://openrouter.ai/api", "OPENROUTER_API_KEY", "anthropic/claude-3.5-sonnet"),
            "ollama" => ("http://localhost:11434", "", "llama3.1:8b"),
            "custom" => {
                if self.base_url.is_empty() || self.model.is_empty() {
                    return Err(eyre::eyre!("Provider 'custom' requires both base-url and model"));
                }
                ("", "", "")
            }
            other => {
                return Err(eyre::eyre!(
                    "Unknown LLM provider: '{}'. Supported: {}",
                    other,
                    PROVIDERS.join(", ")
                ));
            }
        };

        let pick = |value: &str, default: &str| {
            if value.is_empty() {
                default.to_string()
            } else {
                value.to_string()
            }
        };

        Ok(ResolvedLlmConfig {
            provider: self.provider.clone(),
            model: pick(&self.model, model),
            api_key_env: pick(&self.api_key_env, api_key_env),
            api_key: self.api_key.clone().filter(|k| !k.is_empty()),
            base_url: pick(&self.base_url, base_url).trim_end_matches('/').to_string(),
            max_tokens: self.max_tokens,
            timeout_ms: self.timeout_ms,
        })
    }
}

/// LLM configuration with provider defaults applied
#[derive(Clone)]
pub struct ResolvedLlmConfig {
    pub provider: String,
    pub model: String,
    pub api_key_env: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl std::fmt::Debug for ResolvedLlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedLlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key_env", &self.api_key_env)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl ResolvedLlmConfig {
    /// Whether this provider authenticates with an API key
    pub fn requires_api_key(&self) -> bool {
        self.provider != "ollama"
    }

    /// Get the API key: inline value first, then the environment variable
    pub fn get_api_key(&self) -> Result<String> {
        debug!(provider = %self.provider, "get_api_key: called");
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        if !self.requires_api_key() {
            return Ok(String::new());
        }
        if self.api_key_env.is_empty() {
            return Err(eyre::eyre!(
                "No API key configured for provider '{}'. Set api-key or api-key-env.",
                self.provider
            ));
        }
        std::env::var(&self.api_key_env).map_err(|_| {
            eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.api_key_env
            )
        })
    }
}

/// Pipeline limits and per-call deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum chunk size in characters
    #[serde(rename = "chunk-size")]
    pub chunk_size: usize,

    /// Maximum extraction calls in flight
    #[serde(rename = "max-concurrent-extractions")]
    pub max_concurrent_extractions: usize,

    #[serde(rename = "extraction-timeout-ms")]
    pub extraction_timeout_ms: u64,

    #[serde(rename = "intent-timeout-ms")]
    pub intent_timeout_ms: u64,

    #[serde(rename = "skill-match-timeout-ms")]
    pub skill_match_timeout_ms: u64,

    #[serde(rename = "generation-timeout-ms")]
    pub generation_timeout_ms: u64,

    /// Capacity of the generation fragment channel
    #[serde(rename = "stream-buffer")]
    pub stream_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            max_concurrent_extractions: 4,
            extraction_timeout_ms: 60_000,
            intent_timeout_ms: 30_000,
            skill_match_timeout_ms: 10_000,
            generation_timeout_ms: 300_000,
            stream_buffer: 100,
        }
    }
}

impl PipelineConfig {
    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_millis(self.extraction_timeout_ms)
    }

    pub fn intent_timeout(&self) -> Duration {
        Duration::from_millis(self.intent_timeout_ms)
    }

    pub fn skill_match_timeout(&self) -> Duration {
        Duration::from_millis(self.skill_match_timeout_ms)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }
}

/// Document converter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Python interpreter (searched on PATH when unset)
    pub python: Option<PathBuf>,

    /// Path to the docling bridge script (searched in standard locations when unset)
    pub script: Option<PathBuf>,

    /// Conversion timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            python: None,
            script: None,
            timeout_ms: 300_000,
        }
    }
}

/// Skill catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillsConfig {
    /// Directory containing `<name>/SKILL.md` entries
    pub dir: String,

    /// Try semantic matching when no skill is named explicitly
    #[serde(rename = "auto-match")]
    pub auto_match: bool,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            dir: "~/.config/pulp/skills".to_string(),
            auto_match: true,
        }
    }
}

impl SkillsConfig {
    /// Skill directory with `~/` expanded
    pub fn path(&self) -> PathBuf {
        expand_home(&self.dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            pipeline: PipelineConfig::default(),
            converter: ConverterConfig::default(),
            skills: SkillsConfig::default(),
            prompts_dir: "~/.config/pulp/prompts".to_string(),
            log_level: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.pipeline.chunk_size, 1500);
        assert_eq!(config.pipeline.max_concurrent_extractions, 4);
        assert_eq!(config.pipeline.extraction_timeout(), Duration::from_secs(60));
        assert_eq!(config.pipeline.generation_timeout(), Duration::from_secs(300));
        assert!(config.skills.auto_match);
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_resolve_fills_provider_defaults() {
        let config = LlmConfig {
            provider: "anthropic".to_string(),
            ..Default::default()
        };
        let resolved = config.resolve().unwrap();

        assert_eq!(resolved.base_url, "https://api.anthropic.com");
        assert_eq!(resolved.api_key_env, "ANTHROPIC_API_KEY");
        assert!(resolved.model.contains("sonnet"));
    }

    #[test]
    fn test_resolve_keeps_explicit_values() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            base_url: "http://proxy.local/".to_string(),
            ..Default::default()
        };
        let resolved = config.resolve().unwrap();

        assert_eq!(resolved.model, "gpt-4o");
        assert_eq!(resolved.base_url, "http://proxy.local");
        assert_eq!(resolved.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_resolve_custom_requires_base_url_and_model() {
        let config = LlmConfig {
            provider: "custom".to_string(),
            ..Default::default()
        };
        assert!(config.resolve().is_err());

        let config = LlmConfig {
            provider: "custom".to_string(),
            model: "local-model".to_string(),
            base_url: "http://localhost:8080".to_string(),
            ..Default::default()
        };
        assert!(config.resolve().is_ok());
    }

    #[test]
    fn test_resolve_unknown_provider() {
        let config = LlmConfig {
            provider: "nope".to_string(),
            ..Default::default()
        };
        let err = config.resolve().unwrap_err();
        assert!(err.to_string().contains("Unknown LLM provider"));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let resolved = LlmConfig::default().resolve().unwrap();
        assert!(!resolved.requires_api_key());
        assert_eq!(resolved.get_api_key().unwrap(), "");
    }

    #[test]
    fn test_inline_api_key_wins() {
        let config = LlmConfig {
            provider: "groq".to_string(),
            api_key: Some("inline-key".to_string()),
            api_key_env: "PULP_TEST_UNSET_KEY_VAR".to_string(),
            ..Default::default()
        };
        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.get_api_key().unwrap(), "inline-key");
    }

    #[test]
    fn test_missing_env_key_errors() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            api_key_env: "PULP_TEST_DEFINITELY_UNSET_VAR".to_string(),
            ..Default::default()
        };
        let resolved = config.resolve().unwrap();
        let err = resolved.get_api_key().unwrap_err();
        assert!(err.to_string().contains("PULP_TEST_DEFINITELY_UNSET_VAR"));
    }

    #[test]
    #[serial]
    fn test_env_api_key() {
        // SAFETY: env mutation is serialized across tests
        unsafe { std::env::set_var("PULP_TEST_ENV_KEY", "from-env") };
        let config = LlmConfig {
            provider: "anthropic".to_string(),
            api_key_env: "PULP_TEST_ENV_KEY".to_string(),
            ..Default::default()
        };
        let key = config.resolve().unwrap().get_api_key();
        unsafe { std::env::remove_var("PULP_TEST_ENV_KEY") };
        assert_eq!(key.unwrap(), "from-env");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = LlmConfig {
            provider: "openai".to_string(),
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let rendered = format!("{:?}", config.resolve().unwrap());
        assert!(!rendered.contains("sk-secret"));
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
llm:
  provider: anthropic
  model: claude-opus-4
  api-key-env: MY_API_KEY
  base-url: https://api.example.com
  max-tokens: 8192
  timeout-ms: 60000

pipeline:
  chunk-size: 800
  max-concurrent-extractions: 2
  generation-timeout-ms: 1000

skills:
  dir: /tmp/skills
  auto-match: false

log-level: debug
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.model, "claude-opus-4");
        assert_eq!(config.llm.api_key_env, "MY_API_KEY");
        assert_eq!(config.llm.max_tokens, 8192);
        assert_eq!(config.pipeline.chunk_size, 800);
        assert_eq!(config.pipeline.max_concurrent_extractions, 2);
        assert_eq!(config.pipeline.generation_timeout(), Duration::from_secs(1));
        assert_eq!(config.skills.path(), PathBuf::from("/tmp/skills"));
        assert!(!config.skills.auto_match);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
llm:
  model: llama3.2
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.llm.model, "llama3.2");

        // Defaults for unspecified
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.pipeline.stream_buffer, 100);
        assert_eq!(config.converter.timeout_ms, 300_000);
        assert_eq!(config.prompts_dir, "~/.config/pulp/prompts");
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulp.yml");
        fs::write(&path, "pipeline:\n  chunk-size: 42\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.pipeline.chunk_size, 42);
    }

    #[test]
    fn test_load_explicit_path_missing_is_error() {
        let path = PathBuf::from("/nonexistent/pulp.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/x"), home.join("x"));
        }
    }
}

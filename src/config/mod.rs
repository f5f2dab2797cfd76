use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::providers::{Category, ProviderKind};

/// Prefix used by `.env` templates for keys that were never filled in
const PLACEHOLDER_KEY_PREFIX: &str = "YOUR_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP client settings shared by every provider
    #[serde(default)]
    pub http: HttpConfig,

    /// Where generated artifacts are written
    #[serde(default)]
    pub output: OutputConfig,

    /// Providers in registration order
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Whole-request timeout for generation calls
    pub timeout_secs: u64,

    /// TCP connect timeout
    pub connect_timeout_secs: u64,

    /// Timeout for connectivity probes
    pub probe_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for binary artifacts saved without an explicit path
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Display name, unique within its category
    pub name: String,

    /// Provider family
    pub kind: ProviderKind,

    /// Category the provider is registered under
    pub category: Category,

    /// Lower value is tried first
    pub priority: i32,

    /// Environment variables checked, in order, for the API key
    pub credential_env_keys: Vec<String>,

    /// Model override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Voice override for speech providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// API base URL override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            connect_timeout_secs: 10,
            probe_timeout_secs: 10,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("generated"),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Build the HTTP client shared by all providers
    pub fn build_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout())
            .connect_timeout(self.connect_timeout())
            .user_agent(concat!("reelforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")
    }
}

impl ProviderConfig {
    fn new(name: &str, kind: ProviderKind, priority: i32, keys: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            category: kind.category(),
            priority,
            credential_env_keys: keys.iter().map(|k| k.to_string()).collect(),
            model: None,
            voice: None,
            base_url: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            output: OutputConfig::default(),
            providers: vec![
                ProviderConfig::new("Groq", ProviderKind::Groq, 1, &["GROQ_API_KEY"]),
                ProviderConfig::new(
                    "Gemini",
                    ProviderKind::Gemini,
                    2,
                    &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
                ),
                ProviderConfig::new("OpenAI", ProviderKind::OpenAi, 3, &["OPENAI_API_KEY"]),
                ProviderConfig::new(
                    "Replicate",
                    ProviderKind::Replicate,
                    1,
                    &["REPLICATE_API_KEY", "REPLICATE_API_TOKEN"],
                ),
                ProviderConfig::new(
                    "HuggingFace",
                    ProviderKind::HuggingFace,
                    2,
                    &["HUGGINGFACE_API_KEY"],
                ),
                ProviderConfig::new("Stability", ProviderKind::Stability, 3, &["STABILITY_API_KEY"]),
                ProviderConfig::new(
                    "ElevenLabs",
                    ProviderKind::ElevenLabs,
                    1,
                    &["ELEVENLABS_API_KEY"],
                ),
                ProviderConfig::new(
                    "GoogleTTS",
                    ProviderKind::GoogleTts,
                    2,
                    &["GOOGLE_TTS_API_KEY", "GOOGLE_API_KEY"],
                ),
            ],
        }
    }
}

impl Config {
    /// Load configuration from an explicit path, or from the default location
    ///
    /// A missing explicit file is an error; a missing default file is created
    /// with the built-in provider list.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No configuration found, writing defaults to {}", config_path.display());
            let config = Self::default();
            config.save(&config_path)?;
            Ok(config)
        }
    }

    /// Load and validate a configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).context("Failed to read config file")?;
        let config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        tracing::debug!(
            path = %path.display(),
            providers = config.providers.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("reelforge.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("reelforge").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.http.timeout_secs == 0
            || self.http.connect_timeout_secs == 0
            || self.http.probe_timeout_secs == 0
        {
            anyhow::bail!("HTTP timeouts must be greater than zero");
        }

        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                anyhow::bail!("Provider names must not be empty");
            }

            if provider.kind.category() != provider.category {
                anyhow::bail!(
                    "Provider {} is a {} provider but is registered under {}",
                    provider.name,
                    provider.kind.category(),
                    provider.category
                );
            }

            if provider.credential_env_keys.is_empty() {
                anyhow::bail!("Provider {} lists no credential_env_keys", provider.name);
            }

            if let Some(base_url) = &provider.base_url {
                crate::utils::validate_base_url(base_url)
                    .with_context(|| format!("Invalid base_url for provider {}", provider.name))?;
            }
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  HTTP Timeout: {}s", self.http.timeout_secs);
        println!("  Probe Timeout: {}s", self.http.probe_timeout_secs);
        println!("  Output Directory: {}", self.output.dir.display());
        println!("  Providers:");
        for provider in &self.providers {
            let key_state = if resolve_credential(&provider.credential_env_keys).is_some() {
                "key set"
            } else {
                "no key"
            };
            println!(
                "    {} [{}] priority {} ({}: {})",
                provider.name,
                provider.category,
                provider.priority,
                provider.credential_env_keys.join(" | "),
                key_state
            );
        }
    }
}

/// First usable credential among the given environment variables
///
/// The process environment includes anything loaded from `.env` at startup.
/// Empty values and untouched template values (`YOUR_...`) are skipped.
pub fn resolve_credential(keys: &[String]) -> Option<String> {
    keys.iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| is_usable_credential(value))
}

pub fn is_usable_credential(value: &str) -> bool {
    !value.is_empty() && !value.starts_with(PLACEHOLDER_KEY_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.providers.len(), 8);
        assert_eq!(
            config
                .providers
                .iter()
                .filter(|p| p.category == Category::Voice)
                .count(),
            2
        );
    }

    #[test]
    fn test_load_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
http:
  timeout_secs: 30
  connect_timeout_secs: 5
  probe_timeout_secs: 3
providers:
  - name: Groq
    kind: groq
    category: script
    priority: 1
    credential_env_keys: [GROQ_API_KEY]
    model: llama-3.3-70b-versatile
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.output.dir, PathBuf::from("generated"));
        assert_eq!(config.providers[0].model.as_deref(), Some("llama-3.3-70b-versatile"));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(dir.path().join("absent.yaml").as_path())).is_err());
    }

    #[test]
    fn test_validate_rejects_category_mismatch() {
        let mut config = Config::default();
        config.providers[0].category = Category::Image;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("registered under image"));
    }

    #[test]
    fn test_validate_rejects_bad_base_url() {
        let mut config = Config::default();
        config.providers[0].base_url = Some("ftp://example.com".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        Config::default().save(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.providers.len(), 8);
        assert_eq!(loaded.providers[7].kind, ProviderKind::GoogleTts);
    }

    #[test]
    fn test_usable_credential() {
        assert!(is_usable_credential("gsk_live_123"));
        assert!(!is_usable_credential(""));
        assert!(!is_usable_credential("YOUR_GROQ_API_KEY"));
    }

    #[test]
    fn test_resolve_credential_skips_unset_keys() {
        let keys = vec![
            "REELFORGE_TEST_SURELY_UNSET_KEY".to_string(),
            "REELFORGE_TEST_ANOTHER_UNSET_KEY".to_string(),
        ];
        assert_eq!(resolve_credential(&keys), None);
    }
}

use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides `storage.path`.
pub const STORAGE_ENV: &str = "CHROMA_MCP_STORAGE";
/// Overrides `llm.api_key`.
pub const LLM_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

const CONFIG_DIR: &str = ".mcp-toolbox";
const CONFIG_FILE: &str = "config.toml";

/// Top-level configuration, read from `~/.mcp-toolbox/config.toml`.
///
/// Every section is optional; missing values fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Tracing filter used when `RUST_LOG` is unset.
    pub log_level: String,
    pub storage: StorageConfig,
    pub python: PythonConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the collection database. `~` and `$VARS` expand.
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct PythonConfig {
    /// Conda launcher, tried first.
    pub conda_executable: String,
    /// Conda environment the code runs in.
    pub conda_env: String,
    /// Interpreter used when conda is unavailable.
    pub fallback_interpreter: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub api_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            storage: StorageConfig::default(),
            python: PythonConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: format!("~/{CONFIG_DIR}/chroma"),
        }
    }
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            conda_executable: "conda".into(),
            conda_env: "py312".into(),
            fallback_interpreter: "python3".into(),
            timeout_secs: 60,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://openrouter.ai/api/v1/chat/completions".into(),
            model: "anthropic/claude-haiku-4.5".into(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location when
    /// `path` is `None`. A missing default file yields defaults; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config: {}", path.display()))
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(STORAGE_ENV).filter(|v| !v.trim().is_empty()) {
            self.storage.path = path;
        }
        if let Some(key) = lookup(LLM_API_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.llm.api_key = Some(key);
        }
    }

    /// Storage directory with `~` and environment variables expanded.
    pub fn storage_dir(&self) -> PathBuf {
        expand_path(&self.storage.path)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    directories::UserDirs::new().map(|dirs| dirs.home_dir().join(CONFIG_DIR).join(CONFIG_FILE))
}

fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            tracing::warn!("could not expand path {raw}: {e}");
            PathBuf::from(shellexpand::tilde(raw).as_ref())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.python.conda_env, "py312");
        assert!(config.llm.api_key.is_none());
        assert!(config.storage.path.ends_with("chroma"));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            "log_level = \"debug\"\n\n[python]\ntimeout_secs = 5\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.python.timeout_secs, 5);
        assert_eq!(config.python.conda_env, "py312");
        assert_eq!(config.llm, LlmConfig::default());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(Config::load(Some(&tmp.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[python\ntimeout_secs = ").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            (STORAGE_ENV, "/tmp/toolbox-store"),
            (LLM_API_KEY_ENV, "sk-test"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.storage.path, "/tmp/toolbox-store");
        assert_eq!(config.storage_dir(), PathBuf::from("/tmp/toolbox-store"));
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|_| Some("  ".into()));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn schema_lists_sections() {
        let schema = serde_json::to_value(schemars::schema_for!(Config)).unwrap();
        let props = &schema["properties"];
        for key in ["log_level", "storage", "python", "llm"] {
            assert!(props.get(key).is_some(), "missing {key}");
        }
    }
}

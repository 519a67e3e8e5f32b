//! Configuration loader and validator for the news aggregator.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const NEWSAPI_KEY_ENV: &str = "NEWSAPI_KEY";
pub const GUARDIAN_KEY_ENV: &str = "GUARDIAN_KEY";
pub const NYTIMES_KEY_ENV: &str = "NYTIMES_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub providers: Providers,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Seconds between two ingestion runs of the scheduler.
    #[serde(default = "default_fetch_interval_secs")]
    pub fetch_interval_secs: u64,
}

/// One section per external news provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Providers {
    pub newsapi: NewsApi,
    pub guardian: Guardian,
    pub nytimes: NyTimes,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewsApi {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_newsapi_base_url")]
    pub base_url: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Guardian {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_guardian_base_url")]
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NyTimes {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_nytimes_base_url")]
    pub base_url: String,
    /// Top-stories section to poll (`home`, `world`, ...).
    #[serde(default = "default_nytimes_section")]
    pub section: String,
}

fn default_fetch_interval_secs() -> u64 {
    3600
}

fn enabled_by_default() -> bool {
    true
}

fn default_newsapi_base_url() -> String {
    "https://newsapi.org/v2/".into()
}

fn default_guardian_base_url() -> String {
    "https://content.guardianapis.com/".into()
}

fn default_nytimes_base_url() -> String {
    "https://api.nytimes.com/svc/topstories/v2/".into()
}

fn default_nytimes_section() -> String {
    "home".into()
}

fn default_language() -> String {
    "en".into()
}

fn default_page_size() -> u32 {
    10
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Default SQLite location inside the data directory.
    pub fn database_url(&self) -> String {
        format!(
            "sqlite://{}/news.db",
            self.app.data_dir.trim_end_matches('/')
        )
    }

    /// Replace provider API keys with values found through `lookup`.
    /// Empty values are ignored so a blank variable never wipes a key.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(key) = pick(NEWSAPI_KEY_ENV) {
            self.providers.newsapi.api_key = key;
        }
        if let Some(key) = pick(GUARDIAN_KEY_ENV) {
            self.providers.guardian.api_key = key;
        }
        if let Some(key) = pick(NYTIMES_KEY_ENV) {
            self.providers.nytimes.api_key = key;
        }
    }
}

/// Load configuration from a YAML file, apply environment overrides and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env_overrides(|name| std::env::var(name).ok());
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.fetch_interval_secs == 0 {
        return Err(ConfigError::Invalid("app.fetch_interval_secs must be > 0"));
    }

    let newsapi = &cfg.providers.newsapi;
    if newsapi.enabled {
        if newsapi.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "providers.newsapi.api_key must be non-empty",
            ));
        }
        if Url::parse(&newsapi.base_url).is_err() {
            return Err(ConfigError::Invalid(
                "providers.newsapi.base_url must be a valid URL",
            ));
        }
        if newsapi.page_size == 0 {
            return Err(ConfigError::Invalid(
                "providers.newsapi.page_size must be > 0",
            ));
        }
    }

    let guardian = &cfg.providers.guardian;
    if guardian.enabled {
        if guardian.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "providers.guardian.api_key must be non-empty",
            ));
        }
        if Url::parse(&guardian.base_url).is_err() {
            return Err(ConfigError::Invalid(
                "providers.guardian.base_url must be a valid URL",
            ));
        }
        if guardian.page_size == 0 {
            return Err(ConfigError::Invalid(
                "providers.guardian.page_size must be > 0",
            ));
        }
    }

    let nytimes = &cfg.providers.nytimes;
    if nytimes.enabled {
        if nytimes.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "providers.nytimes.api_key must be non-empty",
            ));
        }
        if Url::parse(&nytimes.base_url).is_err() {
            return Err(ConfigError::Invalid(
                "providers.nytimes.base_url must be a valid URL",
            ));
        }
        if nytimes.section.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "providers.nytimes.section must be non-empty",
            ));
        }
    }

    Ok(())
}

/// Returns the example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  fetch_interval_secs: 3600

providers:
  newsapi:
    enabled: true
    api_key: "YOUR_NEWSAPI_KEY"
    base_url: "https://newsapi.org/v2/"
    language: "en"
    page_size: 10
  guardian:
    enabled: true
    api_key: "YOUR_GUARDIAN_KEY"
    base_url: "https://content.guardianapis.com/"
    page_size: 10
  nytimes:
    enabled: true
    api_key: "YOUR_NYTIMES_KEY"
    base_url: "https://api.nytimes.com/svc/topstories/v2/"
    section: "home"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn example_config() -> Config {
        serde_yaml::from_str(example()).unwrap()
    }

    #[test]
    fn parse_example_ok() {
        let cfg = example_config();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.fetch_interval_secs, 3600);
        assert_eq!(cfg.providers.nytimes.section, "home");
    }

    #[test]
    fn defaults_fill_missing_provider_fields() {
        let yaml = r#"app:
  data_dir: "./data"
providers:
  newsapi:
    api_key: "a"
  guardian:
    api_key: "b"
  nytimes:
    api_key: "c"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.fetch_interval_secs, 3600);
        assert!(cfg.providers.newsapi.enabled);
        assert_eq!(cfg.providers.newsapi.page_size, 10);
        assert_eq!(cfg.providers.newsapi.language, "en");
        assert_eq!(
            cfg.providers.guardian.base_url,
            "https://content.guardianapis.com/"
        );
    }

    #[test]
    fn invalid_api_keys() {
        let mut cfg = example_config();
        cfg.providers.newsapi.api_key = "".into();
        match validate(&cfg).unwrap_err() {
            ConfigError::Invalid(msg) => assert!(msg.contains("newsapi.api_key")),
            _ => panic!("wrong error"),
        }

        let mut cfg = example_config();
        cfg.providers.guardian.api_key = "  ".into();
        match validate(&cfg).unwrap_err() {
            ConfigError::Invalid(msg) => assert!(msg.contains("guardian.api_key")),
            _ => panic!("wrong error"),
        }

        let mut cfg = example_config();
        cfg.providers.nytimes.api_key = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn disabled_provider_skips_validation() {
        let mut cfg = example_config();
        cfg.providers.nytimes.enabled = false;
        cfg.providers.nytimes.api_key = "".into();
        cfg.providers.nytimes.base_url = "not a url".into();
        validate(&cfg).unwrap();
    }

    #[test]
    fn invalid_app_settings() {
        let mut cfg = example_config();
        cfg.app.fetch_interval_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_config();
        cfg.app.data_dir = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_config();
        cfg.providers.guardian.base_url = "::nope".into();
        match validate(&cfg).unwrap_err() {
            ConfigError::Invalid(msg) => assert!(msg.contains("guardian.base_url")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn env_overrides_replace_keys() {
        let mut cfg = example_config();
        let env: HashMap<&str, &str> = [(NEWSAPI_KEY_ENV, "from-env"), (NYTIMES_KEY_ENV, "")]
            .into_iter()
            .collect();
        cfg.apply_env_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(cfg.providers.newsapi.api_key, "from-env");
        assert_eq!(cfg.providers.guardian.api_key, "YOUR_GUARDIAN_KEY");
        // blank values leave the file value in place
        assert_eq!(cfg.providers.nytimes.api_key, "YOUR_NYTIMES_KEY");
    }

    #[test]
    fn database_url_points_into_data_dir() {
        let mut cfg = example_config();
        cfg.app.data_dir = "/var/lib/news/".into();
        assert_eq!(cfg.database_url(), "sqlite:///var/lib/news/news.db");
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg = example_config();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.providers.guardian.page_size, 10);
    }
}

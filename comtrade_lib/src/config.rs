//! Immutable configuration context.
//!
//! Built once from defaults, an optional TOML file and `COMTRADE_*`
//! environment variables (in that order of precedence, lowest first), then
//! handed to [`crate::CachedClient`]. Nothing in the library reads the
//! environment after construction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ComtradeError;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

const CONFIG_TEMPLATE: &str = r#"# Comtrade toolkit configuration
[comtrade]
# Add API key. DO NOT SHARE. Get one at https://comtradedeveloper.un.org/
key = "APIKEYHERE"
"#;

/// What to do when the result cache cannot be read or written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheFailurePolicy {
    /// Surface the cache error to the caller.
    #[default]
    Abort,
    /// Log the error and continue as if caching were disabled.
    Bypass,
}

impl std::str::FromStr for CacheFailurePolicy {
    type Err = ComtradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "bypass" => Ok(Self::Bypass),
            other => Err(ComtradeError::Config(format!(
                "unknown cache failure policy '{}', expected 'abort' or 'bypass'",
                other
            ))),
        }
    }
}

/// Settings for retrieval, caching and throttling.
#[derive(Clone, Debug, PartialEq)]
pub struct ComtradeConfig {
    /// Subscription key. `None` selects the preview endpoint.
    pub api_key: Option<String>,
    pub cache_dir: PathBuf,
    /// Directory holding the code book CSV files.
    pub support_dir: PathBuf,
    /// At most this many calls per `period`.
    pub calls_per_period: u64,
    pub period: Duration,
    /// Total calls per sub-request, first attempt included.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub max_backoff: Duration,
    pub cache_valid_days: u64,
    pub timeout: Duration,
    pub cache_failure_policy: CacheFailurePolicy,
}

impl Default for ComtradeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            cache_dir: PathBuf::from("cache"),
            support_dir: PathBuf::from("support"),
            calls_per_period: 1,
            period: Duration::from_secs(20),
            max_attempts: 5,
            backoff_base: Duration::from_secs(6),
            max_backoff: Duration::from_secs(60),
            cache_valid_days: 60,
            timeout: Duration::from_secs(120),
            cache_failure_policy: CacheFailurePolicy::Abort,
        }
    }
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    comtrade: FileSection,
}

#[derive(Deserialize, Default)]
struct FileSection {
    key: Option<String>,
    cache_dir: Option<PathBuf>,
    support_dir: Option<PathBuf>,
    calls_per_period: Option<u64>,
    period_secs: Option<u64>,
    max_attempts: Option<u32>,
    backoff_secs: Option<u64>,
    max_backoff_secs: Option<u64>,
    cache_valid_days: Option<u64>,
    timeout_secs: Option<u64>,
    cache_failure_policy: Option<String>,
}

impl ComtradeConfig {
    /// Defaults, then `path` if it exists, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ComtradeError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let config = if path.is_file() {
            Self::default().merge_file(path)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };
        config.merge_env()
    }

    /// Defaults overridden by `COMTRADE_*` environment variables.
    pub fn from_env() -> Result<Self, ComtradeError> {
        Self::default().merge_env()
    }

    /// Overrides fields with the values present in a TOML file.
    pub fn merge_file(self, path: &Path) -> Result<Self, ComtradeError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ComtradeError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        self.merge_toml(&text)
            .map_err(|e| ComtradeError::Config(format!("{}: {}", path.display(), e)))
    }

    fn merge_toml(mut self, text: &str) -> Result<Self, ComtradeError> {
        let file: ConfigFile =
            toml::from_str(text).map_err(|e| ComtradeError::Config(e.to_string()))?;
        let section = file.comtrade;
        if let Some(key) = section.key {
            self.api_key = comtrade_api::normalize_api_key(Some(&key));
        }
        if let Some(dir) = section.cache_dir {
            self.cache_dir = dir;
        }
        if let Some(dir) = section.support_dir {
            self.support_dir = dir;
        }
        if let Some(v) = section.calls_per_period {
            self.calls_per_period = v;
        }
        if let Some(v) = section.period_secs {
            self.period = Duration::from_secs(v);
        }
        if let Some(v) = section.max_attempts {
            self.max_attempts = v;
        }
        if let Some(v) = section.backoff_secs {
            self.backoff_base = Duration::from_secs(v);
        }
        if let Some(v) = section.max_backoff_secs {
            self.max_backoff = Duration::from_secs(v);
        }
        if let Some(v) = section.cache_valid_days {
            self.cache_valid_days = v;
        }
        if let Some(v) = section.timeout_secs {
            self.timeout = Duration::from_secs(v);
        }
        if let Some(policy) = section.cache_failure_policy {
            self.cache_failure_policy = policy.parse()?;
        }
        self.validate()
    }

    fn merge_env(self) -> Result<Self, ComtradeError> {
        self.merge_vars(|key| std::env::var(key).ok())
    }

    fn merge_vars<F>(mut self, var: F) -> Result<Self, ComtradeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = var("COMTRADE_API_KEY") {
            self.api_key = comtrade_api::normalize_api_key(Some(&key));
        }
        if let Some(dir) = var("COMTRADE_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(dir) = var("COMTRADE_SUPPORT_DIR") {
            self.support_dir = PathBuf::from(dir);
        }
        self.calls_per_period =
            parse_var(&var, "COMTRADE_CALLS_PER_PERIOD", self.calls_per_period);
        self.period = secs_var(&var, "COMTRADE_PERIOD_SECS", self.period);
        self.max_attempts = parse_var(&var, "COMTRADE_MAX_ATTEMPTS", self.max_attempts);
        self.backoff_base = secs_var(&var, "COMTRADE_BACKOFF_SECS", self.backoff_base);
        self.max_backoff = secs_var(&var, "COMTRADE_MAX_BACKOFF_SECS", self.max_backoff);
        self.cache_valid_days =
            parse_var(&var, "COMTRADE_CACHE_VALID_DAYS", self.cache_valid_days);
        self.timeout = secs_var(&var, "COMTRADE_TIMEOUT_SECS", self.timeout);
        self.validate()
    }

    fn validate(self) -> Result<Self, ComtradeError> {
        if self.calls_per_period == 0 {
            return Err(ComtradeError::Config(
                "calls_per_period must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ComtradeError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn with_api_key(mut self, key: Option<&str>) -> Self {
        self.api_key = comtrade_api::normalize_api_key(key);
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn with_support_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.support_dir = dir.into();
        self
    }

    pub fn with_rate_limit(mut self, calls_per_period: u64, period: Duration) -> Self {
        self.calls_per_period = calls_per_period.max(1);
        self.period = period;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff_base: Duration, max_backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff_base = backoff_base;
        self.max_backoff = max_backoff;
        self
    }

    pub fn with_cache_valid_days(mut self, days: u64) -> Self {
        self.cache_valid_days = days;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cache_failure_policy(mut self, policy: CacheFailurePolicy) -> Self {
        self.cache_failure_policy = policy;
        self
    }

    /// Age after which a cache entry is stale.
    pub fn cache_validity(&self) -> Duration {
        Duration::from_secs(self.cache_valid_days.saturating_mul(24 * 3600))
    }
}

fn parse_var<F, T>(var: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match var(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!("Ignoring {}={:?}: not a valid number", key, raw);
                default
            }
        },
        None => default,
    }
}

fn secs_var<F>(var: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    Duration::from_secs(parse_var(var, key, default.as_secs()))
}

/// What [`setup`] created.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SetupReport {
    pub created_dirs: Vec<PathBuf>,
    /// Set when a config template was written.
    pub config_written: Option<PathBuf>,
}

/// Creates the cache and support directories and, when missing, a config
/// file template with a placeholder key. Existing files are left alone.
pub fn setup(config: &ComtradeConfig, config_path: &Path) -> Result<SetupReport, ComtradeError> {
    let mut report = SetupReport::default();
    for dir in [&config.cache_dir, &config.support_dir] {
        if !dir.is_dir() {
            std::fs::create_dir_all(dir).map_err(|e| {
                ComtradeError::Config(format!("cannot create {}: {}", dir.display(), e))
            })?;
            tracing::info!("Created directory {}", dir.display());
            report.created_dirs.push(dir.clone());
        }
    }
    if !config_path.exists() {
        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ComtradeError::Config(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        std::fs::write(config_path, CONFIG_TEMPLATE).map_err(|e| {
            ComtradeError::Config(format!("cannot write {}: {}", config_path.display(), e))
        })?;
        tracing::info!(
            "Created {}; add an API key from https://comtradedeveloper.un.org/",
            config_path.display()
        );
        report.config_written = Some(config_path.to_path_buf());
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_service_limits() {
        let cfg = ComtradeConfig::default();
        assert_eq!(cfg.calls_per_period, 1);
        assert_eq!(cfg.period, Duration::from_secs(20));
        assert_eq!(cfg.max_attempts, 5);
        assert_eq!(cfg.backoff_base, Duration::from_secs(6));
        assert_eq!(cfg.cache_valid_days, 60);
        assert_eq!(cfg.cache_validity(), Duration::from_secs(60 * 86_400));
        assert_eq!(cfg.cache_failure_policy, CacheFailurePolicy::Abort);
    }

    #[test]
    fn env_overrides_defaults() {
        let cfg = ComtradeConfig::default()
            .merge_vars(vars(&[
                ("COMTRADE_API_KEY", "abcd1234"),
                ("COMTRADE_CACHE_DIR", "/tmp/ct-cache"),
                ("COMTRADE_PERIOD_SECS", "7"),
                ("COMTRADE_MAX_ATTEMPTS", "3"),
            ]))
            .unwrap();
        assert_eq!(cfg.api_key.as_deref(), Some("abcd1234"));
        assert_eq!(cfg.cache_dir, PathBuf::from("/tmp/ct-cache"));
        assert_eq!(cfg.period, Duration::from_secs(7));
        assert_eq!(cfg.max_attempts, 3);
    }

    #[test]
    fn bad_env_numbers_fall_back() {
        let cfg = ComtradeConfig::default()
            .merge_vars(vars(&[("COMTRADE_TIMEOUT_SECS", "soon")]))
            .unwrap();
        assert_eq!(cfg.timeout, Duration::from_secs(120));
    }

    #[test]
    fn zero_attempts_rejected() {
        let err = ComtradeConfig::default()
            .merge_vars(vars(&[("COMTRADE_MAX_ATTEMPTS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ComtradeError::Config(_)));
    }

    #[test]
    fn toml_section_is_merged() {
        let cfg = ComtradeConfig::default()
            .merge_toml(
                r#"
                [comtrade]
                key = "APIKEYHERE"
                cache_valid_days = 7
                backoff_secs = 2
                cache_failure_policy = "bypass"
                "#,
            )
            .unwrap();
        assert_eq!(cfg.api_key, None);
        assert_eq!(cfg.cache_valid_days, 7);
        assert_eq!(cfg.backoff_base, Duration::from_secs(2));
        assert_eq!(cfg.cache_failure_policy, CacheFailurePolicy::Bypass);
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = ComtradeConfig::default()
            .merge_toml("[comtrade\nkey=")
            .unwrap_err();
        assert!(matches!(err, ComtradeError::Config(_)));
    }

    #[test]
    fn setup_creates_dirs_and_template_once() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = ComtradeConfig::default()
            .with_cache_dir(tmp.path().join("cache"))
            .with_support_dir(tmp.path().join("support"));
        let config_path = tmp.path().join("config.toml");

        let report = setup(&cfg, &config_path).unwrap();
        assert_eq!(report.created_dirs.len(), 2);
        assert_eq!(report.config_written.as_deref(), Some(config_path.as_path()));
        assert!(tmp.path().join("cache").is_dir());

        let loaded = ComtradeConfig::default().merge_file(&config_path).unwrap();
        assert_eq!(loaded.api_key, None);

        let again = setup(&cfg, &config_path).unwrap();
        assert_eq!(again, SetupReport::default());
    }
}

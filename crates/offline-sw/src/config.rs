//! Worker configuration.
//!
//! Everything the handlers need to know about the application is carried by
//! [`WorkerConfig`], built once at startup and shared behind an `Arc`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::pattern::{CdnPatternSet, UrlPattern};

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Base URL the worker controls; relative asset paths resolve against it.
    pub scope: Url,

    /// Versioned store holding the application shell.
    pub static_cache_name: String,

    /// Store accumulating CDN and on-demand resources.
    pub runtime_cache_name: String,

    /// Paths fetched during install.
    pub static_assets: Vec<String>,

    /// Requests matching any of these are served network-first.
    pub cdn_patterns: Vec<UrlPattern>,

    /// URL schemes the interceptor never touches (browser extensions).
    pub bypass_schemes: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scope: Url::parse("http://localhost/").expect("static URL is valid"),
            static_cache_name: "translate-app-v1".to_string(),
            runtime_cache_name: "translate-runtime-v1".to_string(),
            static_assets: [
                "./",
                "./index.html",
                "./manifest.json",
                "./icon-192.png",
                "./icon-512.png",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            cdn_patterns: vec![
                UrlPattern::regex(r"^https://esm\.run/"),
                UrlPattern::regex(r"^https://cdn\."),
                UrlPattern::regex(r"^https://unpkg\."),
                UrlPattern::regex(r"^https://.*\.jsdelivr\.net/"),
            ],
            bypass_schemes: vec![
                "chrome-extension".to_string(),
                "moz-extension".to_string(),
                "safari-web-extension".to_string(),
            ],
        }
    }
}

impl WorkerConfig {
    /// Default configuration for an application served from `scope`.
    pub fn for_scope(scope: Url) -> Self {
        Self {
            scope,
            ..Default::default()
        }
    }

    /// Load and validate a JSON configuration file. Missing fields take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse and validate a JSON configuration string.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - the scope cannot serve as a base URL
    /// - either store name is empty, or both names are equal
    /// - a static asset does not resolve against the scope
    /// - a CDN pattern fails to compile
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scope.cannot_be_a_base() {
            return Err(ConfigError::invalid("scope", "must be a base URL"));
        }

        if self.static_cache_name.trim().is_empty() {
            return Err(ConfigError::invalid("static_cache_name", "must not be empty"));
        }
        if self.runtime_cache_name.trim().is_empty() {
            return Err(ConfigError::invalid("runtime_cache_name", "must not be empty"));
        }
        if self.static_cache_name == self.runtime_cache_name {
            return Err(ConfigError::invalid(
                "runtime_cache_name",
                "must differ from static_cache_name",
            ));
        }

        self.asset_urls()?;
        CdnPatternSet::compile(&self.cdn_patterns)?;

        Ok(())
    }

    /// Resolve a possibly relative URL against the scope.
    pub fn resolve(&self, url: &str) -> Result<Url, url::ParseError> {
        self.scope.join(url)
    }

    /// Static asset list resolved against the scope, in order.
    pub fn asset_urls(&self) -> Result<Vec<Url>, ConfigError> {
        self.static_assets
            .iter()
            .enumerate()
            .map(|(index, asset)| {
                self.resolve(asset).map_err(|e| {
                    ConfigError::invalid(format!("static_assets[{index}]"), e.to_string())
                })
            })
            .collect()
    }

    /// Whether a store survives activation cleanup.
    pub fn retains(&self, cache_name: &str) -> bool {
        cache_name == self.static_cache_name || cache_name == self.runtime_cache_name
    }

    /// Whether the interceptor must leave this URL alone.
    pub fn bypasses(&self, url: &Url) -> bool {
        self.bypass_schemes.iter().any(|s| s == url.scheme())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validate_default_config() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.static_assets.len(), 5);
        assert_eq!(config.cdn_patterns.len(), 4);
    }

    #[test]
    fn test_asset_urls_resolve_against_scope() {
        let config =
            WorkerConfig::for_scope(Url::parse("https://app.example.com/translate/").unwrap());
        let urls = config.asset_urls().unwrap();
        assert_eq!(urls[0].as_str(), "https://app.example.com/translate/");
        assert_eq!(urls[1].as_str(), "https://app.example.com/translate/index.html");
    }

    #[test]
    fn test_resolve_keeps_absolute_urls() {
        let config = WorkerConfig::default();
        assert_eq!(
            config.resolve("https://cdn.example.com/lib.js").unwrap().as_str(),
            "https://cdn.example.com/lib.js"
        );
    }

    #[test]
    fn test_retains_only_current_stores() {
        let config = WorkerConfig::default();
        assert!(config.retains("translate-app-v1"));
        assert!(config.retains("translate-runtime-v1"));
        assert!(!config.retains("translate-app-v0"));
    }

    #[test]
    fn test_bypasses_extension_schemes() {
        let config = WorkerConfig::default();
        assert!(config.bypasses(&Url::parse("chrome-extension://abcdef/popup.html").unwrap()));
        assert!(config.bypasses(&Url::parse("moz-extension://abcdef/popup.html").unwrap()));
        assert!(!config.bypasses(&Url::parse("https://example.com/").unwrap()));
    }

    #[test]
    fn test_validate_rejects_same_store_names() {
        let config = WorkerConfig {
            runtime_cache_name: "translate-app-v1".to_string(),
            ..Default::default()
        };
        let result = config.validate();
        assert!(
            matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "runtime_cache_name")
        );
    }

    #[test]
    fn test_validate_rejects_empty_static_name() {
        let config = WorkerConfig {
            static_cache_name: " ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field, .. }) if field == "static_cache_name"
        ));
    }

    #[test]
    fn test_validate_rejects_non_base_scope() {
        let config = WorkerConfig::for_scope(Url::parse("data:text/plain,hello").unwrap());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field, .. }) if field == "scope"
        ));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = WorkerConfig::from_json(
            r#"{ "scope": "https://app.example.com/", "static_cache_name": "app-v2" }"#,
        )
        .unwrap();
        assert_eq!(config.static_cache_name, "app-v2");
        assert_eq!(config.runtime_cache_name, "translate-runtime-v1");
        assert_eq!(config.scope.as_str(), "https://app.example.com/");
    }

    #[test]
    fn test_from_json_rejects_bad_regex() {
        let result = WorkerConfig::from_json(
            r#"{ "cdn_patterns": [ { "type": "regex", "pattern": "[" } ] }"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let config = WorkerConfig::for_scope(Url::parse("https://app.example.com/").unwrap());
        write!(file, "{}", config.to_json_pretty().unwrap()).unwrap();

        let loaded = WorkerConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_from_missing_file() {
        let result = WorkerConfig::from_file("/definitely/not/here.json");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}

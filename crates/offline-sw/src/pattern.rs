//! URL patterns used to classify requests as CDN-hosted.

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ConfigError;

/// URL pattern as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPattern {
    /// Pattern type.
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    /// Pattern string.
    pub pattern: String,
}

/// Type of URL pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    /// Exact URL match.
    Exact,
    /// Prefix match.
    Prefix,
    /// Suffix match.
    Suffix,
    /// Contains substring.
    Contains,
    /// Regular expression, unanchored unless the pattern anchors itself.
    Regex,
}

impl UrlPattern {
    /// Create an exact match pattern.
    pub fn exact(url: &str) -> Self {
        Self::new(PatternType::Exact, url)
    }

    /// Create a prefix match pattern.
    pub fn prefix(prefix: &str) -> Self {
        Self::new(PatternType::Prefix, prefix)
    }

    /// Create a suffix match pattern.
    pub fn suffix(suffix: &str) -> Self {
        Self::new(PatternType::Suffix, suffix)
    }

    /// Create a contains pattern.
    pub fn contains(substring: &str) -> Self {
        Self::new(PatternType::Contains, substring)
    }

    /// Create a regular expression pattern.
    pub fn regex(expression: &str) -> Self {
        Self::new(PatternType::Regex, expression)
    }

    fn new(pattern_type: PatternType, pattern: &str) -> Self {
        Self {
            pattern_type,
            pattern: pattern.to_string(),
        }
    }

    fn compile(&self) -> Result<Matcher, regex::Error> {
        let pattern = self.pattern.clone();
        Ok(match self.pattern_type {
            PatternType::Exact => Matcher::Exact(pattern),
            PatternType::Prefix => Matcher::Prefix(pattern),
            PatternType::Suffix => Matcher::Suffix(pattern),
            PatternType::Contains => Matcher::Contains(pattern),
            PatternType::Regex => Matcher::Regex(Regex::new(&pattern)?),
        })
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
    Regex(Regex),
}

impl Matcher {
    fn matches(&self, url: &str) -> bool {
        match self {
            Matcher::Exact(p) => url == p,
            Matcher::Prefix(p) => url.starts_with(p.as_str()),
            Matcher::Suffix(p) => url.ends_with(p.as_str()),
            Matcher::Contains(p) => url.contains(p.as_str()),
            Matcher::Regex(re) => re.is_match(url),
        }
    }
}

/// Compiled set of CDN patterns. A URL is CDN-hosted if any pattern matches.
#[derive(Debug, Clone, Default)]
pub struct CdnPatternSet {
    matchers: Vec<Matcher>,
}

impl CdnPatternSet {
    /// Compile every pattern, failing on the first invalid regular expression.
    pub fn compile(patterns: &[UrlPattern]) -> Result<Self, ConfigError> {
        let matchers = patterns
            .iter()
            .enumerate()
            .map(|(index, pattern)| {
                pattern.compile().map_err(|e| ConfigError::Invalid {
                    field: format!("cdn_patterns[{index}]"),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { matchers })
    }

    /// Check the full URL against every pattern.
    pub fn matches(&self, url: &Url) -> bool {
        let url = url.as_str();
        self.matchers.iter().any(|m| m.matches(url))
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

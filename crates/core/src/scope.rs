use url::Url;

use crate::config::ScopeConfig;
use crate::normalize::NormalizePolicy;

/// Case-insensitive substring match against a needle list. Used for both
/// FAQ indicators and excluded-section keywords.
pub fn contains_any_ci(haystack: &str, needles: &[String]) -> bool {
    let lower = haystack.to_ascii_lowercase();
    needles
        .iter()
        .any(|n| !n.is_empty() && lower.contains(&n.to_ascii_lowercase()))
}

/// Where a normalized URL stands relative to the crawl boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeDecision {
    InScope,
    /// Host outside the allowed-domains set. Recorded, never queued.
    External,
    /// Inside the site but excluded by policy (scheme, section, prefix).
    Excluded(&'static str),
}

/// Admission control compiled from `[scope]` config.
#[derive(Debug, Clone)]
pub struct ScopePolicy {
    allowed_domains: Vec<String>,
    excluded_sections: Vec<String>,
    excluded_prefixes: Vec<String>,
    normalize_policy: NormalizePolicy,
}

impl ScopePolicy {
    pub fn from_config(scope: &ScopeConfig) -> Self {
        Self {
            allowed_domains: scope
                .allowed_domains
                .iter()
                .map(|d| d.to_ascii_lowercase())
                .collect(),
            excluded_sections: scope
                .excluded_sitemap_sections
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            excluded_prefixes: scope.excluded_url_prefixes.clone(),
            normalize_policy: NormalizePolicy {
                strip_params: scope.strip_query_params.clone(),
            },
        }
    }

    pub fn normalize_policy(&self) -> &NormalizePolicy {
        &self.normalize_policy
    }

    pub fn classify(&self, url: &Url) -> ScopeDecision {
        if url.scheme() != "http" && url.scheme() != "https" {
            return ScopeDecision::Excluded("scheme");
        }
        let host = match url.host_str() {
            Some(h) => h.to_ascii_lowercase(),
            None => return ScopeDecision::Excluded("no-host"),
        };
        if !self.allowed_domains.iter().any(|d| *d == host) {
            return ScopeDecision::External;
        }
        let path = url.path().to_ascii_lowercase();
        if self.excluded_sections.iter().any(|s| path.contains(s.as_str())) {
            return ScopeDecision::Excluded("section");
        }
        let as_str = url.as_str();
        if self.excluded_prefixes.iter().any(|p| as_str.starts_with(p.as_str())) {
            return ScopeDecision::Excluded("prefix");
        }
        ScopeDecision::InScope
    }

    pub fn is_in_scope(&self, url: &Url) -> bool {
        self.classify(url) == ScopeDecision::InScope
    }
}

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::CrawlError;

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub crawl: CrawlConfig,
    pub scope: ScopeConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub robots: RobotsConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CrawlConfig {
    /// The single sitemap URL the crawl is rooted at.
    pub seed_sitemap_url: String,
    #[serde(default = "default_max_depth_faq")]
    pub max_depth_faq: u32,
    #[serde(default = "default_max_depth_general")]
    pub max_depth_general: u32,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScopeConfig {
    /// Hostnames the crawl may touch. Anything else is recorded as external.
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub excluded_sitemap_sections: Vec<String>,
    #[serde(default)]
    pub excluded_url_prefixes: Vec<String>,
    #[serde(default = "default_faq_indicators")]
    pub faq_indicators: Vec<String>,
    /// Query parameter names removed during normalization, on top of the
    /// always-stripped `utm_*` family.
    #[serde(default = "default_strip_query_params")]
    pub strip_query_params: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct HttpConfig {
    pub user_agent: String,
    pub request_timeout_ms: u64,
    pub max_retries: u32,
    pub per_host_rps: f64,
    pub per_host_burst: f64,
    pub size_cap_html: usize,
    pub size_cap_pdf: usize,
    pub size_cap_media: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("faqharvest/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_ms: 30_000,
            max_retries: 3,
            per_host_rps: 2.0,
            per_host_burst: 4.0,
            size_cap_html: 4 * 1024 * 1024,
            size_cap_pdf: 64 * 1024 * 1024,
            size_cap_media: 512 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields, default)]
pub struct RobotsConfig {
    pub ttl_hours: u64,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self { ttl_hours: 24 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path of the single-file registry database.
    pub registry_path: PathBuf,
    /// Root of the artifacts tree (html/, md/, pdf/, ...).
    pub artifacts_dir: PathBuf,
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

fn default_max_depth_faq() -> u32 {
    6
}

fn default_max_depth_general() -> u32 {
    3
}

fn default_worker_count() -> usize {
    4
}

fn default_faq_indicators() -> Vec<String> {
    [
        "faq",
        "faqs",
        "frequently-asked",
        "frequently_asked",
        "help-center",
        "support",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_strip_query_params() -> Vec<String> {
    ["gclid", "fbclid", "msclkid", "mc_cid", "mc_eid"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("export")
}

impl AppConfig {
    /// Full static validation, run by `validate` and before every crawl.
    pub fn validate(&self) -> Result<(), CrawlError> {
        let seed = url::Url::parse(&self.crawl.seed_sitemap_url)
            .map_err(|e| CrawlError::Config(format!("seed_sitemap_url: {e}")))?;
        if seed.scheme() != "http" && seed.scheme() != "https" {
            return Err(CrawlError::Config(format!(
                "seed_sitemap_url must be http(s), got {}",
                seed.scheme()
            )));
        }
        if self.scope.allowed_domains.is_empty() {
            return Err(CrawlError::Config("allowed_domains is empty".into()));
        }
        if let Some(host) = seed.host_str() {
            if !self
                .scope
                .allowed_domains
                .iter()
                .any(|d| d.eq_ignore_ascii_case(host))
            {
                return Err(CrawlError::Config(format!(
                    "seed host {host} is not in allowed_domains"
                )));
            }
        }
        if self.crawl.worker_count == 0 || self.crawl.worker_count > 64 {
            return Err(CrawlError::Config(format!(
                "worker_count must be 1..=64, got {}",
                self.crawl.worker_count
            )));
        }
        if self.http.per_host_rps <= 0.0 {
            return Err(CrawlError::Config("per_host_rps must be > 0".into()));
        }
        if self.http.request_timeout_ms == 0 {
            return Err(CrawlError::Config("request_timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.http.request_timeout_ms)
    }

    pub fn robots_ttl(&self) -> Duration {
        Duration::from_secs(self.robots.ttl_hours * 3600)
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use texting_robots::Robot;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use faqharvest_registry::{Registry, RobotsRow};

/// What the engine needs to know before touching a URL.
#[derive(Debug, Clone, Copy)]
pub struct RobotsVerdict {
    pub allowed: bool,
    pub crawl_delay: Option<Duration>,
}

/// One robots.txt HTTP exchange, reduced to the cases that matter.
enum RobotsResponse {
    /// 2xx with a body to parse.
    Body(String),
    /// robots.txt itself answered 4xx: the host declares no restrictions.
    NoRules,
    /// Network error or 5xx. Policy is fail-open until the TTL expires.
    Unreachable,
}

/// Parsed per-host state. `rules: None` means no restrictions.
#[derive(Clone)]
struct HostRecord {
    rules: Option<Arc<Robot>>,
    unreachable: bool,
    fetched_at: DateTime<Utc>,
}

impl HostRecord {
    fn from_response(user_agent: &str, response: &RobotsResponse, now: DateTime<Utc>) -> Self {
        match response {
            RobotsResponse::Body(body) => {
                let rules = match Robot::new(user_agent, body.as_bytes()) {
                    Ok(robot) => Some(Arc::new(robot)),
                    Err(e) => {
                        warn!(error = %e, "unparseable robots.txt, treating as unrestricted");
                        None
                    }
                };
                Self {
                    rules,
                    unreachable: false,
                    fetched_at: now,
                }
            }
            RobotsResponse::NoRules => Self {
                rules: None,
                unreachable: false,
                fetched_at: now,
            },
            RobotsResponse::Unreachable => Self {
                rules: None,
                unreachable: true,
                fetched_at: now,
            },
        }
    }

    fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        is_fresh_at(self.fetched_at, ttl, now)
    }

    fn verdict(&self, url: &Url) -> RobotsVerdict {
        if self.unreachable {
            return RobotsVerdict {
                allowed: true,
                crawl_delay: None,
            };
        }
        match &self.rules {
            None => RobotsVerdict {
                allowed: true,
                crawl_delay: None,
            },
            Some(robot) => RobotsVerdict {
                allowed: robot.allowed(url.as_str()),
                crawl_delay: robot.delay.map(|secs| Duration::from_secs(secs as u64)),
            },
        }
    }
}

fn is_fresh_at(fetched_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    let age = now.signed_duration_since(fetched_at);
    age < chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(24))
}

/// Per-host robots.txt cache. Holding one async mutex per host while
/// resolving coalesces concurrent lookups into a single HTTP fetch per
/// host per TTL window; records persist through the registry so the
/// window survives restarts.
pub struct RobotsCache {
    client: reqwest::Client,
    registry: Registry,
    user_agent: String,
    ttl: Duration,
    hosts: DashMap<String, Arc<Mutex<Option<HostRecord>>>>,
}

impl RobotsCache {
    pub fn new(client: reqwest::Client, registry: Registry, user_agent: String, ttl: Duration) -> Self {
        Self {
            client,
            registry,
            user_agent,
            ttl,
            hosts: DashMap::new(),
        }
    }

    /// Allow-check plus the host's Crawl-delay, resolving (and caching)
    /// the host's robots.txt on first contact.
    pub async fn check(&self, url: &Url) -> Result<RobotsVerdict> {
        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("robots check on hostless url {url}"))?
            .to_ascii_lowercase();

        let slot = self
            .hosts
            .entry(host.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();
        let mut guard = slot.lock().await;

        let now = Utc::now();
        let record = match guard.as_ref() {
            Some(record) if record.is_fresh(self.ttl, now) => record.clone(),
            _ => {
                let record = self.resolve(&host, url.scheme(), now).await;
                *guard = Some(record.clone());
                record
            }
        };
        drop(guard);

        Ok(record.verdict(url))
    }

    /// Load a persisted record if it is still inside the TTL window,
    /// otherwise fetch over HTTP and persist the outcome.
    async fn resolve(&self, host: &str, scheme: &str, now: DateTime<Utc>) -> HostRecord {
        if let Ok(Some(row)) = self.registry.load_robots(host).await {
            if is_fresh_at(row.fetched_at, self.ttl, now) && row.user_agent == self.user_agent {
                let response = match (&row.body, row.unreachable) {
                    (_, true) => RobotsResponse::Unreachable,
                    (Some(body), false) => RobotsResponse::Body(body.clone()),
                    (None, false) => RobotsResponse::NoRules,
                };
                let mut record = HostRecord::from_response(&self.user_agent, &response, now);
                record.fetched_at = row.fetched_at;
                debug!(host, "robots loaded from registry");
                return record;
            }
        }

        let response = self.fetch_remote(host, scheme).await;
        let record = HostRecord::from_response(&self.user_agent, &response, now);

        let body = match &response {
            RobotsResponse::Body(body) => Some(body.clone()),
            _ => None,
        };
        let row = RobotsRow {
            host: host.to_string(),
            body,
            user_agent: self.user_agent.clone(),
            fetched_at: now,
            unreachable: record.unreachable,
        };
        if let Err(e) = self.registry.record_robots(&row).await {
            warn!(host, error = %e, "failed to persist robots record");
        }
        record
    }

    async fn fetch_remote(&self, host: &str, scheme: &str) -> RobotsResponse {
        let robots_url = format!("{scheme}://{host}/robots.txt");
        debug!(url = %robots_url, "fetching robots.txt");
        match self
            .client
            .get(&robots_url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => RobotsResponse::Body(body),
                Err(e) => {
                    warn!(host, error = %e, "robots.txt body read failed");
                    RobotsResponse::Unreachable
                }
            },
            Ok(resp) if resp.status().is_client_error() => RobotsResponse::NoRules,
            Ok(resp) => {
                warn!(host, status = resp.status().as_u16(), "robots.txt server error");
                RobotsResponse::Unreachable
            }
            Err(e) => {
                warn!(host, error = %e, "robots.txt unreachable");
                RobotsResponse::Unreachable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UA: &str = "faqharvest/0.1";

    fn record(response: RobotsResponse) -> HostRecord {
        HostRecord::from_response(UA, &response, Utc::now())
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn disallow_rules_block_matching_paths() {
        let body = "User-agent: *\nDisallow: /private/\nAllow: /private/faq\n".to_string();
        let record = record(RobotsResponse::Body(body));

        assert!(!record.verdict(&url("https://example.com/private/x")).allowed);
        assert!(record.verdict(&url("https://example.com/private/faq")).allowed);
        assert!(record.verdict(&url("https://example.com/public")).allowed);
    }

    #[test]
    fn crawl_delay_is_surfaced() {
        let body = "User-agent: *\nCrawl-delay: 7\nDisallow: /tmp/\n".to_string();
        let record = record(RobotsResponse::Body(body));
        let verdict = record.verdict(&url("https://example.com/page"));
        assert!(verdict.allowed);
        assert_eq!(verdict.crawl_delay, Some(Duration::from_secs(7)));
    }

    #[test]
    fn missing_robots_means_no_restrictions() {
        let record = record(RobotsResponse::NoRules);
        assert!(record.verdict(&url("https://example.com/anything")).allowed);
    }

    #[test]
    fn unreachable_host_fails_open() {
        let record = record(RobotsResponse::Unreachable);
        let verdict = record.verdict(&url("https://example.com/anything"));
        assert!(verdict.allowed);
        assert_eq!(verdict.crawl_delay, None);
    }

    #[test]
    fn records_expire_after_ttl() {
        let mut rec = record(RobotsResponse::NoRules);
        let ttl = Duration::from_secs(3600);
        assert!(rec.is_fresh(ttl, Utc::now()));

        rec.fetched_at = Utc::now() - chrono::Duration::hours(2);
        assert!(!rec.is_fresh(ttl, Utc::now()));
    }

    #[tokio::test]
    async fn persisted_record_is_reused_within_ttl() {
        let registry = Registry::in_memory().await.unwrap();
        registry.run_migrations().await.unwrap();
        registry
            .record_robots(&RobotsRow {
                host: "example.com".into(),
                body: Some("User-agent: *\nDisallow: /blocked/\n".into()),
                user_agent: UA.into(),
                fetched_at: Utc::now(),
                unreachable: false,
            })
            .await
            .unwrap();

        // No HTTP server is running; a cache hit must come from the registry.
        let cache = RobotsCache::new(
            reqwest::Client::new(),
            registry,
            UA.into(),
            Duration::from_secs(3600),
        );
        let verdict = cache
            .check(&url("https://example.com/blocked/page"))
            .await
            .unwrap();
        assert!(!verdict.allowed);
        let verdict = cache.check(&url("https://example.com/open")).await.unwrap();
        assert!(verdict.allowed);
    }
}

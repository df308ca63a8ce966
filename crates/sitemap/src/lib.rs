use std::collections::HashSet;
use std::io::Read;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, info, warn};
use url::Url;

use faqharvest_core::normalize::normalize;
use faqharvest_core::scope::{contains_any_ci, ScopeDecision, ScopePolicy};
use faqharvest_core::{CrawlError, Lineage};

/// A leaf sitemap entry headed for the frontier at depth 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapEntry {
    pub url: Url,
    pub lineage: Lineage,
}

/// Parsed shape of one sitemap document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDoc {
    /// `<sitemapindex>`: child sitemap URLs to expand recursively.
    Index(Vec<String>),
    /// `<urlset>`: leaf page URLs.
    Urlset(Vec<String>),
}

/// Transport seam so tests can expand canned documents.
#[async_trait]
pub trait SitemapSource: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, CrawlError>;
}

pub struct HttpSource {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpSource {
    pub fn new(client: reqwest::Client, user_agent: String) -> Self {
        Self { client, user_agent }
    }
}

#[async_trait]
impl SitemapSource for HttpSource {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, CrawlError> {
        let resp = self
            .client
            .get(url.as_str())
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| CrawlError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(CrawlError::Network(format!(
                "sitemap {url} answered {}",
                resp.status()
            )));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| CrawlError::Network(e.to_string()))?;
        Ok(body.to_vec())
    }
}

/// Gunzip compressed sitemap payloads (`.xml.gz` or gzip magic bytes).
fn decode_body(url: &Url, body: Vec<u8>) -> Vec<u8> {
    let gzipped = url.path().ends_with(".gz") || body.starts_with(&[0x1f, 0x8b]);
    if !gzipped {
        return body;
    }
    let mut decoder = flate2::read::GzDecoder::new(body.as_slice());
    let mut out = Vec::new();
    match decoder.read_to_end(&mut out) {
        Ok(_) => out,
        Err(e) => {
            warn!(url = %url, error = %e, "gunzip failed, using raw bytes");
            body
        }
    }
}

/// Parse one sitemap document. Namespace prefixes are ignored; every
/// `<loc>` under the root is collected.
pub fn parse_sitemap(xml: &[u8]) -> Result<SitemapDoc, CrawlError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut is_index: Option<bool> = None;
    let mut in_loc = false;
    let mut current = String::new();
    let mut locs: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                match (is_index, name.as_ref()) {
                    (None, b"sitemapindex") => is_index = Some(true),
                    (None, b"urlset") => is_index = Some(false),
                    (None, other) => {
                        return Err(CrawlError::Parse(format!(
                            "unexpected sitemap root <{}>",
                            String::from_utf8_lossy(other)
                        )))
                    }
                    (Some(_), b"loc") => {
                        in_loc = true;
                        current.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) if in_loc => {
                let text = t
                    .unescape()
                    .map_err(|e| CrawlError::Parse(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"loc" => {
                if in_loc {
                    let loc = current.trim().to_string();
                    if !loc.is_empty() {
                        locs.push(loc);
                    }
                    in_loc = false;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(CrawlError::Parse(e.to_string())),
        }
        buf.clear();
    }

    match is_index {
        Some(true) => Ok(SitemapDoc::Index(locs)),
        Some(false) => Ok(SitemapDoc::Urlset(locs)),
        None => Err(CrawlError::Parse("empty sitemap document".into())),
    }
}

/// Resolves a seed sitemap (and any nested indexes) into frontier entries.
pub struct SitemapExpander<S> {
    source: S,
    scope: ScopePolicy,
    faq_indicators: Vec<String>,
}

impl<S: SitemapSource> SitemapExpander<S> {
    pub fn new(source: S, scope: ScopePolicy, faq_indicators: Vec<String>) -> Self {
        Self {
            source,
            scope,
            faq_indicators,
        }
    }

    /// Walk the sitemap tree from `seed`. Cycles in sitemap indexes are cut
    /// by a visited set; malformed documents count as empty. Entries are
    /// deduplicated and policy-filtered before they reach the caller.
    pub async fn expand(&self, seed: &Url) -> Vec<SitemapEntry> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut seen_pages: HashSet<String> = HashSet::new();
        let mut work: Vec<(Url, bool)> = vec![(seed.clone(), self.is_faq_path(seed.path()))];
        let mut entries = Vec::new();

        while let Some((sitemap_url, inherited_faq)) = work.pop() {
            if !visited.insert(sitemap_url.to_string()) {
                continue;
            }
            let body = match self.source.fetch(&sitemap_url).await {
                Ok(body) => decode_body(&sitemap_url, body),
                Err(e) => {
                    warn!(url = %sitemap_url, error = %e, "sitemap fetch failed");
                    continue;
                }
            };
            match parse_sitemap(&body) {
                Ok(SitemapDoc::Index(children)) => {
                    debug!(url = %sitemap_url, children = children.len(), "sitemap index");
                    for child in children {
                        let Ok(child_url) = sitemap_url.join(child.trim()) else {
                            warn!(child = %child, "unparseable child sitemap url");
                            continue;
                        };
                        let faq = inherited_faq || self.is_faq_path(child_url.path());
                        work.push((child_url, faq));
                    }
                }
                Ok(SitemapDoc::Urlset(urls)) => {
                    debug!(url = %sitemap_url, urls = urls.len(), "sitemap urlset");
                    for raw in urls {
                        let url = match normalize(
                            &raw,
                            Some(&sitemap_url),
                            self.scope.normalize_policy(),
                        ) {
                            Ok(url) => url,
                            Err(reason) => {
                                debug!(raw = %raw, ?reason, "sitemap entry rejected");
                                continue;
                            }
                        };
                        match self.scope.classify(&url) {
                            ScopeDecision::InScope => {}
                            decision => {
                                debug!(url = %url, ?decision, "sitemap entry out of scope");
                                continue;
                            }
                        }
                        if !seen_pages.insert(url.to_string()) {
                            continue;
                        }
                        let lineage = if inherited_faq || self.is_faq_path(url.path()) {
                            Lineage::Faq
                        } else {
                            Lineage::General
                        };
                        entries.push(SitemapEntry { url, lineage });
                    }
                }
                Err(e) => {
                    warn!(url = %sitemap_url, error = %e, "malformed sitemap, treated as empty");
                }
            }
        }

        info!(
            sitemaps = visited.len(),
            entries = entries.len(),
            "sitemap expansion complete"
        );
        entries
    }

    fn is_faq_path(&self, path: &str) -> bool {
        contains_any_ci(path, &self.faq_indicators)
    }
}

pub mod artifacts;
pub mod politeness;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use url::Url;

use faqharvest_core::normalize::normalize;
use faqharvest_core::scope::ScopePolicy;
use faqharvest_core::{ContentKind, CrawlError, FaqItem, FetchConfig, PageRecord};
use faqharvest_postprocess::{ContentMeta, PostProcessor, ProducedRecord};

pub use artifacts::{sha256_hex, ArtifactStore};
pub use politeness::HostLimiter;

/// Successful HTML download, body retained for link extraction.
pub struct HtmlFetch {
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
    pub content_hash: String,
    pub raw_path: PathBuf,
    pub fetched_at: DateTime<Utc>,
    pub attempts: u32,
}

/// Successful non-HTML download, persisted as an asset.
pub struct AssetFetch {
    pub kind: ContentKind,
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub content_hash: String,
    pub local_path: PathBuf,
    pub size_bytes: u64,
    pub fetched_at: DateTime<Utc>,
    pub attempts: u32,
}

pub enum FetchOutcome {
    Html(HtmlFetch),
    Asset(AssetFetch),
    /// The redirect chain left the crawl scope.
    RedirectedOut {
        final_url: Url,
        status: u16,
        attempts: u32,
    },
    /// Non-retryable 4xx.
    Broken { status: u16, attempts: u32 },
    /// Transport failure, exhausted retries, redirect loop, or size cap.
    Failed { error: CrawlError, attempts: u32 },
}

/// Everything the shipped post-processors yielded for one page.
#[derive(Default)]
pub struct Postprocessed {
    pub markdown_path: Option<String>,
    pub faqs: Vec<FaqItem>,
    pub extracted_text_path: Option<String>,
    pub transcript_path: Option<String>,
    pub error: Option<String>,
}

/// Route a URL by its path extension; the response Content-Type corrects
/// this once headers are in.
pub fn classify_url(url: &Url) -> ContentKind {
    let path = url.path().to_ascii_lowercase();
    let ext = path.rsplit('/').next().and_then(|seg| {
        seg.rsplit_once('.').map(|(_, ext)| ext.to_string())
    });
    match ext.as_deref() {
        Some("pdf") => ContentKind::Pdf,
        Some("mp4" | "webm" | "mov" | "m4v" | "avi" | "mkv") => ContentKind::Video,
        Some("mp3" | "wav" | "m4a" | "ogg" | "flac") => ContentKind::Audio,
        _ => ContentKind::Html,
    }
}

fn kind_from_content_type(ct: &str) -> Option<ContentKind> {
    let ct = ct.to_ascii_lowercase();
    if ct.contains("text/html") || ct.contains("application/xhtml") {
        Some(ContentKind::Html)
    } else if ct.contains("application/pdf") {
        Some(ContentKind::Pdf)
    } else if ct.starts_with("video/") {
        Some(ContentKind::Video)
    } else if ct.starts_with("audio/") {
        Some(ContentKind::Audio)
    } else {
        None
    }
}

/// Exponential backoff schedule: `base * 2^(attempt-1)`, jittered +/-20%.
/// `jitter` is a uniform sample from [0, 1).
pub fn backoff_delay(base: Duration, attempt: u32, jitter: f64) -> Duration {
    let exp = base.as_secs_f64() * 2f64.powi(attempt.saturating_sub(1) as i32);
    let factor = 0.8 + 0.4 * jitter.clamp(0.0, 1.0);
    Duration::from_secs_f64(exp * factor)
}

enum Transport {
    Transient,
    Permanent,
    RedirectLoop,
}

fn classify_transport(e: &reqwest::Error) -> Transport {
    if e.is_redirect() {
        return Transport::RedirectLoop;
    }
    if e.is_timeout() {
        return Transport::Transient;
    }
    // reqwest hides DNS failures inside connect errors; the error chain text
    // is the only discriminator available.
    let chain = format!("{e:?}").to_ascii_lowercase();
    if chain.contains("dns") || chain.contains("resolve") {
        return Transport::Permanent;
    }
    if e.is_connect() {
        return Transport::Transient;
    }
    Transport::Permanent
}

/// Content-type-dispatched downloader. One reqwest client (redirects
/// limited upstream at construction), per-kind size caps, content-addressed
/// artifact persistence, and the synchronous post-processor chain.
pub struct Fetcher {
    client: reqwest::Client,
    config: FetchConfig,
    artifacts: ArtifactStore,
    scope: ScopePolicy,
    postprocessors: Vec<Box<dyn PostProcessor>>,
}

impl Fetcher {
    pub fn new(
        client: reqwest::Client,
        config: FetchConfig,
        artifacts: ArtifactStore,
        scope: ScopePolicy,
        postprocessors: Vec<Box<dyn PostProcessor>>,
    ) -> Self {
        Self {
            client,
            config,
            artifacts,
            scope,
            postprocessors,
        }
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Download one URL, retrying transient failures with backoff.
    pub async fn fetch(&self, url: &Url) -> FetchOutcome {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = self.client.get(url.as_str()).send().await;

            let resp = match result {
                Ok(resp) => resp,
                Err(e) => match classify_transport(&e) {
                    Transport::Transient if attempt <= self.config.max_retries => {
                        let delay =
                            backoff_delay(self.config.backoff_base, attempt, rand::random());
                        warn!(url = %url, attempt, delay_ms = delay.as_millis() as u64,
                              "transient fetch error, backing off: {e}");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    Transport::Transient => {
                        return FetchOutcome::Failed {
                            error: CrawlError::Network(e.to_string()),
                            attempts: attempt,
                        }
                    }
                    Transport::RedirectLoop => {
                        return FetchOutcome::Failed {
                            error: CrawlError::RedirectLoop(url.to_string()),
                            attempts: attempt,
                        }
                    }
                    Transport::Permanent => {
                        return FetchOutcome::Failed {
                            error: CrawlError::Network(e.to_string()),
                            attempts: attempt,
                        }
                    }
                },
            };

            let status = resp.status().as_u16();

            if status == 429 || (500..600).contains(&status) {
                if attempt <= self.config.max_retries {
                    let delay = backoff_delay(self.config.backoff_base, attempt, rand::random());
                    debug!(url = %url, status, attempt, "retryable status, backing off");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return FetchOutcome::Failed {
                    error: CrawlError::Network(format!("HTTP {status} after {attempt} attempts")),
                    attempts: attempt,
                };
            }

            if (400..500).contains(&status) {
                return FetchOutcome::Broken {
                    status,
                    attempts: attempt,
                };
            }

            return self.consume_success(url, resp, attempt).await;
        }
    }

    async fn consume_success(
        &self,
        url: &Url,
        resp: reqwest::Response,
        attempts: u32,
    ) -> FetchOutcome {
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        // Redirects were followed; the landing URL decides scope and kind.
        let final_url = match normalize(resp.url().as_str(), None, self.scope.normalize_policy()) {
            Ok(u) => u,
            Err(reason) => {
                return FetchOutcome::Failed {
                    error: CrawlError::InvalidUrl(format!("{}: {reason:?}", resp.url())),
                    attempts,
                }
            }
        };
        if !self.scope.is_in_scope(&final_url) {
            return FetchOutcome::RedirectedOut {
                final_url,
                status,
                attempts,
            };
        }

        let url_kind = classify_url(&final_url);
        let kind = match &content_type {
            None => url_kind,
            Some(ct) => match kind_from_content_type(ct) {
                Some(kind) => kind,
                None if url_kind == ContentKind::Html => ContentKind::Other,
                None => url_kind,
            },
        };

        let cap = self.config.size_cap(kind);
        if let Some(len) = resp.content_length() {
            if len as usize > cap {
                return FetchOutcome::Failed {
                    error: CrawlError::BodyTooLarge {
                        size: len as usize,
                        max: cap,
                    },
                    attempts,
                };
            }
        }

        let body = match resp.bytes().await {
            Ok(body) => body,
            Err(e) => {
                return FetchOutcome::Failed {
                    error: CrawlError::Network(e.to_string()),
                    attempts,
                }
            }
        };
        if body.len() > cap {
            return FetchOutcome::Failed {
                error: CrawlError::BodyTooLarge {
                    size: body.len(),
                    max: cap,
                },
                attempts,
            };
        }

        let content_hash = sha256_hex(&body);
        let ext = artifact_ext(&final_url, kind);
        let raw_path = match self
            .artifacts
            .store(kind.artifact_dir(), &content_hash, ext, &body)
        {
            Ok(path) => path,
            Err(e) => {
                return FetchOutcome::Failed {
                    error: CrawlError::Io(format!("artifact write failed: {e}")),
                    attempts,
                }
            }
        };
        let fetched_at = Utc::now();

        debug!(url = %url, final_url = %final_url, status, ?kind,
               bytes = body.len(), "fetched");

        if kind == ContentKind::Html {
            FetchOutcome::Html(HtmlFetch {
                final_url,
                status,
                content_type,
                body: String::from_utf8_lossy(&body).into_owned(),
                content_hash,
                raw_path,
                fetched_at,
                attempts,
            })
        } else {
            FetchOutcome::Asset(AssetFetch {
                kind,
                final_url,
                status,
                content_type,
                content_hash,
                local_path: raw_path,
                size_bytes: body.len() as u64,
                fetched_at,
                attempts,
            })
        }
    }

    /// Run every accepting post-processor. Failures are collected onto the
    /// page row; they never demote the fetch itself.
    pub fn run_postprocessors(
        &self,
        kind: ContentKind,
        content_type: Option<&str>,
        input: &Path,
        page: &PageRecord,
    ) -> Postprocessed {
        let meta = ContentMeta {
            kind,
            content_type: content_type.map(|s| s.to_string()),
        };
        let mut out = Postprocessed::default();
        for processor in &self.postprocessors {
            if !processor.accept(&meta) {
                continue;
            }
            match processor.process(input, page) {
                Ok(records) => {
                    for record in records {
                        match record {
                            ProducedRecord::MarkdownArtifact(path) => {
                                out.markdown_path = Some(path.display().to_string());
                            }
                            ProducedRecord::Faq(item) => out.faqs.push(item),
                            ProducedRecord::ExtractedText(path) => {
                                out.extracted_text_path = Some(path.display().to_string());
                            }
                            ProducedRecord::Transcript(path) => {
                                out.transcript_path = Some(path.display().to_string());
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(url = %page.url, processor = processor.name(), error = %e,
                          "post-processor failed");
                    let message = format!("{}: {e}", processor.name());
                    out.error = Some(match out.error.take() {
                        Some(prev) => format!("{prev}; {message}"),
                        None => message,
                    });
                }
            }
        }
        out
    }
}

fn artifact_ext(url: &Url, kind: ContentKind) -> &'static str {
    const KNOWN: &[&str] = &[
        "html", "pdf", "mp4", "webm", "mov", "m4v", "avi", "mkv", "mp3", "wav", "m4a", "ogg",
        "flac",
    ];
    let path = url.path().to_ascii_lowercase();
    KNOWN
        .iter()
        .find(|ext| path.ends_with(&format!(".{ext}")))
        .copied()
        .unwrap_or_else(|| kind.artifact_ext())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn classifies_by_extension() {
        assert_eq!(classify_url(&url("https://example.com/doc.pdf")), ContentKind::Pdf);
        assert_eq!(classify_url(&url("https://example.com/v/a.mp4")), ContentKind::Video);
        assert_eq!(classify_url(&url("https://example.com/p/a.mp3")), ContentKind::Audio);
        assert_eq!(classify_url(&url("https://example.com/page")), ContentKind::Html);
        assert_eq!(classify_url(&url("https://example.com/page.html")), ContentKind::Html);
    }

    #[test]
    fn content_type_overrides_extension() {
        assert_eq!(kind_from_content_type("text/html; charset=utf-8"), Some(ContentKind::Html));
        assert_eq!(kind_from_content_type("application/pdf"), Some(ContentKind::Pdf));
        assert_eq!(kind_from_content_type("video/mp4"), Some(ContentKind::Video));
        assert_eq!(kind_from_content_type("text/css"), None);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_millis(500);
        // Jitter 0.5 is the neutral factor 1.0.
        assert_eq!(backoff_delay(base, 1, 0.5), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2, 0.5), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 3, 0.5), Duration::from_millis(2000));
    }

    #[test]
    fn backoff_jitter_stays_within_twenty_percent() {
        let base = Duration::from_millis(1000);
        let low = backoff_delay(base, 1, 0.0);
        let high = backoff_delay(base, 1, 1.0);
        assert_eq!(low, Duration::from_millis(800));
        assert_eq!(high, Duration::from_millis(1200));
    }

    #[test]
    fn artifact_ext_prefers_url_extension() {
        assert_eq!(artifact_ext(&url("https://example.com/clip.webm"), ContentKind::Video), "webm");
        assert_eq!(artifact_ext(&url("https://example.com/page"), ContentKind::Html), "html");
        assert_eq!(artifact_ext(&url("https://example.com/x"), ContentKind::Other), "bin");
    }
}

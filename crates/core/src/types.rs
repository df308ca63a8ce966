use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Depth-budget classification of a URL. FAQ dominates GENERAL: once a page
/// is reached through any FAQ-tagged path it keeps the FAQ budget forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lineage {
    Faq,
    General,
}

impl Lineage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lineage::Faq => "faq",
            Lineage::General => "general",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "faq" => Some(Lineage::Faq),
            "general" => Some(Lineage::General),
            _ => None,
        }
    }

    /// Absorbing merge: FAQ wins.
    pub fn merge(self, other: Lineage) -> Lineage {
        if self == Lineage::Faq || other == Lineage::Faq {
            Lineage::Faq
        } else {
            Lineage::General
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    Pending,
    Fetching,
    Ok,
    Broken,
    BlockedRobots,
    ExcludedPolicy,
    FetchError,
    SkippedDepth,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Pending => "pending",
            PageStatus::Fetching => "fetching",
            PageStatus::Ok => "ok",
            PageStatus::Broken => "broken",
            PageStatus::BlockedRobots => "blocked_robots",
            PageStatus::ExcludedPolicy => "excluded_policy",
            PageStatus::FetchError => "fetch_error",
            PageStatus::SkippedDepth => "skipped_depth",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PageStatus::Pending),
            "fetching" => Some(PageStatus::Fetching),
            "ok" => Some(PageStatus::Ok),
            "broken" => Some(PageStatus::Broken),
            "blocked_robots" => Some(PageStatus::BlockedRobots),
            "excluded_policy" => Some(PageStatus::ExcludedPolicy),
            "fetch_error" => Some(PageStatus::FetchError),
            "skipped_depth" => Some(PageStatus::SkippedDepth),
            _ => None,
        }
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PageStatus::Pending | PageStatus::Fetching)
    }
}

/// Outcome of offering a URL to the frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Inserted as a fresh PENDING row.
    New,
    /// Existing PENDING row improved (lower depth and/or GENERAL -> FAQ).
    Promoted,
    /// Terminal row, or an equal-or-better frontier entry already present.
    Skipped,
}

/// A claimed unit of work: a PENDING page plus its discovery context.
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub url: Url,
    pub depth: u32,
    pub lineage: Lineage,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Pdf,
    Video,
    Audio,
    Other,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Pdf => "pdf",
            AssetKind::Video => "video",
            AssetKind::Audio => "audio",
            AssetKind::Other => "other",
        }
    }
}

/// What kind of fetcher a URL is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Html,
    Pdf,
    Video,
    Audio,
    Other,
}

impl ContentKind {
    /// Subdirectory under the artifacts root for raw bodies of this kind.
    pub fn artifact_dir(&self) -> &'static str {
        match self {
            ContentKind::Html => "html",
            ContentKind::Pdf => "pdf",
            ContentKind::Video => "video",
            ContentKind::Audio => "audio",
            ContentKind::Other => "other",
        }
    }

    pub fn artifact_ext(&self) -> &'static str {
        match self {
            ContentKind::Html => "html",
            ContentKind::Pdf => "pdf",
            ContentKind::Video => "mp4",
            ContentKind::Audio => "mp3",
            ContentKind::Other => "bin",
        }
    }

    pub fn asset_kind(&self) -> Option<AssetKind> {
        match self {
            ContentKind::Html => None,
            ContentKind::Pdf => Some(AssetKind::Pdf),
            ContentKind::Video => Some(AssetKind::Video),
            ContentKind::Audio => Some(AssetKind::Audio),
            ContentKind::Other => Some(AssetKind::Other),
        }
    }
}

/// Knobs the fetchers apply per request. Client-level settings (user agent,
/// timeouts, redirect policy) live on the HTTP client itself.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub size_cap_html: usize,
    pub size_cap_pdf: usize,
    pub size_cap_media: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_millis(500),
            size_cap_html: 4 * 1024 * 1024,
            size_cap_pdf: 64 * 1024 * 1024,
            size_cap_media: 512 * 1024 * 1024,
        }
    }
}

impl FetchConfig {
    pub fn size_cap(&self, kind: ContentKind) -> usize {
        match kind {
            ContentKind::Html => self.size_cap_html,
            ContentKind::Pdf => self.size_cap_pdf,
            ContentKind::Video | ContentKind::Audio | ContentKind::Other => self.size_cap_media,
        }
    }
}

/// Page row as seen by post-processors and the export job.
#[derive(Debug, Clone, Serialize)]
pub struct PageRecord {
    pub url: String,
    pub host: String,
    pub depth: u32,
    pub lineage: Lineage,
    pub status: PageStatus,
    pub http_status: Option<u16>,
    pub content_type: Option<String>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub content_hash: Option<String>,
    pub raw_path: Option<String>,
    pub markdown_path: Option<String>,
    pub parent_url: Option<String>,
    pub attempts: u32,
    pub postprocess_error: Option<String>,
}

/// Directed link discovered on a page, already normalized.
#[derive(Debug, Clone)]
pub struct EdgeRecord {
    pub to_url: String,
    pub anchor_text: Option<String>,
    pub is_external: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssetRecord {
    pub url: String,
    pub kind: AssetKind,
    pub local_path: String,
    pub content_hash: String,
    pub size_bytes: u64,
    pub owning_page: String,
    pub extracted_text_path: Option<String>,
}

/// Question/answer pair surfaced by the FAQ post-processor. Opaque to the
/// crawl core beyond persistence.
#[derive(Debug, Clone, Serialize)]
pub struct FaqItem {
    pub page_url: String,
    pub question: String,
    pub answer: String,
    pub answer_mode: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lineage_merge_is_absorbing() {
        assert_eq!(Lineage::Faq.merge(Lineage::General), Lineage::Faq);
        assert_eq!(Lineage::General.merge(Lineage::Faq), Lineage::Faq);
        assert_eq!(Lineage::General.merge(Lineage::General), Lineage::General);
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            PageStatus::Pending,
            PageStatus::Fetching,
            PageStatus::Ok,
            PageStatus::Broken,
            PageStatus::BlockedRobots,
            PageStatus::ExcludedPolicy,
            PageStatus::FetchError,
            PageStatus::SkippedDepth,
        ] {
            assert_eq!(PageStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn only_pending_and_fetching_are_non_terminal() {
        assert!(!PageStatus::Pending.is_terminal());
        assert!(!PageStatus::Fetching.is_terminal());
        assert!(PageStatus::Ok.is_terminal());
        assert!(PageStatus::SkippedDepth.is_terminal());
        assert!(PageStatus::BlockedRobots.is_terminal());
    }
}

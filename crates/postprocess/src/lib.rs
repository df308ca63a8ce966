pub mod faq;
pub mod markdown;

use std::path::{Path, PathBuf};

use thiserror::Error;

use faqharvest_core::{ContentKind, FaqItem, PageRecord};

#[derive(Debug, Error)]
#[error("post-processing failed: {0}")]
pub struct PostprocessError(pub String);

/// What a processor may inspect before agreeing to run.
#[derive(Debug, Clone)]
pub struct ContentMeta {
    pub kind: ContentKind,
    pub content_type: Option<String>,
}

/// Everything a processor can hand back to the registry.
#[derive(Debug, Clone)]
pub enum ProducedRecord {
    MarkdownArtifact(PathBuf),
    Faq(FaqItem),
    /// Extracted text for a PDF asset (collaborator-produced).
    ExtractedText(PathBuf),
    /// Transcript for a media asset (collaborator-produced).
    Transcript(PathBuf),
}

/// Synchronous hook the fetcher runs between a successful download and the
/// page's `complete`. Failures are isolated: they flag the page row but
/// never demote the fetch status. PDF text extraction and transcription
/// collaborators plug in through this same interface.
pub trait PostProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Content kind this processor consumes.
    fn kind(&self) -> ContentKind;

    fn accept(&self, meta: &ContentMeta) -> bool;

    fn process(
        &self,
        input: &Path,
        page: &PageRecord,
    ) -> Result<Vec<ProducedRecord>, PostprocessError>;
}

/// The processors shipped with the crawler.
pub fn default_processors(artifacts_root: &Path) -> Vec<Box<dyn PostProcessor>> {
    vec![
        Box::new(markdown::MarkdownConverter::new(artifacts_root.join("md"))),
        Box::new(faq::FaqExtractor::new()),
    ]
}

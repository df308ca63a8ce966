use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use faqharvest_core::{ContentKind, PageRecord};

use crate::{ContentMeta, PostProcessor, PostprocessError, ProducedRecord};

/// Renders fetched HTML to Markdown under `artifacts/md/<sha256>.md`.
pub struct MarkdownConverter {
    md_dir: PathBuf,
}

impl MarkdownConverter {
    pub fn new(md_dir: PathBuf) -> Self {
        Self { md_dir }
    }
}

impl PostProcessor for MarkdownConverter {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn kind(&self) -> ContentKind {
        ContentKind::Html
    }

    fn accept(&self, meta: &ContentMeta) -> bool {
        meta.kind == ContentKind::Html
    }

    fn process(
        &self,
        input: &Path,
        page: &PageRecord,
    ) -> Result<Vec<ProducedRecord>, PostprocessError> {
        let html = fs::read_to_string(input).map_err(|e| PostprocessError(e.to_string()))?;
        let markdown = htmd::convert(&html).map_err(|e| PostprocessError(e.to_string()))?;

        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| PostprocessError(format!("artifact without stem: {}", input.display())))?;
        let out_path = self.md_dir.join(format!("{stem}.md"));

        fs::create_dir_all(&self.md_dir).map_err(|e| PostprocessError(e.to_string()))?;
        let tmp_path = self.md_dir.join(format!("{stem}.md.tmp"));
        fs::write(&tmp_path, markdown.as_bytes()).map_err(|e| PostprocessError(e.to_string()))?;
        fs::rename(&tmp_path, &out_path).map_err(|e| PostprocessError(e.to_string()))?;

        debug!(url = %page.url, path = %out_path.display(), "markdown rendered");
        Ok(vec![ProducedRecord::MarkdownArtifact(out_path)])
    }
}

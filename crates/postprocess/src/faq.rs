use std::collections::HashSet;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use faqharvest_core::{ContentKind, FaqItem, PageRecord};

use crate::{ContentMeta, PostProcessor, PostprocessError, ProducedRecord};

static DL: Lazy<Selector> = Lazy::new(|| Selector::parse("dl").expect("dl selector"));
static DETAILS: Lazy<Selector> = Lazy::new(|| Selector::parse("details").expect("details selector"));
static SUMMARY: Lazy<Selector> = Lazy::new(|| Selector::parse("summary").expect("summary selector"));
static HEADINGS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2, h3, h4").expect("heading selector"));

/// Pulls Question/Answer pairs out of accessible HTML. Three shapes are
/// recognized, tagged through `answer_mode`:
/// definition lists (`dt`/`dd`), `details`/`summary` disclosures, and
/// question-shaped headings followed by body copy.
pub struct FaqExtractor;

impl FaqExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, html_str: &str, page_url: &str) -> Vec<FaqItem> {
        let document = Html::parse_document(html_str);
        let mut seen: HashSet<String> = HashSet::new();
        let mut items = Vec::new();

        for dl in document.select(&DL) {
            for (question, answer) in definition_pairs(&dl) {
                push_item(&mut items, &mut seen, page_url, question, answer, "definition_list");
            }
        }

        for details in document.select(&DETAILS) {
            let Some(summary) = details.select(&SUMMARY).next() else {
                continue;
            };
            let question = clean_text(&summary.text().collect::<String>());
            let answer = details_answer(&details);
            push_item(&mut items, &mut seen, page_url, question, answer, "details");
        }

        for heading in document.select(&HEADINGS) {
            let question = clean_text(&heading.text().collect::<String>());
            if !question.ends_with('?') {
                continue;
            }
            let answer = sibling_answer(&heading);
            push_item(&mut items, &mut seen, page_url, question, answer, "heading");
        }

        items
    }
}

impl Default for FaqExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PostProcessor for FaqExtractor {
    fn name(&self) -> &'static str {
        "faq"
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
        let items = self.extract(&html, &page.url);
        debug!(url = %page.url, count = items.len(), "faq items extracted");
        Ok(items.into_iter().map(ProducedRecord::Faq).collect())
    }
}

fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_item(
    items: &mut Vec<FaqItem>,
    seen: &mut HashSet<String>,
    page_url: &str,
    question: String,
    answer: String,
    mode: &str,
) {
    if question.is_empty() || answer.is_empty() {
        return;
    }
    if !seen.insert(question.clone()) {
        return;
    }
    items.push(FaqItem {
        page_url: page_url.to_string(),
        question,
        answer,
        answer_mode: mode.to_string(),
    });
}

fn definition_pairs(dl: &ElementRef) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut question: Option<String> = None;
    let mut answer: Vec<String> = Vec::new();

    for child in dl.children() {
        let Some(el) = ElementRef::wrap(child) else {
            continue;
        };
        match el.value().name() {
            "dt" => {
                if let Some(q) = question.take() {
                    pairs.push((q, answer.join(" ")));
                    answer.clear();
                }
                question = Some(clean_text(&el.text().collect::<String>()));
            }
            "dd" => {
                let text = clean_text(&el.text().collect::<String>());
                if !text.is_empty() {
                    answer.push(text);
                }
            }
            _ => {}
        }
    }
    if let Some(q) = question {
        pairs.push((q, answer.join(" ")));
    }
    pairs
}

fn details_answer(details: &ElementRef) -> String {
    let mut parts = Vec::new();
    for child in details.children() {
        if let Some(el) = ElementRef::wrap(child) {
            if el.value().name() == "summary" {
                continue;
            }
            let text = clean_text(&el.text().collect::<String>());
            if !text.is_empty() {
                parts.push(text);
            }
        } else if let Some(text) = child.value().as_text() {
            let text = clean_text(text);
            if !text.is_empty() {
                parts.push(text);
            }
        }
    }
    parts.join(" ")
}

fn sibling_answer(heading: &ElementRef) -> String {
    let mut parts = Vec::new();
    for sibling in heading.next_siblings() {
        let Some(el) = ElementRef::wrap(sibling) else {
            continue;
        };
        let name = el.value().name();
        if matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6") {
            break;
        }
        let text = clean_text(&el.text().collect::<String>());
        if !text.is_empty() {
            parts.push(text);
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> Vec<FaqItem> {
        FaqExtractor::new().extract(html, "https://example.com/faq")
    }

    #[test]
    fn extracts_definition_lists() {
        let html = r#"
            <dl>
              <dt>How do I reset my password?</dt>
              <dd>Use the reset link on the login page.</dd>
              <dt>Where is my invoice?</dt>
              <dd>Invoices live under Account.</dd>
              <dd>Older invoices are archived.</dd>
            </dl>
        "#;
        let items = extract(html);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].question, "How do I reset my password?");
        assert_eq!(items[0].answer, "Use the reset link on the login page.");
        assert_eq!(items[0].answer_mode, "definition_list");
        assert_eq!(items[1].answer, "Invoices live under Account. Older invoices are archived.");
    }

    #[test]
    fn extracts_details_disclosures() {
        let html = r#"
            <details>
              <summary>Do you ship internationally?</summary>
              <p>Yes, to most countries.</p>
              <p>Delivery takes 5-10 days.</p>
            </details>
        "#;
        let items = extract(html);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].question, "Do you ship internationally?");
        assert_eq!(items[0].answer, "Yes, to most countries. Delivery takes 5-10 days.");
        assert_eq!(items[0].answer_mode, "details");
    }

    #[test]
    fn extracts_question_headings_until_next_heading() {
        let html = r#"
            <h2>What payment methods are accepted?</h2>
            <p>Cards and bank transfer.</p>
            <p>PayPal in some regions.</p>
            <h2>Company history</h2>
            <p>Founded in 1990.</p>
        "#;
        let items = extract(html);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].question, "What payment methods are accepted?");
        assert_eq!(items[0].answer, "Cards and bank transfer. PayPal in some regions.");
        assert_eq!(items[0].answer_mode, "heading");
    }

    #[test]
    fn pages_without_questions_yield_nothing() {
        let html = "<h1>About</h1><p>We make widgets.</p>";
        assert!(extract(html).is_empty());
    }

    #[test]
    fn duplicate_questions_are_reported_once() {
        let html = r#"
            <dl><dt>Why?</dt><dd>Because.</dd></dl>
            <h2>Why?</h2><p>Because again.</p>
        "#;
        let items = extract(html);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].answer_mode, "definition_list");
    }
}

use scraper::{Html, Selector};
use url::Url;

/// An outbound reference found in a document, resolved against the page's
/// final URL but not yet normalized.
#[derive(Debug, Clone)]
pub struct RawLink {
    pub url: Url,
    pub anchor_text: Option<String>,
}

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

/// Hrefs that can never become crawl targets.
fn is_skippable(href: &str) -> bool {
    href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
        || href.starts_with('#')
}

/// Enumerate `<a href>`, `<link href>` and `<iframe src>` references.
pub fn extract_links(html_str: &str, base_url: &Url) -> Vec<RawLink> {
    let document = Html::parse_document(html_str);
    let mut links = Vec::new();

    for (sel, attr, with_anchor) in [
        ("a[href]", "href", true),
        ("link[href]", "href", false),
        ("iframe[src]", "src", false),
    ] {
        let Some(sel) = selector(sel) else { continue };
        for el in document.select(&sel) {
            let Some(href) = el.value().attr(attr) else {
                continue;
            };
            let href = href.trim();
            if is_skippable(href) {
                continue;
            }
            let Ok(resolved) = base_url.join(href) else {
                continue;
            };
            let anchor_text = if with_anchor {
                let text = el.text().collect::<String>().trim().to_string();
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            } else {
                None
            };
            links.push(RawLink {
                url: resolved,
                anchor_text,
            });
        }
    }

    links
}

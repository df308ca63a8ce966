use url::Url;

use faqharvest_core::scope::contains_any_ci;
use faqharvest_core::Lineage;

/// Decides which depth budget a discovered link inherits.
#[derive(Debug, Clone)]
pub struct LinkClassifier {
    indicators: Vec<String>,
}

impl LinkClassifier {
    pub fn new(indicators: Vec<String>) -> Self {
        Self { indicators }
    }

    /// FAQ pages pass their lineage to every out-link; elsewhere a link is
    /// FAQ when its URL or anchor text matches an indicator.
    pub fn lineage_for(
        &self,
        page_lineage: Lineage,
        url: &Url,
        anchor_text: Option<&str>,
    ) -> Lineage {
        if page_lineage == Lineage::Faq {
            return Lineage::Faq;
        }
        if contains_any_ci(url.path(), &self.indicators) {
            return Lineage::Faq;
        }
        if let Some(anchor) = anchor_text {
            if contains_any_ci(anchor, &self.indicators) {
                return Lineage::Faq;
            }
        }
        Lineage::General
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> LinkClassifier {
        LinkClassifier::new(vec!["faq".into(), "frequently-asked".into()])
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn faq_pages_taint_every_out_link() {
        let lineage = classifier().lineage_for(
            Lineage::Faq,
            &url("https://example.com/pricing"),
            Some("See pricing"),
        );
        assert_eq!(lineage, Lineage::Faq);
    }

    #[test]
    fn url_path_indicator_marks_faq() {
        let lineage = classifier().lineage_for(
            Lineage::General,
            &url("https://example.com/faq/shipping"),
            None,
        );
        assert_eq!(lineage, Lineage::Faq);
    }

    #[test]
    fn anchor_text_indicator_marks_faq() {
        let lineage = classifier().lineage_for(
            Lineage::General,
            &url("https://example.com/help"),
            Some("Frequently-Asked Questions"),
        );
        assert_eq!(lineage, Lineage::Faq);
    }

    #[test]
    fn plain_links_stay_general() {
        let lineage = classifier().lineage_for(
            Lineage::General,
            &url("https://example.com/about"),
            Some("About us"),
        );
        assert_eq!(lineage, Lineage::General);
    }
}

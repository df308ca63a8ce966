use url::Url;

/// Why a raw href could not be turned into a canonical URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Unparseable,
    NoHost,
}

/// Normalization knobs that come from `[scope]` config.
#[derive(Debug, Clone, Default)]
pub struct NormalizePolicy {
    /// Exact query parameter names to drop. `utm_*` is always dropped.
    pub strip_params: Vec<String>,
}

impl NormalizePolicy {
    fn strips(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        lower.starts_with("utm_") || self.strip_params.iter().any(|p| p.eq_ignore_ascii_case(name))
    }
}

/// Canonicalize a raw URL reference, optionally relative to `base`.
///
/// Rules, in order: resolve against base; lowercase scheme/host and strip
/// default ports (url crate semantics); drop the fragment; drop stripped
/// query params; sort the remaining query pairs; collapse duplicate slashes
/// in the path; strip the trailing slash from non-root paths.
///
/// Idempotent: `normalize(normalize(u)) == normalize(u)`.
pub fn normalize(
    raw: &str,
    base: Option<&Url>,
    policy: &NormalizePolicy,
) -> Result<Url, RejectReason> {
    let mut url = match base {
        Some(base) => base.join(raw.trim()),
        None => Url::parse(raw.trim()),
    }
    .map_err(|_| RejectReason::Unparseable)?;

    if !url.has_host() {
        return Err(RejectReason::NoHost);
    }

    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !policy.strips(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }

    let path = collapse_slashes(url.path());
    let path = strip_trailing_slash(&path);
    url.set_path(&path);

    Ok(url)
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for ch in path.chars() {
        if ch == '/' && out.ends_with('/') {
            continue;
        }
        out.push(ch);
    }
    out
}

fn strip_trailing_slash(path: &str) -> String {
    if path.len() > 1 && path.ends_with('/') {
        path[..path.len() - 1].to_string()
    } else {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(raw: &str) -> String {
        normalize(raw, None, &NormalizePolicy::default())
            .unwrap()
            .to_string()
    }

    #[test]
    fn lowercases_and_strips_default_port() {
        assert_eq!(norm("HTTP://EXAMPLE.COM:80/A"), "http://example.com/A");
        assert_eq!(norm("https://Example.com:443/x"), "https://example.com/x");
    }

    #[test]
    fn drops_fragment_and_utm_params() {
        assert_eq!(
            norm("https://example.com/a?utm_source=x&q=1#top"),
            "https://example.com/a?q=1"
        );
    }

    #[test]
    fn sorts_query_pairs() {
        assert_eq!(
            norm("https://example.com/a?z=2&a=1&m=3"),
            "https://example.com/a?a=1&m=3&z=2"
        );
    }

    #[test]
    fn collapses_duplicate_slashes_and_trailing_slash() {
        assert_eq!(norm("https://example.com//a///b/"), "https://example.com/a/b");
        assert_eq!(norm("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn resolves_relative_against_base() {
        let base = Url::parse("https://example.com/dir/page.html").unwrap();
        let url = normalize("../faq/item", Some(&base), &NormalizePolicy::default()).unwrap();
        assert_eq!(url.to_string(), "https://example.com/faq/item");
    }

    #[test]
    fn strips_configured_deny_list_params() {
        let policy = NormalizePolicy {
            strip_params: vec!["gclid".into()],
        };
        let url = normalize("https://example.com/a?gclid=abc&q=1", None, &policy).unwrap();
        assert_eq!(url.to_string(), "https://example.com/a?q=1");
    }

    #[test]
    fn rejects_hostless_schemes() {
        assert_eq!(
            normalize("mailto:x@example.com", None, &NormalizePolicy::default()),
            Err(RejectReason::NoHost)
        );
    }

    #[test]
    fn is_idempotent() {
        let policy = NormalizePolicy {
            strip_params: vec!["fbclid".into()],
        };
        for raw in [
            "HTTP://Example.COM:80//a//b/?z=1&a=2&utm_campaign=x#frag",
            "https://example.com/faq/",
            "https://example.com/a?b=2&a=1",
        ] {
            let once = normalize(raw, None, &policy).unwrap();
            let twice = normalize(once.as_str(), None, &policy).unwrap();
            assert_eq!(once, twice);
        }
    }
}

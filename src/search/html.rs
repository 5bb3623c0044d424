//! HTML helpers: readable text extraction and detail-link discovery.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use super::ListingLink;

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script.*?</script>").expect("static regex"));
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style.*?</style>").expect("static regex"));
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static regex"));

/// Href shapes that usually point at a single item rather than a listing.
static ITEM_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // numeric id suffix: /item-12345, /product-123456
        r#"href=["']([^"']+/[a-zA-Z0-9_-]+-\d{4,}[^"']*)["']"#,
        // detail segments
        r#"href=["']([^"']*/(?:d|detail|item|view|show|product|article|post|ad|offer|oferta|anunt)/[^"']+)["']"#,
        // uppercase alphanumeric id: /X12345, /ABC123
        r#"href=["']([^"']+/[A-Z][A-Z0-9]{5,}[^"']*)["']"#,
        // slug plus id: /some-title-here-12345
        r#"href=["']([^"']+/[a-z0-9-]{10,}-\d{3,}[^"']*)["']"#,
        // slug .html
        r#"href=["']([^"']+/[a-z0-9-]{5,}\.html)["']"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static regex"))
    .collect()
});

const CATEGORY_INDICATORS: &[&str] = &[
    "/category/", "/categories/", "/tag/", "/tags/",
    "/search", "/results", "/browse", "/list",
    "/page/", "/p=", "page=", "pagina=",
    "/filter", "/sort", "/order",
    "/login", "/register", "/signup", "/account",
    "/contact", "/about", "/help", "/faq",
    "/terms", "/privacy", "/cookie",
];

/// Basic HTML entity decoding.
pub fn html_decode(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Extract readable text from HTML.
///
/// Drops scripts, styles and comments, replaces tags with spaces, decodes
/// common entities and collapses whitespace.
pub fn extract_text_from_html(html: &str) -> String {
    let text = SCRIPT_RE.replace_all(html, "");
    let text = STYLE_RE.replace_all(&text, "");
    let text = COMMENT_RE.replace_all(&text, "");
    let text = TAG_RE.replace_all(&text, " ");
    let text = html_decode(&text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether a URL looks like a category, search or navigation page.
pub fn is_likely_category_page(url: &str) -> bool {
    let lower = url.to_lowercase();
    if CATEGORY_INDICATORS.iter().any(|ind| lower.contains(ind)) {
        return true;
    }
    // many query parameters usually means a filtered listing
    url.matches('&').count() > 2
}

/// Readable title from the last path segment of a URL.
pub fn title_from_url(raw: &str) -> String {
    let Ok(parsed) = Url::parse(raw) else {
        return raw.to_string();
    };
    let last = parsed
        .path()
        .trim_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    if last.is_empty() {
        return raw.to_string();
    }
    last.trim_end_matches(".html").replace(['-', '_'], " ")
}

/// Find up to `max_links` same-host detail links in `html` fetched from `page_url`.
///
/// Root-relative hrefs are resolved against the page origin; other relative
/// hrefs are skipped.
pub fn extract_listing_links(html: &str, page_url: &str, max_links: usize) -> Vec<ListingLink> {
    let Ok(page) = Url::parse(page_url) else {
        return Vec::new();
    };
    let origin = format!("{}://{}", page.scheme(), page.host_str().unwrap_or_default());

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    if max_links == 0 {
        return links;
    }

    for pattern in ITEM_PATTERNS.iter() {
        for cap in pattern.captures_iter(html) {
            let href = &cap[1];
            let full = if href.starts_with('/') {
                format!("{}{}", origin, href)
            } else if href.starts_with("http") {
                href.to_string()
            } else {
                continue;
            };

            if seen.contains(&full) || is_likely_category_page(&full) {
                continue;
            }
            match Url::parse(&full) {
                Ok(link) if link.host_str() == page.host_str() => {}
                _ => continue,
            }

            seen.insert(full.clone());
            links.push(ListingLink {
                title: title_from_url(&full),
                url: full,
            });
            if links.len() >= max_links {
                return links;
            }
        }
    }
    links
}

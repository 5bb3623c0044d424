//! URL normalization for deduplication.

use ::url::Url;

const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_content",
    "utm_term",
    "fbclid",
    "gclid",
    "ref",
    "source",
];

/// Canonical form of `raw` used as the dedup key.
///
/// Drops tracking parameters, sorts the remaining ones by key and trims a
/// trailing slash from the path. Unparseable input only loses its trailing
/// slash.
///
/// # Property
/// `normalize_url(&normalize_url(u)) == normalize_url(u)`
pub fn normalize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return raw.strip_suffix('/').unwrap_or(raw).to_string();
    };

    let mut kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    kept.sort_by(|a, b| a.0.cmp(&b.0));

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracking_params_are_removed() {
        assert_eq!(
            normalize_url("http://x.com/a?utm_source=y"),
            normalize_url("http://x.com/a")
        );
        assert_eq!(
            normalize_url("https://shop.ro/p/123/?id=5&gclid=abc&ref=home"),
            "https://shop.ro/p/123?id=5"
        );
    }

    #[test]
    fn remaining_params_are_sorted() {
        assert_eq!(
            normalize_url("https://x.com/s?b=2&a=1"),
            normalize_url("https://x.com/s?a=1&b=2")
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "http://x.com/a/?utm_medium=m&z=1&y=2",
            "https://x.com/",
            "https://x.com/path//",
            "not a url/",
            "https://x.com/q?name=a%20b#frag",
        ] {
            let once = normalize_url(raw);
            assert_eq!(normalize_url(&once), once, "input {raw}");
        }
    }

    #[test]
    fn unparseable_input_drops_trailing_slash() {
        assert_eq!(normalize_url("relative/path/"), "relative/path");
    }
}

//! Shared utility functions used across the codebase.

/// Parse an environment variable as a boolean, returning `default` if unset.
///
/// Recognises `1`, `true`, `yes`, `y`, `on` (case-insensitive) as `true`;
/// everything else (including unset) maps to `false`.
pub fn env_var_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
        Err(_) => default,
    }
}

/// Largest index `<= max` that lies on a UTF-8 char boundary of `s`.
pub fn safe_truncate_index(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut idx = max;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Truncate `s` to at most `max` bytes without splitting a character.
pub fn truncate_str(s: &str, max: usize) -> &str {
    &s[..safe_truncate_index(s, max)]
}

/// Shorten a label for log output, appending `...` when cut.
pub fn truncate_label(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    format!("{}...", truncate_str(s, max.saturating_sub(3)))
}

/// Remove a leading `<think>...</think>` block emitted by reasoning models.
pub fn strip_think_tags(s: &str) -> String {
    let mut out = s;
    if out.contains("<think>") {
        if let Some(end) = out.find("</think>") {
            out = &out[end + "</think>".len()..];
        }
    }
    out.trim().to_string()
}

/// Clean a model response that is expected to contain a JSON document.
///
/// Strips reasoning blocks and Markdown code fences.
pub fn clean_json_response(s: &str) -> String {
    let s = strip_think_tags(s);
    let s = s.trim();
    let s = s.strip_prefix("```json").unwrap_or(s);
    let s = s.strip_prefix("```").unwrap_or(s);
    let s = s.strip_suffix("```").unwrap_or(s);
    s.trim().to_string()
}

//! Final report rendering and result files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::research::Source;

/// Directory used when no output path is given.
pub const RESULTS_DIR: &str = "results";

const MAX_FILENAME_TOPIC: usize = 50;

/// Append a numbered bibliography to `report`.
///
/// Sources are deduplicated by exact URL, keeping first occurrence order.
pub fn render_with_bibliography(report: &str, sources: &[Source]) -> String {
    let mut out = String::with_capacity(report.len() + sources.len() * 64);
    out.push_str(report);
    out.push_str("\n\n---\n\n## Bibliography\n\n");

    let mut seen = HashSet::new();
    let mut n = 0;
    for source in sources {
        if !seen.insert(source.url.as_str()) {
            continue;
        }
        n += 1;
        out.push_str(&format!("{}. [{}]({})\n", n, source.title, source.url));
    }
    out
}

/// Lowercase, replace anything outside `[a-z0-9]` with `_`, and cap the length.
pub fn sanitize_filename(topic: &str) -> String {
    let mut name: String = topic
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    name.truncate(MAX_FILENAME_TOPIC);
    name
}

/// `results/<YYYYMMDD_HHMMSS>_<topic>.md`
pub fn default_output_path(topic: &str, now: DateTime<Local>) -> PathBuf {
    Path::new(RESULTS_DIR).join(format!(
        "{}_{}.md",
        now.format("%Y%m%d_%H%M%S"),
        sanitize_filename(topic)
    ))
}

/// Write a rendered report, creating parent directories as needed.
pub fn write_report(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    tracing::info!("Report saved to {}", path.display());
    Ok(())
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use engine_logging::engine_info;
use inliner_engine::{decode_html, decode_webarchive, ResourceTable};
use url::Url;

const TERMINAL_ESCAPES: &[(&str, &str)] = &[
    ("\\ ", " "),
    ("\\(", "("),
    ("\\)", ")"),
    ("\\[", "["),
    ("\\]", "]"),
    ("\\&", "&"),
    ("\\;", ";"),
    ("\\'", "'"),
    ("\\?", "?"),
    ("\\|", "|"),
];

/// A page read from disk, ready for extraction.
#[derive(Debug)]
pub struct LoadedInput {
    pub path: PathBuf,
    pub html: String,
    pub base_url: Option<Url>,
    /// Embedded resources, present only for webarchive inputs.
    pub resources: Option<ResourceTable>,
}

/// Strips the quoting and backslash escapes a terminal adds to a dropped or pasted path.
pub fn normalize_local_path(raw: &str) -> String {
    let mut clean = raw.trim();
    for quote in ['"', '\''] {
        if clean.len() >= 2 && clean.starts_with(quote) && clean.ends_with(quote) {
            clean = &clean[1..clean.len() - 1];
            break;
        }
    }
    TERMINAL_ESCAPES
        .iter()
        .fold(clean.to_string(), |acc, (escaped, plain)| acc.replace(escaped, plain))
}

pub fn is_webarchive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("webarchive"))
}

pub fn load_input(raw_path: &str) -> Result<LoadedInput> {
    let normalized = normalize_local_path(raw_path);
    let path = std::path::absolute(&normalized)
        .with_context(|| format!("failed to resolve local file path {normalized:?}"))?;
    let bytes = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let file_url = Url::from_file_path(&path).ok();

    if is_webarchive(&path) {
        let archive = decode_webarchive(&bytes)
            .with_context(|| format!("failed to decode webarchive {}", path.display()))?;
        let base_url = archive.base_url().cloned().or(file_url);
        return Ok(LoadedInput {
            path,
            html: archive.main_html,
            base_url,
            resources: Some(archive.resources),
        });
    }

    let decoded = decode_html(&bytes, None)
        .with_context(|| format!("failed to decode {}", path.display()))?;
    engine_info!("read {} as {}", path.display(), decoded.encoding_label);
    Ok(LoadedInput {
        path,
        html: decoded.html,
        base_url: file_url,
        resources: None,
    })
}

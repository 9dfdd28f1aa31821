use sha2::{Digest, Sha256};

const MAX_STEM_LEN: usize = 120;

/// Filesystem-safe output name for an article: `{sanitized_title}.html`.
///
/// Without a usable title the name falls back to `untitled--{short_hash(source)}.html`
/// so that distinct untitled inputs do not overwrite each other.
pub fn output_filename(title: Option<&str>, source: &str) -> String {
    match title.map(sanitize_title).filter(|t| !t.is_empty()) {
        Some(stem) => format!("{stem}.html"),
        None => format!("untitled--{}.html", short_hash(source)),
    }
}

fn sanitize_title(input: &str) -> String {
    let mut collapsed = String::with_capacity(input.len());
    for word in input.split_whitespace() {
        if !collapsed.is_empty() {
            collapsed.push(' ');
        }
        collapsed.push_str(word);
    }
    let replaced: String = collapsed
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let mut stem = replaced.trim_matches(&['_', ' ', '.'][..]).to_string();

    if stem.len() > MAX_STEM_LEN {
        let cut = (0..=MAX_STEM_LEN)
            .rev()
            .find(|&idx| stem.is_char_boundary(idx))
            .unwrap_or(0);
        stem.truncate(cut);
        stem = stem.trim_end_matches(&['_', ' ', '.'][..]).to_string();
    }
    if is_reserved_windows_name(&stem) {
        stem.push('_');
    }
    stem
}

fn is_forbidden(c: char) -> bool {
    matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}')
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().take(4).map(|byte| format!("{byte:02x}")).collect()
}
